//! Page query and mutation over a lopdf document
//!
//! [`PageSource`] and [`PageSink`] are the two seams the processor drives.
//! [`LopdfDocument`] implements both on an in-memory working copy: nothing
//! reaches the caller until [`LopdfDocument::save`] serializes the whole
//! document, so a failed run leaves no partial output behind.

use std::collections::HashMap;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::debug;

use crate::annotator::{InsertionDirective, RedactionRegion};
use crate::error::GeezError;
use crate::font::FontResource;
use crate::geometry::{PageBox, PageSize};
use crate::layout::{
    group_fragments, number, resolve, unclosed_saves, PageFonts, ShownText, TextFragment,
    TextScanner,
};
use crate::redact::{erase_text, fill_operations, real};

/// Resource name prefix for the embedded numeral font.
const FONT_RESOURCE_PREFIX: &str = "FGeez";

/// Limit on `/Parent` hops when resolving inherited page attributes.
const MAX_TREE_DEPTH: usize = 32;

/// Read access to pages, numbered from 1.
pub trait PageSource {
    fn page_count(&self) -> u32;

    fn page_size(&self, page: u32) -> Result<PageSize, GeezError>;

    fn text_fragments(&self, page: u32) -> Result<Vec<TextFragment>, GeezError>;
}

/// Write access to pages, numbered from 1.
pub trait PageSink {
    /// Remove text under `regions` and paint them over. Returns the number
    /// of text operators removed. A failure leaves the page unchanged.
    fn erase(&mut self, page: u32, regions: &[RedactionRegion]) -> Result<usize, GeezError>;

    fn insert_text(&mut self, page: u32, directive: &InsertionDirective) -> Result<(), GeezError>;
}

struct ScannedPage {
    id: ObjectId,
    page_box: PageBox,
    operations: Vec<Operation>,
    shown: Vec<ShownText>,
}

pub struct LopdfDocument {
    doc: Document,
    pages: Vec<ObjectId>,
    /// Type0 font objects already added, by font name
    embedded_fonts: HashMap<String, ObjectId>,
}

impl LopdfDocument {
    pub fn load(bytes: &[u8]) -> Result<Self, GeezError> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| GeezError::UnsupportedInput(format!("Failed to parse PDF: {}", e)))?;
        Self::from_document(doc)
    }

    pub fn from_document(doc: Document) -> Result<Self, GeezError> {
        if doc.trailer.get(b"Encrypt").is_ok() {
            return Err(GeezError::UnsupportedInput(
                "encrypted documents are not supported".into(),
            ));
        }
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if pages.is_empty() {
            return Err(GeezError::UnsupportedInput("document has no pages".into()));
        }
        Ok(Self {
            doc,
            pages,
            embedded_fonts: HashMap::new(),
        })
    }

    /// Serialize the working copy. Objects orphaned by rewritten content are dropped.
    pub fn save(mut self) -> Result<Vec<u8>, GeezError> {
        self.doc.prune_objects();
        self.doc.compress();
        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| GeezError::Serialization(e.to_string()))?;
        Ok(buffer)
    }

    fn page_id(&self, page: u32) -> Result<ObjectId, GeezError> {
        page.checked_sub(1)
            .and_then(|index| self.pages.get(index as usize))
            .copied()
            .ok_or_else(|| {
                GeezError::InvalidArgument(format!(
                    "page {} is outside 1..={}",
                    page,
                    self.pages.len()
                ))
            })
    }

    /// Look up a page attribute, walking up the page tree for inheritable keys.
    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut node = self.doc.get_dictionary(page_id).ok()?;
        for _ in 0..MAX_TREE_DEPTH {
            if let Ok(value) = node.get(key) {
                return Some(resolve(&self.doc, value));
            }
            let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
            node = self.doc.get_dictionary(parent).ok()?;
        }
        None
    }

    fn page_box(&self, page_id: ObjectId) -> PageBox {
        [b"CropBox".as_slice(), b"MediaBox".as_slice()]
            .iter()
            .find_map(|key| {
                self.inherited(page_id, key)
                    .and_then(|obj| parse_box(&self.doc, obj))
            })
            .unwrap_or(PageBox::LETTER)
    }

    fn scan_page(&self, page: u32) -> Result<ScannedPage, GeezError> {
        let id = self.page_id(page)?;
        let page_box = self.page_box(id);
        let content = self
            .doc
            .get_page_content(id)
            .map_err(|e| GeezError::scan(page, e))?;
        let operations = Content::decode(&content)
            .map_err(|e| GeezError::scan(page, e))?
            .operations;
        let resources = self
            .inherited(id, b"Resources")
            .and_then(|obj| obj.as_dict().ok());
        let fonts = PageFonts::from_resources(&self.doc, resources);
        let shown = TextScanner::new(&fonts, page_box).scan(&operations);
        Ok(ScannedPage {
            id,
            page_box,
            operations,
            shown,
        })
    }

    /// Content stream ids of a page in drawing order.
    fn content_ids(&self, page_id: ObjectId) -> Vec<ObjectId> {
        let Ok(page) = self.doc.get_dictionary(page_id) else {
            return Vec::new();
        };
        let references = |items: &[Object]| -> Vec<ObjectId> {
            items.iter().filter_map(|o| o.as_reference().ok()).collect()
        };
        match page.get(b"Contents") {
            Ok(Object::Reference(id)) => match self.doc.get_object(*id) {
                Ok(Object::Array(items)) => references(items),
                _ => vec![*id],
            },
            Ok(Object::Array(items)) => references(items),
            _ => Vec::new(),
        }
    }

    fn set_contents(&mut self, page: u32, page_id: ObjectId, ids: Vec<ObjectId>) -> Result<(), GeezError> {
        let page_dict = self
            .doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| GeezError::mutation(page, e))?;
        page_dict.set(
            "Contents",
            Object::Array(ids.into_iter().map(Object::Reference).collect()),
        );
        Ok(())
    }

    fn add_content(&mut self, page: u32, operations: Vec<Operation>) -> Result<ObjectId, GeezError> {
        let encoded = Content { operations }
            .encode()
            .map_err(|e| GeezError::mutation(page, e))?;
        // Leading newline so concatenation with a neighbouring stream never fuses tokens.
        let mut bytes = Vec::with_capacity(encoded.len() + 1);
        bytes.push(b'\n');
        bytes.extend(encoded);
        Ok(self.doc.add_object(Stream::new(Dictionary::new(), bytes)))
    }

    /// `q` operators the page's content leaves open. Unreadable content counts as balanced.
    fn open_saves(&self, page_id: ObjectId) -> usize {
        self.doc
            .get_page_content(page_id)
            .ok()
            .and_then(|content| Content::decode(&content).ok())
            .map(|content| unclosed_saves(&content.operations))
            .unwrap_or(0)
    }

    /// The Type0 font object for `font`, embedding it on first use.
    fn embedded_font(&mut self, font: &FontResource) -> ObjectId {
        if let Some(id) = self.embedded_fonts.get(font.name()) {
            return *id;
        }
        let id = font.embed(&mut self.doc);
        debug!(font = font.name(), ?id, "Embedded numeral font");
        self.embedded_fonts.insert(font.name().to_string(), id);
        id
    }

    /// A copy of the page's effective resources with `font_id` listed under
    /// a name that does not clash with existing fonts.
    fn resources_with_font(&self, page_id: ObjectId, font_id: ObjectId) -> (Dictionary, String) {
        let mut resources = self
            .inherited(page_id, b"Resources")
            .and_then(|obj| obj.as_dict().ok())
            .cloned()
            .unwrap_or_default();
        let mut fonts = resources
            .get(b"Font")
            .ok()
            .map(|obj| resolve(&self.doc, obj))
            .and_then(|obj| obj.as_dict().ok())
            .cloned()
            .unwrap_or_default();

        let existing = fonts
            .iter()
            .find(|(_, value)| matches!(value, Object::Reference(id) if *id == font_id))
            .map(|(name, _)| String::from_utf8_lossy(name).into_owned());
        let name = match existing {
            Some(name) => name,
            None => {
                let mut index = 0;
                let name = loop {
                    let candidate = if index == 0 {
                        FONT_RESOURCE_PREFIX.to_string()
                    } else {
                        format!("{}{}", FONT_RESOURCE_PREFIX, index)
                    };
                    if !fonts.has(candidate.as_bytes()) {
                        break candidate;
                    }
                    index += 1;
                };
                fonts.set(name.clone(), Object::Reference(font_id));
                name
            }
        };

        resources.set("Font", Object::Dictionary(fonts));
        (resources, name)
    }
}

impl PageSource for LopdfDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_size(&self, page: u32) -> Result<PageSize, GeezError> {
        let id = self.page_id(page)?;
        Ok(self.page_box(id).size())
    }

    fn text_fragments(&self, page: u32) -> Result<Vec<TextFragment>, GeezError> {
        let scanned = self.scan_page(page)?;
        Ok(group_fragments(&scanned.shown))
    }
}

impl PageSink for LopdfDocument {
    fn erase(&mut self, page: u32, regions: &[RedactionRegion]) -> Result<usize, GeezError> {
        if regions.is_empty() {
            return Ok(0);
        }
        let scanned = self
            .scan_page(page)
            .map_err(|e| GeezError::mutation(page, e))?;
        let (operations, erased) = erase_text(scanned.operations, &scanned.shown, regions);

        // Existing content runs inside q/Q so its graphics state stays out of the fills.
        let open = unclosed_saves(&operations);
        let mut rewritten = Vec::with_capacity(operations.len() + open + 2 + regions.len() * 3 + 2);
        rewritten.push(Operation::new("q", vec![]));
        rewritten.extend(operations);
        rewritten.extend(restore_operations(open + 1));
        rewritten.extend(fill_operations(regions, &scanned.page_box));

        let content_id = self.add_content(page, rewritten)?;
        self.set_contents(page, scanned.id, vec![content_id])?;
        debug!(page, regions = regions.len(), erased, "Erased margin text");
        Ok(erased)
    }

    fn insert_text(&mut self, page: u32, directive: &InsertionDirective) -> Result<(), GeezError> {
        let page_id = self.page_id(page)?;
        let glyphs = directive.font.encode(&directive.text).ok_or_else(|| {
            GeezError::mutation(
                page,
                format!("font {} cannot render {:?}", directive.font.name(), directive.text),
            )
        })?;
        let page_box = self.page_box(page_id);
        let origin = page_box.to_user_space(directive.anchor);

        let font_id = self.embedded_font(&directive.font);
        let (resources, resource_name) = self.resources_with_font(page_id, font_id);

        let open = self.open_saves(page_id);
        let color = directive.color;
        let mut overlay = restore_operations(open + 1);
        overlay.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![
                    Object::Name(resource_name.into_bytes()),
                    real(directive.font_size),
                ],
            ),
            Operation::new("rg", vec![real(color.0), real(color.1), real(color.2)]),
            Operation::new("Td", vec![real(origin.x), real(origin.y)]),
            Operation::new(
                "Tj",
                vec![Object::String(glyphs, StringFormat::Hexadecimal)],
            ),
            Operation::new("ET", vec![]),
        ]);
        let save_id = self.add_content(page, vec![Operation::new("q", vec![])])?;
        let overlay_id = self.add_content(page, overlay)?;

        let mut contents = vec![save_id];
        contents.extend(self.content_ids(page_id));
        contents.push(overlay_id);
        self.set_contents(page, page_id, contents)?;

        let page_dict = self
            .doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| GeezError::mutation(page, e))?;
        page_dict.set("Resources", Object::Dictionary(resources));

        debug!(page, text = %directive.text, x = origin.x, y = origin.y, "Inserted numeral");
        Ok(())
    }
}

fn restore_operations(count: usize) -> Vec<Operation> {
    (0..count).map(|_| Operation::new("Q", vec![])).collect()
}

fn parse_box(doc: &Document, obj: &Object) -> Option<PageBox> {
    let items = obj.as_array().ok()?;
    if items.len() != 4 {
        return None;
    }
    let values: Vec<f64> = items
        .iter()
        .filter_map(|o| number(resolve(doc, o)))
        .collect();
    let [x0, y0, x1, y1] = values[..] else {
        return None;
    };
    let page_box = PageBox::new(x0, y0, x1, y1);
    let size = page_box.size();
    (size.width > 0.0 && size.height > 0.0).then_some(page_box)
}
