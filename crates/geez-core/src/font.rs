//! The TrueType font used to draw Ge'ez numerals
//!
//! The font is parsed once, checked for every numeral glyph, and embedded
//! into a document as a Type0 font with Identity-H encoding so content
//! streams address glyphs directly by glyph id. A generated ToUnicode CMap
//! keeps the inserted numerals extractable as text.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;
use ttf_parser::Face;

use crate::error::GeezError;
use crate::numeral::numeral_glyphs;

const FALLBACK_NAME: &str = "GeezNumerals";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Glyph {
    id: u16,
    /// Advance width in font units
    advance: u16,
}

pub struct FontResource {
    name: String,
    data: Vec<u8>,
    units_per_em: u16,
    ascender: i16,
    descender: i16,
    bbox: [i16; 4],
    glyphs: BTreeMap<char, Glyph>,
}

impl fmt::Debug for FontResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontResource")
            .field("name", &self.name)
            .field("data_len", &self.data.len())
            .field("units_per_em", &self.units_per_em)
            .field("glyphs", &self.glyphs.len())
            .finish()
    }
}

impl FontResource {
    /// Parse a TrueType font and require a glyph for every Ge'ez numeral.
    pub fn from_bytes(name: &str, data: Vec<u8>) -> Result<Self, GeezError> {
        let face = Face::parse(&data, 0)
            .map_err(|e| GeezError::FontLoad(format!("{}: {}", name, e)))?;

        let mut glyphs = BTreeMap::new();
        for ch in numeral_glyphs() {
            let id = face.glyph_index(ch).ok_or_else(|| {
                GeezError::FontLoad(format!(
                    "{} has no glyph for U+{:04X} ({})",
                    name, ch as u32, ch
                ))
            })?;
            let advance = face.glyph_hor_advance(id).unwrap_or(0);
            glyphs.insert(ch, Glyph { id: id.0, advance });
        }

        let bbox = face.global_bounding_box();
        let font = Self {
            name: pdf_font_name(name),
            units_per_em: face.units_per_em(),
            ascender: face.ascender(),
            descender: face.descender(),
            bbox: [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max],
            glyphs,
            data,
        };
        debug!(font = %font.name, glyphs = font.glyphs.len(), "Loaded numeral font");
        Ok(font)
    }

    /// Read a font file; the file stem becomes the font name.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, GeezError> {
        let path = path.as_ref();
        let data = fs::read(path)
            .map_err(|e| GeezError::FontLoad(format!("{}: {}", path.display(), e)))?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(FALLBACK_NAME);
        Self::from_bytes(name, data)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity-H bytes for `text`: two big-endian bytes per glyph id.
    /// `None` if any character has no glyph in this font.
    pub fn encode(&self, text: &str) -> Option<Vec<u8>> {
        let mut bytes = Vec::with_capacity(text.len() * 2);
        for ch in text.chars() {
            let glyph = self.glyphs.get(&ch)?;
            bytes.extend_from_slice(&glyph.id.to_be_bytes());
        }
        Some(bytes)
    }

    /// Font units to the 1000-unit glyph space PDF uses for metrics.
    fn to_pdf_units(&self, value: i32) -> f64 {
        f64::from(value) * 1000.0 / f64::from(self.units_per_em.max(1))
    }

    fn pdf_int(&self, value: i32) -> Object {
        Object::Integer(self.to_pdf_units(value).round() as i64)
    }

    /// Add the font program and its dictionaries to `doc`, returning the Type0 font id.
    pub fn embed(&self, doc: &mut Document) -> ObjectId {
        let font_file = Stream::new(
            dictionary! { "Length1" => Object::Integer(self.data.len() as i64) },
            self.data.clone(),
        );
        let font_file_id = doc.add_object(font_file);

        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => Object::Name(self.name.as_bytes().to_vec()),
            "Flags" => Object::Integer(4),
            "FontBBox" => Object::Array(
                self.bbox.iter().map(|v| self.pdf_int(i32::from(*v))).collect()
            ),
            "ItalicAngle" => Object::Integer(0),
            "Ascent" => self.pdf_int(i32::from(self.ascender)),
            "Descent" => self.pdf_int(i32::from(self.descender)),
            "CapHeight" => self.pdf_int(i32::from(self.ascender)),
            "StemV" => Object::Integer(80),
            "FontFile2" => Object::Reference(font_file_id),
        });

        let cid_font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => Object::Name(self.name.as_bytes().to_vec()),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => Object::Integer(0),
            },
            "FontDescriptor" => Object::Reference(descriptor_id),
            "DW" => Object::Integer(1000),
            "W" => self.widths_array(),
            "CIDToGIDMap" => "Identity",
        });

        let to_unicode_id = doc.add_object(Stream::new(
            dictionary! {},
            self.to_unicode_cmap().into_bytes(),
        ));

        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => Object::Name(self.name.as_bytes().to_vec()),
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(cid_font_id)],
            "ToUnicode" => Object::Reference(to_unicode_id),
        })
    }

    /// `/W` entries in the `cid [w]` form, one per numeral glyph.
    fn widths_array(&self) -> Object {
        let mut by_gid: Vec<&Glyph> = self.glyphs.values().collect();
        by_gid.sort_by_key(|g| g.id);
        by_gid.dedup_by_key(|g| g.id);

        let mut entries = Vec::with_capacity(by_gid.len() * 2);
        for glyph in by_gid {
            entries.push(Object::Integer(i64::from(glyph.id)));
            entries.push(Object::Array(vec![self.pdf_int(i32::from(glyph.advance))]));
        }
        Object::Array(entries)
    }

    fn to_unicode_cmap(&self) -> String {
        let mut mappings: Vec<(u16, char)> =
            self.glyphs.iter().map(|(ch, g)| (g.id, *ch)).collect();
        mappings.sort_by_key(|(gid, _)| *gid);

        let mut cmap = String::new();
        cmap.push_str("/CIDInit /ProcSet findresource begin\n");
        cmap.push_str("12 dict begin\n");
        cmap.push_str("begincmap\n");
        cmap.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
        cmap.push_str("/CMapName /Adobe-Identity-UCS def\n");
        cmap.push_str("/CMapType 2 def\n");
        cmap.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");

        // At most 100 entries per bfchar block
        for chunk in mappings.chunks(100) {
            cmap.push_str(&format!("{} beginbfchar\n", chunk.len()));
            for (gid, ch) in chunk {
                let mut units = [0u16; 2];
                let dst: String = ch
                    .encode_utf16(&mut units)
                    .iter()
                    .map(|u| format!("{:04X}", u))
                    .collect();
                cmap.push_str(&format!("<{:04X}> <{}>\n", gid, dst));
            }
            cmap.push_str("endbfchar\n");
        }

        cmap.push_str("endcmap\n");
        cmap.push_str("CMapName currentdict /CMap defineresource pop\n");
        cmap.push_str("end\nend\n");
        cmap
    }
}

/// PDF names for fonts keep to ASCII letters, digits and hyphens.
fn pdf_font_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned
    }
}
