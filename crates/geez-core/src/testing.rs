//! Fixtures shared by unit tests: a tiny numeral font and small PDFs.

use std::sync::Arc;

use lopdf::{dictionary, Dictionary, Document, Object, Stream};

use crate::font::FontResource;

/// Glyph count of the test font: `.notdef` plus U+1369..=U+137C.
const NUM_GLYPHS: u16 = 20;

/// A minimal TrueType font mapping U+1369.. to glyph ids 1.., every glyph 600 units wide.
pub(crate) fn numeral_font_bytes() -> Vec<u8> {
    let mut cmap = Vec::new();
    cmap.extend_from_slice(&0u16.to_be_bytes()); // version
    cmap.extend_from_slice(&1u16.to_be_bytes()); // numTables
    cmap.extend_from_slice(&3u16.to_be_bytes()); // platform: Windows
    cmap.extend_from_slice(&10u16.to_be_bytes()); // encoding: full Unicode
    cmap.extend_from_slice(&12u32.to_be_bytes()); // subtable offset
    cmap.extend_from_slice(&12u16.to_be_bytes()); // format 12
    cmap.extend_from_slice(&0u16.to_be_bytes());
    cmap.extend_from_slice(&28u32.to_be_bytes()); // subtable length
    cmap.extend_from_slice(&0u32.to_be_bytes()); // language
    cmap.extend_from_slice(&1u32.to_be_bytes()); // one group
    cmap.extend_from_slice(&0x1369u32.to_be_bytes());
    cmap.extend_from_slice(&(0x1369u32 + u32::from(NUM_GLYPHS) - 2).to_be_bytes());
    cmap.extend_from_slice(&1u32.to_be_bytes());

    let mut head = Vec::new();
    head.extend_from_slice(&0x0001_0000u32.to_be_bytes()); // version
    head.extend_from_slice(&0x0001_0000u32.to_be_bytes()); // fontRevision
    head.extend_from_slice(&0u32.to_be_bytes()); // checkSumAdjustment
    head.extend_from_slice(&0x5F0F_3CF5u32.to_be_bytes()); // magic
    head.extend_from_slice(&0u16.to_be_bytes()); // flags
    head.extend_from_slice(&1000u16.to_be_bytes()); // unitsPerEm
    head.extend_from_slice(&[0u8; 16]); // created, modified
    for v in [0i16, -200, 1000, 800] {
        head.extend_from_slice(&v.to_be_bytes()); // bbox
    }
    head.extend_from_slice(&0u16.to_be_bytes()); // macStyle
    head.extend_from_slice(&8u16.to_be_bytes()); // lowestRecPPEM
    head.extend_from_slice(&2i16.to_be_bytes()); // fontDirectionHint
    head.extend_from_slice(&0i16.to_be_bytes()); // indexToLocFormat
    head.extend_from_slice(&0i16.to_be_bytes()); // glyphDataFormat

    let mut hhea = Vec::new();
    hhea.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    for v in [800i16, -200, 0] {
        hhea.extend_from_slice(&v.to_be_bytes()); // ascender, descender, lineGap
    }
    hhea.extend_from_slice(&600u16.to_be_bytes()); // advanceWidthMax
    for v in [0i16, 0, 600, 1, 0, 0, 0, 0, 0, 0, 0] {
        hhea.extend_from_slice(&v.to_be_bytes());
    }
    hhea.extend_from_slice(&NUM_GLYPHS.to_be_bytes()); // numberOfHMetrics

    let mut hmtx = Vec::new();
    for _ in 0..NUM_GLYPHS {
        hmtx.extend_from_slice(&600u16.to_be_bytes());
        hmtx.extend_from_slice(&0i16.to_be_bytes());
    }

    let mut maxp = Vec::new();
    maxp.extend_from_slice(&0x0000_5000u32.to_be_bytes());
    maxp.extend_from_slice(&NUM_GLYPHS.to_be_bytes());

    // Table records must be sorted by tag.
    let tables: [(&[u8; 4], Vec<u8>); 5] = [
        (b"cmap", cmap),
        (b"head", head),
        (b"hhea", hhea),
        (b"hmtx", hmtx),
        (b"maxp", maxp),
    ];

    let mut font = Vec::new();
    font.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    font.extend_from_slice(&(tables.len() as u16).to_be_bytes());
    font.extend_from_slice(&64u16.to_be_bytes()); // searchRange
    font.extend_from_slice(&2u16.to_be_bytes()); // entrySelector
    font.extend_from_slice(&16u16.to_be_bytes()); // rangeShift

    let mut offset = 12 + 16 * tables.len();
    let mut body = Vec::new();
    for (tag, data) in &tables {
        font.extend_from_slice(*tag);
        font.extend_from_slice(&0u32.to_be_bytes()); // checksum, unchecked by parsers
        font.extend_from_slice(&(offset as u32).to_be_bytes());
        font.extend_from_slice(&(data.len() as u32).to_be_bytes());
        body.extend_from_slice(data);
        while body.len() % 4 != 0 {
            body.push(0);
        }
        offset = 12 + 16 * tables.len() + body.len();
    }
    font.extend_from_slice(&body);
    font
}

pub(crate) fn numeral_font() -> Arc<FontResource> {
    Arc::new(FontResource::from_bytes("TestNumerals", numeral_font_bytes()).unwrap())
}

/// Content that shows each `(x, y, text)` in user space with `/F1` at 10pt.
pub(crate) fn text_content(items: &[(f64, f64, &str)]) -> Vec<u8> {
    items
        .iter()
        .map(|(x, y, text)| format!("BT /F1 10 Tf {} {} Td ({}) Tj ET\n", x, y, text))
        .collect::<String>()
        .into_bytes()
}

/// A US Letter document with one page per content buffer.
pub(crate) fn build_pdf(contents: &[Vec<u8>]) -> Vec<u8> {
    build(contents, false)
}

/// Like [`build_pdf`], but the font resources live on the page tree root.
pub(crate) fn build_pdf_inherited_resources(contents: &[Vec<u8>]) -> Vec<u8> {
    build(contents, true)
}

fn build(contents: &[Vec<u8>], inherited: bool) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources = dictionary! {
        "Font" => dictionary! { "F1" => Object::Reference(font_id) },
    };

    let mut page_ids = Vec::new();
    for content in contents {
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.clone()));
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
            "Contents" => Object::Reference(content_id),
        };
        if !inherited {
            page.set("Resources", resources.clone());
        }
        page_ids.push(doc.add_object(page));
    }

    let mut pages = dictionary! {
        "Type" => "Pages",
        "Count" => Object::Integer(page_ids.len() as i64),
        "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
    };
    if inherited {
        pages.set("Resources", resources);
    }
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}
