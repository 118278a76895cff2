//! Text geometry from page content streams
//!
//! Walks a decoded content stream with a minimal graphics/text state machine
//! and records, for every text-showing operator, the text it shows and the
//! page-space box its glyphs cover. Neighbouring operators on one baseline
//! are then grouped into [`TextFragment`]s.
//!
//! Glyph boxes use the font's advance widths horizontally and its
//! ascent/descent vertically. Text inside form XObjects is not visited.

use std::collections::HashMap;

use lopdf::content::Operation;
use lopdf::{Dictionary, Document, Object};
use serde::Serialize;

use crate::cmap::ToUnicodeMap;
use crate::geometry::{Matrix, PageBox, Point, Rect};

/// Advance width used when a font gives none, in glyph units per 1000.
const DEFAULT_GLYPH_WIDTH: f64 = 500.0;
const DEFAULT_ASCENT: f64 = 0.8;
const DEFAULT_DESCENT: f64 = -0.2;

/// A run of text and the page-space rectangle it occupies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextFragment {
    pub rect: Rect,
    pub text: String,
    /// Indices of the content stream operators that drew this text
    #[serde(skip)]
    pub operators: Vec<usize>,
}

impl TextFragment {
    pub fn new(rect: Rect, text: impl Into<String>) -> Self {
        Self {
            rect,
            text: text.into(),
            operators: Vec::new(),
        }
    }
}

/// What one text-showing operator put on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct ShownText {
    /// Index of the operator in the decoded content stream
    pub op_index: usize,
    /// Which `BT`/`ET` block the operator belongs to
    pub text_object: usize,
    pub text: String,
    /// Page-space box of every glyph shown
    pub rect: Rect,
    /// Page-space y of the first glyph's origin
    pub baseline: f64,
    /// Rendered font height in page units
    pub size: f64,
    /// Total horizontal displacement in unscaled text space
    pub advance: f64,
    /// Font size times horizontal scaling when the operator ran
    pub horizontal_scale: f64,
}

#[derive(Debug, Clone, PartialEq)]
enum Widths {
    Simple {
        first_char: u32,
        widths: Vec<f64>,
        missing: f64,
    },
    Composite {
        default: f64,
        widths: HashMap<u32, f64>,
    },
}

/// Per-font data needed to decode codes and size glyphs.
#[derive(Debug, Clone, PartialEq)]
pub struct FontMetrics {
    widths: Widths,
    to_unicode: Option<ToUnicodeMap>,
    ascent: f64,
    descent: f64,
    two_byte: bool,
}

impl Default for FontMetrics {
    fn default() -> Self {
        Self {
            widths: Widths::Simple {
                first_char: 0,
                widths: Vec::new(),
                missing: DEFAULT_GLYPH_WIDTH,
            },
            to_unicode: None,
            ascent: DEFAULT_ASCENT,
            descent: DEFAULT_DESCENT,
            two_byte: false,
        }
    }
}

impl FontMetrics {
    pub fn from_dict(doc: &Document, font: &Dictionary) -> Self {
        let mut metrics = FontMetrics::default();
        let is_type0 = name_of(font.get(b"Subtype").ok()) == Some(b"Type0".as_slice());

        metrics.to_unicode = font
            .get(b"ToUnicode")
            .ok()
            .and_then(|o| stream_bytes(doc, o))
            .map(|data| ToUnicodeMap::parse(&data));

        if is_type0 {
            metrics.two_byte = true;
            let descendant = font
                .get(b"DescendantFonts")
                .ok()
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_array().ok())
                .and_then(|arr| arr.first())
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_dict().ok());

            let mut default = 1000.0;
            let mut widths = HashMap::new();
            if let Some(cid_font) = descendant {
                if let Some(dw) = cid_font.get(b"DW").ok().and_then(number) {
                    default = dw;
                }
                if let Some(w) = cid_font
                    .get(b"W")
                    .ok()
                    .map(|o| resolve(doc, o))
                    .and_then(|o| o.as_array().ok())
                {
                    widths = parse_cid_widths(doc, w);
                }
                metrics.apply_descriptor(doc, cid_font);
            }
            metrics.widths = Widths::Composite { default, widths };
        } else {
            let base_font = name_of(font.get(b"BaseFont").ok()).unwrap_or_default();
            let mut missing = if base_font.windows(7).any(|w| w == b"Courier") {
                600.0
            } else {
                DEFAULT_GLYPH_WIDTH
            };
            if let Some(descriptor) = font
                .get(b"FontDescriptor")
                .ok()
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_dict().ok())
            {
                if let Some(mw) = descriptor.get(b"MissingWidth").ok().and_then(number) {
                    missing = mw;
                }
            }
            let first_char = font
                .get(b"FirstChar")
                .ok()
                .and_then(number)
                .map(|v| v.max(0.0) as u32)
                .unwrap_or(0);
            let widths = font
                .get(b"Widths")
                .ok()
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_array().ok())
                .map(|arr| {
                    arr.iter()
                        .map(|o| number(resolve(doc, o)).unwrap_or(missing))
                        .collect()
                })
                .unwrap_or_default();
            metrics.widths = Widths::Simple {
                first_char,
                widths,
                missing,
            };
            metrics.apply_descriptor(doc, font);
        }

        metrics
    }

    fn apply_descriptor(&mut self, doc: &Document, font: &Dictionary) {
        let Some(descriptor) = font
            .get(b"FontDescriptor")
            .ok()
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_dict().ok())
        else {
            return;
        };
        let ascent = descriptor.get(b"Ascent").ok().and_then(number);
        let descent = descriptor.get(b"Descent").ok().and_then(number);
        // Some producers write zeros; keep the defaults then.
        if let (Some(a), Some(d)) = (ascent, descent) {
            if a > d && a != 0.0 {
                self.ascent = a / 1000.0;
                self.descent = d.min(0.0) / 1000.0;
            }
        }
    }

    fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        let width = if self.two_byte { 2 } else { 1 };
        bytes
            .chunks(width)
            .map(|chunk| chunk.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)))
            .collect()
    }

    /// Advance width of a code as a fraction of the font size.
    fn width(&self, code: u32) -> f64 {
        let units = match &self.widths {
            Widths::Simple {
                first_char,
                widths,
                missing,
            } => code
                .checked_sub(*first_char)
                .and_then(|i| widths.get(i as usize))
                .copied()
                .unwrap_or(*missing),
            Widths::Composite { default, widths } => {
                widths.get(&code).copied().unwrap_or(*default)
            }
        };
        units / 1000.0
    }

    fn decode(&self, code: u32) -> String {
        if let Some(text) = self.to_unicode.as_ref().and_then(|m| m.get(code)) {
            return text.to_string();
        }
        if self.two_byte {
            char::REPLACEMENT_CHARACTER.to_string()
        } else {
            // Latin-1 agrees with WinAnsi and Standard encodings on digits and letters.
            char::from(code as u8).to_string()
        }
    }
}

/// Fonts available to a page, keyed by resource name.
#[derive(Debug, Clone, Default)]
pub struct PageFonts {
    fonts: HashMap<Vec<u8>, FontMetrics>,
}

impl PageFonts {
    pub fn from_resources(doc: &Document, resources: Option<&Dictionary>) -> Self {
        let mut fonts = HashMap::new();
        let font_dict = resources
            .and_then(|r| r.get(b"Font").ok())
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_dict().ok());
        if let Some(font_dict) = font_dict {
            for (name, value) in font_dict.iter() {
                if let Ok(dict) = resolve(doc, value).as_dict() {
                    fonts.insert(name.clone(), FontMetrics::from_dict(doc, dict));
                }
            }
        }
        Self { fonts }
    }

    fn get(&self, name: &[u8]) -> Option<&FontMetrics> {
        self.fonts.get(name)
    }
}

#[derive(Debug, Clone)]
struct TextState {
    font: Option<Vec<u8>>,
    size: f64,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scaling: f64,
    leading: f64,
    rise: f64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: None,
            size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct GraphicsState {
    ctm: Matrix,
    text: TextState,
}

/// Replays a content stream and reports where text landed.
pub struct TextScanner<'a> {
    fonts: &'a PageFonts,
    page_box: PageBox,
    fallback: FontMetrics,
}

impl<'a> TextScanner<'a> {
    pub fn new(fonts: &'a PageFonts, page_box: PageBox) -> Self {
        Self {
            fonts,
            page_box,
            fallback: FontMetrics::default(),
        }
    }

    pub fn scan(&self, operations: &[Operation]) -> Vec<ShownText> {
        let mut shown = Vec::new();
        let mut stack: Vec<GraphicsState> = Vec::new();
        let mut gs = GraphicsState::default();
        let mut tm = Matrix::identity();
        let mut tlm = Matrix::identity();
        let mut text_object = 0usize;

        for (op_index, op) in operations.iter().enumerate() {
            let args = &op.operands;
            match op.operator.as_str() {
                "q" => stack.push(gs.clone()),
                "Q" => {
                    if let Some(saved) = stack.pop() {
                        gs = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix_operand(args) {
                        gs.ctm = m.multiply(&gs.ctm);
                    }
                }
                "BT" => {
                    tm = Matrix::identity();
                    tlm = Matrix::identity();
                    text_object += 1;
                }
                "Tf" => {
                    gs.text.font = args.first().and_then(|o| o.as_name().ok()).map(<[u8]>::to_vec);
                    if let Some(size) = arg(args, 1) {
                        gs.text.size = size;
                    }
                }
                "Tc" => set_if_some(&mut gs.text.char_spacing, arg(args, 0)),
                "Tw" => set_if_some(&mut gs.text.word_spacing, arg(args, 0)),
                "Tz" => {
                    if let Some(scale) = arg(args, 0) {
                        gs.text.horizontal_scaling = scale / 100.0;
                    }
                }
                "TL" => set_if_some(&mut gs.text.leading, arg(args, 0)),
                "Ts" => set_if_some(&mut gs.text.rise, arg(args, 0)),
                "Td" | "TD" => {
                    if let (Some(tx), Some(ty)) = (arg(args, 0), arg(args, 1)) {
                        if op.operator == "TD" {
                            gs.text.leading = -ty;
                        }
                        tlm = Matrix::translation(tx, ty).multiply(&tlm);
                        tm = tlm;
                    }
                }
                "Tm" => {
                    if let Some(m) = matrix_operand(args) {
                        tlm = m;
                        tm = m;
                    }
                }
                "T*" => {
                    tlm = Matrix::translation(0.0, -gs.text.leading).multiply(&tlm);
                    tm = tlm;
                }
                "Tj" | "TJ" | "'" | "\"" => {
                    let shown_arg = match op.operator.as_str() {
                        "'" => args.first(),
                        "\"" => {
                            set_if_some(&mut gs.text.word_spacing, arg(args, 0));
                            set_if_some(&mut gs.text.char_spacing, arg(args, 1));
                            args.get(2)
                        }
                        _ => args.first(),
                    };
                    if matches!(op.operator.as_str(), "'" | "\"") {
                        tlm = Matrix::translation(0.0, -gs.text.leading).multiply(&tlm);
                        tm = tlm;
                    }
                    if let Some(operand) = shown_arg {
                        if let Some(run) = self.show(operand, &gs, &mut tm) {
                            shown.push(ShownText {
                                op_index,
                                text_object,
                                ..run
                            });
                        }
                    }
                }
                _ => {}
            }
        }

        shown
    }

    /// Lay out one string or `TJ` array, advancing the text matrix.
    fn show(&self, operand: &Object, gs: &GraphicsState, tm: &mut Matrix) -> Option<ShownText> {
        let ts = &gs.text;
        let font = ts
            .font
            .as_deref()
            .and_then(|name| self.fonts.get(name))
            .unwrap_or(&self.fallback);
        let scale = ts.size * ts.horizontal_scaling;

        let mut text = String::new();
        let mut corners: Vec<Point> = Vec::new();
        let mut origin: Option<(Point, f64)> = None;
        let mut advance = 0.0;

        let mut show_string = |bytes: &[u8], tm: &mut Matrix, advance: &mut f64| {
            for code in font.codes(bytes) {
                let w0 = font.width(code);
                let trm = Matrix::new(scale, 0.0, 0.0, ts.size, 0.0, ts.rise)
                    .multiply(tm)
                    .multiply(&gs.ctm);
                if origin.is_none() {
                    let o = trm.transform(0.0, 0.0);
                    let up = trm.transform(0.0, 1.0);
                    origin = Some((o, (up.x - o.x).hypot(up.y - o.y)));
                }
                for (gx, gy) in [
                    (0.0, font.descent),
                    (w0, font.descent),
                    (0.0, font.ascent),
                    (w0, font.ascent),
                ] {
                    corners.push(trm.transform(gx, gy));
                }
                text.push_str(&font.decode(code));

                let word_spacing = if !font.two_byte && code == 32 {
                    ts.word_spacing
                } else {
                    0.0
                };
                let tx = (w0 * ts.size + ts.char_spacing + word_spacing) * ts.horizontal_scaling;
                *tm = Matrix::translation(tx, 0.0).multiply(tm);
                *advance += tx;
            }
        };

        match operand {
            Object::String(bytes, _) => show_string(bytes, tm, &mut advance),
            Object::Array(items) => {
                for item in items {
                    match item {
                        Object::String(bytes, _) => show_string(bytes, tm, &mut advance),
                        other => {
                            if let Some(n) = number(other) {
                                let tx = -n / 1000.0 * scale;
                                *tm = Matrix::translation(tx, 0.0).multiply(tm);
                                advance += tx;
                            }
                        }
                    }
                }
            }
            _ => return None,
        }

        let (origin, size) = origin?;
        let rect = Rect::bounding(corners.into_iter().map(|p| self.page_box.to_page_space(p)))?;
        Some(ShownText {
            op_index: 0,
            text_object: 0,
            text,
            rect,
            baseline: self.page_box.to_page_space(origin).y,
            size,
            advance,
            horizontal_scale: scale,
        })
    }
}

/// Merge operators that continue one another on the same baseline.
pub fn group_fragments(shown: &[ShownText]) -> Vec<TextFragment> {
    let mut fragments = Vec::new();
    let mut current: Option<(TextFragment, &ShownText)> = None;

    for item in shown {
        if let Some((fragment, last)) = current.as_mut() {
            let size = last.size.max(item.size).max(1.0);
            let gap = item.rect.x0 - fragment.rect.x1;
            let continues = last.text_object == item.text_object
                && (last.baseline - item.baseline).abs() <= size * 0.5
                && gap.abs() <= size;
            if continues {
                if gap > size * 0.25
                    && !fragment.text.ends_with(char::is_whitespace)
                    && !item.text.starts_with(char::is_whitespace)
                {
                    fragment.text.push(' ');
                }
                fragment.text.push_str(&item.text);
                fragment.rect = fragment.rect.union(&item.rect);
                fragment.operators.push(item.op_index);
                *last = item;
                continue;
            }
        }
        if let Some((done, _)) = current.take() {
            fragments.push(done);
        }
        let mut fragment = TextFragment::new(item.rect, item.text.clone());
        fragment.operators.push(item.op_index);
        current = Some((fragment, item));
    }
    if let Some((done, _)) = current {
        fragments.push(done);
    }

    fragments
}

/// Number of `q` operators still open at the end of `operations`.
pub fn unclosed_saves(operations: &[Operation]) -> usize {
    operations
        .iter()
        .fold(0usize, |depth, op| match op.operator.as_str() {
            "q" => depth + 1,
            "Q" => depth.saturating_sub(1),
            _ => depth,
        })
}

pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    let mut current = obj;
    // Bounded so a reference cycle cannot spin forever.
    for _ in 0..16 {
        match current {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(target) => current = target,
                Err(_) => return current,
            },
            _ => return current,
        }
    }
    current
}

pub(crate) fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// Decoded bytes of a (possibly referenced) stream.
pub(crate) fn stream_bytes(doc: &Document, obj: &Object) -> Option<Vec<u8>> {
    let stream = resolve(doc, obj).as_stream().ok()?;
    if stream.dict.has(b"Filter") {
        stream.decompressed_content().ok()
    } else {
        Some(stream.content.clone())
    }
}

fn name_of(obj: Option<&Object>) -> Option<&[u8]> {
    match obj {
        Some(Object::Name(name)) => Some(name.as_slice()),
        _ => None,
    }
}

fn arg(args: &[Object], index: usize) -> Option<f64> {
    args.get(index).and_then(number)
}

fn set_if_some(target: &mut f64, value: Option<f64>) {
    if let Some(v) = value {
        *target = v;
    }
}

fn matrix_operand(args: &[Object]) -> Option<Matrix> {
    if args.len() < 6 {
        return None;
    }
    Some(Matrix::new(
        arg(args, 0)?,
        arg(args, 1)?,
        arg(args, 2)?,
        arg(args, 3)?,
        arg(args, 4)?,
        arg(args, 5)?,
    ))
}

/// `/W` array: `c [w1 w2 ...]` or `c_first c_last w`.
fn parse_cid_widths(doc: &Document, w: &[Object]) -> HashMap<u32, f64> {
    let mut widths = HashMap::new();
    let mut i = 0;
    while i < w.len() {
        let Some(first) = number(resolve(doc, &w[i])) else {
            break;
        };
        let first = first.max(0.0) as u32;
        match w.get(i + 1).map(|o| resolve(doc, o)) {
            Some(Object::Array(list)) => {
                for (offset, value) in list.iter().enumerate() {
                    if let Some(width) = number(resolve(doc, value)) {
                        widths.insert(first + offset as u32, width);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let (Some(last), Some(width)) =
                    (number(last), w.get(i + 2).and_then(|o| number(resolve(doc, o))))
                else {
                    break;
                };
                let last = last.max(0.0) as u32;
                // Clamp absurd ranges from broken files.
                for cid in first..=last.min(first.saturating_add(0xFFFF)) {
                    widths.insert(cid, width);
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}


#[cfg(test)]
mod proptests {
    use super::*;
    use lopdf::content::Content;
    use proptest::prelude::*;

    proptest! {
        /// Property: scanning never panics on whatever operations decode
        #[test]
        fn scan_never_panics(input in prop::collection::vec(any::<u8>(), 0..300)) {
            if let Ok(content) = Content::decode(&input) {
                let fonts = PageFonts::default();
                let shown = TextScanner::new(&fonts, PageBox::LETTER).scan(&content.operations);
                let _ = group_fragments(&shown);
            }
        }

        /// Property: a single digit run lands where Td put it
        #[test]
        fn td_position_is_honoured(x in 0u32..600, y in 0u32..780, digits in "[0-9]{1,3}") {
            let content = format!("BT /F1 10 Tf {} {} Td ({}) Tj ET", x, y, digits);
            let ops = Content::decode(content.as_bytes()).unwrap().operations;
            let fonts = PageFonts::default();
            let shown = TextScanner::new(&fonts, PageBox::LETTER).scan(&ops);
            prop_assert_eq!(shown.len(), 1);
            prop_assert!((shown[0].rect.x0 - f64::from(x)).abs() < 1e-6);
            prop_assert!((shown[0].baseline - (792.0 - f64::from(y))).abs() < 1e-6);
            prop_assert_eq!(&shown[0].text, &digits);
        }
    }
}
