//! Ge'ez page numbering for PDFs
//!
//! Finds Western-Arabic page numbers printed near the bottom corners of each
//! page, erases them, and draws the page's ordinal as a Ge'ez numeral in the
//! outer margin: right on odd pages, left on even pages.
//!
//! The pipeline:
//! - [`layout`] reads text geometry out of content streams
//! - [`annotator`] decides what to erase and where the numeral goes
//! - [`document`] applies those decisions to a lopdf working copy
//! - [`processor`] walks the pages and serializes the result once

pub mod annotator;
pub mod cmap;
pub mod config;
pub mod document;
pub mod error;
pub mod font;
pub mod geometry;
pub mod layout;
pub mod numeral;
pub mod processor;
pub mod redact;
pub mod report;

#[cfg(test)]
mod testing;

pub use annotator::{
    is_page_number_text, margin_side, InsertionDirective, MarginSide, PageAnnotator, PagePlan,
    RedactionRegion,
};
pub use config::AnnotatorConfig;
pub use document::{LopdfDocument, PageSink, PageSource};
pub use error::GeezError;
pub use font::FontResource;
pub use geometry::{Color, PageSize, Point, Rect};
pub use layout::TextFragment;
pub use numeral::{to_geez, MAX_ORDINAL};
pub use processor::DocumentProcessor;
pub use report::{PageReport, ProcessOutput, ProcessReport, ScanFailure};

/// Parse PDF bytes and return the page count.
pub fn get_page_count(bytes: &[u8]) -> Result<u32, GeezError> {
    LopdfDocument::load(bytes).map(|doc| doc.page_count())
}
