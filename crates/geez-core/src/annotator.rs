//! Per-page decisions: which fragments are old page numbers and where the
//! Ge'ez numeral goes.
//!
//! Everything here is pure. The annotator sees page sizes and text fragments
//! and returns plans; applying them to a document is [`crate::document`]'s job.

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::config::AnnotatorConfig;
use crate::error::GeezError;
use crate::font::FontResource;
use crate::geometry::{Color, PageSize, Point, Rect};
use crate::layout::TextFragment;
use crate::numeral::to_geez;

lazy_static! {
    static ref PAGE_NUMBER: Regex = Regex::new(r"^\d{1,3}$").unwrap();
}

/// True when `text`, ignoring surrounding whitespace, is one to three digits.
pub fn is_page_number_text(text: &str) -> bool {
    PAGE_NUMBER.is_match(text.trim())
}

/// Outer margin a page number sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginSide {
    Left,
    Right,
}

/// Odd pages are recto (outer margin right), even pages verso.
pub fn margin_side(page_number: u32) -> MarginSide {
    if page_number % 2 == 1 {
        MarginSide::Right
    } else {
        MarginSide::Left
    }
}

/// An area to paint over after the text in it is removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedactionRegion {
    pub rect: Rect,
    pub fill: Color,
    /// Content stream operators that drew the text being removed. When
    /// empty, text lying wholly inside `rect` is removed instead.
    #[serde(skip)]
    pub operators: Vec<usize>,
}

/// Text to draw with its baseline origin at `anchor` (page space).
#[derive(Debug, Clone)]
pub struct InsertionDirective {
    pub anchor: Point,
    pub text: String,
    pub font: Arc<FontResource>,
    pub font_size: f64,
    pub color: Color,
}

#[derive(Debug, Clone)]
pub struct PagePlan {
    pub page_number: u32,
    pub side: MarginSide,
    pub redactions: Vec<RedactionRegion>,
    pub insertion: InsertionDirective,
}

pub struct PageAnnotator {
    config: AnnotatorConfig,
    font: Arc<FontResource>,
}

impl PageAnnotator {
    pub fn new(config: AnnotatorConfig, font: Arc<FontResource>) -> Self {
        Self { config, font }
    }

    /// Whether a fragment looks like an old page number: in the bottom band,
    /// near a side edge when the edge gate is on, and one to three digits.
    pub fn is_candidate(&self, size: PageSize, fragment: &TextFragment) -> bool {
        let detection = &self.config.detection;
        if fragment.rect.y0 <= size.height - detection.margin_depth {
            return false;
        }
        if detection.edge_gate {
            let near_left = fragment.rect.x0 < detection.edge_threshold;
            let near_right = fragment.rect.x1 > size.width - detection.edge_threshold;
            if !near_left && !near_right {
                return false;
            }
        }
        is_page_number_text(&fragment.text)
    }

    /// Regions covering every candidate fragment, in fragment order.
    pub fn find_candidates(&self, size: PageSize, fragments: &[TextFragment]) -> Vec<RedactionRegion> {
        fragments
            .iter()
            .filter(|f| self.is_candidate(size, f))
            .map(|f| RedactionRegion {
                rect: f.rect,
                fill: self.config.redaction.fill,
                operators: f.operators.clone(),
            })
            .collect()
    }

    /// Where and what to draw for a 1-based page number.
    pub fn placement(&self, page_number: u32, size: PageSize) -> Result<InsertionDirective, GeezError> {
        let placement = &self.config.placement;
        let text = to_geez(i64::from(page_number))?;
        let x = match margin_side(page_number) {
            MarginSide::Right => size.width - placement.outer_right_inset,
            MarginSide::Left => placement.outer_left_inset,
        };
        Ok(InsertionDirective {
            anchor: Point::new(x, size.height - placement.bottom_offset),
            text,
            font: Arc::clone(&self.font),
            font_size: placement.font_size,
            color: placement.color,
        })
    }

    pub fn plan(
        &self,
        page_number: u32,
        size: PageSize,
        fragments: &[TextFragment],
    ) -> Result<PagePlan, GeezError> {
        Ok(PagePlan {
            page_number,
            side: margin_side(page_number),
            redactions: self.find_candidates(size, fragments),
            insertion: self.placement(page_number, size)?,
        })
    }
}
