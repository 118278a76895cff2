use serde::Serialize;

use crate::annotator::MarginSide;

/// Result of a successful run: the new document and what was done to it.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub data: Vec<u8>,
    pub report: ProcessReport,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessReport {
    pub page_count: u32,
    pub pages: Vec<PageReport>,
    /// Pages whose text could not be read; each still got its numeral
    pub scan_failures: Vec<ScanFailure>,
    pub input_size_bytes: usize,
    pub output_size_bytes: usize,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageReport {
    pub page: u32,
    pub numeral: String,
    pub side: MarginSide,
    /// Fragments judged to be old page numbers
    pub redacted_fragments: usize,
    /// Text operators removed from the content stream
    pub erased_operators: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanFailure {
    pub page: u32,
    pub reason: String,
}

impl ProcessReport {
    pub fn new(page_count: u32) -> Self {
        Self {
            page_count,
            ..Default::default()
        }
    }

    pub fn redacted_fragments(&self) -> usize {
        self.pages.iter().map(|p| p.redacted_fragments).sum()
    }

    pub fn erased_operators(&self) -> usize {
        self.pages.iter().map(|p| p.erased_operators).sum()
    }
}
