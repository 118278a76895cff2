//! Whole-document orchestration
//!
//! Pages are visited in document order. Each page is scanned, then erased,
//! then annotated. A scan failure only costs that page its redactions; any
//! other failure aborts the run, and because [`DocumentProcessor::process`]
//! serializes only after every page succeeded, no partial output escapes.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::annotator::PageAnnotator;
use crate::config::AnnotatorConfig;
use crate::document::{LopdfDocument, PageSink, PageSource};
use crate::error::GeezError;
use crate::font::FontResource;
use crate::numeral::MAX_ORDINAL;
use crate::report::{PageReport, ProcessOutput, ProcessReport, ScanFailure};

pub struct DocumentProcessor {
    annotator: PageAnnotator,
}

impl DocumentProcessor {
    pub fn new(font: Arc<FontResource>, config: AnnotatorConfig) -> Self {
        Self {
            annotator: PageAnnotator::new(config, font),
        }
    }

    /// Renumber a PDF given as bytes and return the new PDF.
    pub fn process(&self, input: &[u8]) -> Result<ProcessOutput, GeezError> {
        let start = Instant::now();
        let mut document = LopdfDocument::load(input)?;
        let mut report = self.annotate(&mut document)?;
        let data = document.save()?;

        report.input_size_bytes = input.len();
        report.output_size_bytes = data.len();
        report.processing_time_ms = start.elapsed().as_millis() as u64;
        info!(
            pages = report.page_count,
            redacted = report.redacted_fragments(),
            scan_failures = report.scan_failures.len(),
            elapsed_ms = report.processing_time_ms,
            "Renumbered document"
        );

        Ok(ProcessOutput { data, report })
    }

    /// Run the per-page pipeline over any page source/sink.
    pub fn annotate<D>(&self, document: &mut D) -> Result<ProcessReport, GeezError>
    where
        D: PageSource + PageSink,
    {
        let page_count = document.page_count();
        if i64::from(page_count) > MAX_ORDINAL {
            return Err(GeezError::InvalidArgument(format!(
                "document has {} pages, Ge'ez numbering supports at most {}",
                page_count, MAX_ORDINAL
            )));
        }

        let mut report = ProcessReport::new(page_count);
        for page in 1..=page_count {
            let size = document.page_size(page)?;
            let fragments = match document.text_fragments(page) {
                Ok(fragments) => fragments,
                Err(e) => {
                    warn!(page, error = %e, "Could not read page text, skipping redaction");
                    report.scan_failures.push(ScanFailure {
                        page,
                        reason: e.to_string(),
                    });
                    Vec::new()
                }
            };

            let plan = self.annotator.plan(page, size, &fragments)?;
            let erased = if plan.redactions.is_empty() {
                0
            } else {
                document.erase(page, &plan.redactions)?
            };
            document.insert_text(page, &plan.insertion)?;

            debug!(
                page,
                numeral = %plan.insertion.text,
                side = ?plan.side,
                candidates = plan.redactions.len(),
                erased,
                "Annotated page"
            );
            report.pages.push(PageReport {
                page,
                numeral: plan.insertion.text,
                side: plan.side,
                redacted_fragments: plan.redactions.len(),
                erased_operators: erased,
            });
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotator::{InsertionDirective, MarginSide, RedactionRegion};
    use crate::geometry::{PageSize, Rect};
    use crate::layout::TextFragment;
    use crate::testing::numeral_font;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Erase(u32, usize),
        Insert(u32, String),
    }

    /// In-memory pages with scripted failures.
    #[derive(Default)]
    struct FakeDocument {
        pages: Vec<Vec<TextFragment>>,
        unreadable: Vec<u32>,
        failing_insert: Option<u32>,
        calls: Vec<Call>,
    }

    impl PageSource for FakeDocument {
        fn page_count(&self) -> u32 {
            self.pages.len() as u32
        }

        fn page_size(&self, _page: u32) -> Result<PageSize, GeezError> {
            Ok(PageSize::new(612.0, 792.0))
        }

        fn text_fragments(&self, page: u32) -> Result<Vec<TextFragment>, GeezError> {
            if self.unreadable.contains(&page) {
                return Err(GeezError::scan(page, "broken content stream"));
            }
            Ok(self.pages[page as usize - 1].clone())
        }
    }

    impl PageSink for FakeDocument {
        fn erase(&mut self, page: u32, regions: &[RedactionRegion]) -> Result<usize, GeezError> {
            self.calls.push(Call::Erase(page, regions.len()));
            Ok(regions.len())
        }

        fn insert_text(&mut self, page: u32, directive: &InsertionDirective) -> Result<(), GeezError> {
            if self.failing_insert == Some(page) {
                return Err(GeezError::mutation(page, "sink refused"));
            }
            self.calls.push(Call::Insert(page, directive.text.clone()));
            Ok(())
        }
    }

    fn processor() -> DocumentProcessor {
        DocumentProcessor::new(numeral_font(), AnnotatorConfig::default())
    }

    fn corner_number(text: &str) -> TextFragment {
        TextFragment::new(Rect::new(540.0, 744.0, 545.0, 754.0), text)
    }

    #[test]
    fn test_erase_runs_before_insert_on_each_page() {
        let mut doc = FakeDocument {
            pages: vec![vec![corner_number("1")], vec![]],
            ..Default::default()
        };
        let report = processor().annotate(&mut doc).unwrap();
        assert_eq!(
            doc.calls,
            vec![
                Call::Erase(1, 1),
                Call::Insert(1, "፩".into()),
                Call::Insert(2, "፪".into()),
            ]
        );
        assert_eq!(report.page_count, 2);
        assert_eq!(report.pages[0].side, MarginSide::Right);
        assert_eq!(report.pages[1].side, MarginSide::Left);
        assert_eq!(report.redacted_fragments(), 1);
    }

    #[test]
    fn test_scan_failure_still_inserts_numeral() {
        let mut doc = FakeDocument {
            pages: vec![vec![corner_number("1")], vec![corner_number("2")]],
            unreadable: vec![1],
            ..Default::default()
        };
        let report = processor().annotate(&mut doc).unwrap();
        assert_eq!(
            doc.calls,
            vec![
                Call::Insert(1, "፩".into()),
                Call::Erase(2, 1),
                Call::Insert(2, "፪".into()),
            ]
        );
        assert_eq!(report.scan_failures.len(), 1);
        assert_eq!(report.scan_failures[0].page, 1);
    }

    #[test]
    fn test_mutation_failure_aborts_run() {
        let mut doc = FakeDocument {
            pages: vec![vec![], vec![], vec![]],
            failing_insert: Some(2),
            ..Default::default()
        };
        let err = processor().annotate(&mut doc).unwrap_err();
        assert!(matches!(err, GeezError::PageMutation { page: 2, .. }));
        // Page 3 is never reached
        assert_eq!(doc.calls, vec![Call::Insert(1, "፩".into())]);
    }

    #[test]
    fn test_too_many_pages_rejected_before_any_mutation() {
        let mut doc = FakeDocument {
            pages: vec![Vec::new(); 1000],
            ..Default::default()
        };
        let err = processor().annotate(&mut doc).unwrap_err();
        assert!(matches!(err, GeezError::InvalidArgument(_)));
        assert!(doc.calls.is_empty());
    }

    #[test]
    fn test_process_rejects_non_pdf_input() {
        assert!(matches!(
            processor().process(b"%PDF-garbage"),
            Err(GeezError::UnsupportedInput(_))
        ));
    }
}
