//! Document extraction: MIME-dispatched extractors producing a canonical
//! text/table representation.
//!
//! The registry is an explicitly constructed object owned by the
//! orchestrator's startup path — no process-wide singleton. Exactly one
//! extractor is registered per MIME type; re-registration replaces the
//! prior entry.

pub mod csv;
pub mod excel;
pub mod pdf;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ExtractError;

/// A page or sheet of extracted text, carrying provenance.
#[derive(Debug, Clone)]
pub struct Segment {
    /// "page 1", "sheet Orders", ...
    pub label: String,
    pub text: String,
}

/// Canonical intermediate representation shared by all extractors.
#[derive(Debug, Clone)]
pub struct CanonicalContent {
    /// Full concatenated text.
    pub text: String,
    /// Per-page / per-sheet provenance.
    pub segments: Vec<Segment>,
    /// Tabular rows when the source is natively tabular (CSV/XLSX).
    pub rows: Option<Vec<Vec<String>>>,
    /// Fraction of segments that yielded non-blank text. A low ratio on
    /// a PDF usually means a scanned document without a text layer.
    pub text_coverage: f64,
}

impl CanonicalContent {
    pub fn page_count(&self) -> usize {
        self.segments.len()
    }

    /// True when the source is known-tabular; feeds the fingerprint's
    /// table flag so the text heuristic doesn't have to guess.
    pub fn is_tabular(&self) -> bool {
        self.rows.is_some()
    }

    pub(crate) fn from_segments(segments: Vec<Segment>, rows: Option<Vec<Vec<String>>>) -> Self {
        let covered = segments
            .iter()
            .filter(|s| !s.text.trim().is_empty())
            .count();
        let text_coverage = if segments.is_empty() {
            0.0
        } else {
            covered as f64 / segments.len() as f64
        };
        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            text,
            segments,
            rows,
            text_coverage,
        }
    }
}

/// One document format behind the registry.
pub trait Extractor: Send + Sync {
    /// Extractor identifier recorded on the ExtractionRun, e.g. "pdf".
    fn name(&self) -> &'static str;

    /// Version recorded alongside the name; bumped when output changes.
    fn version(&self) -> &'static str;

    /// MIME types this extractor handles.
    fn mime_types(&self) -> &'static [&'static str];

    fn extract(&self, bytes: &[u8]) -> Result<CanonicalContent, ExtractError>;
}

/// MIME-keyed extractor dispatch.
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Empty registry; callers register what they need.
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// Registry with the built-in PDF, XLSX and CSV extractors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(pdf::PdfExtractor::new()));
        registry.register(Arc::new(excel::ExcelExtractor::new()));
        registry.register(Arc::new(csv::CsvExtractor::new()));
        registry
    }

    /// Registers an extractor for all its MIME types, replacing any
    /// prior registration.
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        for mime in extractor.mime_types() {
            if self
                .extractors
                .insert(mime.to_string(), Arc::clone(&extractor))
                .is_some()
            {
                tracing::debug!(mime, name = extractor.name(), "extractor replaced");
            }
        }
    }

    pub fn lookup(&self, mime_type: &str) -> Result<&Arc<dyn Extractor>, ExtractError> {
        self.extractors
            .get(mime_type)
            .ok_or_else(|| ExtractError::UnsupportedFormat(mime_type.to_string()))
    }

    pub fn supports(&self, mime_type: &str) -> bool {
        self.extractors.contains_key(mime_type)
    }

    /// Dispatches to the extractor registered for `mime_type`.
    pub fn extract(
        &self,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<CanonicalContent, ExtractError> {
        let extractor = self.lookup(mime_type)?;
        let _span =
            tracing::info_span!("extract", extractor = extractor.name(), mime = mime_type)
                .entered();
        extractor.extract(bytes)
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_XLSX: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_CSV: &str = "text/csv";

#[cfg(test)]
mod tests {
    use super::*;

    struct StubExtractor {
        name: &'static str,
        mimes: &'static [&'static str],
    }

    impl Extractor for StubExtractor {
        fn name(&self) -> &'static str {
            self.name
        }
        fn version(&self) -> &'static str {
            "0"
        }
        fn mime_types(&self) -> &'static [&'static str] {
            self.mimes
        }
        fn extract(&self, _bytes: &[u8]) -> Result<CanonicalContent, ExtractError> {
            Ok(CanonicalContent::from_segments(
                vec![Segment {
                    label: "page 1".to_string(),
                    text: format!("from {}", self.name),
                }],
                None,
            ))
        }
    }

    #[test]
    fn test_defaults_cover_three_formats() {
        let registry = ExtractorRegistry::with_defaults();
        assert!(registry.supports(MIME_PDF));
        assert!(registry.supports(MIME_XLSX));
        assert!(registry.supports(MIME_CSV));
        assert!(!registry.supports("application/msword"));
    }

    #[test]
    fn test_unsupported_mime_errors() {
        let registry = ExtractorRegistry::with_defaults();
        let result = registry.extract(b"data", "application/x-unknown");
        match result {
            Err(ExtractError::UnsupportedFormat(mime)) => {
                assert_eq!(mime, "application/x-unknown");
            }
            other => panic!("Expected UnsupportedFormat, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_reregistration_replaces_prior_entry() {
        let mut registry = ExtractorRegistry::new();
        registry.register(Arc::new(StubExtractor {
            name: "first",
            mimes: &["text/x-test"],
        }));
        registry.register(Arc::new(StubExtractor {
            name: "second",
            mimes: &["text/x-test"],
        }));

        let content = registry.extract(b"", "text/x-test").unwrap();
        assert_eq!(content.text, "from second");
    }

    #[test]
    fn test_coverage_ratio() {
        let content = CanonicalContent::from_segments(
            vec![
                Segment {
                    label: "page 1".to_string(),
                    text: "text".to_string(),
                },
                Segment {
                    label: "page 2".to_string(),
                    text: "   ".to_string(),
                },
            ],
            None,
        );
        assert_eq!(content.page_count(), 2);
        assert!((content.text_coverage - 0.5).abs() < f64::EPSILON);
    }
}
