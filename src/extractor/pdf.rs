use crate::error::ExtractError;
use crate::extractor::{CanonicalContent, Extractor, Segment, MIME_PDF};

/// Text-layer PDF extraction via lopdf. Scanned PDFs without a text
/// layer come back with empty pages and a low coverage ratio; operators
/// read that ratio off the Document record.
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn version(&self) -> &'static str {
        "1"
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &[MIME_PDF]
    }

    fn extract(&self, bytes: &[u8]) -> Result<CanonicalContent, ExtractError> {
        let doc = lopdf::Document::load_mem(bytes)
            .map_err(|e| ExtractError::Pdf(format!("Failed to load PDF: {}", e)))?;

        let mut segments = Vec::new();
        for (page_num, _) in doc.get_pages() {
            let text = doc.extract_text(&[page_num]).unwrap_or_default();
            segments.push(Segment {
                label: format!("page {}", page_num),
                text,
            });
        }

        if segments.is_empty() {
            return Err(ExtractError::Pdf("PDF contains no pages".to_string()));
        }

        let content = CanonicalContent::from_segments(segments, None);
        tracing::debug!(
            pages = content.page_count(),
            coverage = content.text_coverage,
            "pdf extracted"
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a minimal single-page PDF containing the given text.
    pub(crate) fn minimal_pdf(text: &str) -> Vec<u8> {
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.new_object_id();
        let resources_id = doc.new_object_id();
        let content_id = doc.new_object_id();
        let page_id = doc.new_object_id();

        doc.objects.insert(
            font_id,
            Object::Dictionary(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Courier",
            }),
        );

        doc.objects.insert(
            resources_id,
            Object::Dictionary(dictionary! {
                "Font" => dictionary! {
                    "F1" => font_id,
                },
            }),
        );

        let content = format!("BT /F1 12 Tf 50 700 Td ({}) Tj ET", text);
        let content_stream = Stream::new(dictionary! {}, content.into_bytes());
        doc.objects
            .insert(content_id, Object::Stream(content_stream));

        doc.objects.insert(
            page_id,
            Object::Dictionary(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => resources_id,
                "Contents" => content_id,
            }),
        );

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut pdf_bytes = Vec::new();
        doc.save_to(&mut pdf_bytes).unwrap();
        pdf_bytes
    }

    #[test]
    fn test_extracts_embedded_text() {
        let bytes = minimal_pdf("Order 4711 for Acme GmbH");
        let extractor = PdfExtractor::new();

        let content = extractor.extract(&bytes).unwrap();
        assert!(content.text.contains("Order 4711"));
        assert_eq!(content.page_count(), 1);
        assert_eq!(content.segments[0].label, "page 1");
        assert!(content.rows.is_none());
        assert!(content.text_coverage > 0.99);
    }

    #[test]
    fn test_corrupt_pdf_fails_with_cause() {
        let extractor = PdfExtractor::new();
        let result = extractor.extract(b"not a valid pdf");

        match result {
            Err(ExtractError::Pdf(msg)) => {
                assert!(msg.contains("Failed to load PDF"), "{}", msg);
            }
            other => panic!("Expected Pdf error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_error_code_is_stable() {
        let err = ExtractError::Pdf("x".to_string());
        assert_eq!(err.code(), "extraction_failed");
        let err = ExtractError::UnsupportedFormat("x".to_string());
        assert_eq!(err.code(), "unsupported_format");
    }
}
