use crate::error::ExtractError;
use crate::extractor::{CanonicalContent, Extractor, Segment, MIME_CSV};

const DELIMITER_CANDIDATES: &[u8] = &[b',', b';', b'\t', b'|'];

/// Delimited text extraction with delimiter sniffing. Exports from
/// European ERP systems routinely use semicolons, so the delimiter is
/// picked by counting candidates on the first line instead of trusting
/// the MIME type's implied comma.
pub struct CsvExtractor;

impl CsvExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CsvExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or(&[]);
    DELIMITER_CANDIDATES
        .iter()
        .copied()
        .max_by_key(|d| first_line.iter().filter(|b| *b == d).count())
        .unwrap_or(b',')
}

impl Extractor for CsvExtractor {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn version(&self) -> &'static str {
        "1"
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &[MIME_CSV]
    }

    fn extract(&self, bytes: &[u8]) -> Result<CanonicalContent, ExtractError> {
        let delimiter = sniff_delimiter(bytes);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);

        let mut rows: Vec<Vec<String>> = Vec::new();
        for record in reader.records() {
            let record =
                record.map_err(|e| ExtractError::Csv(format!("Failed to parse CSV: {}", e)))?;
            rows.push(record.iter().map(|f| f.to_string()).collect());
        }

        if rows.is_empty() {
            return Err(ExtractError::Csv("File contains no records".to_string()));
        }

        let text = rows
            .iter()
            .map(|r| r.join("\t"))
            .collect::<Vec<_>>()
            .join("\n");
        let segments = vec![Segment {
            label: "sheet 1".to_string(),
            text,
        }];

        let content = CanonicalContent::from_segments(segments, Some(rows));
        tracing::debug!(
            delimiter = %(delimiter as char),
            rows = content.rows.as_ref().map(|r| r.len()).unwrap_or(0),
            "csv extracted"
        );
        Ok(content)
    }
}
