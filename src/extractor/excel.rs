use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::ExtractError;
use crate::extractor::{CanonicalContent, Extractor, Segment, MIME_XLSX};

/// OOXML workbook (.xlsx) extraction: shared strings plus streamed
/// worksheet XML. Legacy binary .xls is not handled; register a separate
/// extractor for it if ever needed.
pub struct ExcelExtractor;

impl ExcelExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ExcelExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for ExcelExtractor {
    fn name(&self) -> &'static str {
        "excel"
    }

    fn version(&self) -> &'static str {
        "1"
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &[MIME_XLSX]
    }

    fn extract(&self, bytes: &[u8]) -> Result<CanonicalContent, ExtractError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| ExtractError::Excel(format!("Failed to open workbook: {}", e)))?;

        let shared_strings = read_shared_strings(&mut archive)?;
        let sheet_names = read_sheet_names(&mut archive)?;

        // Worksheet parts carry a numeric suffix (sheet1.xml, sheet2.xml,
        // ...). A plain string sort puts sheet10 before sheet2 and detaches
        // the labels from their content, so order by the parsed ordinal.
        let mut sheet_files: Vec<String> = (0..archive.len())
            .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
            .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
            .collect();
        sheet_files.sort_by_key(|n| (sheet_ordinal(n), n.clone()));

        if sheet_files.is_empty() {
            return Err(ExtractError::Excel(
                "Workbook contains no worksheets".to_string(),
            ));
        }

        let mut segments = Vec::new();
        let mut all_rows = Vec::new();

        for (index, file_name) in sheet_files.iter().enumerate() {
            let mut xml = String::new();
            archive
                .by_name(file_name)
                .map_err(|e| ExtractError::Excel(format!("Failed to read {}: {}", file_name, e)))?
                .read_to_string(&mut xml)
                .map_err(|e| ExtractError::Excel(format!("Failed to read {}: {}", file_name, e)))?;

            let rows = parse_sheet_xml(&xml, &shared_strings)?;
            let label = sheet_names
                .get(index)
                .map(|n| format!("sheet {}", n))
                .unwrap_or_else(|| format!("sheet {}", index + 1));
            let text = rows
                .iter()
                .map(|r| r.join("\t"))
                .collect::<Vec<_>>()
                .join("\n");

            segments.push(Segment { label, text });
            all_rows.extend(rows);
        }

        let content = CanonicalContent::from_segments(segments, Some(all_rows));
        tracing::debug!(
            sheets = content.page_count(),
            rows = content.rows.as_ref().map(|r| r.len()).unwrap_or(0),
            "workbook extracted"
        );
        Ok(content)
    }
}

/// Numeric position of a worksheet part; unparseable names sort last.
fn sheet_ordinal(part: &str) -> u32 {
    part.strip_prefix("xl/worksheets/sheet")
        .and_then(|s| s.strip_suffix(".xml"))
        .and_then(|s| s.parse().ok())
        .unwrap_or(u32::MAX)
}

fn read_shared_strings<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<Vec<String>, ExtractError> {
    let mut xml = String::new();
    match archive.by_name("xl/sharedStrings.xml") {
        Ok(mut file) => {
            file.read_to_string(&mut xml).map_err(|e| {
                ExtractError::Excel(format!("Failed to read shared strings: {}", e))
            })?;
        }
        // Optional part; workbooks using only inline/numeric cells omit it.
        Err(_) => return Ok(vec![]),
    }

    let mut reader = Reader::from_str(&xml);
    reader.config_mut().trim_text(false);

    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_si = false;
    let mut in_t = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    if in_si {
                        strings.push(current.clone());
                        in_si = false;
                    }
                }
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_si && in_t {
                    current.push_str(&e.decode().unwrap_or_default());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractError::Excel(format!(
                    "Shared strings XML error: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(strings)
}

fn read_sheet_names<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<Vec<String>, ExtractError> {
    let mut xml = String::new();
    match archive.by_name("xl/workbook.xml") {
        Ok(mut file) => {
            file.read_to_string(&mut xml)
                .map_err(|e| ExtractError::Excel(format!("Failed to read workbook.xml: {}", e)))?;
        }
        Err(_) => return Ok(vec![]),
    }

    let mut reader = Reader::from_str(&xml);
    let mut names = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"sheet" {
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"name" {
                            names.push(String::from_utf8_lossy(&attr.value).to_string());
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractError::Excel(format!("Workbook XML error: {}", e)));
            }
            _ => {}
        }
    }

    Ok(names)
}

/// Streams one worksheet's XML into rows of cell strings. Handles
/// shared-string (`t="s"`), inline-string and plain value cells.
fn parse_sheet_xml(xml: &str, shared: &[String]) -> Result<Vec<Vec<String>>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut in_row = false;
    let mut in_value = false;
    let mut in_inline_t = false;
    let mut cell_is_shared = false;
    let mut cell_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"row" => {
                    in_row = true;
                    row.clear();
                }
                b"c" => {
                    cell_is_shared = false;
                    cell_text.clear();
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"t" && attr.value.as_ref() == b"s" {
                            cell_is_shared = true;
                        }
                    }
                }
                b"v" => in_value = true,
                b"t" => in_inline_t = true,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"row" => {
                    if in_row {
                        rows.push(row.clone());
                        in_row = false;
                    }
                }
                b"c" => {
                    let value = if cell_is_shared {
                        cell_text
                            .trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared.get(i).cloned())
                            .unwrap_or_default()
                    } else {
                        cell_text.clone()
                    };
                    row.push(value);
                }
                b"v" => in_value = false,
                b"t" => in_inline_t = false,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_value || in_inline_t {
                    cell_text.push_str(&e.decode().unwrap_or_default());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractError::Excel(format!("Worksheet XML error: {}", e)));
            }
            _ => {}
        }
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    /// Builds a minimal .xlsx archive with one sheet of the given rows.
    pub(crate) fn minimal_xlsx(sheet_name: &str, rows: &[&[&str]]) -> Vec<u8> {
        let mut shared: Vec<String> = Vec::new();
        let mut sheet_xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
        );
        for (r, cells) in rows.iter().enumerate() {
            sheet_xml.push_str(&format!("<row r=\"{}\">", r + 1));
            for cell in cells.iter() {
                if cell.parse::<f64>().is_ok() {
                    sheet_xml.push_str(&format!("<c><v>{}</v></c>", cell));
                } else {
                    let idx = shared.len();
                    shared.push(cell.to_string());
                    sheet_xml.push_str(&format!("<c t=\"s\"><v>{}</v></c>", idx));
                }
            }
            sheet_xml.push_str("</row>");
        }
        sheet_xml.push_str("</sheetData></worksheet>");

        let mut shared_xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        );
        for s in &shared {
            shared_xml.push_str(&format!("<si><t>{}</t></si>", s));
        }
        shared_xml.push_str("</sst>");

        let workbook_xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheets><sheet name="{}" sheetId="1"/></sheets></workbook>"#,
            sheet_name
        );

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        writer.start_file("xl/workbook.xml", options).unwrap();
        writer.write_all(workbook_xml.as_bytes()).unwrap();
        writer.start_file("xl/sharedStrings.xml", options).unwrap();
        writer.write_all(shared_xml.as_bytes()).unwrap();
        writer
            .start_file("xl/worksheets/sheet1.xml", options)
            .unwrap();
        writer.write_all(sheet_xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    /// Builds a workbook with `count` single-cell inline-string sheets,
    /// where sheet N holds `MARKER-N`.
    fn numbered_xlsx(count: usize) -> Vec<u8> {
        let mut sheets_xml = String::new();
        for n in 1..=count {
            sheets_xml.push_str(&format!(r#"<sheet name="S{}" sheetId="{}"/>"#, n, n));
        }
        let workbook_xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheets>{}</sheets></workbook>"#,
            sheets_xml
        );

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        writer.start_file("xl/workbook.xml", options).unwrap();
        writer.write_all(workbook_xml.as_bytes()).unwrap();
        for n in 1..=count {
            let sheet_xml = format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c t="inlineStr"><is><t>MARKER-{}</t></is></c></row></sheetData></worksheet>"#,
                n
            );
            writer
                .start_file(format!("xl/worksheets/sheet{}.xml", n), options)
                .unwrap();
            writer.write_all(sheet_xml.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extracts_rows_and_sheet_provenance() {
        let bytes = minimal_xlsx(
            "Orders",
            &[
                &["SKU", "Qty", "Unit"],
                &["AB-100", "5", "ST"],
                &["CD-200", "12", "KAR"],
            ],
        );

        let extractor = ExcelExtractor::new();
        let content = extractor.extract(&bytes).unwrap();

        assert_eq!(content.segments.len(), 1);
        assert_eq!(content.segments[0].label, "sheet Orders");
        assert!(content.text.contains("AB-100\t5\tST"));

        let rows = content.rows.as_ref().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], vec!["AB-100", "5", "ST"]);
        assert!(content.is_tabular());
    }

    #[test]
    fn test_ten_plus_sheets_keep_label_and_content_paired() {
        let bytes = numbered_xlsx(11);

        let extractor = ExcelExtractor::new();
        let content = extractor.extract(&bytes).unwrap();

        assert_eq!(content.segments.len(), 11);
        for (i, segment) in content.segments.iter().enumerate() {
            assert_eq!(segment.label, format!("sheet S{}", i + 1));
            assert_eq!(segment.text, format!("MARKER-{}", i + 1));
        }
    }

    #[test]
    fn test_not_a_zip_fails() {
        let extractor = ExcelExtractor::new();
        let result = extractor.extract(b"definitely not a zip archive");
        assert!(matches!(result, Err(ExtractError::Excel(_))));
    }

    #[test]
    fn test_zip_without_worksheets_fails() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("other.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"hi").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let extractor = ExcelExtractor::new();
        let result = extractor.extract(&bytes);
        match result {
            Err(ExtractError::Excel(msg)) => assert!(msg.contains("no worksheets"), "{}", msg),
            other => panic!("Expected Excel error, got {:?}", other.map(|_| ())),
        }
    }
}
