//! Builders for test payloads and document fixtures.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use serde_json::{json, Map, Value};

/// Builder for model extraction payloads.
pub struct PayloadBuilder {
    header: Map<String, Value>,
    lines: Vec<Value>,
}

impl PayloadBuilder {
    pub fn new() -> Self {
        Self {
            header: Map::new(),
            lines: Vec::new(),
        }
    }

    pub fn order_number(mut self, number: &str) -> Self {
        self.header
            .insert("external_order_number".to_string(), json!(number));
        self
    }

    pub fn customer_hint(mut self, hint: &str) -> Self {
        self.header.insert("customer_hint".to_string(), json!(hint));
        self
    }

    pub fn currency(mut self, currency: &str) -> Self {
        self.header.insert("currency".to_string(), json!(currency));
        self
    }

    pub fn ship_to(mut self, address: &str) -> Self {
        self.header.insert("ship_to".to_string(), json!(address));
        self
    }

    /// Appends a line; line numbers are assigned in call order.
    pub fn line(mut self, customer_sku: &str, quantity: f64, unit: &str) -> Self {
        let number = self.lines.len() + 1;
        self.lines.push(json!({
            "line_number": number,
            "customer_sku": customer_sku,
            "quantity": quantity,
            "unit": unit,
        }));
        self
    }

    pub fn line_with_description(
        mut self,
        customer_sku: &str,
        description: &str,
        quantity: f64,
        unit: &str,
    ) -> Self {
        let number = self.lines.len() + 1;
        self.lines.push(json!({
            "line_number": number,
            "customer_sku": customer_sku,
            "description": description,
            "quantity": quantity,
            "unit": unit,
        }));
        self
    }

    pub fn build(self) -> Value {
        json!({
            "header": Value::Object(self.header),
            "lines": Value::Array(self.lines),
        })
    }
}

impl Default for PayloadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// CSV document bytes with a header row and the given order lines.
pub fn csv_document(lines: &[(&str, u32)]) -> Vec<u8> {
    let mut out = String::from("Pos,Artikel,Menge\n");
    for (i, (sku, qty)) in lines.iter().enumerate() {
        out.push_str(&format!("{},{},{}\n", i + 1, sku, qty));
    }
    out.into_bytes()
}

/// Minimal single-sheet XLSX with inline-string cells.
pub fn xlsx_document(sheet_name: &str, rows: &[&[&str]]) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        let options = zip::write::SimpleFileOptions::default();

        writer
            .start_file("[Content_Types].xml", options)
            .unwrap();
        writer
            .write_all(
                br#"<?xml version="1.0"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#,
            )
            .unwrap();

        writer.start_file("xl/workbook.xml", options).unwrap();
        writer
            .write_all(
                format!(
                    r#"<?xml version="1.0"?><workbook><sheets><sheet name="{}" sheetId="1"/></sheets></workbook>"#,
                    sheet_name
                )
                .as_bytes(),
            )
            .unwrap();

        let mut sheet = String::from(r#"<?xml version="1.0"?><worksheet><sheetData>"#);
        for row in rows {
            sheet.push_str("<row>");
            for cell in *row {
                sheet.push_str(&format!("<c t=\"inlineStr\"><is><t>{}</t></is></c>", cell));
            }
            sheet.push_str("</row>");
        }
        sheet.push_str("</sheetData></worksheet>");
        writer
            .start_file("xl/worksheets/sheet1.xml", options)
            .unwrap();
        writer.write_all(sheet.as_bytes()).unwrap();

        writer.finish().unwrap();
    }
    buffer.into_inner()
}
