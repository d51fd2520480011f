//! Structured-output validation and repair.
//!
//! Model payloads arrive as arbitrary JSON. Structural problems with the
//! envelope are hard failures, reported all at once so a bad prompt can be
//! diagnosed from a single run. Defects confined to a single line are
//! repaired or dropped with a warning, so one hallucinated row never sinks
//! an otherwise usable document.

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::error::ValidateError;

pub const MAX_QUANTITY: f64 = 1_000_000.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderHeader {
    pub external_order_number: Option<String>,
    pub order_date: Option<NaiveDate>,
    pub currency: Option<String>,
    pub customer_hint: Option<String>,
    pub ship_to: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderLine {
    pub line_number: u32,
    pub customer_sku: String,
    pub description: Option<String>,
    pub quantity: f64,
    /// Raw unit token as extracted; normalization happens downstream.
    pub unit: Option<String>,
    pub unit_price: Option<f64>,
    pub currency: Option<String>,
    pub requested_delivery: Option<NaiveDate>,
}

/// The validated, repaired output handed to the rest of the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionOutput {
    pub header: OrderHeader,
    pub lines: Vec<OrderLine>,
    /// Per-field confidence as reported by the model, if any.
    pub field_confidence: HashMap<String, f64>,
    pub warnings: Vec<ValidationWarning>,
}

/// A repair applied during validation. Persisted on the run so reviewers
/// can see what was changed or dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    /// A currency value was not a three-letter ISO code and was removed.
    CurrencyStripped { field: String, value: String },
    /// A date did not parse as YYYY-MM-DD and was removed.
    InvalidDate { field: String, value: String },
    /// An entire line was unusable and removed.
    LineDropped { line: Option<u64>, reason: String },
    /// The lines array exceeded the configured cap and was cut.
    LinesTruncated { kept: usize, dropped: usize },
    /// Line numbers were missing or out of sequence and were reassigned.
    Renumbered,
    /// A unit token did not match any known synonym; kept verbatim.
    UnknownUnit { line: u32, value: String },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::CurrencyStripped { field, value } => {
                write!(f, "stripped non-ISO currency '{}' from {}", value, field)
            }
            ValidationWarning::InvalidDate { field, value } => {
                write!(f, "removed unparseable date '{}' from {}", value, field)
            }
            ValidationWarning::LineDropped { line, reason } => match line {
                Some(n) => write!(f, "dropped line {}: {}", n, reason),
                None => write!(f, "dropped line: {}", reason),
            },
            ValidationWarning::LinesTruncated { kept, dropped } => {
                write!(f, "truncated to {} lines ({} dropped)", kept, dropped)
            }
            ValidationWarning::Renumbered => write!(f, "line numbers reassigned"),
            ValidationWarning::UnknownUnit { line, value } => {
                write!(f, "line {}: unknown unit '{}'", line, value)
            }
        }
    }
}

/// Validates a model payload against the order contract.
///
/// Envelope violations (wrong shapes at the top level) are collected and
/// returned together as a hard error. Line-level defects are repaired or
/// dropped with warnings recorded on the output.
pub fn validate(payload: &Value, max_lines: usize) -> Result<ExtractionOutput, ValidateError> {
    let mut violations = Vec::new();

    let root = match payload.as_object() {
        Some(obj) => obj,
        None => {
            return Err(ValidateError::Schema {
                violations: vec!["payload is not a JSON object".to_string()],
            });
        }
    };

    let header_value = root.get("header");
    if let Some(v) = header_value {
        if !v.is_object() && !v.is_null() {
            violations.push("'header' is not an object".to_string());
        }
    }

    let lines_value = match root.get("lines") {
        Some(Value::Array(arr)) => Some(arr),
        Some(_) => {
            violations.push("'lines' is not an array".to_string());
            None
        }
        None => {
            violations.push("'lines' is missing".to_string());
            None
        }
    };

    if let Some(arr) = lines_value {
        for (i, item) in arr.iter().enumerate() {
            if !item.is_object() {
                violations.push(format!("lines[{}] is not an object", i));
            }
        }
    }

    if !violations.is_empty() {
        return Err(ValidateError::Schema { violations });
    }

    let mut warnings = Vec::new();
    let header = parse_header(
        header_value.and_then(Value::as_object),
        &mut warnings,
    );

    let raw_lines = lines_value.map(|v| v.as_slice()).unwrap_or(&[]);
    let mut lines = Vec::new();
    for item in raw_lines {
        // Envelope check above guarantees an object.
        if let Some(obj) = item.as_object() {
            if let Some(line) = parse_line(obj, &mut warnings) {
                lines.push(line);
            }
        }
    }

    if lines.len() > max_lines {
        let dropped = lines.len() - max_lines;
        lines.truncate(max_lines);
        warnings.push(ValidationWarning::LinesTruncated {
            kept: max_lines,
            dropped,
        });
    }

    // Guaranteed contiguous 1..N numbering for downstream persistence.
    let in_sequence = lines
        .iter()
        .enumerate()
        .all(|(i, l)| l.line_number as usize == i + 1);
    if !in_sequence {
        for (i, line) in lines.iter_mut().enumerate() {
            line.line_number = (i + 1) as u32;
        }
        warnings.push(ValidationWarning::Renumbered);
    }

    tracing::debug!(
        lines = lines.len(),
        warnings = warnings.len(),
        "payload validated"
    );

    Ok(ExtractionOutput {
        header,
        lines,
        field_confidence: parse_confidence(root.get("field_confidence")),
        warnings,
    })
}

fn parse_header(
    obj: Option<&serde_json::Map<String, Value>>,
    warnings: &mut Vec<ValidationWarning>,
) -> OrderHeader {
    let Some(obj) = obj else {
        return OrderHeader::default();
    };
    OrderHeader {
        external_order_number: string_field(obj, "external_order_number"),
        order_date: date_field(obj, "order_date", "header.order_date", warnings),
        currency: currency_field(obj, "currency", "header.currency", warnings),
        customer_hint: string_field(obj, "customer_hint"),
        ship_to: string_field(obj, "ship_to"),
        notes: string_field(obj, "notes"),
    }
}

fn parse_line(
    obj: &serde_json::Map<String, Value>,
    warnings: &mut Vec<ValidationWarning>,
) -> Option<OrderLine> {
    let declared = obj.get("line_number").and_then(Value::as_u64);

    let customer_sku = match string_field(obj, "customer_sku") {
        Some(sku) => sku,
        None => {
            warnings.push(ValidationWarning::LineDropped {
                line: declared,
                reason: "missing customer SKU".to_string(),
            });
            return None;
        }
    };

    let quantity = match obj.get("quantity").and_then(Value::as_f64) {
        Some(q) if q.is_finite() && q > 0.0 && q <= MAX_QUANTITY => q,
        other => {
            warnings.push(ValidationWarning::LineDropped {
                line: declared,
                reason: match other {
                    Some(q) => format!("quantity {} out of range", q),
                    None => "quantity missing or not a number".to_string(),
                },
            });
            return None;
        }
    };

    let field = |name: &str| format!("line {}.{}", declared.unwrap_or(0), name);

    Some(OrderLine {
        line_number: declared.and_then(|n| u32::try_from(n).ok()).unwrap_or(0),
        customer_sku,
        description: string_field(obj, "description"),
        quantity,
        unit: string_field(obj, "unit"),
        unit_price: obj
            .get("unit_price")
            .and_then(Value::as_f64)
            .filter(|p| p.is_finite() && *p >= 0.0),
        currency: currency_field(obj, "currency", &field("currency"), warnings),
        requested_delivery: date_field(
            obj,
            "requested_delivery",
            &field("requested_delivery"),
            warnings,
        ),
    })
}

fn string_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn currency_field(
    obj: &serde_json::Map<String, Value>,
    key: &str,
    field: &str,
    warnings: &mut Vec<ValidationWarning>,
) -> Option<String> {
    let raw = string_field(obj, key)?;
    let code = raw.trim().to_uppercase();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(code)
    } else {
        warnings.push(ValidationWarning::CurrencyStripped {
            field: field.to_string(),
            value: raw,
        });
        None
    }
}

fn date_field(
    obj: &serde_json::Map<String, Value>,
    key: &str,
    field: &str,
    warnings: &mut Vec<ValidationWarning>,
) -> Option<NaiveDate> {
    let raw = string_field(obj, key)?;
    match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            warnings.push(ValidationWarning::InvalidDate {
                field: field.to_string(),
                value: raw,
            });
            None
        }
    }
}

fn parse_confidence(value: Option<&Value>) -> HashMap<String, f64> {
    let mut map = HashMap::new();
    if let Some(Value::Object(obj)) = value {
        for (k, v) in obj {
            if let Some(score) = v.as_f64() {
                if (0.0..=1.0).contains(&score) {
                    map.insert(k.clone(), score);
                }
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn good_payload() -> Value {
        json!({
            "header": {
                "external_order_number": "PO-4711",
                "order_date": "2025-03-14",
                "currency": "EUR",
                "customer_hint": "Acme GmbH",
                "ship_to": "Industriestr. 1, 70565 Stuttgart",
                "notes": null
            },
            "lines": [
                {
                    "line_number": 1,
                    "customer_sku": "AB-100",
                    "description": "Widget",
                    "quantity": 5,
                    "unit": "Stück",
                    "unit_price": 9.99,
                    "currency": "EUR",
                    "requested_delivery": "2025-04-01"
                },
                {
                    "line_number": 2,
                    "customer_sku": "CD-200",
                    "quantity": 12.5,
                    "unit": "kg"
                }
            ]
        })
    }

    #[test]
    fn test_valid_payload_passes_clean() {
        let output = validate(&good_payload(), 500).unwrap();
        assert!(output.warnings.is_empty());
        assert_eq!(output.lines.len(), 2);
        assert_eq!(output.header.external_order_number.as_deref(), Some("PO-4711"));
        assert_eq!(
            output.header.order_date,
            Some(NaiveDate::from_ymd_opt(2025, 3, 14).unwrap())
        );
        assert_eq!(output.lines[0].customer_sku, "AB-100");
        assert_eq!(output.lines[0].unit.as_deref(), Some("Stück"));
        assert_eq!(output.lines[1].quantity, 12.5);
    }

    #[test]
    fn test_envelope_violations_are_collected() {
        let payload = json!({"header": "not an object", "lines": {"oops": true}});
        match validate(&payload, 500) {
            Err(ValidateError::Schema { violations }) => {
                assert_eq!(violations.len(), 2);
                assert!(violations.iter().any(|v| v.contains("'header'")));
                assert!(violations.iter().any(|v| v.contains("'lines'")));
            }
            other => panic!("Expected Schema error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_non_object_payload_fails() {
        assert!(validate(&json!([1, 2, 3]), 500).is_err());
        assert!(validate(&json!("text"), 500).is_err());
    }

    #[test]
    fn test_missing_lines_is_hard_failure() {
        let payload = json!({"header": {}});
        match validate(&payload, 500) {
            Err(ValidateError::Schema { violations }) => {
                assert!(violations[0].contains("'lines' is missing"));
            }
            other => panic!("Expected Schema error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_line_without_sku_is_dropped_with_warning() {
        let payload = json!({
            "lines": [
                {"line_number": 1, "customer_sku": "AB-100", "quantity": 5},
                {"line_number": 2, "quantity": 3},
                {"line_number": 3, "customer_sku": "   ", "quantity": 3}
            ]
        });
        let output = validate(&payload, 500).unwrap();
        assert_eq!(output.lines.len(), 1);
        let dropped = output
            .warnings
            .iter()
            .filter(|w| matches!(w, ValidationWarning::LineDropped { .. }))
            .count();
        assert_eq!(dropped, 2);
    }

    #[test]
    fn test_quantity_bounds() {
        let payload = json!({
            "lines": [
                {"line_number": 1, "customer_sku": "A", "quantity": 0},
                {"line_number": 2, "customer_sku": "B", "quantity": -5},
                {"line_number": 3, "customer_sku": "C", "quantity": 2_000_000},
                {"line_number": 4, "customer_sku": "D", "quantity": 1}
            ]
        });
        let output = validate(&payload, 500).unwrap();
        assert_eq!(output.lines.len(), 1);
        assert_eq!(output.lines[0].customer_sku, "D");
    }

    #[test]
    fn test_bad_currency_stripped_not_fatal() {
        let payload = json!({
            "header": {"currency": "Euro"},
            "lines": [{"line_number": 1, "customer_sku": "A", "quantity": 1, "currency": "eur"}]
        });
        let output = validate(&payload, 500).unwrap();
        assert_eq!(output.header.currency, None);
        // Lowercase three-letter codes are coerced, not stripped.
        assert_eq!(output.lines[0].currency.as_deref(), Some("EUR"));
        assert!(output
            .warnings
            .iter()
            .any(|w| matches!(w, ValidationWarning::CurrencyStripped { .. })));
    }

    #[test]
    fn test_bad_date_removed_with_warning() {
        let payload = json!({
            "header": {"order_date": "14.03.2025"},
            "lines": [{"line_number": 1, "customer_sku": "A", "quantity": 1}]
        });
        let output = validate(&payload, 500).unwrap();
        assert_eq!(output.header.order_date, None);
        assert!(output
            .warnings
            .iter()
            .any(|w| matches!(w, ValidationWarning::InvalidDate { .. })));
    }

    #[test]
    fn test_truncation_at_max_lines() {
        let lines: Vec<Value> = (1..=10)
            .map(|i| json!({"line_number": i, "customer_sku": format!("S-{}", i), "quantity": 1}))
            .collect();
        let payload = json!({"lines": lines});
        let output = validate(&payload, 4).unwrap();
        assert_eq!(output.lines.len(), 4);
        assert!(output.warnings.iter().any(|w| matches!(
            w,
            ValidationWarning::LinesTruncated { kept: 4, dropped: 6 }
        )));
    }

    #[test]
    fn test_renumbering_after_drop() {
        let payload = json!({
            "lines": [
                {"line_number": 1, "customer_sku": "A", "quantity": 1},
                {"line_number": 2, "quantity": 1},
                {"line_number": 3, "customer_sku": "C", "quantity": 1}
            ]
        });
        let output = validate(&payload, 500).unwrap();
        assert_eq!(output.lines.len(), 2);
        assert_eq!(output.lines[0].line_number, 1);
        assert_eq!(output.lines[1].line_number, 2);
        assert!(output
            .warnings
            .iter()
            .any(|w| matches!(w, ValidationWarning::Renumbered)));
    }

    #[test]
    fn test_duplicate_numbers_renumbered_in_order() {
        let payload = json!({
            "lines": [
                {"line_number": 1, "customer_sku": "A", "quantity": 1},
                {"line_number": 1, "customer_sku": "B", "quantity": 1},
                {"line_number": 3, "customer_sku": "C", "quantity": 1}
            ]
        });
        let output = validate(&payload, 500).unwrap();
        let numbers: Vec<u32> = output.lines.iter().map(|l| l.line_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        let skus: Vec<&str> = output.lines.iter().map(|l| l.customer_sku.as_str()).collect();
        assert_eq!(skus, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_field_confidence_filtered_to_unit_interval() {
        let payload = json!({
            "lines": [{"line_number": 1, "customer_sku": "A", "quantity": 1}],
            "field_confidence": {"header.currency": 0.9, "bogus": 7.0}
        });
        let output = validate(&payload, 500).unwrap();
        assert_eq!(output.field_confidence.get("header.currency"), Some(&0.9));
        assert!(!output.field_confidence.contains_key("bogus"));
    }
}
