//! Draft order repository — the `draft_orders` and `draft_order_lines` tables.

use rusqlite::{params, Row};

use super::{now, Database, DbError};
use crate::model::ExportStatus;

/// A raw draft order row.
#[derive(Debug, Clone)]
pub struct DraftOrderRow {
    pub id: String,
    pub org_id: String,
    pub document_id: String,
    pub run_id: String,
    pub external_order_number: Option<String>,
    pub order_date: Option<String>,
    pub currency: Option<String>,
    pub customer_id: Option<String>,
    pub ship_to: Option<String>,
    pub notes: Option<String>,
    pub export_status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl DraftOrderRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            org_id: row.get("org_id")?,
            document_id: row.get("document_id")?,
            run_id: row.get("run_id")?,
            external_order_number: row.get("external_order_number")?,
            order_date: row.get("order_date")?,
            currency: row.get("currency")?,
            customer_id: row.get("customer_id")?,
            ship_to: row.get("ship_to")?,
            notes: row.get("notes")?,
            export_status: row.get("export_status")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// A raw draft order line row.
#[derive(Debug, Clone)]
pub struct DraftLineRow {
    pub id: String,
    pub draft_order_id: String,
    pub line_number: i64,
    pub customer_sku: String,
    pub description: Option<String>,
    pub quantity: f64,
    /// Unit token exactly as extracted.
    pub unit_raw: Option<String>,
    /// Canonical unit code, when the raw token was recognized.
    pub unit: Option<String>,
    pub unit_price: Option<f64>,
    pub currency: Option<String>,
    pub requested_delivery: Option<String>,
    pub internal_sku: Option<String>,
    pub match_status: String,
    pub match_method: Option<String>,
    pub match_confidence: Option<f64>,
    /// JSON trace of the strategies consulted.
    pub match_trace: Option<String>,
}

impl DraftLineRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            draft_order_id: row.get("draft_order_id")?,
            line_number: row.get("line_number")?,
            customer_sku: row.get("customer_sku")?,
            description: row.get("description")?,
            quantity: row.get("quantity")?,
            unit_raw: row.get("unit_raw")?,
            unit: row.get("unit")?,
            unit_price: row.get("unit_price")?,
            currency: row.get("currency")?,
            requested_delivery: row.get("requested_delivery")?,
            internal_sku: row.get("internal_sku")?,
            match_status: row.get("match_status")?,
            match_method: row.get("match_method")?,
            match_confidence: row.get("match_confidence")?,
            match_trace: row.get("match_trace")?,
        })
    }
}

/// Inserts a draft order and its lines in one transaction.
pub fn insert(db: &Database, order: &DraftOrderRow, lines: &[DraftLineRow]) -> Result<(), DbError> {
    db.with_conn(|conn| {
        conn.execute_batch("BEGIN")?;
        let result = (|| -> Result<(), DbError> {
            conn.execute(
                "INSERT INTO draft_orders (id, org_id, document_id, run_id, external_order_number,
                 order_date, currency, customer_id, ship_to, notes, export_status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    order.id,
                    order.org_id,
                    order.document_id,
                    order.run_id,
                    order.external_order_number,
                    order.order_date,
                    order.currency,
                    order.customer_id,
                    order.ship_to,
                    order.notes,
                    order.export_status,
                    order.created_at,
                    order.updated_at,
                ],
            )?;
            for line in lines {
                conn.execute(
                    "INSERT INTO draft_order_lines (id, draft_order_id, line_number, customer_sku,
                     description, quantity, unit_raw, unit, unit_price, currency, requested_delivery,
                     internal_sku, match_status, match_method, match_confidence, match_trace)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                    params![
                        line.id,
                        line.draft_order_id,
                        line.line_number,
                        line.customer_sku,
                        line.description,
                        line.quantity,
                        line.unit_raw,
                        line.unit,
                        line.unit_price,
                        line.currency,
                        line.requested_delivery,
                        line.internal_sku,
                        line.match_status,
                        line.match_method,
                        line.match_confidence,
                        line.match_trace,
                    ],
                )?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                conn.execute_batch("COMMIT")?;
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    })
}

/// Finds a draft order by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<DraftOrderRow>, DbError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM draft_orders WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], DraftOrderRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DbError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lines of a draft order, in line-number order.
pub fn lines_for_order(db: &Database, draft_order_id: &str) -> Result<Vec<DraftLineRow>, DbError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM draft_order_lines WHERE draft_order_id = ?1 ORDER BY line_number",
        )?;
        let rows: Vec<DraftLineRow> = stmt
            .query_map(params![draft_order_id], DraftLineRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Assigns the detected (or manually chosen) customer.
pub fn set_customer(db: &Database, id: &str, customer_id: &str) -> Result<(), DbError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE draft_orders SET customer_id = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, customer_id, now()],
        )?;
        Ok(())
    })
}

/// Overrides one line's match manually.
pub fn override_line_match(
    db: &Database,
    line_id: &str,
    internal_sku: &str,
) -> Result<(), DbError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE draft_order_lines SET internal_sku = ?2, match_status = 'overridden',
             match_method = 'manual', match_confidence = NULL
             WHERE id = ?1",
            params![line_id, internal_sku],
        )?;
        if affected == 0 {
            return Err(DbError::Conflict {
                message: format!("line {} does not exist", line_id),
            });
        }
        Ok(())
    })
}

/// Advances the export status along its legal transitions.
pub fn update_export_status(db: &Database, id: &str, next: ExportStatus) -> Result<(), DbError> {
    db.with_conn(|conn| {
        let current: String = conn
            .query_row(
                "SELECT export_status FROM draft_orders WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .map_err(DbError::Sqlite)?;

        let current_status = ExportStatus::parse(&current).ok_or_else(|| DbError::Conflict {
            message: format!("order {} has unknown export status '{}'", id, current),
        })?;
        if !current_status.can_transition(next) {
            return Err(DbError::Conflict {
                message: format!(
                    "order {} cannot move from {} to {}",
                    id, current_status, next
                ),
            });
        }

        let affected = conn.execute(
            "UPDATE draft_orders SET export_status = ?2, updated_at = ?3
             WHERE id = ?1 AND export_status = ?4",
            params![id, next.as_str(), now(), current],
        )?;
        if affected == 0 {
            return Err(DbError::Conflict {
                message: format!("order {} changed concurrently", id),
            });
        }
        Ok(())
    })
}
