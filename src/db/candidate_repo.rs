//! Detection candidate repository — customer hypotheses per draft order.

use rusqlite::{params, Row};

use super::{now, Database, DbError};

/// A raw detection candidate row.
#[derive(Debug, Clone)]
pub struct CandidateRow {
    pub id: String,
    pub draft_order_id: String,
    pub customer_id: String,
    pub score: f64,
    /// JSON breakdown of the contributing signals.
    pub signals: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl CandidateRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            draft_order_id: row.get("draft_order_id")?,
            customer_id: row.get("customer_id")?,
            score: row.get("score")?,
            signals: row.get("signals")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Upserts one candidate. Re-detection refreshes the score and signals
/// in place instead of stacking a second row per customer.
pub fn upsert(
    db: &Database,
    id: &str,
    draft_order_id: &str,
    customer_id: &str,
    score: f64,
    signals: Option<&str>,
) -> Result<(), DbError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO detection_candidates (id, draft_order_id, customer_id, score, signals,
             status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'candidate', ?6, ?6)
             ON CONFLICT(draft_order_id, customer_id) DO UPDATE SET
               score = ?4,
               signals = ?5,
               updated_at = ?6",
            params![id, draft_order_id, customer_id, score, signals, now()],
        )?;
        Ok(())
    })
}

/// Candidates for a draft order, best score first.
pub fn list_for_order(db: &Database, draft_order_id: &str) -> Result<Vec<CandidateRow>, DbError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM detection_candidates WHERE draft_order_id = ?1
             ORDER BY score DESC, customer_id",
        )?;
        let rows: Vec<CandidateRow> = stmt
            .query_map(params![draft_order_id], CandidateRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Confirms one candidate and demotes every other hypothesis on the
/// same order back to `candidate`.
pub fn confirm(db: &Database, draft_order_id: &str, customer_id: &str) -> Result<(), DbError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE detection_candidates SET status = 'candidate', updated_at = ?2
             WHERE draft_order_id = ?1",
            params![draft_order_id, now()],
        )?;
        let affected = conn.execute(
            "UPDATE detection_candidates SET status = 'confirmed', updated_at = ?3
             WHERE draft_order_id = ?1 AND customer_id = ?2",
            params![draft_order_id, customer_id, now()],
        )?;
        if affected == 0 {
            return Err(DbError::Conflict {
                message: format!(
                    "no candidate for customer {} on order {}",
                    customer_id, draft_order_id
                ),
            });
        }
        Ok(())
    })
}
