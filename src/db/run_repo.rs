//! Extraction run repository — one row per processing attempt.

use rusqlite::{params, Row};

use super::{now, Database, DbError};
use crate::model::RunStatus;

/// A raw extraction run row.
#[derive(Debug, Clone)]
pub struct RunRow {
    pub id: String,
    pub document_id: String,
    pub org_id: String,
    pub status: String,
    pub extractor_name: Option<String>,
    pub extractor_version: Option<String>,
    pub fingerprint: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// JSON array of repair warnings from validation.
    pub warnings: Option<String>,
    /// Validated output payload as JSON; the latest succeeded run's
    /// payload is authoritative for the document.
    pub payload: Option<String>,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub llm_latency_ms: i64,
    pub llm_cost: Option<f64>,
    pub duration_ms: i64,
    pub line_count: i64,
    pub matched_count: i64,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub created_at: String,
}

impl RunRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            document_id: row.get("document_id")?,
            org_id: row.get("org_id")?,
            status: row.get("status")?,
            extractor_name: row.get("extractor_name")?,
            extractor_version: row.get("extractor_version")?,
            fingerprint: row.get("fingerprint")?,
            error_code: row.get("error_code")?,
            error_message: row.get("error_message")?,
            warnings: row.get("warnings")?,
            payload: row.get("payload")?,
            prompt_tokens: row.get("prompt_tokens")?,
            completion_tokens: row.get("completion_tokens")?,
            llm_latency_ms: row.get("llm_latency_ms")?,
            llm_cost: row.get("llm_cost")?,
            duration_ms: row.get("duration_ms")?,
            line_count: row.get("line_count")?,
            matched_count: row.get("matched_count")?,
            started_at: row.get("started_at")?,
            finished_at: row.get("finished_at")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Creates a pending run for a document.
pub fn create(db: &Database, id: &str, document_id: &str, org_id: &str) -> Result<(), DbError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO extraction_runs (id, document_id, org_id, status, created_at)
             VALUES (?1, ?2, ?3, 'pending', ?4)",
            params![id, document_id, org_id, now()],
        )?;
        Ok(())
    })
}

/// Marks a pending run as running.
pub fn mark_running(db: &Database, id: &str) -> Result<(), DbError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE extraction_runs SET status = 'running', started_at = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![id, now()],
        )?;
        if affected == 0 {
            return Err(DbError::Conflict {
                message: format!("run {} is not pending", id),
            });
        }
        Ok(())
    })
}

/// Metrics recorded when a run reaches a terminal state.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub extractor_name: Option<String>,
    pub extractor_version: Option<String>,
    pub fingerprint: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub warnings: Option<String>,
    pub payload: Option<String>,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub llm_latency_ms: i64,
    pub llm_cost: Option<f64>,
    pub duration_ms: i64,
    pub line_count: i64,
    pub matched_count: i64,
}

/// Finishes a run. Terminal rows are immutable; finishing one again is a
/// `Conflict`, never a silent overwrite.
pub fn finish(db: &Database, id: &str, status: RunStatus, outcome: &RunOutcome) -> Result<(), DbError> {
    debug_assert!(status.is_terminal());
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE extraction_runs SET
               status = ?2, extractor_name = ?3, extractor_version = ?4, fingerprint = ?5,
               error_code = ?6, error_message = ?7, warnings = ?8, payload = ?9,
               prompt_tokens = ?10, completion_tokens = ?11, llm_latency_ms = ?12, llm_cost = ?13,
               duration_ms = ?14, line_count = ?15, matched_count = ?16, finished_at = ?17
             WHERE id = ?1 AND status IN ('pending', 'running')",
            params![
                id,
                status.as_str(),
                outcome.extractor_name,
                outcome.extractor_version,
                outcome.fingerprint,
                outcome.error_code,
                outcome.error_message,
                outcome.warnings,
                outcome.payload,
                outcome.prompt_tokens,
                outcome.completion_tokens,
                outcome.llm_latency_ms,
                outcome.llm_cost,
                outcome.duration_ms,
                outcome.line_count,
                outcome.matched_count,
                now(),
            ],
        )?;
        if affected == 0 {
            return Err(DbError::Conflict {
                message: format!("run {} is already terminal", id),
            });
        }
        Ok(())
    })
}

/// Finds a run by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<RunRow>, DbError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM extraction_runs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], RunRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DbError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// All runs for a document, newest first.
pub fn list_for_document(db: &Database, document_id: &str) -> Result<Vec<RunRow>, DbError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM extraction_runs WHERE document_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows: Vec<RunRow> = stmt
            .query_map(params![document_id], RunRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
