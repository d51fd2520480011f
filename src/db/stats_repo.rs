//! Processing statistics repository — per-org daily aggregates.

use rusqlite::params;
use serde::Serialize;

use super::{Database, DbError};

/// Records one finished document into the org's daily statistics.
///
/// Uses UPSERT to increment counters for the `(org_id, date)` row.
pub fn record_completion(
    db: &Database,
    org_id: &str,
    date: &str,
    succeeded: bool,
    duration_ms: i64,
    lines: i64,
    matched_lines: i64,
    tokens: i64,
) -> Result<(), DbError> {
    db.with_conn(|conn| {
        let success_val: i64 = if succeeded { 1 } else { 0 };
        let failure_val: i64 = if succeeded { 0 } else { 1 };

        // Running-average formula: In SQLite's ON CONFLICT DO UPDATE, column
        // references on the right side resolve to the *pre-update* (old) values.
        // With old count N and old avg A, the correct update is:
        //   new_avg = (A * N + new_value) / (N + 1)
        conn.execute(
            "INSERT INTO processing_stats (org_id, date, total_processed, total_succeeded,
             total_failed, total_lines, total_matched_lines, total_tokens, avg_duration_ms)
             VALUES (?1, ?2, 1, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(org_id, date) DO UPDATE SET
               total_processed = total_processed + 1,
               total_succeeded = total_succeeded + ?3,
               total_failed = total_failed + ?4,
               total_lines = total_lines + ?5,
               total_matched_lines = total_matched_lines + ?6,
               total_tokens = total_tokens + ?7,
               avg_duration_ms = (avg_duration_ms * total_processed + ?8) / (total_processed + 1)",
            params![
                org_id,
                date,
                success_val,
                failure_val,
                lines,
                matched_lines,
                tokens,
                duration_ms,
            ],
        )?;
        Ok(())
    })
}

/// A single statistics row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatRow {
    pub org_id: String,
    pub date: String,
    pub total_processed: i64,
    pub total_succeeded: i64,
    pub total_failed: i64,
    pub total_lines: i64,
    pub total_matched_lines: i64,
    pub total_tokens: i64,
    pub avg_duration_ms: i64,
}

/// Statistics rows for one org in a date range, newest first.
pub fn query(
    db: &Database,
    org_id: &str,
    from_date: Option<&str>,
    to_date: Option<&str>,
) -> Result<Vec<StatRow>, DbError> {
    db.with_conn(|conn| {
        let mut conditions = vec!["org_id = ?1".to_string()];
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(org_id.to_string())];

        if let Some(from) = from_date {
            conditions.push(format!("date >= ?{}", param_values.len() + 1));
            param_values.push(Box::new(from.to_string()));
        }
        if let Some(to) = to_date {
            conditions.push(format!("date <= ?{}", param_values.len() + 1));
            param_values.push(Box::new(to.to_string()));
        }

        let sql = format!(
            "SELECT org_id, date, total_processed, total_succeeded, total_failed,
             total_lines, total_matched_lines, total_tokens, avg_duration_ms
             FROM processing_stats WHERE {} ORDER BY date DESC",
            conditions.join(" AND ")
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<StatRow> = stmt
            .query_map(params_ref.as_slice(), |row| {
                Ok(StatRow {
                    org_id: row.get(0)?,
                    date: row.get(1)?,
                    total_processed: row.get(2)?,
                    total_succeeded: row.get(3)?,
                    total_failed: row.get(4)?,
                    total_lines: row.get(5)?,
                    total_matched_lines: row.get(6)?,
                    total_tokens: row.get(7)?,
                    avg_duration_ms: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    #[test]
    fn test_record_and_query() {
        let db = test_db();

        record_completion(&db, "org-1", "2026-01-01", true, 1500, 10, 8, 100).unwrap();
        record_completion(&db, "org-1", "2026-01-01", true, 2000, 5, 5, 100).unwrap();
        record_completion(&db, "org-1", "2026-01-01", false, 500, 0, 0, 100).unwrap();

        let rows = query(&db, "org-1", Some("2026-01-01"), Some("2026-01-01")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_processed, 3);
        assert_eq!(rows[0].total_succeeded, 2);
        assert_eq!(rows[0].total_failed, 1);
        assert_eq!(rows[0].total_lines, 15);
        assert_eq!(rows[0].total_matched_lines, 13);
        assert_eq!(rows[0].total_tokens, 300);
    }

    #[test]
    fn test_running_average_correctness() {
        let db = test_db();

        // Record 100ms then 200ms — average should be 150.
        record_completion(&db, "org-1", "2026-02-01", true, 100, 1, 1, 100).unwrap();
        record_completion(&db, "org-1", "2026-02-01", true, 200, 1, 1, 100).unwrap();

        let rows = query(&db, "org-1", None, None).unwrap();
        assert_eq!(rows[0].avg_duration_ms, 150);

        // A third value of 300ms — average should be (100+200+300)/3 = 200.
        record_completion(&db, "org-1", "2026-02-01", true, 300, 1, 1, 100).unwrap();
        let rows = query(&db, "org-1", None, None).unwrap();
        assert_eq!(rows[0].avg_duration_ms, 200);
    }

    #[test]
    fn test_orgs_do_not_mix() {
        let db = test_db();

        record_completion(&db, "org-1", "2026-01-01", true, 100, 1, 1, 100).unwrap();
        record_completion(&db, "org-2", "2026-01-01", true, 200, 1, 1, 100).unwrap();

        let rows = query(&db, "org-1", None, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_processed, 1);
    }

    #[test]
    fn test_date_range_filter() {
        let db = test_db();

        record_completion(&db, "org-1", "2026-01-01", true, 100, 1, 1, 100).unwrap();
        record_completion(&db, "org-1", "2026-01-05", true, 100, 1, 1, 100).unwrap();
        record_completion(&db, "org-1", "2026-02-01", true, 100, 1, 1, 100).unwrap();

        let rows = query(&db, "org-1", Some("2026-01-01"), Some("2026-01-31")).unwrap();
        assert_eq!(rows.len(), 2);
        // Newest first.
        assert_eq!(rows[0].date, "2026-01-05");
    }
}
