//! Schema migrations.
//!
//! Applied versions are recorded in `_migrations`; anything newer than
//! the recorded maximum runs in order on open.

use rusqlite::Connection;

use super::error::DbError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// Ordered schema history. A version runs at most once per database.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_documents_table",
        sql: include_str!("sql/001_create_documents.sql"),
    },
    Migration {
        version: 2,
        description: "create_extraction_runs_table",
        sql: include_str!("sql/002_create_extraction_runs.sql"),
    },
    Migration {
        version: 3,
        description: "create_draft_orders_tables",
        sql: include_str!("sql/003_create_draft_orders.sql"),
    },
    Migration {
        version: 4,
        description: "create_sku_mappings_table",
        sql: include_str!("sql/004_create_sku_mappings.sql"),
    },
    Migration {
        version: 5,
        description: "create_detection_candidates_table",
        sql: include_str!("sql/005_create_detection_candidates.sql"),
    },
    Migration {
        version: 6,
        description: "create_processing_stats_table",
        sql: include_str!("sql/006_create_processing_stats.sql"),
    },
];

/// Brings the schema up to the latest version.
pub fn run_all(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Applying migration v{} ({})",
            migration.version,
            migration.description
        );

        conn.execute_batch(migration.sql)
            .map_err(|e| DbError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}
