//! SKU mapping repository — learned customer-SKU associations, plus the
//! `MappingStore` implementation the match engine consumes.

use rusqlite::{params, OptionalExtension, Row};

use super::{now, Database, DbError};
use crate::error::MatchError;
use crate::matcher::{MappingStore, SkuMapping};
use crate::model::MappingStatus;

/// A raw mapping row.
#[derive(Debug, Clone)]
pub struct MappingRow {
    pub id: i64,
    pub org_id: String,
    pub customer_id: Option<String>,
    pub customer_sku_normalized: String,
    pub internal_sku: String,
    pub status: String,
    /// Confidence assigned by the learning process; exact-match hits do
    /// not read it, the cascade returns 1.0 for confirmed mappings.
    pub confidence: f64,
    pub support_count: i64,
    pub reject_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl MappingRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            org_id: row.get("org_id")?,
            customer_id: row.get("customer_id")?,
            customer_sku_normalized: row.get("customer_sku_normalized")?,
            internal_sku: row.get("internal_sku")?,
            status: row.get("status")?,
            confidence: row.get("confidence")?,
            support_count: row.get("support_count")?,
            reject_count: row.get("reject_count")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts a suggested mapping. Fails on the partial unique index if an
/// active mapping already exists for the key.
pub fn insert_suggestion(
    db: &Database,
    org_id: &str,
    customer_id: Option<&str>,
    customer_sku_normalized: &str,
    internal_sku: &str,
) -> Result<i64, DbError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO sku_mappings (org_id, customer_id, customer_sku_normalized, internal_sku,
             status, support_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'suggested', 0, ?5, ?5)",
            params![org_id, customer_id, customer_sku_normalized, internal_sku, now()],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// The active mapping for (org, customer, normalized SKU), if any.
/// A customer-specific mapping wins over an org-wide one.
pub fn find_active(
    db: &Database,
    org_id: &str,
    customer_id: Option<&str>,
    customer_sku_normalized: &str,
) -> Result<Option<MappingRow>, DbError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM sku_mappings
                 WHERE org_id = ?1 AND customer_sku_normalized = ?2
                   AND status IN ('suggested', 'confirmed')
                   AND (customer_id = ?3 OR customer_id IS NULL)
                 ORDER BY customer_id IS NULL
                 LIMIT 1",
                params![org_id, customer_sku_normalized, customer_id],
                MappingRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

fn set_status(db: &Database, id: i64, status: MappingStatus) -> Result<(), DbError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE sku_mappings SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), now()],
        )?;
        if affected == 0 {
            return Err(DbError::Conflict {
                message: format!("mapping {} does not exist", id),
            });
        }
        Ok(())
    })
}

/// Confirms a suggested mapping; confirmed mappings short-circuit matching.
pub fn confirm(db: &Database, id: i64) -> Result<(), DbError> {
    set_status(db, id, MappingStatus::Confirmed)
}

/// Rejects a mapping, removing it from the active set and counting the
/// rejection as negative evidence.
pub fn reject(db: &Database, id: i64) -> Result<(), DbError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE sku_mappings SET status = 'rejected',
             reject_count = reject_count + 1, updated_at = ?2
             WHERE id = ?1",
            params![id, now()],
        )?;
        if affected == 0 {
            return Err(DbError::Conflict {
                message: format!("mapping {} does not exist", id),
            });
        }
        Ok(())
    })
}

/// Retires a mapping that no longer reflects the catalog.
pub fn deprecate(db: &Database, id: i64) -> Result<(), DbError> {
    set_status(db, id, MappingStatus::Deprecated)
}

/// Atomically bumps the support counter.
pub fn increment_support(db: &Database, id: i64) -> Result<(), DbError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE sku_mappings SET support_count = support_count + 1, updated_at = ?2
             WHERE id = ?1",
            params![id, now()],
        )?;
        Ok(())
    })
}

/// `MappingStore` backed by the SQLite mapping table.
#[derive(Clone)]
pub struct SqliteMappingStore {
    db: Database,
}

impl SqliteMappingStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl MappingStore for SqliteMappingStore {
    fn active_mapping(
        &self,
        org_id: &str,
        customer_id: Option<&str>,
        normalized_sku: &str,
    ) -> Result<Option<SkuMapping>, MatchError> {
        let row = find_active(&self.db, org_id, customer_id, normalized_sku)
            .map_err(|e| MatchError::Store(e.to_string()))?;
        Ok(row.and_then(|r| {
            MappingStatus::parse(&r.status).map(|status| SkuMapping {
                id: r.id,
                internal_sku: r.internal_sku,
                status,
                support_count: r.support_count,
            })
        }))
    }

    fn record_support(&self, mapping_id: i64) -> Result<(), MatchError> {
        increment_support(&self.db, mapping_id).map_err(|e| MatchError::Store(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    #[test]
    fn test_insert_and_find_active() {
        let db = test_db();
        let id = insert_suggestion(&db, "org-1", Some("cust-1"), "AB100", "INT-1").unwrap();

        let found = find_active(&db, "org-1", Some("cust-1"), "AB100")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.internal_sku, "INT-1");
        assert_eq!(found.status, "suggested");

        assert!(find_active(&db, "org-2", Some("cust-1"), "AB100")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_customer_specific_beats_org_wide() {
        let db = test_db();
        insert_suggestion(&db, "org-1", None, "AB100", "INT-ORG").unwrap();
        insert_suggestion(&db, "org-1", Some("cust-1"), "AB100", "INT-CUST").unwrap();

        let found = find_active(&db, "org-1", Some("cust-1"), "AB100")
            .unwrap()
            .unwrap();
        assert_eq!(found.internal_sku, "INT-CUST");

        // A different customer only sees the org-wide mapping.
        let found = find_active(&db, "org-1", Some("cust-2"), "AB100")
            .unwrap()
            .unwrap();
        assert_eq!(found.internal_sku, "INT-ORG");
    }

    #[test]
    fn test_second_active_mapping_rejected() {
        let db = test_db();
        insert_suggestion(&db, "org-1", Some("cust-1"), "AB100", "INT-1").unwrap();
        let result = insert_suggestion(&db, "org-1", Some("cust-1"), "AB100", "INT-2");
        assert!(result.is_err());
    }

    #[test]
    fn test_rejected_frees_the_slot_and_counts() {
        let db = test_db();
        let id = insert_suggestion(&db, "org-1", Some("cust-1"), "AB100", "INT-1").unwrap();
        reject(&db, id).unwrap();

        assert!(find_active(&db, "org-1", Some("cust-1"), "AB100")
            .unwrap()
            .is_none());
        let reject_count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT reject_count FROM sku_mappings WHERE id = ?1",
                    params![id],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(reject_count, 1);
        // Slot is free for a new suggestion.
        insert_suggestion(&db, "org-1", Some("cust-1"), "AB100", "INT-2").unwrap();
    }

    #[test]
    fn test_confirm_and_support() {
        let db = test_db();
        let id = insert_suggestion(&db, "org-1", None, "AB100", "INT-1").unwrap();
        confirm(&db, id).unwrap();
        increment_support(&db, id).unwrap();
        increment_support(&db, id).unwrap();

        let found = find_active(&db, "org-1", None, "AB100").unwrap().unwrap();
        assert_eq!(found.status, "confirmed");
        assert_eq!(found.support_count, 2);
    }

    #[test]
    fn test_store_trait_round_trip() {
        let db = test_db();
        let id = insert_suggestion(&db, "org-1", None, "AB100", "INT-1").unwrap();
        confirm(&db, id).unwrap();

        let store = SqliteMappingStore::new(db.clone());
        let mapping = store.active_mapping("org-1", None, "AB100").unwrap().unwrap();
        assert_eq!(mapping.internal_sku, "INT-1");
        assert_eq!(mapping.status, MappingStatus::Confirmed);

        store.record_support(mapping.id).unwrap();
        let row = find_active(&db, "org-1", None, "AB100").unwrap().unwrap();
        assert_eq!(row.support_count, 1);
    }
}
