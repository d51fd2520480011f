//! Document repository — rows of the `documents` table.

use rusqlite::{params, Row};

use super::{now, Database, DbError};
use crate::model::DocumentStatus;

/// A raw document row from the database.
#[derive(Debug, Clone)]
pub struct DocumentRow {
    pub id: String,
    pub org_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub byte_size: i64,
    pub content_hash: String,
    pub source: String,
    pub sender_email: Option<String>,
    pub status: String,
    pub page_count: Option<i64>,
    pub text_coverage: Option<f64>,
    pub fingerprint: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            org_id: row.get("org_id")?,
            file_name: row.get("file_name")?,
            mime_type: row.get("mime_type")?,
            byte_size: row.get("byte_size")?,
            content_hash: row.get("content_hash")?,
            source: row.get("source")?,
            sender_email: row.get("sender_email")?,
            status: row.get("status")?,
            page_count: row.get("page_count")?,
            text_coverage: row.get("text_coverage")?,
            fingerprint: row.get("fingerprint")?,
            error_code: row.get("error_code")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts a new document row.
pub fn insert(db: &Database, doc: &DocumentRow) -> Result<(), DbError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO documents (id, org_id, file_name, mime_type, byte_size, content_hash,
             source, sender_email, status, page_count, text_coverage, fingerprint,
             error_code, error_message, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                doc.id,
                doc.org_id,
                doc.file_name,
                doc.mime_type,
                doc.byte_size,
                doc.content_hash,
                doc.source,
                doc.sender_email,
                doc.status,
                doc.page_count,
                doc.text_coverage,
                doc.fingerprint,
                doc.error_code,
                doc.error_message,
                doc.created_at,
                doc.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a document by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<DocumentRow>, DbError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM documents WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], DocumentRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DbError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Finds an existing document with the same identity tuple, which is how
/// re-submitted files are detected.
pub fn find_duplicate(
    db: &Database,
    org_id: &str,
    content_hash: &str,
    file_name: &str,
    byte_size: i64,
) -> Result<Option<DocumentRow>, DbError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM documents
             WHERE org_id = ?1 AND content_hash = ?2 AND file_name = ?3 AND byte_size = ?4",
        )?;
        let mut rows = stmt.query_map(
            params![org_id, content_hash, file_name, byte_size],
            DocumentRow::from_row,
        )?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DbError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Advances a document's status, enforcing the legal transitions.
///
/// Returns `Conflict` when the stored status does not permit the move,
/// which also covers concurrent writers racing for the same document.
pub fn update_status(
    db: &Database,
    id: &str,
    next: DocumentStatus,
    error_code: Option<&str>,
    error_message: Option<&str>,
) -> Result<(), DbError> {
    db.with_conn(|conn| {
        let current: String = conn
            .query_row(
                "SELECT status FROM documents WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .map_err(DbError::Sqlite)?;

        let current_status = DocumentStatus::parse(&current).ok_or_else(|| DbError::Conflict {
            message: format!("document {} has unknown status '{}'", id, current),
        })?;
        if !current_status.can_transition(next) {
            return Err(DbError::Conflict {
                message: format!(
                    "document {} cannot move from {} to {}",
                    id, current_status, next
                ),
            });
        }

        // Guard repeated in SQL so a concurrent writer that won the race
        // leaves this update affecting zero rows.
        let affected = conn.execute(
            "UPDATE documents SET status = ?2, error_code = ?3, error_message = ?4, updated_at = ?5
             WHERE id = ?1 AND status = ?6",
            params![id, next.as_str(), error_code, error_message, now(), current],
        )?;
        if affected == 0 {
            return Err(DbError::Conflict {
                message: format!("document {} changed concurrently", id),
            });
        }
        Ok(())
    })
}

/// Records what extraction learned about the document's shape. Written
/// whenever content was read, even if a later stage failed.
pub fn record_extraction_profile(
    db: &Database,
    id: &str,
    page_count: i64,
    text_coverage: f64,
    fingerprint: Option<&str>,
) -> Result<(), DbError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE documents SET page_count = ?2, text_coverage = ?3,
             fingerprint = COALESCE(?4, fingerprint), updated_at = ?5
             WHERE id = ?1",
            params![id, page_count, text_coverage, fingerprint, now()],
        )?;
        Ok(())
    })
}

/// Documents of an org in a given status, oldest first.
pub fn list_by_status(
    db: &Database,
    org_id: &str,
    status: DocumentStatus,
) -> Result<Vec<DocumentRow>, DbError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM documents WHERE org_id = ?1 AND status = ?2 ORDER BY created_at",
        )?;
        let rows: Vec<DocumentRow> = stmt
            .query_map(params![org_id, status.as_str()], DocumentRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    pub(crate) fn sample(id: &str, org: &str) -> DocumentRow {
        DocumentRow {
            id: id.to_string(),
            org_id: org.to_string(),
            file_name: "order.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            byte_size: 1024,
            content_hash: format!("hash-{}", id),
            source: "upload".to_string(),
            sender_email: None,
            status: "uploaded".to_string(),
            page_count: None,
            text_coverage: None,
            fingerprint: None,
            error_code: None,
            error_message: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        insert(&db, &sample("d1", "org-1")).unwrap();

        let found = find_by_id(&db, "d1").unwrap().unwrap();
        assert_eq!(found.file_name, "order.pdf");
        assert_eq!(found.status, "uploaded");
        assert!(find_by_id(&db, "missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_detection() {
        let db = test_db();
        let doc = sample("d1", "org-1");
        insert(&db, &doc).unwrap();

        let dup = find_duplicate(&db, "org-1", &doc.content_hash, "order.pdf", 1024)
            .unwrap()
            .unwrap();
        assert_eq!(dup.id, "d1");

        // Same hash in another org is not a duplicate.
        assert!(
            find_duplicate(&db, "org-2", &doc.content_hash, "order.pdf", 1024)
                .unwrap()
                .is_none()
        );
        // Different size breaks the identity tuple.
        assert!(
            find_duplicate(&db, "org-1", &doc.content_hash, "order.pdf", 999)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_unique_constraint_on_identity_tuple() {
        let db = test_db();
        let doc = sample("d1", "org-1");
        insert(&db, &doc).unwrap();

        let mut copy = doc.clone();
        copy.id = "d2".to_string();
        assert!(insert(&db, &copy).is_err());
    }

    #[test]
    fn test_status_transitions_enforced() {
        let db = test_db();
        insert(&db, &sample("d1", "org-1")).unwrap();

        update_status(&db, "d1", DocumentStatus::Stored, None, None).unwrap();
        update_status(&db, "d1", DocumentStatus::Processing, None, None).unwrap();
        update_status(&db, "d1", DocumentStatus::Extracted, None, None).unwrap();

        // Terminal: no further moves.
        let result = update_status(&db, "d1", DocumentStatus::Failed, None, None);
        assert!(matches!(result, Err(DbError::Conflict { .. })));
    }

    #[test]
    fn test_skip_ahead_rejected() {
        let db = test_db();
        insert(&db, &sample("d1", "org-1")).unwrap();

        let result = update_status(&db, "d1", DocumentStatus::Extracted, None, None);
        assert!(matches!(result, Err(DbError::Conflict { .. })));
    }

    #[test]
    fn test_failure_records_error_fields() {
        let db = test_db();
        insert(&db, &sample("d1", "org-1")).unwrap();

        update_status(
            &db,
            "d1",
            DocumentStatus::Failed,
            Some("extraction_failed"),
            Some("corrupt file"),
        )
        .unwrap();

        let row = find_by_id(&db, "d1").unwrap().unwrap();
        assert_eq!(row.status, "failed");
        assert_eq!(row.error_code.as_deref(), Some("extraction_failed"));
        assert_eq!(row.error_message.as_deref(), Some("corrupt file"));
    }

    #[test]
    fn test_extraction_profile_is_recorded() {
        let db = test_db();
        insert(&db, &sample("d1", "org-1")).unwrap();

        record_extraction_profile(&db, "d1", 3, 0.8, Some("abc123")).unwrap();
        let row = find_by_id(&db, "d1").unwrap().unwrap();
        assert_eq!(row.page_count, Some(3));
        assert_eq!(row.text_coverage, Some(0.8));
        assert_eq!(row.fingerprint.as_deref(), Some("abc123"));

        // A later write without a fingerprint keeps the old one.
        record_extraction_profile(&db, "d1", 3, 0.8, None).unwrap();
        let row = find_by_id(&db, "d1").unwrap().unwrap();
        assert_eq!(row.fingerprint.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_list_by_status_scoped_to_org() {
        let db = test_db();
        insert(&db, &sample("d1", "org-1")).unwrap();
        insert(&db, &sample("d2", "org-2")).unwrap();

        let rows = list_by_status(&db, "org-1", DocumentStatus::Uploaded).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "d1");
    }
}
