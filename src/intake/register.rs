//! Document registration: content hashing, dedup and the initial row.

use log::info;
use sha2::{Digest, Sha256};

use crate::db::document_repo::{self, DocumentRow};
use crate::db::{Database, DbError};
use crate::model::DocumentStatus;

use super::IntakeItem;

/// SHA-256 hex digest of a document's bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Registers an intake item as a document for `org_id`.
///
/// Dedup key is (org, content hash, file name, byte size): a re-seen file
/// returns the existing row and `true` instead of creating a second
/// document. New rows go straight to `stored` since the bytes are already
/// in hand.
pub fn register(
    db: &Database,
    org_id: &str,
    source: &str,
    item: &IntakeItem,
) -> Result<(DocumentRow, bool), DbError> {
    let hash = content_hash(&item.bytes);
    let byte_size = item.bytes.len() as i64;

    if let Some(existing) =
        document_repo::find_duplicate(db, org_id, &hash, &item.file_name, byte_size)?
    {
        info!(
            "Document '{}' already registered as {} (duplicate)",
            item.file_name, existing.id
        );
        return Ok((existing, true));
    }

    let created = crate::db::now();
    let mut doc = DocumentRow {
        id: uuid::Uuid::new_v4().to_string(),
        org_id: org_id.to_string(),
        file_name: item.file_name.clone(),
        mime_type: item.mime_type.clone(),
        byte_size,
        content_hash: hash,
        source: source.to_string(),
        sender_email: item
            .mail
            .as_ref()
            .and_then(|m| m.from_address.clone()),
        status: DocumentStatus::Uploaded.as_str().to_string(),
        page_count: None,
        text_coverage: None,
        fingerprint: None,
        error_code: None,
        error_message: None,
        created_at: created.clone(),
        updated_at: created,
    };
    document_repo::insert(db, &doc)?;
    document_repo::update_status(db, &doc.id, DocumentStatus::Stored, None, None)?;
    doc.status = DocumentStatus::Stored.as_str().to_string();

    info!("Registered document {} ({})", doc.id, doc.file_name);
    Ok((doc, false))
}
