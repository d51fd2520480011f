//! Processing jobs and their results.

/// One document queued for extraction. Carries the bytes so workers never
/// touch object storage themselves.
#[derive(Debug, Clone)]
pub struct Job {
    /// Job identifier; doubles as the extraction run id.
    pub id: String,
    pub org_id: String,
    pub document_id: String,
    pub file_name: String,
    pub mime_type: String,
    /// SHA-256 hex digest of `bytes`, computed at registration.
    pub content_hash: String,
    pub bytes: Vec<u8>,
    /// Sender address when the document arrived as a mail attachment.
    pub sender_email: Option<String>,
}

impl Job {
    pub fn new(
        org_id: &str,
        document_id: &str,
        file_name: &str,
        mime_type: &str,
        content_hash: &str,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            org_id: org_id.to_string(),
            document_id: document_id.to_string(),
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            content_hash: content_hash.to_string(),
            bytes,
            sender_email: None,
        }
    }

    /// Attaches the mail sender, feeding customer detection downstream.
    pub fn with_sender(mut self, sender_email: &str) -> Self {
        self.sender_email = Some(sender_email.to_string());
        self
    }

    /// Builds a job from a registered intake item and its document row.
    pub fn from_intake(
        item: &crate::intake::IntakeItem,
        document: &crate::db::document_repo::DocumentRow,
    ) -> Self {
        let mut job = Self::new(
            &document.org_id,
            &document.id,
            &document.file_name,
            &document.mime_type,
            &document.content_hash,
            item.bytes.clone(),
        );
        if let Some(mail) = &item.mail {
            job.sender_email = mail.from_address.clone();
        }
        job
    }
}

/// Terminal outcome of one job, as delivered on the result channel.
#[derive(Debug)]
pub struct JobResult {
    pub job_id: String,
    pub document_id: String,
    pub success: bool,
    /// Set once the draft order row exists; `None` on failure.
    pub draft_order_id: Option<String>,
    pub line_count: usize,
    pub matched_count: usize,
    pub error_code: Option<String>,
    pub error: Option<String>,
}

impl JobResult {
    pub fn success(job: &Job, line_count: usize, matched_count: usize) -> Self {
        Self {
            job_id: job.id.clone(),
            document_id: job.document_id.clone(),
            success: true,
            draft_order_id: None,
            line_count,
            matched_count,
            error_code: None,
            error: None,
        }
    }

    pub fn failure(job: &Job, error_code: &str, error: String) -> Self {
        Self {
            job_id: job.id.clone(),
            document_id: job.document_id.clone(),
            success: false,
            draft_order_id: None,
            line_count: 0,
            matched_count: 0,
            error_code: Some(error_code.to_string()),
            error: Some(error),
        }
    }
}
