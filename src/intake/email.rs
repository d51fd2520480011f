//! Inbound-email attachment extraction.
//!
//! The mail transport (IMAP, webhook, whatever) lives outside this crate;
//! it hands over raw RFC 822 bytes and gets back the attachments that
//! qualify as documents, each carrying the mail envelope metadata.

use log::debug;
use mail_parser::{Message, MessageParser, MimeHeaders, PartType};

use crate::config::schema::IntakeConfig;
use crate::error::IntakeError;
use crate::extractor::ExtractorRegistry;

use super::{FilenameFilter, IntakeItem, MailMeta};

pub struct EmailIntake {
    filter: FilenameFilter,
    min_size: u64,
    max_size: u64,
}

impl EmailIntake {
    pub fn from_config(config: &IntakeConfig) -> Result<Self, IntakeError> {
        Ok(Self {
            filter: FilenameFilter::compile(&config.include, &config.exclude)?,
            min_size: config.min_attachment_bytes,
            max_size: config.max_attachment_bytes,
        })
    }

    /// Extracts every qualifying attachment from one raw message.
    ///
    /// Attachments are filtered by supported MIME type, size bounds and
    /// the filename globs; a message with no qualifying attachment yields
    /// an empty vec, not an error.
    pub fn extract(
        &self,
        raw_email: &[u8],
        registry: &ExtractorRegistry,
    ) -> Result<Vec<IntakeItem>, IntakeError> {
        let message = MessageParser::default()
            .parse(raw_email)
            .ok_or_else(|| IntakeError::MailParse("not an RFC 822 message".to_string()))?;

        let mail = mail_meta(&message);
        let mut items = Vec::new();

        for part in message.parts.iter() {
            if !is_attachment(part) {
                continue;
            }

            let bytes = match &part.body {
                PartType::Binary(data) | PartType::InlineBinary(data) => data.to_vec(),
                PartType::Text(text) => text.as_bytes().to_vec(),
                _ => continue,
            };

            let file_name = part
                .attachment_name()
                .map(str::to_string)
                .unwrap_or_else(|| "attachment.bin".to_string());

            let mime_type = declared_mime(part)
                // Generic or missing declarations fall back to the extension.
                .filter(|m| m != "application/octet-stream")
                .or_else(|| {
                    mime_guess::from_path(&file_name)
                        .first()
                        .map(|m| m.to_string())
                })
                .unwrap_or_else(|| "application/octet-stream".to_string());

            if !registry.supports(&mime_type) {
                debug!("Attachment '{}' skipped: type {}", file_name, mime_type);
                continue;
            }
            let size = bytes.len() as u64;
            if size < self.min_size || size > self.max_size {
                debug!("Attachment '{}' skipped: {} bytes", file_name, size);
                continue;
            }
            if !self.filter.matches(&file_name) {
                debug!("Attachment '{}' skipped: filename filter", file_name);
                continue;
            }

            items.push(IntakeItem {
                file_name,
                mime_type,
                bytes,
                mail: Some(mail.clone()),
            });
        }

        debug!(
            "Extracted {} attachments from message {:?}",
            items.len(),
            mail.message_id.as_deref().unwrap_or("(no id)")
        );
        Ok(items)
    }
}

fn mail_meta(message: &Message) -> MailMeta {
    let from = message.from().and_then(|addrs| addrs.first());
    MailMeta {
        from_name: from
            .and_then(|a| a.name())
            .map(|s| s.to_string()),
        from_address: from
            .and_then(|a| a.address())
            .map(|s| s.to_string()),
        subject: message.subject().map(|s| s.to_string()),
        date: message.date().map(|d| d.to_rfc3339()),
        message_id: message.message_id().map(|s| s.to_string()),
    }
}

fn is_attachment(part: &mail_parser::MessagePart) -> bool {
    if let Some(disposition) = part.content_disposition() {
        if disposition.ctype() == "attachment" {
            return true;
        }
    }
    // Inline parts with a filename count too.
    part.attachment_name().is_some()
}

fn declared_mime(part: &mail_parser::MessagePart) -> Option<String> {
    part.content_type().map(|ct| match ct.subtype() {
        Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
        None => ct.ctype().to_string(),
    })
}
