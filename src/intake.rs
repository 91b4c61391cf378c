//! Intake registry for uploaded department ranking files.
//!
//! Classification happens once, at submit time, against the media-type
//! allow-list. Content problems surface later, when the aggregation engine
//! parses the payload.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::models::{DocumentId, DocumentStatus, MediaType, SourceDocument};
use crate::notice::NoticeBoard;

/// Upload as handed over by the caller, before registration.
pub struct Upload {
    pub name: String,
    pub declared_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
pub struct IntakeRegistry {
    documents: Vec<Arc<SourceDocument>>,
}

impl IntakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a document. Unsupported types are kept with `Rejected` status.
    pub fn submit(
        &mut self,
        bytes: Vec<u8>,
        name: impl Into<String>,
        declared_type: impl Into<String>,
    ) -> Arc<SourceDocument> {
        let name = name.into();
        let declared_type = declared_type.into();
        let media_type = MediaType::from_mime(&declared_type);
        let status = if media_type.is_some() {
            DocumentStatus::Accepted
        } else {
            DocumentStatus::Rejected
        };

        let document = Arc::new(SourceDocument {
            id: DocumentId::new(),
            name,
            declared_type,
            media_type,
            status,
            payload: Arc::from(bytes),
            submitted_at: Utc::now(),
        });

        match status {
            DocumentStatus::Rejected => warn!(
                document_id = %document.id,
                name = %document.name,
                declared_type = %document.declared_type,
                "rejected upload with unsupported media type"
            ),
            _ => info!(
                document_id = %document.id,
                name = %document.name,
                bytes = document.payload.len(),
                "accepted upload"
            ),
        }

        self.documents.push(Arc::clone(&document));
        document
    }

    /// Submits several uploads and posts the notices an operator sees after
    /// picking files: one error per rejected file and one summary for the
    /// accepted ones.
    pub fn submit_batch(
        &mut self,
        uploads: Vec<Upload>,
        notices: &mut NoticeBoard,
    ) -> Vec<Arc<SourceDocument>> {
        let submitted: Vec<_> = uploads
            .into_iter()
            .map(|upload| self.submit(upload.bytes, upload.name, upload.declared_type))
            .collect();

        let mut accepted = 0usize;
        for document in &submitted {
            if document.status == DocumentStatus::Rejected {
                notices.error(format!(
                    "File {} has an unsupported format. Please upload PDF, CSV, or Excel files.",
                    document.name
                ));
            } else {
                accepted += 1;
            }
        }
        if accepted > 0 {
            notices.success(format!("{accepted} file(s) uploaded successfully."));
        }

        submitted
    }

    /// Removes the entry if present. Unknown ids are ignored.
    pub fn delete(&mut self, id: DocumentId) {
        let before = self.documents.len();
        self.documents.retain(|document| document.id != id);
        if self.documents.len() < before {
            info!(document_id = %id, "deleted upload");
        }
    }

    pub fn get(&self, id: DocumentId) -> Option<Arc<SourceDocument>> {
        self.documents
            .iter()
            .find(|document| document.id == id)
            .cloned()
    }

    /// All entries in insertion order, rejected ones included.
    pub fn documents(&self) -> &[Arc<SourceDocument>] {
        &self.documents
    }

    pub fn accepted_documents(&self) -> Vec<Arc<SourceDocument>> {
        self.documents
            .iter()
            .filter(|document| document.status == DocumentStatus::Accepted)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

    #[test]
    fn unsupported_types_are_rejected_not_errors() {
        let mut registry = IntakeRegistry::new();
        for declared in [DOCX, "image/png", "", "text/plain"] {
            let document = registry.submit(b"x".to_vec(), "file", declared);
            assert_eq!(document.status, DocumentStatus::Rejected);
            assert_eq!(document.media_type, None);
        }
        assert_eq!(registry.documents().len(), 4);
        assert!(registry.accepted_documents().is_empty());
    }

    #[test]
    fn accepted_documents_keep_insertion_order_and_skip_rejected() {
        let mut registry = IntakeRegistry::new();
        let first = registry.submit(b"a".to_vec(), "cs.csv", "text/csv");
        registry.submit(b"b".to_vec(), "notes.docx", DOCX);
        let third = registry.submit(b"c".to_vec(), "ee.pdf", "application/pdf");

        let accepted: Vec<_> = registry.accepted_documents().iter().map(|d| d.id).collect();
        assert_eq!(accepted, vec![first.id, third.id]);
    }

    #[test]
    fn delete_is_reflected_immediately() {
        let mut registry = IntakeRegistry::new();
        let first = registry.submit(b"a".to_vec(), "cs.csv", "text/csv");
        let second = registry.submit(b"b".to_vec(), "me.csv", "text/csv");

        registry.delete(first.id);
        let accepted: Vec<_> = registry.accepted_documents().iter().map(|d| d.id).collect();
        assert_eq!(accepted, vec![second.id]);
        assert!(registry.get(first.id).is_none());
    }

    #[test]
    fn deleting_unknown_id_leaves_registry_unchanged() {
        let mut registry = IntakeRegistry::new();
        let kept = registry.submit(b"a".to_vec(), "cs.csv", "text/csv");

        registry.delete(DocumentId::new());
        registry.delete(kept.id);
        registry.delete(kept.id);
        assert!(registry.documents().is_empty());

        let again = registry.submit(b"a".to_vec(), "cs.csv", "text/csv");
        registry.delete(DocumentId::new());
        assert_eq!(registry.documents().len(), 1);
        assert_eq!(registry.documents()[0].id, again.id);
    }

    #[test]
    fn batch_posts_rejection_and_summary_notices() {
        let mut registry = IntakeRegistry::new();
        let mut notices = NoticeBoard::new(Duration::from_secs(5));
        let uploads = vec![
            Upload {
                name: "cs.csv".into(),
                declared_type: "text/csv".into(),
                bytes: b"a".to_vec(),
            },
            Upload {
                name: "letter.docx".into(),
                declared_type: DOCX.into(),
                bytes: b"b".to_vec(),
            },
        ];

        let submitted = registry.submit_batch(uploads, &mut notices);
        assert_eq!(submitted.len(), 2);

        let messages: Vec<_> = notices
            .active(Utc::now())
            .into_iter()
            .map(|notice| notice.message)
            .collect();
        assert_eq!(
            messages,
            vec![
                "File letter.docx has an unsupported format. Please upload PDF, CSV, or Excel files."
                    .to_string(),
                "1 file(s) uploaded successfully.".to_string(),
            ]
        );
    }
}
