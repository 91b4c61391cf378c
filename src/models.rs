use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactId(pub Uuid);

impl ArtifactId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Upload formats accepted for department ranking lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Pdf,
    Csv,
    LegacySpreadsheet,
    ModernSpreadsheet,
}

impl MediaType {
    pub const ALL: [MediaType; 4] = [
        MediaType::Pdf,
        MediaType::Csv,
        MediaType::LegacySpreadsheet,
        MediaType::ModernSpreadsheet,
    ];

    pub fn as_mime(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Csv => "text/csv",
            Self::LegacySpreadsheet => "application/vnd.ms-excel",
            Self::ModernSpreadsheet => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }

    /// Returns `None` for anything outside the allow-list.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        Self::ALL
            .into_iter()
            .find(|media| media.as_mime().eq_ignore_ascii_case(essence))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    Pending,
    Accepted,
    Rejected,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub id: DocumentId,
    pub name: String,
    /// MIME type exactly as declared by the uploader.
    pub declared_type: String,
    pub media_type: Option<MediaType>,
    pub status: DocumentStatus,
    pub payload: Arc<[u8]>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRecord {
    pub student_id: String,
    pub name: String,
    pub department: String,
    pub gpa: f64,
    pub source: DocumentId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRecord {
    pub rank: u32,
    pub record: RankingRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_round_trips_mime_strings() {
        for media in MediaType::ALL {
            assert_eq!(MediaType::from_mime(media.as_mime()), Some(media));
        }
    }

    #[test]
    fn mime_parameters_and_case_are_ignored() {
        assert_eq!(
            MediaType::from_mime("Text/CSV; charset=utf-8"),
            Some(MediaType::Csv)
        );
    }

    #[test]
    fn unknown_mime_is_not_allowed() {
        assert_eq!(
            MediaType::from_mime(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            ),
            None
        );
        assert_eq!(MediaType::from_mime(""), None);
    }
}
