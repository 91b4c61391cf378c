use std::time::Duration;

use thiserror::Error;

use crate::models::{ArtifactId, DocumentId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    #[error("Please upload department ranking files first.")]
    EmptyInput,

    #[error("Document {document_id} could not be parsed: {reason}")]
    ParseFailure {
        document_id: DocumentId,
        reason: String,
    },

    #[error("Student {student_id} appears in both {first_document} and {second_document}")]
    DuplicateStudent {
        student_id: String,
        first_document: DocumentId,
        second_document: DocumentId,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error("A ranking generation is already running")]
    AlreadyRunning,

    #[error("Ranking generation was cancelled")]
    Cancelled,

    #[error("Ranking generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Ranking worker stopped unexpectedly: {0}")]
    Worker(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PublishError {
    #[error("Ranking artifact {0} not found")]
    NotFound(ArtifactId),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Session token rejected")]
    TokenRejected,

    #[error("Auth service is not configured (set GRADREQ_AUTH_URL)")]
    NotConfigured,

    #[error("Auth service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Session storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Session file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccessError {
    #[error("Please log in first")]
    Unauthenticated,

    #[error("This page requires the {required} role")]
    Forbidden { required: &'static str },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}
