use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{PublishError, RunError};
use crate::models::{ArtifactId, DocumentId, RankedRecord, RunId};

/// Immutable result of a successful ranking run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedArtifact {
    pub id: ArtifactId,
    pub run_id: RunId,
    pub generated_at: DateTime<Utc>,
    pub inputs: Vec<DocumentId>,
    pub records: Vec<RankedRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishFailure {
    pub run_id: RunId,
    pub failed_at: DateTime<Utc>,
    pub error: RunError,
}

#[derive(Default)]
pub struct RankingPublisher {
    artifacts: HashMap<ArtifactId, Arc<PublishedArtifact>>,
    latest: Option<ArtifactId>,
    last_failure: Option<PublishFailure>,
}

impl RankingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(
        &mut self,
        run_id: RunId,
        inputs: Vec<DocumentId>,
        outcome: Result<Vec<RankedRecord>, RunError>,
    ) -> Result<Arc<PublishedArtifact>, PublishFailure> {
        match outcome {
            Ok(records) => {
                let artifact = Arc::new(PublishedArtifact {
                    id: ArtifactId::new(),
                    run_id,
                    generated_at: Utc::now(),
                    inputs,
                    records,
                });
                info!(
                    run_id = %run_id,
                    artifact_id = %artifact.id,
                    records = artifact.records.len(),
                    "published faculty ranking"
                );
                self.artifacts.insert(artifact.id, Arc::clone(&artifact));
                self.latest = Some(artifact.id);
                Ok(artifact)
            }
            Err(error) => {
                warn!(run_id = %run_id, error = %error, "ranking run failed");
                let failure = PublishFailure {
                    run_id,
                    failed_at: Utc::now(),
                    error,
                };
                self.last_failure = Some(failure.clone());
                Err(failure)
            }
        }
    }

    pub fn fetch(&self, id: ArtifactId) -> Result<Arc<PublishedArtifact>, PublishError> {
        self.artifacts
            .get(&id)
            .cloned()
            .ok_or(PublishError::NotFound(id))
    }

    pub fn latest(&self) -> Option<Arc<PublishedArtifact>> {
        self.latest.and_then(|id| self.artifacts.get(&id).cloned())
    }

    pub fn last_failure(&self) -> Option<&PublishFailure> {
        self.last_failure.as_ref()
    }
}
