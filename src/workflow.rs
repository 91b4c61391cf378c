//! Ranking run state machine.
//!
//! A run moves `Idle -> Running -> {Succeeded, Failed}`. Only one run may be
//! in flight per workflow; a trigger while running is refused immediately
//! rather than queued. The shared state lives behind a mutex that is never
//! held across an await point, so callers can poll `state()` to drive
//! progress indication while the spawned generation task works.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::engine::AggregationEngine;
use crate::error::{PublishError, RunError};
use crate::intake::IntakeRegistry;
use crate::models::{ArtifactId, DocumentId, RankedRecord, RunId};
use crate::notice::NoticeBoard;
use crate::publisher::{PublishFailure, PublishedArtifact, RankingPublisher};

#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    Idle,
    Running {
        run_id: RunId,
        inputs: Vec<DocumentId>,
        started_at: DateTime<Utc>,
    },
    Succeeded {
        run_id: RunId,
        artifact_id: ArtifactId,
    },
    Failed {
        run_id: RunId,
        error: RunError,
    },
}

struct Inner {
    state: RunState,
    cancel: Option<oneshot::Sender<()>>,
    publisher: RankingPublisher,
}

#[derive(Clone)]
pub struct RankingWorkflow {
    engine: AggregationEngine,
    timeout: Duration,
    inner: Arc<Mutex<Inner>>,
}

pub struct RunHandle {
    pub run_id: RunId,
    task: JoinHandle<Result<Arc<PublishedArtifact>, RunError>>,
}

impl RunHandle {
    pub async fn wait(self) -> Result<Arc<PublishedArtifact>, RunError> {
        self.task
            .await
            .map_err(|e| RunError::Worker(e.to_string()))?
    }
}

impl RankingWorkflow {
    pub fn new(engine: AggregationEngine, timeout: Duration) -> Self {
        Self {
            engine,
            timeout,
            inner: Arc::new(Mutex::new(Inner {
                state: RunState::Idle,
                cancel: None,
                publisher: RankingPublisher::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> RunState {
        self.lock().state.clone()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.lock().state, RunState::Running { .. })
    }

    /// Snapshots the accepted documents and starts generation on the runtime.
    ///
    /// Must be called from within a tokio runtime.
    pub fn trigger(&self, registry: &IntakeRegistry) -> Result<RunHandle, RunError> {
        let documents = registry.accepted_documents();
        let inputs: Vec<DocumentId> = documents.iter().map(|document| document.id).collect();
        let run_id = RunId::new();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        {
            let mut inner = self.lock();
            if let RunState::Running { run_id: current, .. } = &inner.state {
                warn!(run_id = %current, "refused trigger while a ranking run is in flight");
                return Err(RunError::AlreadyRunning);
            }
            inner.state = RunState::Running {
                run_id,
                inputs: inputs.clone(),
                started_at: Utc::now(),
            };
            inner.cancel = Some(cancel_tx);
        }
        info!(run_id = %run_id, documents = documents.len(), "ranking run started");

        let workflow = self.clone();
        let task = tokio::spawn(async move {
            let outcome = tokio::select! {
                result = tokio::time::timeout(workflow.timeout, workflow.engine.generate(&documents)) => {
                    match result {
                        Ok(generated) => generated.map_err(RunError::from),
                        Err(_) => Err(RunError::Timeout(workflow.timeout)),
                    }
                }
                Ok(()) = cancel_rx => Err(RunError::Cancelled),
            };
            workflow.finish(run_id, inputs, outcome)
        });

        Ok(RunHandle { run_id, task })
    }

    /// Moves the in-flight run straight to `Failed(Cancelled)`. Returns
    /// `false` when nothing was running.
    pub fn cancel(&self) -> bool {
        let mut inner = self.lock();
        let (run_id, inputs) = match &inner.state {
            RunState::Running { run_id, inputs, .. } => (*run_id, inputs.clone()),
            _ => return false,
        };
        if let Some(signal) = inner.cancel.take() {
            let _ = signal.send(());
        }
        let _ = inner.publisher.publish(run_id, inputs, Err(RunError::Cancelled));
        inner.state = RunState::Failed {
            run_id,
            error: RunError::Cancelled,
        };
        info!(run_id = %run_id, "ranking run cancelled");
        true
    }

    fn finish(
        &self,
        run_id: RunId,
        inputs: Vec<DocumentId>,
        outcome: Result<Vec<RankedRecord>, RunError>,
    ) -> Result<Arc<PublishedArtifact>, RunError> {
        let mut inner = self.lock();
        match &inner.state {
            RunState::Running { run_id: current, .. } if *current == run_id => {}
            // Already resolved elsewhere, e.g. by `cancel`.
            RunState::Failed {
                run_id: current,
                error,
            } if *current == run_id => return Err(error.clone()),
            _ => return Err(RunError::Cancelled),
        }

        inner.cancel = None;
        match inner.publisher.publish(run_id, inputs, outcome) {
            Ok(artifact) => {
                inner.state = RunState::Succeeded {
                    run_id,
                    artifact_id: artifact.id,
                };
                Ok(artifact)
            }
            Err(failure) => {
                inner.state = RunState::Failed {
                    run_id,
                    error: failure.error.clone(),
                };
                Err(failure.error)
            }
        }
    }

    pub fn fetch(&self, id: ArtifactId) -> Result<Arc<PublishedArtifact>, PublishError> {
        self.lock().publisher.fetch(id)
    }

    pub fn latest(&self) -> Option<Arc<PublishedArtifact>> {
        self.lock().publisher.latest()
    }

    pub fn last_failure(&self) -> Option<PublishFailure> {
        self.lock().publisher.last_failure().cloned()
    }
}

/// Posts the confirmation or error message for a finished run.
pub fn announce(
    outcome: &Result<Arc<PublishedArtifact>, RunError>,
    notices: &mut NoticeBoard,
) -> u64 {
    match outcome {
        Ok(_) => notices.success("Faculty ranking list generated successfully! You can download it now."),
        Err(error) => notices.error(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AggregationError;
    use crate::models::{MediaType, RankingRecord, SourceDocument};
    use crate::notice::NoticeLevel;
    use crate::parse::{CsvParser, DocumentParser, ParserSet};

    struct SlowParser(Duration);

    impl DocumentParser for SlowParser {
        fn parse(&self, document: &SourceDocument) -> Result<Vec<RankingRecord>, String> {
            std::thread::sleep(self.0);
            CsvParser.parse(document)
        }
    }

    fn workflow_with(parse_delay: Duration, timeout: Duration) -> RankingWorkflow {
        let parsers = ParserSet::standard().with(MediaType::Csv, Arc::new(SlowParser(parse_delay)));
        RankingWorkflow::new(AggregationEngine::new(parsers), timeout)
    }

    fn workflow() -> RankingWorkflow {
        workflow_with(Duration::ZERO, Duration::from_secs(10))
    }

    fn registry_with(rows: &str) -> IntakeRegistry {
        let mut registry = IntakeRegistry::new();
        registry.submit(
            format!("student_id,name,department,gpa\n{rows}").into_bytes(),
            "dept.csv",
            "text/csv",
        );
        registry
    }

    #[tokio::test]
    async fn successful_run_publishes_artifact() {
        let workflow = workflow();
        let registry = registry_with("1,Alice,CS,3.9\n2,Bob,EE,3.9\n");
        assert_eq!(workflow.state(), RunState::Idle);

        let handle = workflow.trigger(&registry).unwrap();
        assert!(workflow.is_running());
        let run_id = handle.run_id;
        let artifact = handle.wait().await.unwrap();

        assert_eq!(artifact.run_id, run_id);
        assert_eq!(artifact.records.len(), 2);
        assert_eq!(artifact.records[0].record.name, "Alice");
        assert_eq!(
            workflow.state(),
            RunState::Succeeded {
                run_id,
                artifact_id: artifact.id
            }
        );
        assert_eq!(workflow.fetch(artifact.id).unwrap(), artifact);
    }

    #[tokio::test]
    async fn second_trigger_while_running_is_refused() {
        let workflow = workflow_with(Duration::from_millis(300), Duration::from_secs(10));
        let registry = registry_with("1,Alice,CS,3.9\n");

        let first = workflow.trigger(&registry).unwrap();
        let err = workflow.trigger(&registry).err().unwrap();
        assert_eq!(err, RunError::AlreadyRunning);
        match workflow.state() {
            RunState::Running { run_id, .. } => assert_eq!(run_id, first.run_id),
            other => panic!("expected running state, got {other:?}"),
        }

        let artifact = first.wait().await.unwrap();
        assert_eq!(artifact.records.len(), 1);
    }

    #[tokio::test]
    async fn empty_registry_fails_with_empty_input() {
        let workflow = workflow();
        let outcome = workflow.trigger(&IntakeRegistry::new()).unwrap().wait().await;
        assert_eq!(
            outcome.unwrap_err(),
            RunError::Aggregation(AggregationError::EmptyInput)
        );
        assert!(matches!(workflow.state(), RunState::Failed { .. }));
    }

    #[tokio::test]
    async fn duplicate_student_publishes_nothing() {
        let workflow = workflow();
        let mut registry = registry_with("7,Alice,CS,3.9\n");
        registry.submit(
            b"student_id,name,department,gpa\n7,Alice,EE,3.2\n".to_vec(),
            "ee.csv",
            "text/csv",
        );

        let err = workflow.trigger(&registry).unwrap().wait().await.unwrap_err();
        assert!(matches!(
            err,
            RunError::Aggregation(AggregationError::DuplicateStudent { .. })
        ));
        assert!(workflow.latest().is_none());
        assert_eq!(workflow.last_failure().unwrap().error, err);
    }

    #[tokio::test]
    async fn cancel_moves_running_run_to_failed() {
        let workflow = workflow_with(Duration::from_millis(300), Duration::from_secs(10));
        let registry = registry_with("1,Alice,CS,3.9\n");

        let handle = workflow.trigger(&registry).unwrap();
        assert!(workflow.cancel());
        assert_eq!(
            workflow.state(),
            RunState::Failed {
                run_id: handle.run_id,
                error: RunError::Cancelled
            }
        );
        assert!(!workflow.cancel());
        assert_eq!(handle.wait().await.unwrap_err(), RunError::Cancelled);
        assert!(workflow.latest().is_none());
    }

    #[tokio::test]
    async fn stalled_generation_times_out() {
        let workflow = workflow_with(Duration::from_millis(400), Duration::from_millis(50));
        let registry = registry_with("1,Alice,CS,3.9\n");

        let err = workflow.trigger(&registry).unwrap().wait().await.unwrap_err();
        assert_eq!(err, RunError::Timeout(Duration::from_millis(50)));
        assert!(matches!(
            workflow.state(),
            RunState::Failed {
                error: RunError::Timeout(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn earlier_artifacts_survive_new_runs() {
        let workflow = workflow();
        let registry = registry_with("1,Alice,CS,3.9\n");
        let first = workflow.trigger(&registry).unwrap().wait().await.unwrap();

        let _ = workflow
            .trigger(&IntakeRegistry::new())
            .unwrap()
            .wait()
            .await;
        let second = workflow.trigger(&registry).unwrap().wait().await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.records, second.records);
        assert_eq!(workflow.fetch(first.id).unwrap().id, first.id);
        assert_eq!(workflow.latest().unwrap().id, second.id);
    }

    #[tokio::test]
    async fn outcome_is_announced() {
        let workflow = workflow();
        let mut notices = NoticeBoard::new(Duration::from_secs(5));
        let outcome = workflow.trigger(&IntakeRegistry::new()).unwrap().wait().await;

        announce(&outcome, &mut notices);
        let active = notices.active(Utc::now());
        assert_eq!(active[0].level, NoticeLevel::Error);
        assert_eq!(active[0].message, "Please upload department ranking files first.");
    }
}
