//! Background extraction worker.
//!
//! Turns an uploaded schedule photo into structured JSON via the vision
//! model. The upload path dispatches a task and returns immediately; the
//! status poll reads the registry. Model output is isolated and parsed
//! with the recoverable-failure contract: malformed JSON becomes a
//! `Success` payload carrying `{"error": "malformed JSON", "raw": ...}`,
//! not a task failure, so the caller can show the raw text.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

use rota_core::{new_task_id, Identity, OwnerId, TaskId, TaskState};
use rota_vision::{parse_model_json, VisionModel};

use crate::settings::ConfigStore;

/// How long finished task entries stay pollable.
const RESULT_RETENTION: Duration = Duration::from_secs(3600);

/// Registry housekeeping cadence.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// One unit of extraction work.
pub struct ExtractionTask {
    pub task_id: TaskId,
    pub owner_id: OwnerId,
    /// Name the prompt targets, as written in the schedule table.
    pub owner_name: String,
    pub image: Vec<u8>,
    pub mime_type: String,
}

/// What the worker needs besides the queue.
pub struct ExtractionWorkerDeps {
    pub settings: ConfigStore,
    pub model: Arc<dyn VisionModel>,
}

struct StatusEntry {
    state: TaskState,
    updated_at: Instant,
}

/// Dispatch handle plus status registry.
///
/// Cloneable; all clones share the queue and registry.
#[derive(Clone)]
pub struct ExtractionQueue {
    tx: mpsc::UnboundedSender<ExtractionTask>,
    statuses: Arc<DashMap<TaskId, StatusEntry>>,
}

impl ExtractionQueue {
    /// Spawn the worker and return the queue handle.
    pub fn start(
        deps: ExtractionWorkerDeps,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let statuses: Arc<DashMap<TaskId, StatusEntry>> = Arc::new(DashMap::new());

        let handle = tokio::spawn(extraction_worker(
            rx,
            Arc::clone(&statuses),
            deps,
            shutdown,
        ));

        (Self { tx, statuses }, handle)
    }

    /// Hand an image to the worker. Returns immediately with the task id;
    /// the caller polls [`status`](Self::status) for the outcome.
    pub fn dispatch(&self, owner: &Identity, image: Vec<u8>, mime_type: &str) -> TaskId {
        let task_id = new_task_id();
        self.statuses.insert(
            task_id,
            StatusEntry {
                state: TaskState::Processing,
                updated_at: Instant::now(),
            },
        );

        let task = ExtractionTask {
            task_id,
            owner_id: owner.owner_id,
            owner_name: owner.name.clone(),
            image,
            mime_type: mime_type.to_string(),
        };

        if self.tx.send(task).is_err() {
            // Worker gone (shutdown); the poller sees a terminal failure
            // instead of polling forever.
            self.finish(task_id, TaskState::Failure {
                error: "extraction worker unavailable".to_string(),
            });
        }

        tracing::info!(%task_id, "extraction task dispatched");
        task_id
    }

    /// Current state of a task. Safe to poll repeatedly; `None` means the
    /// id is unknown or the entry aged out.
    pub fn status(&self, task_id: TaskId) -> Option<TaskState> {
        self.statuses.get(&task_id).map(|e| e.state.clone())
    }

    fn finish(&self, task_id: TaskId, state: TaskState) {
        self.statuses.insert(
            task_id,
            StatusEntry {
                state,
                updated_at: Instant::now(),
            },
        );
    }
}

/// Worker loop: drain the queue, run inference, publish results, and
/// periodically drop finished entries past retention.
pub async fn extraction_worker(
    mut rx: mpsc::UnboundedReceiver<ExtractionTask>,
    statuses: Arc<DashMap<TaskId, StatusEntry>>,
    deps: ExtractionWorkerDeps,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut cleanup = interval(CLEANUP_INTERVAL);
    cleanup.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!("extraction worker started");

    loop {
        tokio::select! {
            task = rx.recv() => {
                match task {
                    Some(task) => {
                        let task_id = task.task_id;
                        let state = process_task(task, &deps).await;
                        statuses.insert(task_id, StatusEntry {
                            state,
                            updated_at: Instant::now(),
                        });
                    }
                    None => break,
                }
            }
            changed = shutdown.changed() => {
                // A dropped sender means the process is tearing down.
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!("extraction worker shutting down");
                    break;
                }
            }
            _ = cleanup.tick() => {
                let cutoff = Instant::now() - RESULT_RETENTION;
                statuses.retain(|_, entry| {
                    !(entry.state.is_terminal() && entry.updated_at < cutoff)
                });
            }
        }
    }
}

async fn process_task(task: ExtractionTask, deps: &ExtractionWorkerDeps) -> TaskState {
    tracing::info!(task_id = %task.task_id, owner = %task.owner_name, "processing schedule image");

    let prompt = match deps.settings.vision_prompt(&task.owner_name).await {
        Ok(prompt) => prompt,
        Err(e) => {
            tracing::error!(task_id = %task.task_id, error = %e, "prompt lookup failed");
            return TaskState::Failure {
                error: e.to_string(),
            };
        }
    };

    match deps
        .model
        .infer_image(&task.image, &task.mime_type, &prompt)
        .await
    {
        Ok(raw) => {
            // Parse failure is recoverable by contract; the payload then
            // carries the raw text for the caller to inspect.
            let result = parse_model_json(&raw);
            tracing::info!(task_id = %task.task_id, "extraction complete");
            TaskState::Success { result }
        }
        Err(e) => {
            tracing::error!(task_id = %task.task_id, error = %e, "model inference failed");
            TaskState::Failure {
                error: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rota_core::VisionError;
    use rota_storage::{KeyValueCache, MemoryCacheBackend, MemorySettingsRepository};

    struct ScriptedModel {
        response: Result<String, VisionError>,
    }

    #[async_trait]
    impl VisionModel for ScriptedModel {
        async fn infer_image(
            &self,
            _image: &[u8],
            _mime: &str,
            prompt: &str,
        ) -> Result<String, VisionError> {
            // The prompt must target the owner by name.
            assert!(prompt.contains("Anna"));
            self.response.clone()
        }
    }

    fn identity() -> Identity {
        let now = chrono::Utc::now();
        Identity {
            owner_id: rota_core::new_owner_id(),
            name: "Anna".to_string(),
            display_name: "Anna".to_string(),
            token_hash: "h".to_string(),
            is_active: true,
            is_admin: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn deps(response: Result<String, VisionError>) -> ExtractionWorkerDeps {
        let settings = ConfigStore::new(
            Arc::new(MemorySettingsRepository::new()),
            KeyValueCache::new(Arc::new(MemoryCacheBackend::new())),
        );
        ExtractionWorkerDeps {
            settings,
            model: Arc::new(ScriptedModel { response }),
        }
    }

    async fn wait_terminal(queue: &ExtractionQueue, task_id: TaskId) -> TaskState {
        for _ in 0..200 {
            if let Some(state) = queue.status(task_id) {
                if state.is_terminal() {
                    return state;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task never reached a terminal state");
    }

    #[tokio::test]
    async fn test_dispatch_returns_immediately_then_succeeds() {
        let (_tx, shutdown_rx) = watch::channel(false);
        let (queue, _handle) = ExtractionQueue::start(
            deps(Ok("```json\n{\"turni\": [{\"data\": \"2024-03-01\"}]}\n```".to_string())),
            shutdown_rx,
        );

        let task_id = queue.dispatch(&identity(), vec![1, 2, 3], "image/png");
        // Immediately pollable.
        assert!(queue.status(task_id).is_some());

        let state = wait_terminal(&queue, task_id).await;
        match state {
            TaskState::Success { result } => {
                assert_eq!(result["turni"][0]["data"], "2024-03-01");
            }
            other => panic!("expected success, got {other:?}"),
        }

        // Polling is idempotent: the terminal state sticks.
        assert!(queue.status(task_id).unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_malformed_model_output_is_recoverable() {
        let (_tx, shutdown_rx) = watch::channel(false);
        let (queue, _handle) = ExtractionQueue::start(
            deps(Ok("the table shows { broken".to_string())),
            shutdown_rx,
        );

        let task_id = queue.dispatch(&identity(), vec![], "image/png");
        let state = wait_terminal(&queue, task_id).await;
        match state {
            TaskState::Success { result } => {
                assert_eq!(result["error"], "malformed JSON");
                assert_eq!(result["raw"], "the table shows { broken");
            }
            other => panic!("expected recoverable success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_model_error_is_task_failure() {
        let (_tx, shutdown_rx) = watch::channel(false);
        let (queue, _handle) = ExtractionQueue::start(
            deps(Err(VisionError::RequestFailed {
                provider: "gemini".to_string(),
                status: 503,
                message: "overloaded".to_string(),
            })),
            shutdown_rx,
        );

        let task_id = queue.dispatch(&identity(), vec![], "image/png");
        let state = wait_terminal(&queue, task_id).await;
        match state {
            TaskState::Failure { error } => assert!(error.contains("overloaded")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_task_id_is_none() {
        let (_tx, shutdown_rx) = watch::channel(false);
        let (queue, _handle) =
            ExtractionQueue::start(deps(Ok("{}".to_string())), shutdown_rx);
        assert!(queue.status(rota_core::new_task_id()).is_none());
    }

    #[tokio::test]
    async fn test_shutdown_stops_worker_and_fails_new_dispatches() {
        let (tx, shutdown_rx) = watch::channel(false);
        let (queue, handle) =
            ExtractionQueue::start(deps(Ok("{}".to_string())), shutdown_rx);

        tx.send(true).unwrap();
        handle.await.unwrap();

        let task_id = queue.dispatch(&identity(), vec![], "image/png");
        match queue.status(task_id).unwrap() {
            TaskState::Failure { error } => assert!(error.contains("unavailable")),
            other => panic!("expected failure after shutdown, got {other:?}"),
        }
    }
}
