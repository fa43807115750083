//! Per-file processing state machine.
//!
//! ```text
//! enqueue ─▶ validate ─┬─ invalid ─────────────────────────────▶ error (0%)
//!                      └─ valid ─▶ uploading (0%) ─▶ processing (50%) ─┬─▶ completed (100%)
//!                                                                      └─▶ error (100%)
//! ```
//!
//! Each accepted file runs as its own task on a bounded worker pool. Tasks
//! never touch shared state: they post store commands to one store task,
//! which owns the [`FileStore`], applies each change as a whole-entry
//! replacement keyed by upload id, notifies the [`ProcessingListener`] and
//! publishes a fresh [`StoreSnapshot`].
//!
//! Removing an upload cancels its task. Results that arrive for an id that
//! is gone are dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::config::Config;
use crate::extract::{FileSource, TextExtractor};
use crate::models::{ProcessedFile, UploadStatus, UploadedFile};
use crate::progress::ProcessingListener;
use crate::store::{FileStore, StoreChange, StoreSnapshot};
use crate::validate::{validate_file, FileDescriptor, UploadPolicy};

pub const CANCELLED_MESSAGE: &str = "Processing cancelled";

enum StoreCommand {
    Insert(UploadedFile),
    Start {
        id: String,
    },
    Finish {
        id: String,
        processed: ProcessedFile,
    },
    Fail {
        id: String,
        error: String,
    },
    Remove {
        id: String,
        ack: oneshot::Sender<bool>,
    },
    Flush {
        ack: oneshot::Sender<()>,
    },
}

pub struct FileProcessor {
    commands: mpsc::UnboundedSender<StoreCommand>,
    snapshots: watch::Receiver<Arc<StoreSnapshot>>,
    workers: Arc<Semaphore>,
    extractor: Arc<TextExtractor>,
    policy: UploadPolicy,
    tracker: TaskTracker,
    tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl FileProcessor {
    /// Creates a processor and spawns its store task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &Config, listener: Arc<dyn ProcessingListener>) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (publish, snapshots) = watch::channel(Arc::new(StoreSnapshot::default()));
        tokio::spawn(run_store(rx, publish, listener));

        Self {
            commands,
            snapshots,
            workers: Arc::new(Semaphore::new(config.pipeline.workers.max(1))),
            extractor: Arc::new(TextExtractor::new(&config.pipeline)),
            policy: config.upload.policy(),
            tracker: TaskTracker::new(),
            tokens: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers a file and, if it passes validation, starts processing it.
    /// Returns the new upload id.
    pub fn enqueue(&self, file: FileDescriptor, source: FileSource) -> String {
        let id = Uuid::new_v4().to_string();
        let mut upload = UploadedFile {
            id: id.clone(),
            name: file.name.clone(),
            size: file.size,
            media_type: file.media_type.clone(),
            progress: 0,
            status: UploadStatus::Uploading,
            error: None,
            processed_id: None,
        };

        if let Err(reason) = validate_file(&file, &self.policy) {
            tracing::info!(file = %file.name, reason = %reason, "upload rejected");
            upload.status = UploadStatus::Error;
            upload.error = Some(reason.to_string());
            self.post(StoreCommand::Insert(upload));
            return id;
        }

        self.post(StoreCommand::Insert(upload));

        let token = CancellationToken::new();
        self.lock_tokens().insert(id.clone(), token.clone());

        let commands = self.commands.clone();
        let workers = self.workers.clone();
        let extractor = self.extractor.clone();
        let tokens = self.tokens.clone();
        let task_id = id.clone();

        self.tracker.spawn(async move {
            let work = async {
                let _permit = workers.acquire_owned().await.ok();
                let _ = commands.send(StoreCommand::Start {
                    id: task_id.clone(),
                });
                extractor.extract_source(&file, &source).await
            };

            let command = tokio::select! {
                _ = token.cancelled() => StoreCommand::Fail {
                    id: task_id.clone(),
                    error: CANCELLED_MESSAGE.to_string(),
                },
                processed = work => StoreCommand::Finish {
                    id: task_id.clone(),
                    processed,
                },
            };
            let _ = commands.send(command);

            if let Ok(mut map) = tokens.lock() {
                map.remove(&task_id);
            }
        });

        id
    }

    /// Cancels an in-flight file. Returns `false` if it was not running.
    pub fn cancel(&self, id: &str) -> bool {
        match self.lock_tokens().get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Deletes an upload and its processed file. The listener has been
    /// notified of the new processed set by the time this returns.
    pub async fn remove(&self, id: &str) -> bool {
        self.cancel(id);
        let (ack, done) = oneshot::channel();
        self.post(StoreCommand::Remove {
            id: id.to_string(),
            ack,
        });
        done.await.unwrap_or(false)
    }

    /// Waits until every spawned file task has finished and the store has
    /// applied all of their results.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();

        let (ack, done) = oneshot::channel();
        self.post(StoreCommand::Flush { ack });
        let _ = done.await;
    }

    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn processed_files(&self) -> Arc<[ProcessedFile]> {
        self.snapshot().processed.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<StoreSnapshot>> {
        self.snapshots.clone()
    }

    fn post(&self, command: StoreCommand) {
        if self.commands.send(command).is_err() {
            tracing::error!("file store task has stopped");
        }
    }

    fn lock_tokens(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn run_store(
    mut rx: mpsc::UnboundedReceiver<StoreCommand>,
    publish: watch::Sender<Arc<StoreSnapshot>>,
    listener: Arc<dyn ProcessingListener>,
) {
    let mut store = FileStore::default();

    while let Some(command) = rx.recv().await {
        let change = match command {
            StoreCommand::Insert(file) => store.insert(file),
            StoreCommand::Start { id } => store.start(&id),
            StoreCommand::Finish { id, processed } => store.finish(&id, processed),
            StoreCommand::Fail { id, error } => store.fail(&id, error),
            StoreCommand::Remove { id, ack } => {
                let change = store.remove(&id);
                let removed = change.is_some();
                if let Some(change) = change {
                    apply(&store, &publish, listener.as_ref(), change, true);
                }
                let _ = ack.send(removed);
                continue;
            }
            StoreCommand::Flush { ack } => {
                let _ = ack.send(());
                continue;
            }
        };
        apply(&store, &publish, listener.as_ref(), change, false);
    }

    tracing::debug!("file store task stopped");
}

fn apply(
    store: &FileStore,
    publish: &watch::Sender<Arc<StoreSnapshot>>,
    listener: &dyn ProcessingListener,
    change: StoreChange,
    removed: bool,
) {
    if change.is_empty() {
        return;
    }
    publish.send_replace(Arc::new(store.snapshot()));

    if let Some(file) = &change.file {
        if removed {
            tracing::debug!(id = %file.id, file = %file.name, "upload removed");
        } else {
            tracing::debug!(
                id = %file.id,
                file = %file.name,
                status = ?file.status,
                progress = file.progress,
                "upload updated"
            );
            listener.on_file_updated(file);
        }
    }
    if let Some(processed) = change.processed {
        listener.on_processed_changed(processed);
    }
}
