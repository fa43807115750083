//! Upload table and aggregate processed-file set.
//!
//! [`FileStore`] is owned by a single task (see [`crate::processor`]); all
//! mutation goes through the methods below, which replace whole entries and
//! rebuild the processed set rather than editing it in place. Readers only
//! ever see [`StoreSnapshot`] values.

use std::sync::Arc;

use crate::models::{ProcessedFile, UploadStatus, UploadedFile};

/// Immutable view of the store at one point in time.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub uploads: Vec<UploadedFile>,
    pub processed: Arc<[ProcessedFile]>,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self {
            uploads: Vec::new(),
            processed: Arc::from(Vec::new()),
        }
    }
}

impl StoreSnapshot {
    pub fn upload(&self, id: &str) -> Option<&UploadedFile> {
        self.uploads.iter().find(|u| u.id == id)
    }
}

/// What a store operation changed, for listener notification.
#[derive(Debug, Default)]
pub struct StoreChange {
    pub file: Option<UploadedFile>,
    pub processed: Option<Arc<[ProcessedFile]>>,
}

impl StoreChange {
    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.processed.is_none()
    }
}

fn can_transition(from: UploadStatus, to: UploadStatus) -> bool {
    use UploadStatus::*;
    matches!(
        (from, to),
        (Uploading, Processing) | (Uploading, Error) | (Processing, Completed) | (Processing, Error)
    )
}

#[derive(Debug, Default)]
pub struct FileStore {
    uploads: Vec<UploadedFile>,
    processed: Vec<ProcessedFile>,
}

impl FileStore {
    pub fn insert(&mut self, file: UploadedFile) -> StoreChange {
        let change = StoreChange {
            file: Some(file.clone()),
            processed: None,
        };
        match self.uploads.iter_mut().find(|u| u.id == file.id) {
            Some(existing) => *existing = file,
            None => self.uploads.push(file),
        }
        change
    }

    /// `uploading → processing`, progress 50.
    pub fn start(&mut self, id: &str) -> StoreChange {
        self.replace(id, UploadStatus::Processing, |mut f| {
            f.progress = 50;
            f
        })
    }

    /// Records an extraction outcome. A completed file joins the aggregate
    /// set; a failed one only carries its error.
    pub fn finish(&mut self, id: &str, processed: ProcessedFile) -> StoreChange {
        if !processed.is_completed() {
            let error = processed
                .error
                .unwrap_or_else(|| "Extraction failed".to_string());
            return self.fail(id, error);
        }

        let processed_id = processed.id.clone();
        let mut change = self.replace(id, UploadStatus::Completed, |mut f| {
            f.progress = 100;
            f.processed_id = Some(processed_id);
            f.error = None;
            f
        });
        if change.file.is_some() {
            self.processed.push(processed);
            change.processed = Some(self.processed_set());
        }
        change
    }

    pub fn fail(&mut self, id: &str, error: String) -> StoreChange {
        self.replace(id, UploadStatus::Error, |mut f| {
            if f.status == UploadStatus::Processing {
                f.progress = 100;
            }
            f.error = Some(error);
            f
        })
    }

    /// Deletes an upload and its processed file, if any.
    pub fn remove(&mut self, id: &str) -> Option<StoreChange> {
        let pos = self.uploads.iter().position(|u| u.id == id)?;
        let removed = self.uploads.remove(pos);

        let mut change = StoreChange {
            file: Some(removed.clone()),
            processed: None,
        };
        if let Some(pid) = removed.processed_id.as_deref() {
            let before = self.processed.len();
            self.processed.retain(|p| p.id != pid);
            if self.processed.len() != before {
                change.processed = Some(self.processed_set());
            }
        }
        Some(change)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            uploads: self.uploads.clone(),
            processed: self.processed_set(),
        }
    }

    fn processed_set(&self) -> Arc<[ProcessedFile]> {
        Arc::from(self.processed.clone())
    }

    /// Replaces the entry for `id` with `update(entry)` if the status
    /// transition is legal. Unknown ids and illegal transitions are no-ops.
    fn replace(
        &mut self,
        id: &str,
        to: UploadStatus,
        update: impl FnOnce(UploadedFile) -> UploadedFile,
    ) -> StoreChange {
        let Some(slot) = self.uploads.iter_mut().find(|u| u.id == id) else {
            tracing::debug!(id, "ignoring update for removed upload");
            return StoreChange::default();
        };
        if !can_transition(slot.status, to) {
            tracing::debug!(id, from = ?slot.status, to = ?to, "ignoring illegal transition");
            return StoreChange::default();
        }

        let mut next = update(slot.clone());
        next.status = to;
        *slot = next.clone();
        StoreChange {
            file: Some(next),
            processed: None,
        }
    }
}
