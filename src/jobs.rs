use crate::error::EngineError;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

/// One download request and everything it produced.
#[derive(Clone, Debug, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub kind: MediaKind,
    pub url: String,
    pub quality: Option<String>,
    pub state: JobState,
    pub title: Option<String>,
    pub error: Option<String>,
    pub files: Vec<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

struct JobEntry {
    record: JobRecord,
    cancel: CancellationToken,
}

/// Registry of download jobs, doubling as the file ownership manifest.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<Uuid, JobEntry>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &self,
        kind: MediaKind,
        url: &str,
        quality: Option<&str>,
    ) -> (Uuid, CancellationToken) {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let record = JobRecord {
            id,
            kind,
            url: url.to_string(),
            quality: quality.map(ToString::to_string),
            state: JobState::Queued,
            title: None,
            error: None,
            files: Vec::new(),
            created_at: Utc::now(),
            finished_at: None,
        };
        self.lock().insert(
            id,
            JobEntry {
                record,
                cancel: cancel.clone(),
            },
        );
        (id, cancel)
    }

    pub fn mark_running(&self, id: Uuid) {
        if let Some(entry) = self.lock().get_mut(&id)
            && entry.record.state == JobState::Queued
        {
            entry.record.state = JobState::Running;
        }
    }

    pub fn set_title(&self, id: Uuid, title: &str) {
        if let Some(entry) = self.lock().get_mut(&id) {
            entry.record.title = Some(title.to_string());
        }
    }

    /// Records the terminal state of a job from its background unit's outcome.
    pub fn finish(&self, id: Uuid, outcome: &Result<Vec<PathBuf>, EngineError>) {
        let mut jobs = self.lock();
        let Some(entry) = jobs.get_mut(&id) else {
            return;
        };
        let record = &mut entry.record;
        match outcome {
            Ok(files) => {
                record.state = JobState::Succeeded;
                record.files = files.clone();
            }
            Err(EngineError::Cancelled) => {
                record.state = JobState::Cancelled;
            }
            Err(error) => {
                record.state = JobState::Failed;
                record.error = Some(error.to_string());
            }
        }
        record.finished_at = Some(Utc::now());
    }

    pub fn get(&self, id: Uuid) -> Option<JobRecord> {
        self.lock().get(&id).map(|entry| entry.record.clone())
    }

    /// All jobs, newest first.
    pub fn list(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self
            .lock()
            .values()
            .map(|entry| entry.record.clone())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Requests cancellation. `None` if the job is unknown, `Some(false)` if
    /// it already finished.
    pub fn cancel(&self, id: Uuid) -> Option<bool> {
        let jobs = self.lock();
        let entry = jobs.get(&id)?;
        if entry.record.state.is_terminal() {
            return Some(false);
        }
        entry.cancel.cancel();
        Some(true)
    }

    /// Forgets a job, cancelling it first if it is still running.
    pub fn remove(&self, id: Uuid) -> Option<JobRecord> {
        let entry = self.lock().remove(&id)?;
        if !entry.record.state.is_terminal() {
            entry.cancel.cancel();
        }
        Some(entry.record)
    }

    pub fn clear_finished(&self) -> usize {
        let mut jobs = self.lock();
        let before = jobs.len();
        jobs.retain(|_, entry| !entry.record.state.is_terminal());
        before - jobs.len()
    }

    /// Drops finished jobs whose terminal state is older than `ttl`.
    pub fn evict_finished(&self, ttl: Duration) -> usize {
        let Some(cutoff) = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
        else {
            return 0;
        };
        let mut jobs = self.lock();
        let before = jobs.len();
        jobs.retain(|_, entry| match entry.record.finished_at {
            Some(finished_at) => finished_at > cutoff,
            None => true,
        });
        before - jobs.len()
    }

    /// The job that produced `path`, if any.
    pub fn owner_of(&self, path: &Path) -> Option<Uuid> {
        let file_name = path.file_name()?;
        self.lock()
            .values()
            .find(|entry| {
                entry
                    .record
                    .files
                    .iter()
                    .any(|file| file.file_name() == Some(file_name))
            })
            .map(|entry| entry.record.id)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, JobEntry>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
