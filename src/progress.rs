use crate::engine::{EventStatus, ProgressEvent, ProgressHook};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    Downloading,
    Finished,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProgressSnapshot {
    pub percentage: f64,
    pub status: SnapshotStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>, // bytes per second
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<f64>, // seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    #[serde(skip)]
    pub updated_at: Instant,
}

/// Last observed progress per engine-reported filename.
///
/// Shared between the engine hooks of every running job and the `/progress`
/// poller. Keys are whatever filename the engine reports, which may change
/// between stages of a single download (fragments, merge output).
#[derive(Clone, Default)]
pub struct ProgressTracker {
    entries: Arc<Mutex<HashMap<String, ProgressSnapshot>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hook handed to the engine for one job.
    pub fn hook(&self, job_id: Uuid) -> ProgressHook {
        let tracker = self.clone();
        Arc::new(move |event: &ProgressEvent| tracker.record(Some(job_id), event))
    }

    pub fn record(&self, job_id: Option<Uuid>, event: &ProgressEvent) {
        let key = event
            .filename
            .clone()
            .unwrap_or_else(|| "unknown".to_string());

        let snapshot = match event.status {
            EventStatus::Downloading => {
                let Some(percentage) = download_percentage(event) else {
                    return;
                };
                ProgressSnapshot {
                    percentage,
                    status: SnapshotStatus::Downloading,
                    speed: Some(event.speed.unwrap_or(0.0)),
                    eta: Some(event.eta.unwrap_or(0.0)),
                    filepath: None,
                    job_id,
                    updated_at: Instant::now(),
                }
            }
            EventStatus::Finished => ProgressSnapshot {
                percentage: 100.0,
                status: SnapshotStatus::Finished,
                speed: None,
                eta: None,
                filepath: Some(event.filename.clone().unwrap_or_default()),
                job_id,
                updated_at: Instant::now(),
            },
            EventStatus::Other => return,
        };

        self.lock().insert(key, snapshot);
    }

    pub fn get(&self, key: &str) -> Option<ProgressSnapshot> {
        self.lock().get(key).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, ProgressSnapshot> {
        self.lock().clone()
    }

    /// Drops snapshots not updated within `ttl`. Returns how many were dropped.
    pub fn evict_stale(&self, ttl: Duration) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, snapshot| snapshot.updated_at.elapsed() < ttl);
        before - entries.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProgressSnapshot>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Percentage for a "downloading" event, or `None` when the total is unknown.
fn download_percentage(event: &ProgressEvent) -> Option<f64> {
    let Some(total) = event
        .total_bytes
        .filter(|total| *total > 0.0)
        .or(event.total_bytes_estimate)
    else {
        debug!(
            "Progress event without total size for {:?}, skipping",
            event.filename
        );
        return None;
    };
    if !(total > 0.0) {
        return None;
    }
    let downloaded = event.downloaded_bytes.unwrap_or(0.0);
    Some((downloaded / total * 100.0).clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downloading(filename: &str, downloaded: f64, total: Option<f64>) -> ProgressEvent {
        ProgressEvent {
            status: EventStatus::Downloading,
            filename: Some(filename.to_string()),
            downloaded_bytes: Some(downloaded),
            total_bytes: total,
            total_bytes_estimate: None,
            speed: Some(1024.0),
            eta: Some(3.0),
        }
    }

    #[test]
    fn percentage_is_monotonic_and_finishes_at_100() {
        let tracker = ProgressTracker::new();
        let mut last = 0.0;
        for downloaded in [0.0, 100.0, 250.0, 600.0, 1000.0] {
            tracker.record(None, &downloading("clip.mp4", downloaded, Some(1000.0)));
            let pct = tracker.get("clip.mp4").unwrap().percentage;
            assert!(pct >= last);
            last = pct;
        }

        tracker.record(
            None,
            &ProgressEvent {
                status: EventStatus::Finished,
                filename: Some("clip.mp4".to_string()),
                ..Default::default()
            },
        );
        let done = tracker.get("clip.mp4").unwrap();
        assert_eq!(done.percentage, 100.0);
        assert_eq!(done.status, SnapshotStatus::Finished);
        assert_eq!(done.filepath.as_deref(), Some("clip.mp4"));
    }

    #[test]
    fn unknown_or_zero_total_is_ignored() {
        let tracker = ProgressTracker::new();
        tracker.record(None, &downloading("a.mp4", 10.0, None));
        tracker.record(None, &downloading("b.mp4", 10.0, Some(0.0)));
        assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn estimate_is_used_when_total_is_missing() {
        let tracker = ProgressTracker::new();
        let mut event = downloading("c.mp4", 50.0, None);
        event.total_bytes_estimate = Some(200.0);
        tracker.record(None, &event);
        assert_eq!(tracker.get("c.mp4").unwrap().percentage, 25.0);
    }

    #[test]
    fn zero_total_falls_back_to_the_estimate() {
        let tracker = ProgressTracker::new();
        let mut event = downloading("z.mp4", 50.0, Some(0.0));
        event.total_bytes_estimate = Some(100.0);
        tracker.record(None, &event);
        assert_eq!(tracker.get("z.mp4").unwrap().percentage, 50.0);
    }

    #[test]
    fn overshooting_estimates_are_clamped() {
        let tracker = ProgressTracker::new();
        tracker.record(None, &downloading("d.mp4", 300.0, Some(200.0)));
        assert_eq!(tracker.get("d.mp4").unwrap().percentage, 100.0);
    }

    #[test]
    fn hook_tags_snapshots_with_the_job() {
        let tracker = ProgressTracker::new();
        let job_id = Uuid::new_v4();
        let hook = tracker.hook(job_id);
        hook(&downloading("e.mp4", 1.0, Some(2.0)));
        assert_eq!(tracker.get("e.mp4").unwrap().job_id, Some(job_id));
    }

    #[test]
    fn stale_snapshots_are_evicted() {
        let tracker = ProgressTracker::new();
        tracker.record(None, &downloading("f.mp4", 1.0, Some(2.0)));
        assert_eq!(tracker.evict_stale(Duration::from_secs(3600)), 0);
        assert_eq!(tracker.evict_stale(Duration::ZERO), 1);
        assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn serializes_like_the_polling_contract() {
        let tracker = ProgressTracker::new();
        tracker.record(None, &downloading("g.mp4", 1.0, Some(4.0)));
        let json = serde_json::to_value(tracker.snapshot()).unwrap();
        let entry = &json["g.mp4"];
        assert_eq!(entry["percentage"], 25.0);
        assert_eq!(entry["status"], "downloading");
        assert_eq!(entry["speed"], 1024.0);
        assert!(entry.get("updated_at").is_none());
    }
}
