use crate::state::AppState;
use std::time::Duration;
use tracing::{debug, info};

pub fn start_background_tasks(state: AppState) {
    // Progress / job history eviction
    let interval_secs = state.settings.sweep_interval_secs.max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            sweep(&state);
        }
    });
}

/// Evicts stale progress snapshots and expired finished jobs.
pub fn sweep(state: &AppState) -> (usize, usize) {
    let progress = state
        .progress
        .evict_stale(Duration::from_secs(state.settings.progress_ttl_secs));
    let jobs = state
        .jobs
        .evict_finished(Duration::from_secs(state.settings.job_ttl_secs));

    if progress > 0 || jobs > 0 {
        info!(
            "Evicted {} progress snapshot(s) and {} finished job(s)",
            progress, jobs
        );
    } else {
        debug!("Sweep found nothing to evict");
    }
    (progress, jobs)
}
