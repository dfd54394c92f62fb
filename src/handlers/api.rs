use crate::jobs::JobRecord;
use crate::progress::ProgressSnapshot;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

pub async fn progress(State(state): State<AppState>) -> Json<HashMap<String, ProgressSnapshot>> {
    Json(state.progress.snapshot())
}

pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobRecord>> {
    Json(state.jobs.list())
}

pub async fn get_job(Path(id): Path<Uuid>, State(state): State<AppState>) -> Response {
    match state.jobs.get(id) {
        Some(record) => Json(record).into_response(),
        None => job_not_found(),
    }
}

pub async fn cancel_job(Path(id): Path<Uuid>, State(state): State<AppState>) -> Response {
    match state.jobs.cancel(id) {
        Some(true) => {
            info!("Cancellation requested for job {}", id);
            Json(serde_json::json!({ "success": true, "message": "Cancellation requested" }))
                .into_response()
        }
        Some(false) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "success": false, "message": "Job already finished" })),
        )
            .into_response(),
        None => job_not_found(),
    }
}

pub async fn delete_job(Path(id): Path<Uuid>, State(state): State<AppState>) -> Response {
    match state.jobs.remove(id) {
        Some(_) => Json(serde_json::json!({ "message": "Download removed from history" }))
            .into_response(),
        None => job_not_found(),
    }
}

pub async fn clear_jobs(State(state): State<AppState>) -> Json<serde_json::Value> {
    let removed = state.jobs.clear_finished();
    info!("Cleared {} finished job(s) from history", removed);
    Json(serde_json::json!({
        "message": "Download history cleared",
        "removed": removed
    }))
}

fn job_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "message": "Download not found" })),
    )
        .into_response()
}
