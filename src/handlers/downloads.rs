use crate::downloads;
use crate::flash::FlashMessage;
use crate::quality;
use crate::state::AppState;
use axum::{
    Form,
    extract::State,
    http::{HeaderMap, HeaderValue},
    response::Response,
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

pub const JOB_ID_HEADER: &str = "x-job-id";

#[derive(Debug, Deserialize)]
pub struct VideoForm {
    #[serde(default)]
    pub url: String,
    pub quality: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AudioForm {
    #[serde(default)]
    pub url: String,
}

pub async fn download_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<VideoForm>,
) -> Response {
    let quality = form
        .quality
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(quality::DEFAULT_LABEL)
        .to_string();

    match downloads::start_video(&state, &form.url, &quality) {
        Ok(job_id) => started(
            &state,
            &headers,
            job_id,
            format!("Video download started in {quality} quality!"),
        ),
        Err(e) => {
            warn!("Rejected video request: {}", e);
            state.flash.redirect(&headers, FlashMessage::error(e.to_string()))
        }
    }
}

pub async fn download_audio(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<AudioForm>,
) -> Response {
    match downloads::start_audio(&state, &form.url) {
        Ok(job_id) => started(
            &state,
            &headers,
            job_id,
            "Audio download started in best quality!".to_string(),
        ),
        Err(e) => {
            warn!("Rejected audio request: {}", e);
            state.flash.redirect(&headers, FlashMessage::error(e.to_string()))
        }
    }
}

fn started(state: &AppState, headers: &HeaderMap, job_id: Uuid, message: String) -> Response {
    let mut response = state.flash.redirect(headers, FlashMessage::success(message));
    if let Ok(value) = HeaderValue::from_str(&job_id.to_string()) {
        response.headers_mut().insert(JOB_ID_HEADER, value);
    }
    response
}
