use crate::error::StoreError;
use crate::flash::FlashMessage;
use crate::state::AppState;
use crate::store::StoredFile;
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{error, info};

#[derive(Debug, Serialize)]
pub struct FileOpResult {
    pub success: bool,
    pub message: String,
}

impl FileOpResult {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }

    fn failed(status: StatusCode, message: impl Into<String>) -> Response {
        (
            status,
            Json(Self {
                success: false,
                message: message.into(),
            }),
        )
            .into_response()
    }
}

pub async fn list_downloads(State(state): State<AppState>) -> Json<Vec<StoredFile>> {
    let store = state.store.clone();
    let listing = tokio::task::spawn_blocking(move || store.list()).await;

    match listing {
        Ok(Ok(files)) => Json(files),
        Ok(Err(e)) => {
            error!("List downloads error: {}", e);
            Json(Vec::new())
        }
        Err(e) => {
            error!("List downloads task failed: {}", e);
            Json(Vec::new())
        }
    }
}

pub async fn download_file(
    Path(filename): Path<String>,
    State(state): State<AppState>,
    request_headers: HeaderMap,
) -> Response {
    let store = state.store.clone();
    let name = filename.clone();
    let file_path = match tokio::task::spawn_blocking(move || store.resolve(&name)).await {
        Ok(Ok(path)) => path,
        Ok(Err(e)) => {
            info!("Requested missing file {:?}: {}", filename, e);
            return state
                .flash
                .redirect(&request_headers, FlashMessage::error("File not found"));
        }
        Err(e) => {
            error!("File lookup task failed: {}", e);
            return state.flash.redirect(
                &request_headers,
                FlashMessage::error(format!("Error downloading file: {e}")),
            );
        }
    };

    let file = match File::open(&file_path).await {
        Ok(f) => f,
        Err(e) => {
            error!("File download failed: {} (Path: {:?})", e, file_path);
            return state.flash.redirect(
                &request_headers,
                FlashMessage::error(format!("Error downloading file: {e}")),
            );
        }
    };

    let total_size = match file.metadata().await {
        Ok(metadata) => Some(metadata.len()),
        Err(e) => {
            error!("Could not stat {:?}: {}", file_path, e);
            None
        }
    };

    if let Some(job_id) = state.jobs.owner_of(&file_path) {
        info!("Serving {} (job {})", filename, job_id);
    } else {
        info!("Serving {}", filename);
    }

    let body = Body::from_stream(ReaderStream::new(file));

    let mut headers = HeaderMap::new();
    let content_type = mime_guess::from_path(&filename).first_or_octet_stream();
    if let Ok(val) = HeaderValue::from_str(content_type.as_ref()) {
        headers.insert(CONTENT_TYPE, val);
    }
    if let Ok(val) = HeaderValue::from_str(&content_disposition(&filename)) {
        headers.insert(CONTENT_DISPOSITION, val);
    }
    if let Some(size) = total_size
        && let Ok(val) = HeaderValue::from_str(&size.to_string())
    {
        headers.insert(CONTENT_LENGTH, val);
    }

    (headers, body).into_response()
}

pub async fn delete_file(Path(filename): Path<String>, State(state): State<AppState>) -> Response {
    let store = state.store.clone();
    let name = filename.clone();
    let deleted = tokio::task::spawn_blocking(move || store.delete(&name)).await;

    match deleted {
        Ok(Ok(())) => {
            info!("Deleted {}", filename);
            FileOpResult::ok("File deleted successfully").into_response()
        }
        Ok(Err(StoreError::NotFound(_))) => {
            FileOpResult::failed(StatusCode::NOT_FOUND, "File not found")
        }
        Ok(Err(e)) => {
            error!("File deletion error: {}", e);
            FileOpResult::failed(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            error!("File deletion task failed: {}", e);
            FileOpResult::failed(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub async fn clear_downloads(State(state): State<AppState>) -> Response {
    let store = state.store.clone();
    let cleared = tokio::task::spawn_blocking(move || store.clear()).await;

    match cleared {
        Ok(Ok(count)) => {
            info!("Cleared {} downloaded file(s)", count);
            FileOpResult::ok(format!("Deleted {count} files")).into_response()
        }
        Ok(Err(e)) => {
            error!("Clear downloads error: {}", e);
            FileOpResult::failed(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            error!("Clear downloads task failed: {}", e);
            FileOpResult::failed(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// `attachment` disposition with an ASCII fallback name and the exact name
/// as RFC 5987 `filename*`.
pub fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let ascii = match ascii.trim() {
        "" => "download.bin",
        trimmed => trimmed,
    };
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        utf8_percent_encode(filename, NON_ALPHANUMERIC)
    )
}
