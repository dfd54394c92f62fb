mod config;
mod downloads;
mod engine;
mod error;
mod flash;
mod handlers;
mod jobs;
mod progress;
mod quality;
mod state;
mod store;
mod tasks;
mod validator;

use axum::{
    Router,
    routing::{get, post},
};
use local_ip_address::local_ip;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Level, info, warn};

use crate::config::Settings;
use crate::engine::YtDlp;
use crate::handlers::{api, downloads as download_h, files, web};
use crate::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let settings = Settings::new().expect("Failed to load configuration");

    tracing_subscriber::fmt()
        .with_env_filter(&settings.log_level)
        .init();

    info!("Starting Tubegrab...");

    if settings.session_secret().1 {
        warn!("No session secret configured; flash cookies are signed with an insecure development key");
    }

    let engine = Arc::new(YtDlp::new(
        settings.ytdlp_path.clone(),
        settings.ffmpeg_location.clone(),
        settings.engine_timeout_secs,
    ));
    let state = AppState::new(settings.clone(), engine);

    state
        .store
        .ensure_dir()
        .expect("Failed to create downloads directory");
    info!("Downloads directory: {:?}", state.store.dir());
    info!("Media engine: {}", settings.ytdlp_path);

    // Start background tasks (progress / job eviction)
    tasks::start_background_tasks(state.clone());

    // --- Router Setup ---
    let app = create_app(state);

    let port = settings.server_port;
    let listener = tokio::net::TcpListener::bind((settings.bind_address.as_str(), port))
        .await
        .expect("Failed to bind listener");
    info!("Listening on http://{}:{}", settings.bind_address, port);
    if let Ok(ip) = local_ip() {
        info!("Network address: http://{}:{}", ip, port);
    }

    axum::serve(listener, app).await.expect("Server error");
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(web::index_handler))
        .route("/download_video", post(download_h::download_video))
        .route("/download_audio", post(download_h::download_audio))
        .route("/progress", get(api::progress))
        .route("/list_downloads", get(files::list_downloads))
        .route("/download_file/{filename}", get(files::download_file))
        .route("/delete_file/{filename}", post(files::delete_file))
        .route("/clear_downloads", post(files::clear_downloads))
        .route("/api/downloads", get(api::list_jobs).delete(api::clear_jobs))
        .route("/api/downloads/{id}", get(api::get_job).delete(api::delete_job))
        .route("/api/downloads/{id}/cancel", post(api::cancel_job))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
        .fallback(web::static_handler)
}
