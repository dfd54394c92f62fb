use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

pub const INSECURE_SESSION_SECRET: &str = "dev-secret-key-change-in-production";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server_port: u16,
    pub bind_address: String,
    pub downloads_dir: PathBuf,
    pub sentinel_name: String,
    pub log_level: String,
    pub session_secret: Option<String>,
    pub ytdlp_path: String,
    pub ffmpeg_location: Option<String>,
    pub engine_timeout_secs: u64,
    pub progress_ttl_secs: u64,
    pub job_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            // Default settings
            .set_default("server_port", 5000)?
            .set_default("bind_address", "0.0.0.0")?
            .set_default("downloads_dir", "./downloads")?
            .set_default("sentinel_name", ".gitkeep")?
            .set_default("log_level", "info")?
            .set_default("ytdlp_path", "yt-dlp")?
            .set_default("engine_timeout_secs", 0)?
            .set_default("progress_ttl_secs", 3600)?
            .set_default("job_ttl_secs", 86400)?
            .set_default("sweep_interval_secs", 60)?
            // Config file (optional)
            .add_source(File::with_name("config").required(false))
            // Environment variables (e.g. TUBEGRAB_SERVER_PORT=8080)
            .add_source(Environment::with_prefix("TUBEGRAB"));

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        if settings.session_secret.is_none() {
            settings.session_secret = std::env::var("SESSION_SECRET")
                .ok()
                .filter(|value| !value.trim().is_empty());
        }
        Ok(settings)
    }

    /// Secret used to sign flash cookies, and whether it is the built-in fallback.
    pub fn session_secret(&self) -> (&str, bool) {
        match self.session_secret.as_deref() {
            Some(secret) => (secret, false),
            None => (INSECURE_SESSION_SECRET, true),
        }
    }

    #[cfg(test)]
    pub fn for_tests(downloads_dir: PathBuf) -> Self {
        Self {
            server_port: 0,
            bind_address: "127.0.0.1".to_string(),
            downloads_dir,
            sentinel_name: ".gitkeep".to_string(),
            log_level: "info".to_string(),
            session_secret: Some("test-secret".to_string()),
            ytdlp_path: "yt-dlp".to_string(),
            ffmpeg_location: None,
            engine_timeout_secs: 0,
            progress_ttl_secs: 3600,
            job_ttl_secs: 86400,
            sweep_interval_secs: 60,
        }
    }
}
