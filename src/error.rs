use thiserror::Error;

/// Failures of the external media engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("external tool is missing: {tool}")]
    ToolMissing { tool: String },

    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed (code={code:?}): {message}")]
    Failed {
        tool: String,
        code: Option<i32>,
        message: String,
    },

    #[error("could not parse engine metadata: {0}")]
    InvalidMetadata(#[from] serde_json::Error),

    #[error("engine call timed out after {0}s")]
    Timeout(u64),

    #[error("download cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the downloads directory.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("File not found")]
    NotFound(String),

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejections of a download request before any work is scheduled.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("Please enter a YouTube URL")]
    MissingUrl,

    #[error("Please enter a valid YouTube URL")]
    InvalidUrl,
}
