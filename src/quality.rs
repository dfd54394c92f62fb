use serde::{Deserialize, Serialize};

/// Selector used when the requested label is not one of [`Quality::ALL`].
pub const DEFAULT_SELECTOR: &str = "bestvideo[height<=720]+bestaudio/best";

/// Label assumed when a request carries no quality at all.
pub const DEFAULT_LABEL: &str = "720p";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "4K")]
    Uhd4k,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "360p")]
    P360,
}

impl Quality {
    pub const ALL: [Quality; 5] = [
        Quality::Uhd4k,
        Quality::P1080,
        Quality::P720,
        Quality::P480,
        Quality::P360,
    ];

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.label() == label)
    }

    pub fn label(self) -> &'static str {
        match self {
            Quality::Uhd4k => "4K",
            Quality::P1080 => "1080p",
            Quality::P720 => "720p",
            Quality::P480 => "480p",
            Quality::P360 => "360p",
        }
    }

    /// Vertical resolution the tier is named after.
    pub fn height(self) -> u32 {
        match self {
            Quality::Uhd4k => 2160,
            Quality::P1080 => 1080,
            Quality::P720 => 720,
            Quality::P480 => 480,
            Quality::P360 => 360,
        }
    }

    /// Format selector for the engine.
    ///
    /// Each chain prefers the exact tier as mp4 video with m4a audio, then
    /// the exact tier in any container, then anything at or below the tier
    /// (4K degrades to 1440p and up instead), and finally whatever the
    /// engine considers best.
    pub fn format_selector(self) -> &'static str {
        match self {
            Quality::Uhd4k => {
                "bestvideo[height>=2160][ext=mp4]+bestaudio[ext=m4a]/bestvideo[height>=2160]+bestaudio/bestvideo[height>=1440]+bestaudio/best"
            }
            Quality::P1080 => {
                "bestvideo[height>=1080][height<=1080][ext=mp4]+bestaudio[ext=m4a]/bestvideo[height>=1080][height<=1080]+bestaudio/bestvideo[height<=1080]+bestaudio/best"
            }
            Quality::P720 => {
                "bestvideo[height>=720][height<=720][ext=mp4]+bestaudio[ext=m4a]/bestvideo[height>=720][height<=720]+bestaudio/bestvideo[height<=720]+bestaudio/best"
            }
            Quality::P480 => {
                "bestvideo[height>=480][height<=480][ext=mp4]+bestaudio[ext=m4a]/bestvideo[height>=480][height<=480]+bestaudio/bestvideo[height<=480]+bestaudio/best"
            }
            Quality::P360 => {
                "bestvideo[height>=360][height<=360][ext=mp4]+bestaudio[ext=m4a]/bestvideo[height>=360][height<=360]+bestaudio/bestvideo[height<=360]+bestaudio/best"
            }
        }
    }
}

/// Maps a free-form label to a selector, falling back to [`DEFAULT_SELECTOR`].
pub fn format_selector_for(label: &str) -> &'static str {
    Quality::from_label(label)
        .map(Quality::format_selector)
        .unwrap_or(DEFAULT_SELECTOR)
}
