//! Link validation for incoming download requests.
//!
//! Accepts the usual watch, embed, `v/` and short-link shapes on the
//! youtube, youtu.be and youtube-nocookie hosts, with or without scheme and
//! `www.` prefix. The pattern is anchored at the start only, so trailing
//! query parameters (`&t=42s`, `&list=...`) are tolerated.

use once_cell::sync::Lazy;
use regex::Regex;

static VIDEO_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(https?://)?(www\.)?(youtube|youtu|youtube-nocookie)\.(com|be)/(watch\?v=|embed/|v/|.+\?v=)?([^&=%?]{11})",
    )
    .expect("video url pattern is valid")
});

/// Whether `url` plausibly identifies a single video on a supported host.
pub fn is_valid_video_url(url: &str) -> bool {
    VIDEO_URL_RE.is_match(url)
}

/// The 11-character id segment of a valid link.
pub fn extract_video_id(url: &str) -> Option<&str> {
    VIDEO_URL_RE
        .captures(url)
        .and_then(|caps| caps.get(6))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_link_shapes() {
        let urls = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "http://youtube.com/watch?v=dQw4w9WgXcQ",
            "www.youtube.com/watch?v=dQw4w9WgXcQ",
            "youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/v/dQw4w9WgXcQ",
            "https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s",
            "https://www.youtube.com/attribution_link?a=xyz&u=/watch?v=dQw4w9WgXcQ",
        ];
        for url in urls {
            assert!(is_valid_video_url(url), "expected valid: {url}");
        }
    }

    #[test]
    fn rejects_links_without_an_id_segment() {
        let urls = [
            "",
            "not a url",
            "https://www.youtube.com/",
            "https://www.youtube.com/watch?v=short",
            "https://youtu.be/abc",
            "https://vimeo.com/123456789",
            "https://example.com/watch?v=dQw4w9WgXcQ",
            "ftp://youtube.com/watch?v=dQw4w9WgXcQ",
        ];
        for url in urls {
            assert!(!is_valid_video_url(url), "expected invalid: {url}");
        }
    }

    #[test]
    fn extracts_the_id() {
        assert_eq!(
            extract_video_id("https://youtu.be/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=1"),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(extract_video_id("https://example.com"), None);
    }
}
