use crate::flash::{FlashLevel, FlashMessage, FlashSigner};
use crate::quality::{self, Quality};
use crate::state::AppState;
use axum::{
    extract::State,
    http::{
        HeaderMap, StatusCode,
        header::{CONTENT_TYPE, SET_COOKIE},
    },
    response::{Html, IntoResponse, Response},
};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Assets;

pub async fn static_handler(uri: axum::http::Uri) -> Response {
    let path = uri.path().trim_start_matches('/');
    let path = path.strip_prefix("static/").unwrap_or(path);

    match Assets::get(path) {
        Some(content) if path != "index.html" => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            ([(CONTENT_TYPE, mime.as_ref())], content.data).into_response()
        }
        _ => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}

/// The single page, with any pending flash messages rendered in and consumed.
pub async fn index_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(template) = Assets::get("index.html") else {
        return (
            StatusCode::NOT_FOUND,
            "index.html not found in embedded assets",
        )
            .into_response();
    };

    let messages = state.flash.read(&headers);
    let page = String::from_utf8_lossy(&template.data)
        .replace("{{flash}}", &render_flash(&messages))
        .replace("{{quality_options}}", &render_quality_options());

    let mut response = Html(page).into_response();
    if !messages.is_empty() {
        response
            .headers_mut()
            .insert(SET_COOKIE, FlashSigner::clear_cookie());
    }
    response
}

fn render_flash(messages: &[FlashMessage]) -> String {
    messages
        .iter()
        .map(|flash| {
            let class = match flash.level {
                FlashLevel::Success => "success",
                FlashLevel::Error => "danger",
            };
            format!(
                "<div class=\"alert alert-{class}\" role=\"alert\">{}</div>",
                escape_html(&flash.message)
            )
        })
        .collect()
}

fn render_quality_options() -> String {
    Quality::ALL
        .iter()
        .map(|quality| {
            let label = quality.label();
            let selected = if label == quality::DEFAULT_LABEL {
                " selected"
            } else {
                ""
            };
            format!("<option value=\"{label}\"{selected}>{label}</option>")
        })
        .collect()
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_messages_are_escaped() {
        let html = render_flash(&[FlashMessage::error("<script>alert('x')</script>")]);
        assert!(html.contains("alert-danger"));
        assert!(html.contains("&lt;script&gt;alert(&#039;x&#039;)&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn quality_options_default_to_720p() {
        let html = render_quality_options();
        assert!(html.contains("<option value=\"720p\" selected>720p</option>"));
        assert!(html.contains("<option value=\"4K\">4K</option>"));
        assert_eq!(html.matches("<option").count(), 5);
    }
}
