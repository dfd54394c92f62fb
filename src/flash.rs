//! One-shot status messages carried across the post/redirect/get cycle in a
//! signed cookie.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, LOCATION, SET_COOKIE},
};
use axum::response::{IntoResponse, Response};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

pub const FLASH_COOKIE: &str = "tubegrab_flash";

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: FlashLevel,
    pub message: String,
}

impl FlashMessage {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Clone)]
pub struct FlashSigner {
    mac: HmacSha256,
}

impl FlashSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            mac: HmacSha256::new_from_slice(secret.as_bytes())
                .expect("HMAC accepts keys of any length"),
        }
    }

    pub fn encode(&self, messages: &[FlashMessage]) -> String {
        let payload = serde_json::to_vec(messages).unwrap_or_default();
        let mut mac = self.mac.clone();
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        )
    }

    /// Verified messages from a cookie value; `None` if tampered or malformed.
    pub fn decode(&self, value: &str) -> Option<Vec<FlashMessage>> {
        let (payload, signature) = value.split_once('.')?;
        let payload = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac.clone();
        mac.update(&payload);
        if mac.verify_slice(&signature).is_err() {
            debug!("Discarding flash cookie with a bad signature");
            return None;
        }
        serde_json::from_slice(&payload).ok()
    }

    /// Pending messages sent back by the browser.
    pub fn read(&self, headers: &HeaderMap) -> Vec<FlashMessage> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|cookies| cookies.split(';'))
            .filter_map(|cookie| cookie.trim().strip_prefix(FLASH_COOKIE)?.strip_prefix('='))
            .find_map(|value| self.decode(value))
            .unwrap_or_default()
    }

    pub fn set_cookie(&self, messages: &[FlashMessage]) -> Option<HeaderValue> {
        HeaderValue::from_str(&format!(
            "{FLASH_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax",
            self.encode(messages)
        ))
        .ok()
    }

    pub fn clear_cookie() -> HeaderValue {
        HeaderValue::from_static("tubegrab_flash=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")
    }

    /// `303 See Other` back to the form, queueing `message` behind any still
    /// pending ones.
    pub fn redirect(&self, headers: &HeaderMap, message: FlashMessage) -> Response {
        let mut messages = self.read(headers);
        messages.push(message);

        let mut response = (
            axum::http::StatusCode::SEE_OTHER,
            [(LOCATION, HeaderValue::from_static("/"))],
        )
            .into_response();
        if let Some(cookie) = self.set_cookie(&messages) {
            response.headers_mut().insert(SET_COOKIE, cookie);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_messages_decode() {
        let signer = FlashSigner::new("secret");
        let messages = vec![
            FlashMessage::success("Audio download started in best quality!"),
            FlashMessage::error("File not found"),
        ];
        let value = signer.encode(&messages);
        assert_eq!(signer.decode(&value), Some(messages));
    }

    #[test]
    fn tampered_or_foreign_cookies_are_rejected() {
        let signer = FlashSigner::new("secret");
        let value = signer.encode(&[FlashMessage::success("ok")]);

        let other = FlashSigner::new("another-secret");
        assert_eq!(other.decode(&value), None);

        let forged_payload = URL_SAFE_NO_PAD.encode(br#"[{"level":"success","message":"pwned"}]"#);
        let signature = value.split_once('.').unwrap().1;
        assert_eq!(signer.decode(&format!("{forged_payload}.{signature}")), None);
        assert_eq!(signer.decode("garbage"), None);
    }

    #[test]
    fn reads_from_cookie_header() {
        let signer = FlashSigner::new("secret");
        let value = signer.encode(&[FlashMessage::error("Please enter a YouTube URL")]);
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {FLASH_COOKIE}={value}")).unwrap(),
        );
        let messages = signer.read(&headers);
        assert_eq!(messages, vec![FlashMessage::error("Please enter a YouTube URL")]);
    }

    #[test]
    fn redirect_appends_to_pending_messages() {
        let signer = FlashSigner::new("secret");
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!(
                "{FLASH_COOKIE}={}",
                signer.encode(&[FlashMessage::success("first")])
            ))
            .unwrap(),
        );

        let response = signer.redirect(&headers, FlashMessage::success("second"));
        assert_eq!(response.status(), axum::http::StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[LOCATION], "/");

        let cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        let value = cookie
            .strip_prefix(&format!("{FLASH_COOKIE}="))
            .and_then(|rest| rest.split(';').next())
            .unwrap();
        let messages = signer.decode(value).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].message, "second");
    }
}
