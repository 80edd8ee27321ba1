//! Outbound alert delivery.
//!
//! The channel is a best-effort collaborator: delivery failures are logged
//! and dropped, never surfaced into the capture loop. Requests carry a
//! bounded timeout so a stalled network cannot stall capture beyond it.

use std::time::Duration;

/// Request timeout for one delivery attempt.
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

const MULTIPART_BOUNDARY: &str = "camguard-multipart-9c4e71";

/// Best-effort push-notification channel fed by the capture loop.
pub trait AlertChannel: Send + Sync {
    /// Deliver an encoded frame. Must not panic or block beyond the
    /// channel's own timeout; errors are handled internally.
    fn notify(&self, jpeg: &[u8]);
}

/// Channel used when no alert credentials are configured.
pub struct NullChannel;

impl AlertChannel for NullChannel {
    fn notify(&self, _jpeg: &[u8]) {
        log::debug!("alert channel not configured; dropping notification");
    }
}

/// Sends the triggering frame as a photo via the Telegram Bot API.
pub struct TelegramChannel {
    agent: ureq::Agent,
    token: String,
    chat_id: String,
}

impl TelegramChannel {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(NOTIFY_TIMEOUT).build();
        Self {
            agent,
            token: token.into(),
            chat_id: chat_id.into(),
        }
    }
}

impl AlertChannel for TelegramChannel {
    fn notify(&self, jpeg: &[u8]) {
        let url = format!("https://api.telegram.org/bot{}/sendPhoto", self.token);
        let body = multipart_photo(&self.chat_id, "Motion detected!", jpeg);
        let content_type = format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY);

        match self
            .agent
            .post(&url)
            .set("Content-Type", &content_type)
            .send_bytes(&body)
        {
            Ok(_) => log::debug!("telegram photo sent ({} bytes)", jpeg.len()),
            Err(ureq::Error::Status(code, response)) => {
                let detail = response.into_string().unwrap_or_default();
                log::warn!("telegram error {}: {}", code, detail.trim());
            }
            Err(e) => log::warn!("telegram delivery failed: {}", e),
        }
    }
}

/// Build a `multipart/form-data` body carrying chat id, caption, and photo.
fn multipart_photo(chat_id: &str, caption: &str, jpeg: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(jpeg.len() + 512);
    for (name, value) in [("chat_id", chat_id), ("caption", caption)] {
        body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"photo\"; filename=\"motion.jpg\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
    body.extend_from_slice(jpeg);
    body.extend_from_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}
