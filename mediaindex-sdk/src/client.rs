//! Telegram Bot API client.
//!
//! [`Bot`] wraps a `reqwest::Client` and exposes the Bot API methods the
//! indexing bot uses. Every call goes through one JSON envelope decoder, so
//! rate limiting (`retry_after`) and "message is not modified" come back as
//! typed [`ApiError`] variants.
//!
//! ## Polling
//!
//! [`connect`] spawns a long-poll task and returns a receiver of
//! [`Event`]s. Poll failures back off exponentially (2→4→8→16→30s cap,
//! with jitter) and are reported once per outage as
//! [`Event::Disconnected`]; a successful `getMe` afterwards emits
//! [`Event::Connected`] again.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::error::{ApiError, ApiResult};
use crate::event::Event;
use crate::types::{
    ApiResponse, Chat, ChatTarget, File, InlineKeyboardMarkup, Message, Update, User,
};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// How many times [`with_flood_retry`] waits out a flood limit.
const MAX_FLOOD_RETRIES: u32 = 3;

/// A cloneable handle to the Bot API.
#[derive(Clone)]
pub struct Bot {
    http: reqwest::Client,
    token: Arc<str>,
    api_url: Arc<str>,
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot").field("api_url", &self.api_url).finish_non_exhaustive()
    }
}

impl Bot {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_api_url(token, DEFAULT_API_URL)
    }

    /// Point the client at a different Bot API server (local server, tests).
    pub fn with_api_url(token: impl Into<String>, api_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: Arc::from(token.into()),
            api_url: Arc::from(api_url.trim_end_matches('/')),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_url, self.token, file_path)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> ApiResult<T> {
        tracing::trace!(method, "Bot API call");
        let resp = self.http.post(self.method_url(method)).json(body).send().await?;
        // Telegram answers errors with the same JSON envelope and a 4xx status.
        let envelope: ApiResponse<T> = resp.json().await?;
        into_result(envelope)
    }

    pub async fn get_me(&self) -> ApiResult<User> {
        self.call("getMe", &json!({})).await
    }

    /// Long-poll for updates. `timeout` is in seconds.
    pub async fn get_updates(&self, offset: Option<i64>, timeout: u64) -> ApiResult<Vec<Update>> {
        let mut body = json!({
            "timeout": timeout,
            "allowed_updates": ["message", "channel_post", "edited_channel_post", "callback_query"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        self.call("getUpdates", &body).await
    }

    /// Send an HTML formatted message.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> ApiResult<Message> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if let Some(kb) = keyboard {
            body["reply_markup"] = json!(kb);
        }
        self.call("sendMessage", &body).await
    }

    /// Upload an in-memory file as a document.
    pub async fn send_document(
        &self,
        chat_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> ApiResult<Message> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);
        if let Some(caption) = caption {
            form = form
                .text("caption", caption.to_string())
                .text("parse_mode", "HTML");
        }
        let resp = self
            .http
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?;
        let envelope: ApiResponse<Message> = resp.json().await?;
        into_result(envelope)
    }

    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> ApiResult<Message> {
        let mut body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if let Some(kb) = keyboard {
            body["reply_markup"] = json!(kb);
        }
        self.call("editMessageText", &body).await
    }

    /// Replace a media caption. Captions are sent as plain text.
    pub async fn edit_message_caption(
        &self,
        chat_id: i64,
        message_id: i64,
        caption: &str,
    ) -> ApiResult<Message> {
        let body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "caption": caption,
        });
        self.call("editMessageCaption", &body).await
    }

    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> ApiResult<bool> {
        let body = json!({ "chat_id": chat_id, "message_id": message_id });
        self.call("deleteMessage", &body).await
    }

    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> ApiResult<bool> {
        let mut body = json!({
            "callback_query_id": callback_query_id,
            "show_alert": show_alert,
        });
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        self.call("answerCallbackQuery", &body).await
    }

    pub async fn get_chat(&self, chat: &ChatTarget) -> ApiResult<Chat> {
        self.call("getChat", &json!({ "chat_id": chat })).await
    }

    pub async fn get_file(&self, file_id: &str) -> ApiResult<File> {
        self.call("getFile", &json!({ "file_id": file_id })).await
    }

    /// Download at most `max_bytes` of a file into `dest`, truncating any
    /// existing content. Returns the number of bytes written.
    pub async fn download_file_range(
        &self,
        file_path: &str,
        max_bytes: u64,
        dest: &Path,
    ) -> ApiResult<u64> {
        if max_bytes == 0 {
            return Ok(0);
        }
        let mut resp = self
            .http
            .get(self.file_url(file_path))
            .header(reqwest::header::RANGE, format!("bytes=0-{}", max_bytes - 1))
            .send()
            .await?
            .error_for_status()?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = resp.chunk().await? {
            let remaining = max_bytes - written;
            let take = (chunk.len() as u64).min(remaining) as usize;
            file.write_all(&chunk[..take]).await?;
            written += take as u64;
            // Servers that ignore Range keep streaming; stop at the cap.
            if written >= max_bytes {
                break;
            }
        }
        file.flush().await?;
        tracing::debug!(file_path, written, "Partial download finished");
        Ok(written)
    }

    /// Fetch a small file (a channel list, say) into memory.
    pub async fn download_file_bytes(&self, file_path: &str, max_bytes: usize) -> ApiResult<Vec<u8>> {
        let mut resp = self
            .http
            .get(self.file_url(file_path))
            .send()
            .await?
            .error_for_status()?;
        let mut buf = Vec::new();
        while let Some(chunk) = resp.chunk().await? {
            if buf.len() + chunk.len() > max_bytes {
                return Err(ApiError::Decode(format!("{file_path} is larger than {max_bytes} bytes")));
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }
}

fn into_result<T>(envelope: ApiResponse<T>) -> ApiResult<T> {
    if envelope.ok {
        return envelope
            .result
            .ok_or_else(|| ApiError::Decode("ok response without result".to_string()));
    }
    let description = envelope.description.unwrap_or_default();
    if let Some(retry_after) = envelope.parameters.as_ref().and_then(|p| p.retry_after) {
        return Err(ApiError::FloodWait { retry_after });
    }
    if description.contains("message is not modified") {
        return Err(ApiError::NotModified);
    }
    Err(ApiError::Api {
        code: envelope.error_code.unwrap_or(0),
        description,
    })
}

/// Run `call`, sleeping through flood waits up to three times.
pub async fn with_flood_retry<T, F, Fut>(mut call: F) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let mut attempts = 0;
    loop {
        match call().await {
            Err(ApiError::FloodWait { retry_after }) if attempts < MAX_FLOOD_RETRIES => {
                attempts += 1;
                tracing::warn!(retry_after, attempt = attempts, "FloodWait, sleeping");
                tokio::time::sleep(Duration::from_secs(retry_after)).await;
            }
            other => return other,
        }
    }
}

/// Long-poll and backoff settings.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// `getUpdates` timeout in seconds.
    pub timeout_secs: u64,
    /// Initial delay before retrying after a failure.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failure.
    pub backoff_factor: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

/// Start polling for updates.
///
/// The poller runs in a spawned task and stops once the returned receiver
/// is dropped.
pub fn connect(bot: Bot, config: PollConfig) -> mpsc::Receiver<Event> {
    let (event_tx, event_rx) = mpsc::channel(4096);
    tokio::spawn(run_poller(bot, config, event_tx));
    event_rx
}

async fn run_poller(bot: Bot, config: PollConfig, event_tx: mpsc::Sender<Event>) {
    let mut offset: Option<i64> = None;
    let mut delay = config.initial_delay;
    let mut online = false;
    let mut username = String::new();
    // Last state handed to the consumer: `Some(true)` after Connected,
    // `Some(false)` after Disconnected. Each is sent once per change.
    let mut announced: Option<bool> = None;

    loop {
        if event_tx.is_closed() {
            tracing::debug!("Event receiver dropped, stopping poller");
            return;
        }

        if !online {
            match bot.get_me().await {
                Ok(me) => {
                    online = true;
                    username = me.username.unwrap_or(me.first_name);
                    if announced.is_none() {
                        announced = Some(true);
                        if event_tx.send(Event::Connected { username: username.clone() }).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, delay_secs = delay.as_secs(), "getMe failed, retrying");
                    if announced != Some(false) {
                        announced = Some(false);
                        let _ = event_tx.send(Event::Disconnected { reason: e.to_string() }).await;
                    }
                    tokio::time::sleep(delay).await;
                    delay = next_delay(delay, &config);
                    continue;
                }
            }
        }

        match bot.get_updates(offset, config.timeout_secs).await {
            Ok(updates) => {
                delay = config.initial_delay;
                if announced == Some(false) {
                    announced = Some(true);
                    if event_tx.send(Event::Connected { username: username.clone() }).await.is_err() {
                        return;
                    }
                }
                for update in updates {
                    offset = Some(update.update_id + 1);
                    if let Some(event) = Event::from_update(update) {
                        if event_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Err(ApiError::FloodWait { retry_after }) => {
                tracing::warn!(retry_after, "getUpdates rate limited");
                tokio::time::sleep(Duration::from_secs(retry_after)).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, delay_secs = delay.as_secs(), "getUpdates failed");
                online = false;
                if announced != Some(false) {
                    announced = Some(false);
                    let _ = event_tx.send(Event::Disconnected { reason: e.to_string() }).await;
                }
                tokio::time::sleep(delay).await;
                delay = next_delay(delay, &config);
            }
        }
    }
}

/// Exponential backoff with up to 25% jitter, capped at `max_delay`.
fn next_delay(delay: Duration, config: &PollConfig) -> Duration {
    let base = delay.as_millis() as u64;
    let jitter = if base >= 4 {
        rand::thread_rng().gen_range(0..base / 4)
    } else {
        0
    };
    Duration::from_millis(
        ((base as f64 * config.backoff_factor) as u64 + jitter)
            .min(config.max_delay.as_millis() as u64),
    )
}
