//! Bot API object models (only the fields the bot reads or writes).

use serde::{Deserialize, Serialize};

/// Envelope every Bot API method responds with.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseParameters {
    pub retry_after: Option<u64>,
    pub migrate_to_chat_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Option<String>,
    pub username: Option<String>,
}

impl Chat {
    /// Human readable name: title, then @username, then the numeric id.
    pub fn display_name(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        match &self.username {
            Some(u) => format!("@{u}"),
            None => self.id.to_string(),
        }
    }
}

/// Chat addressed either by numeric id or by public `@username`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChatTarget {
    Id(i64),
    Username(String),
}

impl std::fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatTarget::Id(id) => write!(f, "{id}"),
            ChatTarget::Username(name) => write!(f, "{name}"),
        }
    }
}

impl From<i64> for ChatTarget {
    fn from(id: i64) -> Self {
        ChatTarget::Id(id)
    }
}

/// Shared shape of video, audio, document and animation attachments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaFile {
    pub file_id: String,
    #[serde(default)]
    pub file_unique_id: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Document,
    Animation,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
            MediaKind::Animation => "animation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "video" => Some(MediaKind::Video),
            "audio" => Some(MediaKind::Audio),
            "document" => Some(MediaKind::Document),
            "animation" => Some(MediaKind::Animation),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub date: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub sender_chat: Option<Chat>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub video: Option<MediaFile>,
    pub audio: Option<MediaFile>,
    pub document: Option<MediaFile>,
    pub animation: Option<MediaFile>,
    pub reply_to_message: Option<Box<Message>>,
}

impl Message {
    /// The attached media, checked in order video, audio, document, animation.
    pub fn media(&self) -> Option<(MediaKind, &MediaFile)> {
        if let Some(v) = &self.video {
            return Some((MediaKind::Video, v));
        }
        if let Some(a) = &self.audio {
            return Some((MediaKind::Audio, a));
        }
        if let Some(d) = &self.document {
            return Some((MediaKind::Document, d));
        }
        self.animation.as_ref().map(|a| (MediaKind::Animation, a))
    }

    /// Parse `/cmd@botname arg1 arg2` into (`cmd`, args).
    pub fn command(&self) -> Option<(String, Vec<String>)> {
        let text = self.text.as_deref()?.trim_start();
        let rest = text.strip_prefix('/')?;
        let mut parts = rest.split_whitespace();
        let head = parts.next()?;
        let name = head.split('@').next().unwrap_or(head).to_lowercase();
        if name.is_empty() {
            return None;
        }
        Some((name, parts.map(str::to_string).collect()))
    }

    /// Id of the sending user, or of the sending chat for anonymous posts.
    pub fn sender_id(&self) -> Option<i64> {
        self.from
            .as_ref()
            .map(|u| u.id)
            .or_else(|| self.sender_chat.as_ref().map(|c| c.id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub channel_post: Option<Message>,
    pub edited_channel_post: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

/// Result of `getFile`; `file_path` is what the download endpoint wants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub file_id: String,
    #[serde(default)]
    pub file_unique_id: String,
    pub file_size: Option<u64>,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
}

impl InlineKeyboardButton {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: Some(data.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(value: serde_json::Value) -> Message {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn command_strips_bot_suffix_and_splits_args() {
        let msg = message(json!({
            "message_id": 1,
            "chat": {"id": 5, "type": "private"},
            "text": "/UpdateMediaInfo@mediaindex_bot -1001234 -f"
        }));
        let (cmd, args) = msg.command().unwrap();
        assert_eq!(cmd, "updatemediainfo");
        assert_eq!(args, vec!["-1001234", "-f"]);
    }

    #[test]
    fn plain_text_is_not_a_command() {
        let msg = message(json!({
            "message_id": 1,
            "chat": {"id": 5, "type": "private"},
            "text": "-1001234567890"
        }));
        assert!(msg.command().is_none());
    }

    #[test]
    fn media_prefers_video_over_document() {
        let msg = message(json!({
            "message_id": 9,
            "chat": {"id": -100, "type": "channel"},
            "document": {"file_id": "d", "file_name": "a.mkv"},
            "video": {"file_id": "v", "file_name": "a.mp4", "file_size": 10}
        }));
        let (kind, file) = msg.media().unwrap();
        assert_eq!(kind, MediaKind::Video);
        assert_eq!(file.file_id, "v");
    }

    #[test]
    fn sender_falls_back_to_sender_chat() {
        let msg = message(json!({
            "message_id": 2,
            "chat": {"id": -100, "type": "supergroup"},
            "sender_chat": {"id": -100777, "type": "channel", "title": "Anon"}
        }));
        assert_eq!(msg.sender_id(), Some(-100777));
    }

    #[test]
    fn chat_target_serializes_untagged() {
        assert_eq!(serde_json::to_value(ChatTarget::Id(-1001)).unwrap(), json!(-1001));
        assert_eq!(
            serde_json::to_value(ChatTarget::Username("@movies".into())).unwrap(),
            json!("@movies")
        );
    }
}
