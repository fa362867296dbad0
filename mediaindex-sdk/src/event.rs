//! Events emitted by the update poller for the bot layer to consume.

use crate::types::{CallbackQuery, Message, Update};

/// Events that the SDK emits to the consumer.
#[derive(Debug, Clone)]
pub enum Event {
    /// `getMe` succeeded; `username` is the bot's confirmed username.
    Connected {
        username: String,
    },

    /// A private or group message addressed to the bot.
    Message(Message),

    /// A new post in a channel the bot administers.
    ChannelPost(Message),

    /// A channel post was edited (captions included).
    EditedChannelPost(Message),

    /// An inline keyboard button was pressed.
    CallbackQuery(CallbackQuery),

    /// Polling failed; the poller keeps retrying in the background.
    Disconnected {
        reason: String,
    },
}

impl Event {
    /// Map a raw update to an event. Update kinds the bot does not
    /// subscribe to yield `None`.
    pub fn from_update(update: Update) -> Option<Self> {
        if let Some(query) = update.callback_query {
            return Some(Event::CallbackQuery(query));
        }
        if let Some(msg) = update.message {
            return Some(Event::Message(msg));
        }
        if let Some(post) = update.channel_post {
            return Some(Event::ChannelPost(post));
        }
        update.edited_channel_post.map(Event::EditedChannelPost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_post_update_maps_to_channel_post_event() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 42,
            "channel_post": {
                "message_id": 7,
                "chat": {"id": -1001, "type": "channel", "title": "Shows"},
                "caption": "Show.S01E01.1080p.mkv"
            }
        }))
        .unwrap();
        match Event::from_update(update) {
            Some(Event::ChannelPost(msg)) => assert_eq!(msg.message_id, 7),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn empty_update_is_ignored() {
        let update: Update = serde_json::from_value(json!({"update_id": 1})).unwrap();
        assert!(Event::from_update(update).is_none());
    }
}
