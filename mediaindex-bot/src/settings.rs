//! `/settings`: view and change the index channel.

use std::sync::Arc;

use anyhow::Result;
use mediaindex_sdk::types::{CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, Message};

use crate::app::App;
use crate::output;
use crate::tasks::UserState;

pub const CALLBACK_PREFIX: &str = "settings:";
pub const SET_INDEX_CALLBACK: &str = "settings:set_index";

pub fn settings_text(index_channel_id: i64) -> String {
    let current = if index_channel_id == 0 {
        "Not Set".to_string()
    } else {
        index_channel_id.to_string()
    };
    format!(
        "<b>Bot Settings</b>\n\nHere you can manage the bot's configuration.\n\n<b>Current Index Channel ID:</b> <code>{current}</code>"
    )
}

pub fn settings_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![vec![InlineKeyboardButton::callback(
            "📺 Set Index Channel",
            SET_INDEX_CALLBACK,
        )]],
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelIdError {
    NotANumber,
    NotAChannel,
}

/// Accept only integers written with the `-100` channel prefix.
pub fn parse_index_channel(text: &str) -> Result<i64, ChannelIdError> {
    let text = text.trim();
    let id: i64 = text.parse().map_err(|_| ChannelIdError::NotANumber)?;
    if !text.starts_with("-100") {
        return Err(ChannelIdError::NotAChannel);
    }
    Ok(id)
}

/// `/settings`
pub async fn handle(app: Arc<App>, msg: Message) -> Result<()> {
    output::say_with_keyboard(
        &app.bot,
        msg.chat.id,
        &settings_text(app.config.index_channel_id()),
        &settings_keyboard(),
    )
    .await?;
    Ok(())
}

/// "Set Index Channel" pressed: the next text from this user is the id.
pub async fn handle_callback(app: Arc<App>, query: CallbackQuery) -> Result<()> {
    if query.data.as_deref() != Some(SET_INDEX_CALLBACK) {
        app.bot.answer_callback_query(&query.id, None, false).await?;
        return Ok(());
    }

    app.users.set(query.from.id, UserState::AwaitingIndexChannel);
    app.bot
        .answer_callback_query(&query.id, Some("Please send the new Index Channel ID."), true)
        .await?;
    if let Some(message) = &query.message {
        output::edit(
            &app.bot,
            message.chat.id,
            message.message_id,
            "Okay, I'm ready for the new Index Channel ID.\n\nPlease send the ID now (e.g., <code>-1001234567890</code>).",
            None,
        )
        .await?;
    }
    Ok(())
}

/// The reply to the prompt above. The waiting state is cleared whatever
/// the outcome.
pub async fn receive_channel_id(app: Arc<App>, msg: Message, user_id: i64) -> Result<()> {
    app.users.take(user_id);
    let text = msg.text.as_deref().unwrap_or_default();

    let reply = match parse_index_channel(text) {
        Ok(id) => {
            app.set_index_channel(id)?;
            tracing::info!(user = user_id, index_channel = id, "Index channel updated");
            format!("<b>Success!</b> Index Channel ID has been updated to <code>{id}</code>.")
        }
        Err(ChannelIdError::NotAChannel) => {
            "<b>Invalid ID:</b> Channel IDs should be negative and usually start with <code>-100</code>. Please try again.".to_string()
        }
        Err(ChannelIdError::NotANumber) => {
            "<b>Error:</b> That doesn't look like a valid number. Please send only the channel ID.".to_string()
        }
    };
    output::say(&app.bot, msg.chat.id, &reply).await?;
    Ok(())
}
