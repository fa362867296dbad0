//! Chat replies: flood-aware send/edit helpers and message splitting.

use mediaindex_sdk::client::{Bot, with_flood_retry};
use mediaindex_sdk::types::{InlineKeyboardMarkup, Message};
use mediaindex_sdk::{ApiError, escape_html};

use crate::format::MAX_MESSAGE_CHARS;

/// Send `text`, split across several messages when it is too long.
/// Returns the last message sent.
pub async fn say(bot: &Bot, chat_id: i64, text: &str) -> anyhow::Result<Message> {
    let mut chunks = split_message(text, MAX_MESSAGE_CHARS).into_iter().peekable();
    loop {
        let chunk = chunks.next().unwrap_or_default();
        let sent = with_flood_retry(|| bot.send_message(chat_id, &chunk, None)).await?;
        if chunks.peek().is_none() {
            return Ok(sent);
        }
        // Small delay between multi-part messages to avoid flood
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
}

pub async fn say_with_keyboard(
    bot: &Bot,
    chat_id: i64,
    text: &str,
    keyboard: &InlineKeyboardMarkup,
) -> anyhow::Result<Message> {
    Ok(with_flood_retry(|| bot.send_message(chat_id, text, Some(keyboard))).await?)
}

/// Edit a message. An unchanged message counts as success.
pub async fn edit(
    bot: &Bot,
    chat_id: i64,
    message_id: i64,
    text: &str,
    keyboard: Option<&InlineKeyboardMarkup>,
) -> anyhow::Result<()> {
    match with_flood_retry(|| bot.edit_message_text(chat_id, message_id, text, keyboard)).await {
        Ok(_) | Err(ApiError::NotModified) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Edit a progress message, logging instead of failing.
pub async fn edit_quietly(bot: &Bot, chat_id: i64, message_id: i64, text: &str) {
    if let Err(e) = edit(bot, chat_id, message_id, text, None).await {
        tracing::warn!(chat = chat_id, msg_id = message_id, error = %e, "Progress edit failed");
    }
}

/// `❌ Error: <reason>`, escaped. Failures to deliver are only logged.
pub async fn error(bot: &Bot, chat_id: i64, reason: &str) {
    let text = format!("❌ <b>Error:</b> {}", escape_html(reason));
    if let Err(e) = say(bot, chat_id, &text).await {
        tracing::warn!(chat = chat_id, error = %e, "Could not deliver error reply");
    }
}

/// Split text into chunks of at most `max_len` characters, preferring line
/// breaks, then word breaks, then hard cuts.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    let mut flush = |current: &mut String, current_len: &mut usize| {
        if !current.is_empty() {
            chunks.push(std::mem::take(current));
        }
        *current_len = 0;
    };

    for line in text.lines() {
        for piece in wrap_line(line, max_len) {
            let piece_len = piece.chars().count();
            let needed = if current.is_empty() { piece_len } else { piece_len + 1 };
            if current_len + needed > max_len {
                flush(&mut current, &mut current_len);
            }
            if !current.is_empty() {
                current.push('\n');
                current_len += 1;
            }
            current.push_str(&piece);
            current_len += piece_len;
        }
    }
    flush(&mut current, &mut current_len);
    chunks
}

/// Wrap a single line on word boundaries; words longer than `max_len` are cut.
fn wrap_line(line: &str, max_len: usize) -> Vec<String> {
    if line.chars().count() <= max_len {
        return vec![line.to_string()];
    }
    let mut result = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        let mut word: String = word.to_string();
        while word.chars().count() > max_len {
            if !current.is_empty() {
                result.push(std::mem::take(&mut current));
            }
            let head: String = word.chars().take(max_len).collect();
            word = word.chars().skip(max_len).collect();
            result.push(head);
        }
        if current.chars().count() + word.chars().count() + 1 > max_len {
            if !current.is_empty() {
                result.push(std::mem::take(&mut current));
            }
            current = word;
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
    }
    if !current.is_empty() {
        result.push(current);
    }
    result
}
