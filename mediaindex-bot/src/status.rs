//! `/status`: one live message listing running scans with pause/cancel
//! buttons, refreshed in the background while anything is running.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use mediaindex_sdk::escape_html;
use mediaindex_sdk::types::{CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, Message};

use crate::app::App;
use crate::output;
use crate::store::ScanRecord;
use crate::tasks::ScanInfo;

pub const CALLBACK_PREFIX: &str = "status:";
const REFRESH_INTERVAL: Duration = Duration::from_secs(15);

/// Text and keyboard for the current set of scans.
pub fn render(running: &[ScanInfo], records: &[ScanRecord]) -> (String, InlineKeyboardMarkup) {
    let mut text = String::from("📊 <b>Live Task Status</b>\n\n");
    let mut keyboard = InlineKeyboardMarkup::default();

    if running.is_empty() {
        text.push_str("No active tasks.");
    }

    let by_id: HashMap<&str, &ScanRecord> = records.iter().map(|r| (r.scan_id.as_str(), r)).collect();
    for (i, scan) in running.iter().enumerate() {
        let line = match by_id.get(scan.id.as_str()) {
            Some(record) => format!(
                "{}. <b>{}</b> ({}) — {} / {}",
                i + 1,
                escape_html(&record.chat_title),
                scan.kind.label(),
                record.processed_messages,
                record.total_messages
            ),
            None => format!("{}. <code>{}</code> ({}) — queued", i + 1, scan.channel_id, scan.kind.label()),
        };
        text.push_str(&line);
        if scan.paused {
            text.push_str(" ⏸️ <i>paused</i>");
        }
        text.push('\n');

        let pause = if scan.paused { "▶️ Resume" } else { "⏸️ Pause" };
        keyboard.inline_keyboard.push(vec![
            InlineKeyboardButton::callback(pause, format!("{CALLBACK_PREFIX}pause:{}", scan.id)),
            InlineKeyboardButton::callback("⏹️ Cancel", format!("{CALLBACK_PREFIX}cancel:{}", scan.id)),
        ]);
    }

    keyboard
        .inline_keyboard
        .push(vec![InlineKeyboardButton::callback("🔄 Refresh", format!("{CALLBACK_PREFIX}refresh"))]);
    (text, keyboard)
}

fn current_view(app: &App) -> Result<(String, InlineKeyboardMarkup)> {
    let records = app.store.active_scans()?;
    Ok(render(&app.tasks.list(), &records))
}

/// Re-render the stored status message, if there is one.
pub async fn refresh(app: &App) -> Result<()> {
    let Some((chat_id, message_id)) = app.store.get_status_message()? else {
        return Ok(());
    };
    let (text, keyboard) = current_view(app)?;
    output::edit(&app.bot, chat_id, message_id, &text, Some(&keyboard)).await
}

/// Keep the status message fresh until no scan is left.
pub fn ensure_refresher(app: &Arc<App>) {
    let mut slot = app.refresher.lock();
    if slot.as_ref().is_some_and(|h| !h.is_finished()) {
        return;
    }
    let app = Arc::clone(app);
    *slot = Some(tokio::spawn(async move {
        loop {
            tokio::time::sleep(REFRESH_INTERVAL).await;
            if let Err(e) = refresh(&app).await {
                tracing::warn!(error = %e, "Status refresh failed");
            }
            if app.tasks.is_empty() {
                tracing::debug!("No active scans, status refresher stopping");
                return;
            }
        }
    }));
}

/// `/status`
pub async fn handle(app: Arc<App>, msg: Message) -> Result<()> {
    let old = app.store.get_status_message()?;

    let (text, keyboard) = current_view(&app)?;
    let sent = output::say_with_keyboard(&app.bot, msg.chat.id, &text, &keyboard).await?;
    app.store.set_status_message(sent.chat.id, sent.message_id)?;

    if let Some((chat_id, message_id)) = old {
        if let Err(e) = app.bot.delete_message(chat_id, message_id).await {
            tracing::debug!(chat = chat_id, msg_id = message_id, error = %e, "Old status message not deleted");
        }
    }

    if !app.tasks.is_empty() {
        ensure_refresher(&app);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusAction {
    Pause(String),
    Cancel(String),
    Refresh,
}

pub fn parse_callback(data: &str) -> Option<StatusAction> {
    let rest = data.strip_prefix(CALLBACK_PREFIX)?;
    if rest == "refresh" {
        return Some(StatusAction::Refresh);
    }
    let (action, id) = rest.split_once(':')?;
    match action {
        "pause" => Some(StatusAction::Pause(id.to_string())),
        "cancel" => Some(StatusAction::Cancel(id.to_string())),
        _ => None,
    }
}

/// Buttons of the status message.
pub async fn handle_callback(app: Arc<App>, query: CallbackQuery) -> Result<()> {
    let Some(action) = query.data.as_deref().and_then(parse_callback) else {
        app.bot.answer_callback_query(&query.id, None, false).await?;
        return Ok(());
    };

    let answer = match &action {
        StatusAction::Pause(id) => match app.tasks.toggle_pause(id) {
            Some(true) => "Paused".to_string(),
            Some(false) => "Resumed".to_string(),
            None => "Task not found.".to_string(),
        },
        StatusAction::Cancel(id) => {
            if app.tasks.cancel(id) {
                app.store.end_scan(id)?;
                tracing::info!(scan = %id, "Scan cancelled from status message");
                "Cancelled".to_string()
            } else {
                "Task not found.".to_string()
            }
        }
        StatusAction::Refresh => "Refreshed".to_string(),
    };
    if let Err(e) = app.bot.answer_callback_query(&query.id, Some(&answer), false).await {
        tracing::debug!(error = %e, "Callback answer failed");
    }

    // Refresh the message the button belongs to, which may be an old one.
    if let Some(message) = &query.message {
        let (text, keyboard) = current_view(&app)?;
        output::edit(&app.bot, message.chat.id, message.message_id, &text, Some(&keyboard)).await?;
    }
    Ok(())
}

pub fn interrupted_notice(scans: &[ScanRecord]) -> String {
    let mut text = String::from(
        "⚠️ <b>Bot Restarted with Interrupted Scans</b> ⚠️\n\nThe following scans were interrupted and did not complete:\n",
    );
    for scan in scans {
        text.push_str(&format!(
            "\n- <b>Channel:</b> {}\n  <b>Progress:</b> {} / {} messages\n",
            escape_html(&scan.chat_title),
            scan.processed_messages,
            scan.total_messages
        ));
    }
    text
}

/// Report scans left over from a previous run to the owner, then forget them.
pub async fn notify_interrupted_scans(app: &App) -> Result<()> {
    let scans = app.store.active_scans()?;
    if scans.is_empty() {
        return Ok(());
    }
    tracing::warn!(count = scans.len(), "Found interrupted scans from a previous run");
    if let Err(e) = output::say(&app.bot, app.config.owner_id, &interrupted_notice(&scans)).await {
        tracing::warn!(error = %e, "Failed to send interruption notification");
    }
    app.store.clear_all_scans()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::ScanKind;

    fn record(id: &str, title: &str, done: usize, total: usize) -> ScanRecord {
        ScanRecord {
            scan_id: id.into(),
            channel_id: -100,
            user_id: 1,
            total_messages: total,
            processed_messages: done,
            chat_title: title.into(),
        }
    }

    #[test]
    fn empty_status() {
        let (text, keyboard) = render(&[], &[]);
        assert_eq!(text, "📊 <b>Live Task Status</b>\n\nNo active tasks.");
        assert_eq!(keyboard.inline_keyboard.len(), 1);
        assert_eq!(keyboard.inline_keyboard[0][0].callback_data.as_deref(), Some("status:refresh"));
    }

    #[test]
    fn running_scans_get_controls() {
        let running = vec![
            ScanInfo { id: "scan-a".into(), channel_id: -100, kind: ScanKind::MediaInfo, paused: false },
            ScanInfo { id: "scan-b".into(), channel_id: -200, kind: ScanKind::Index, paused: true },
        ];
        let (text, keyboard) = render(&running, &[record("scan-a", "Shows", 40, 120)]);
        assert!(text.contains("1. <b>Shows</b> (MediaInfo) — 40 / 120\n"));
        assert!(text.contains("2. <code>-200</code> (Index) — queued ⏸️ <i>paused</i>\n"));
        assert_eq!(keyboard.inline_keyboard.len(), 3);
        assert_eq!(keyboard.inline_keyboard[1][0].text, "▶️ Resume");
        assert_eq!(keyboard.inline_keyboard[0][1].callback_data.as_deref(), Some("status:cancel:scan-a"));
    }

    #[test]
    fn callback_parsing() {
        assert_eq!(parse_callback("status:refresh"), Some(StatusAction::Refresh));
        assert_eq!(
            parse_callback("status:pause:scan--100-17"),
            Some(StatusAction::Pause("scan--100-17".into()))
        );
        assert_eq!(parse_callback("status:cancel:x"), Some(StatusAction::Cancel("x".into())));
        assert_eq!(parse_callback("settings:set_index"), None);
        assert_eq!(parse_callback("status:explode:x"), None);
    }

    #[test]
    fn interrupted_notice_lists_progress() {
        let text = interrupted_notice(&[record("s", "Movies <HD>", 10, 50)]);
        assert!(text.starts_with("⚠️ <b>Bot Restarted with Interrupted Scans</b> ⚠️"));
        assert!(text.contains("- <b>Channel:</b> Movies &lt;HD&gt;\n  <b>Progress:</b> 10 / 50 messages\n"));
    }
}
