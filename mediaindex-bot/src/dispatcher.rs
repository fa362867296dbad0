//! Update loop: records channel posts, routes commands and button presses.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use mediaindex_sdk::client::{PollConfig, connect};
use mediaindex_sdk::event::Event;
use mediaindex_sdk::types::{CallbackQuery, Message};

use crate::app::App;
use crate::tasks::UserState;
use crate::{admin, encoders, indexing, mediainfo_update, output, settings, status};

pub const START_TEXT: &str = "🤖 <b>Media Indexing Bot</b>

🎯 <b>Purpose:</b> Extract MediaInfo and organize channel content

📋 <b>Available Commands:</b>
• <code>/updatemediainfo</code> - Enhance video captions with MediaInfo
• <code>/indexfiles</code> - Create organized content indexes
• <code>/findencoders</code> - Discover unknown encoder tags
• <code>/status</code> - View processing progress
• <code>/settings</code> - Configure preferences
• <code>/help</code> - Detailed help

🚀 <b>Ready to index your media content!</b>";

pub const HELP_TEXT: &str = "<b>Media Indexing Bot - Guide</b>

<b>Commands:</b>
<code>/start</code> - Welcome message
<code>/updatemediainfo</code> - Add stream info to captions
<code>/indexfiles</code> - Build per-title index posts
<code>/findencoders</code> - Count unknown release tags in a channel
<code>/status</code> - Live progress with pause and cancel buttons
<code>/cancel [scan id]</code> - Cancel one scan, or all of them
<code>/settings</code> - Set the index channel
<code>/log</code> - Last lines of the bot log
<code>/stats</code> - Server resource usage
<code>/help</code> - This guide

━━━━━━━━━━━━━━━━━━━━

<b>MediaInfo:</b>
• <code>/updatemediainfo -1001234567890</code> - Process a channel. <code>-f</code> retries failed files with a bigger download, <code>-rescan</code> processes every file again.
• <code>/updatemediainfo</code> (reply to a file) - Bulk process channels listed in a text file.

Only the first 5 MB of each file is downloaded; 20 MB is fetched when that is not enough. The original caption is kept and the stream info appended:
<pre>Original Caption Here

Video: X265 1080p
Audio: 2 (ENG, HIN)</pre>

━━━━━━━━━━━━━━━━━━━━

<b>Indexing:</b>
• <code>/indexfiles -1001234567890</code> - Index a channel. <code>-rescan</code> clears old data first.
• <code>/indexfiles</code> (reply to a file) - Bulk index channels listed in a text file.

Files are grouped by title, season and episode, with one post per title in the index channel:
<pre>Motherland꞉ Fort Salem (2020) -

Season 1 (8 Episodes)
└─ 1080P X265 (GHOST): E02, E04-E10</pre>

━━━━━━━━━━━━━━━━━━━━

<b>Bulk file format:</b> one channel id per line, e.g.
<pre>-1001234567890
-1009876543210</pre>

━━━━━━━━━━━━━━━━━━━━

<b>Requirements:</b>
• The bot must be an admin in the target channels to edit captions.
• The bot only knows posts it has seen, so add it to a channel before the posts you want processed.";

/// A routed bot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    UpdateMediaInfo(Vec<String>),
    IndexFiles(Vec<String>),
    FindEncoders(Vec<String>),
    Status,
    Settings,
    Log,
    Stats,
    Cancel(Option<String>),
}

impl Command {
    pub fn parse(name: &str, args: Vec<String>) -> Option<Self> {
        Some(match name {
            "start" => Command::Start,
            "help" => Command::Help,
            "updatemediainfo" => Command::UpdateMediaInfo(args),
            "indexfiles" => Command::IndexFiles(args),
            "findencoders" => Command::FindEncoders(args),
            "status" => Command::Status,
            "settings" => Command::Settings,
            "log" => Command::Log,
            "stats" => Command::Stats,
            "cancel" => Command::Cancel(args.into_iter().next()),
            _ => return None,
        })
    }
}

/// The sender or the chat it wrote in is allowed to use the bot.
pub fn is_authorized(app: &App, msg: &Message) -> bool {
    msg.sender_id().is_some_and(|id| app.config.is_authorized(id))
        || app.config.is_authorized(msg.chat.id)
}

/// Poll until Ctrl-C or until the poller goes away.
pub async fn run(app: Arc<App>) -> Result<()> {
    let mut events = connect(app.bot.clone(), PollConfig::default());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => handle_event(&app, event),
                None => {
                    tracing::warn!("Event channel closed, exiting");
                    break;
                }
            },
            _ = &mut shutdown => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }
    for scan in app.tasks.list() {
        app.tasks.cancel(&scan.id);
    }
    Ok(())
}

pub fn handle_event(app: &Arc<App>, event: Event) {
    match event {
        Event::Connected { username } => tracing::info!(bot = %username, "Connected to Bot API"),
        Event::Disconnected { reason } => tracing::warn!(%reason, "Bot API unreachable"),
        Event::ChannelPost(post) | Event::EditedChannelPost(post) => {
            if let Err(e) = app.store.record_message(&post) {
                tracing::warn!(channel = post.chat.id, msg_id = post.message_id, error = %e, "Failed to record channel post");
            }
        }
        Event::Message(msg) => handle_message(app, msg),
        Event::CallbackQuery(query) => handle_callback(app, query),
    }
}

fn handle_message(app: &Arc<App>, msg: Message) {
    let chat_id = msg.chat.id;

    let Some((name, args)) = msg.command() else {
        let Some(user_id) = msg.sender_id() else { return };
        if msg.text.is_some() && app.users.get(user_id) == Some(UserState::AwaitingIndexChannel) {
            spawn_handler(app, chat_id, "settings", settings::receive_channel_id(Arc::clone(app), msg, user_id));
        }
        return;
    };

    if !is_authorized(app, &msg) {
        tracing::debug!(chat = chat_id, sender = ?msg.sender_id(), command = %name, "Ignoring unauthorized command");
        return;
    }
    let Some(command) = Command::parse(&name, args) else {
        tracing::debug!(command = %name, "Unknown command");
        return;
    };
    tracing::info!(chat = chat_id, sender = ?msg.sender_id(), command = %name, "Command received");

    let app2 = Arc::clone(app);
    match command {
        Command::Start => spawn_handler(app, chat_id, &name, async move {
            output::say(&app2.bot, chat_id, START_TEXT).await.map(drop)
        }),
        Command::Help => spawn_handler(app, chat_id, &name, async move {
            output::say(&app2.bot, chat_id, HELP_TEXT).await.map(drop)
        }),
        Command::UpdateMediaInfo(args) => spawn_handler(app, chat_id, &name, mediainfo_update::handle(app2, msg, args)),
        Command::IndexFiles(args) => spawn_handler(app, chat_id, &name, indexing::handle(app2, msg, args)),
        Command::FindEncoders(args) => spawn_handler(app, chat_id, &name, encoders::handle(app2, msg, args)),
        Command::Status => spawn_handler(app, chat_id, &name, status::handle(app2, msg)),
        Command::Settings => spawn_handler(app, chat_id, &name, settings::handle(app2, msg)),
        Command::Log => spawn_handler(app, chat_id, &name, admin::handle_log(app2, msg)),
        Command::Stats => spawn_handler(app, chat_id, &name, admin::handle_stats(app2, msg)),
        Command::Cancel(id) => spawn_handler(app, chat_id, &name, async move {
            let text = cancel_scans(&app2, id.as_deref())?;
            output::say(&app2.bot, chat_id, &text).await.map(drop)
        }),
    }
}

/// `/cancel [id]`: stop one scan, or every scan when no id is given.
pub fn cancel_scans(app: &App, id: Option<&str>) -> Result<String> {
    let ids: Vec<String> = match id {
        Some(id) => vec![id.to_string()],
        None => app.tasks.list().into_iter().map(|s| s.id).collect(),
    };
    let mut cancelled = 0;
    for id in &ids {
        if app.tasks.cancel(id) {
            app.store.end_scan(id)?;
            tracing::info!(scan = %id, "Scan cancelled");
            cancelled += 1;
        }
    }
    Ok(match (id, cancelled) {
        (Some(id), 0) => format!("❌ No running task <code>{}</code>.", mediaindex_sdk::escape_html(id)),
        (Some(id), _) => format!("⏹️ Cancelled <code>{}</code>.", mediaindex_sdk::escape_html(id)),
        (None, 0) => "No active tasks.".to_string(),
        (None, n) => format!("⏹️ Cancelled {n} task(s)."),
    })
}

fn handle_callback(app: &Arc<App>, query: CallbackQuery) {
    if !app.config.is_authorized(query.from.id) {
        tracing::debug!(user = query.from.id, "Ignoring unauthorized callback");
        return;
    }
    let data = query.data.clone().unwrap_or_default();
    let chat_id = query.message.as_ref().map_or(query.from.id, |m| m.chat.id);
    let app2 = Arc::clone(app);
    if data.starts_with(status::CALLBACK_PREFIX) {
        spawn_handler(app, chat_id, "status", status::handle_callback(app2, query));
    } else if data.starts_with(settings::CALLBACK_PREFIX) {
        spawn_handler(app, chat_id, "settings", settings::handle_callback(app2, query));
    } else {
        tracing::debug!(%data, "Unknown callback data");
        tokio::spawn(async move {
            if let Err(e) = app2.bot.answer_callback_query(&query.id, None, false).await {
                tracing::debug!(error = %e, "Callback answer failed");
            }
        });
    }
}

/// Run a handler in its own task; failures are logged and reported in chat.
fn spawn_handler<F>(app: &Arc<App>, chat_id: i64, name: &str, fut: F)
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    let app = Arc::clone(app);
    let name = name.to_string();
    tokio::spawn(async move {
        if let Err(e) = fut.await {
            tracing::error!(command = %name, chat = chat_id, error = %e, "Handler failed");
            output::error(&app.bot, chat_id, &format!("{e:#}")).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::test_support;
    use crate::tasks::ScanKind;
    use serde_json::json;

    fn message(value: serde_json::Value) -> Message {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn commands_parse() {
        assert_eq!(Command::parse("help", vec![]), Some(Command::Help));
        assert_eq!(
            Command::parse("indexfiles", vec!["-100".into(), "-rescan".into()]),
            Some(Command::IndexFiles(vec!["-100".into(), "-rescan".into()]))
        );
        assert_eq!(Command::parse("cancel", vec!["scan-1".into()]), Some(Command::Cancel(Some("scan-1".into()))));
        assert_eq!(Command::parse("cancel", vec![]), Some(Command::Cancel(None)));
        assert_eq!(Command::parse("factory", vec![]), None);
    }

    #[tokio::test]
    async fn authorization_checks_sender_and_chat() {
        let app = test_support::app();
        let owner = app.config.owner_id;
        let from_owner = message(json!({
            "message_id": 1, "chat": {"id": 555, "type": "private"}, "from": {"id": owner, "first_name": "O"}
        }));
        assert!(is_authorized(&app, &from_owner));
        let stranger = message(json!({
            "message_id": 2, "chat": {"id": 556, "type": "private"}, "from": {"id": 556, "first_name": "S"}
        }));
        assert!(!is_authorized(&app, &stranger));
    }

    #[tokio::test]
    async fn channel_posts_are_recorded() {
        let app = test_support::app();
        let post = message(json!({
            "message_id": 9, "chat": {"id": -1007, "type": "channel", "title": "Shows"},
            "caption": "Show.S01E01.mkv"
        }));
        handle_event(&app, Event::ChannelPost(post));
        assert_eq!(app.store.message_count(-1007).unwrap(), 1);
    }

    #[tokio::test]
    async fn cancel_without_id_stops_everything() {
        let app = test_support::app();
        assert_eq!(cancel_scans(&app, None).unwrap(), "No active tasks.");

        let id = app.spawn_scan(-100, ScanKind::Index, |_control| async {
            std::future::pending::<()>().await;
        });
        assert_eq!(cancel_scans(&app, None).unwrap(), "⏹️ Cancelled 1 task(s).");
        assert!(app.tasks.is_empty());
        assert!(cancel_scans(&app, Some(&id)).unwrap().starts_with("❌ No running task"));
    }
}
