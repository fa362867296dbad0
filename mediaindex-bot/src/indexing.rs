//! `/indexfiles`: per-title index posts built from a channel's media.
//!
//! Phase one walks the channel and groups parsed file names by title.
//! Phase two stores the entries of each title and refreshes its post in
//! the index channel, editing the remembered message or sending a new one.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use mediaindex_sdk::client::with_flood_retry;
use mediaindex_sdk::escape_html;
use mediaindex_sdk::types::{Chat, Message};

use crate::app::App;
use crate::format::{format_post, timestamp_label, truncate_post};
use crate::history::{HistoryBatches, HistoryOptions};
use crate::output;
use crate::parser::{ParsedInfo, parse_media_info};
use crate::store::{MediaData, ScanRecord};
use crate::targets::{ScanFlags, resolve_chat, resolve_targets};
use crate::tasks::{ScanControl, ScanKind};

pub const USAGE: &str = "❌ <b>Usage:</b> <code>/indexfiles -100123...</code>\nAdd <code>-rescan</code> to clear old data and re-index.";

/// One parsed file, ready to be stored.
#[derive(Debug, Clone)]
pub struct IndexedFile {
    pub info: ParsedInfo,
    pub file_size: u64,
    pub message_id: i64,
}

/// Parse a post's file name (video, audio or document with a name).
pub fn index_entry(msg: &Message) -> Option<IndexedFile> {
    let file = msg.video.as_ref().or(msg.audio.as_ref()).or(msg.document.as_ref())?;
    let name = file.file_name.as_deref()?;
    let info = parse_media_info(name, msg.caption.as_deref())?;
    Some(IndexedFile { info, file_size: file.file_size.unwrap_or(0), message_id: msg.message_id })
}

/// Found episode counts match the expected ones for every expected season.
pub fn is_complete(data: &MediaData, expected: &BTreeMap<u32, usize>) -> bool {
    expected.iter().all(|(season, count)| {
        data.seasons.get(season).map_or(0, |s| s.episodes.len()) == *count
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    Created,
    Updated,
    Empty,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub titles: usize,
    pub files: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    pub incomplete: Vec<String>,
}

impl IndexSummary {
    pub fn text(&self, chat_title: &str) -> String {
        let mut text = format!(
            "✅ Indexing task for <b>{}</b> has finished successfully.\n\n\
             📁 <b>Files:</b> {} | 🎬 <b>Titles:</b> {}\n\
             🆕 <b>Created:</b> {} | ✏️ <b>Updated:</b> {}",
            escape_html(chat_title),
            self.files,
            self.titles,
            self.created,
            self.updated,
        );
        if self.failed > 0 {
            text.push_str(&format!(" | ❌ <b>Failed:</b> {}", self.failed));
        }
        if !self.incomplete.is_empty() {
            let names: Vec<String> = self.incomplete.iter().map(|t| escape_html(t)).collect();
            text.push_str(&format!("\n⚠️ <b>Incomplete:</b> {}", names.join(", ")));
        }
        text
    }
}

/// Render the post of `title` and put it in the index channel.
/// Returns the outcome and, for series known to TVMaze, completeness.
pub async fn update_or_create_post(app: &App, title: &str) -> Result<(PostOutcome, Option<bool>)> {
    let index_channel = app.config.index_channel_id();
    let post = app.store.get_or_create_post(title, index_channel)?;
    let Some(data) = app.store.media_data(title)? else {
        return Ok((PostOutcome::Empty, None));
    };

    let expected = if data.is_series() {
        app.tvmaze.season_episode_counts(title).await
    } else {
        None
    };
    let complete = expected.as_ref().map(|e| is_complete(&data, e));

    let updated = timestamp_label(&chrono::Local::now(), &app.config.timezone);
    let text = truncate_post(&format_post(title, &data, expected.as_ref(), &updated));

    if let Some(message_id) = post.message_id {
        match output::edit(&app.bot, index_channel, message_id, &text, None).await {
            Ok(()) => {
                tracing::info!(title, msg_id = message_id, "Updated index post");
                return Ok((PostOutcome::Updated, complete));
            }
            Err(e) => {
                tracing::warn!(title, msg_id = message_id, error = %e, "Index post edit failed, sending a new one");
            }
        }
    }

    let sent = with_flood_retry(|| app.bot.send_message(index_channel, &text, None)).await?;
    app.store.update_post_message_id(post.id, sent.message_id)?;
    tracing::info!(title, msg_id = sent.message_id, "Created index post");
    Ok((PostOutcome::Created, complete))
}

pub async fn run_index(
    app: Arc<App>,
    mut control: ScanControl,
    chat: Chat,
    user_id: i64,
    flags: ScanFlags,
) -> Result<IndexSummary> {
    let _permit = app.tasks.limiter().acquire_owned().await?;
    let chat_title = chat.display_name();

    if flags.rescan {
        let cleared = app.store.clear_media_entries(chat.id)?;
        tracing::info!(channel = chat.id, cleared, "Cleared media entries for re-index");
    }

    let options = HistoryOptions { track: false, pause: Duration::ZERO, ..Default::default() };
    let mut batches = HistoryBatches::open(Arc::clone(&app.store), chat.id, options)?;
    let guard = app.track_scan(ScanRecord {
        scan_id: control.id.clone(),
        channel_id: chat.id,
        user_id,
        total_messages: batches.total_messages,
        processed_messages: 0,
        chat_title: chat_title.clone(),
    })?;

    tracing::info!(channel = chat.id, title = %chat_title, "Phase 1: collecting media");
    let mut by_title: BTreeMap<String, Vec<IndexedFile>> = BTreeMap::new();
    let mut scanned = 0;
    let mut summary = IndexSummary::default();
    while let Some(batch) = batches.next_batch().await? {
        control.checkpoint().await;
        for msg in &batch {
            if let Some(file) = index_entry(msg) {
                summary.files += 1;
                by_title.entry(file.info.title.clone()).or_default().push(file);
            }
        }
        scanned += batch.len();
        guard.progress(scanned);
    }
    summary.titles = by_title.len();
    tracing::info!(channel = chat.id, titles = by_title.len(), "Phase 1 complete");

    tracing::info!(channel = chat.id, "Phase 2: updating posts");
    for (title, files) in &by_title {
        control.checkpoint().await;
        for file in files {
            app.store.add_media_entry(chat.id, file.message_id, &file.info, file.file_size)?;
        }
        match update_or_create_post(&app, title).await {
            Ok((PostOutcome::Created, complete)) => {
                summary.created += 1;
                if complete == Some(false) {
                    summary.incomplete.push(title.clone());
                }
            }
            Ok((PostOutcome::Updated, complete)) => {
                summary.updated += 1;
                if complete == Some(false) {
                    summary.incomplete.push(title.clone());
                }
            }
            Ok((PostOutcome::Empty, _)) => {}
            Err(e) => {
                summary.failed += 1;
                tracing::error!(title = %title, error = %e, "Failed to update post");
            }
        }
    }

    tracing::info!(channel = chat.id, created = summary.created, updated = summary.updated, "Indexing complete");
    Ok(summary)
}

/// `/indexfiles <channel>|reply [-rescan]`
pub async fn handle(app: Arc<App>, msg: Message, args: Vec<String>) -> Result<()> {
    let chat_id = msg.chat.id;
    let user_id = msg.sender_id().unwrap_or(chat_id);

    if app.config.index_channel_id() == 0 {
        output::say(
            &app.bot,
            chat_id,
            "❌ <b>Error:</b> Index channel is not set. Use /settings to configure it.",
        )
        .await?;
        return Ok(());
    }

    let (flags, positional) = ScanFlags::parse(&args);
    let targets = resolve_targets(&app.bot, &msg, &positional).await?;
    if targets.is_empty() {
        output::say(&app.bot, chat_id, USAGE).await?;
        return Ok(());
    }

    for target in targets {
        let chat = match resolve_chat(&app.bot, &target).await {
            Ok(chat) => chat,
            Err(e) => {
                output::error(&app.bot, chat_id, &format!("{e:#}")).await;
                continue;
            }
        };
        output::say(
            &app.bot,
            chat_id,
            &format!(
                "✅ <b>Indexing task started for channel</b> <code>{}</code>.\n\nI will now scan the channel and create/update posts in the index channel. This may take some time.",
                chat.id
            ),
        )
        .await?;

        let scan_app = Arc::clone(&app);
        app.spawn_scan(chat.id, ScanKind::Index, move |control| async move {
            let channel = chat.id;
            let title = chat.display_name();
            match run_index(Arc::clone(&scan_app), control, chat, user_id, flags).await {
                Ok(summary) => {
                    if let Err(e) = output::say(&scan_app.bot, chat_id, &summary.text(&title)).await {
                        tracing::warn!(error = %e, "Could not deliver index summary");
                    }
                }
                Err(e) => {
                    tracing::error!(channel, error = %e, "Indexing failed");
                    output::error(
                        &scan_app.bot,
                        chat_id,
                        &format!("An error occurred during the index scan for channel {channel}: {e:#}"),
                    )
                    .await;
                }
            }
        });
    }
    Ok(())
}
