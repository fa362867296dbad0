//! `/updatemediainfo`: append stream info to media captions in a channel.
//!
//! Every media post gets a 5 MiB prefix downloaded and probed. When that is
//! not enough to describe the streams, a 20 MiB prefix is tried (the
//! "fallback"). Ids that still fail are kept so `-f` can retry them later,
//! starting directly with the larger download.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use mediaindex_sdk::client::with_flood_retry;
use mediaindex_sdk::types::{Chat, MediaKind, Message};
use mediaindex_sdk::{ApiError, escape_html};

use crate::app::App;
use crate::caption::{caption_changed, generate_caption, has_mediainfo, strip_media_section};
use crate::download::{MIB, download_partial};
use crate::history::{HistoryBatches, HistoryOptions};
use crate::output;
use crate::probe::{ProbeReport, probe_file};
use crate::store::ScanRecord;
use crate::targets::{ScanFlags, resolve_chat, resolve_targets};
use crate::tasks::{ScanControl, ScanKind};

const FIRST_ATTEMPT_MB: u64 = 5;
const FALLBACK_MB: u64 = 20;
const PROGRESS_EVERY: usize = 10;

pub const USAGE: &str = "❌ <b>Usage:</b>\n• <code>/updatemediainfo -1001234567890</code>\n• Reply to a file or message with channel IDs\n\nFlags: <code>-rescan</code> process everything again, <code>-f</code> retry failed files";

/// A post worth probing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub kind: MediaKind,
    pub file_id: String,
    pub file_name: String,
    pub file_size: u64,
}

/// Video, audio, animation, or a document that is audio/video (or at least
/// carries a file name).
pub fn media_candidate(msg: &Message) -> Option<Candidate> {
    let (kind, file) = msg.media()?;
    let default_name = match kind {
        MediaKind::Video => format!("video_{}.mp4", msg.message_id),
        MediaKind::Audio => format!("audio_{}.mp3", msg.message_id),
        MediaKind::Animation => format!("animation_{}.gif", msg.message_id),
        MediaKind::Document => {
            let mime = file.mime_type.as_deref().unwrap_or_default();
            let is_media = mime.starts_with("video/") || mime.starts_with("audio/");
            if !is_media && file.file_name.is_none() {
                return None;
            }
            format!("document_{}", msg.message_id)
        }
    };
    Some(Candidate {
        kind,
        file_id: file.file_id.clone(),
        file_name: file.file_name.clone().unwrap_or(default_name),
        file_size: file.file_size.unwrap_or(0),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Updated,
    NoChange,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Processed {
    pub outcome: Outcome,
    pub used_fallback: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub total_messages: usize,
    pub media_found: usize,
    pub updated: usize,
    pub errors: usize,
    pub fallback_used: usize,
    pub no_change: usize,
    pub skipped_no_media: usize,
    pub skipped_already_processed: usize,
}

impl ScanStats {
    pub fn record(&mut self, processed: Processed) {
        if processed.used_fallback {
            self.fallback_used += 1;
        }
        match processed.outcome {
            Outcome::Updated => self.updated += 1,
            Outcome::NoChange => self.no_change += 1,
            Outcome::Error => self.errors += 1,
        }
    }

    pub fn progress_text(&self, title: &str) -> String {
        format!(
            "🔄 <b>Processing:</b> {}\n\
             📊 <b>Messages:</b> {} | <b>Media:</b> {}\n\
             ✅ <b>Updated:</b> {} | ❌ <b>Errors:</b> {}\n\
             🔄 <b>Fallback Used:</b> {} | ℹ️ <b>No Changes:</b> {}\n\
             ⏭️ <b>Skipped:</b> {}",
            escape_html(title),
            self.total_messages,
            self.media_found,
            self.updated,
            self.errors,
            self.fallback_used,
            self.no_change,
            self.skipped_no_media + self.skipped_already_processed,
        )
    }

    pub fn final_text(&self, title: &str) -> String {
        format!(
            "✅ <b>Completed:</b> {}\n\
             📊 <b>Total Messages:</b> {}\n\
             📁 <b>Media Found:</b> {}\n\
             ✅ <b>Updated:</b> {} files\n\
             ❌ <b>Errors:</b> {} files\n\
             🔄 <b>Fallback Used:</b> {} files\n\
             ℹ️ <b>No Changes:</b> {} files\n\
             ⏭️ <b>Skipped (No Media):</b> {}\n\
             ⏭️ <b>Skipped (Already Processed):</b> {}",
            escape_html(title),
            self.total_messages,
            self.media_found,
            self.updated,
            self.errors,
            self.fallback_used,
            self.no_change,
            self.skipped_no_media,
            self.skipped_already_processed,
        )
    }
}

/// Whether a prefix probe should be retried with the larger download.
pub fn needs_fallback(report: &ProbeReport, whole_file: bool) -> bool {
    !whole_file && (!report.has_content() || !report.is_complete())
}

/// Download `size_mb` of the file and probe it. The flag is true when the
/// download already holds the whole file.
async fn probe_prefix(app: &App, candidate: &Candidate, size_mb: u64) -> Result<(ProbeReport, bool)> {
    let media = download_partial(
        &app.bot,
        &candidate.file_id,
        &candidate.file_name,
        &app.config.download_dir,
        size_mb,
    )
    .await?;
    let whole_file = media.bytes < size_mb * MIB;
    let report = match probe_file(media.path(), &app.config.probe_tools()).await {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!(file = %candidate.file_name, size_mb, error = %e, "Probe failed");
            ProbeReport::default()
        }
    };
    Ok((report, whole_file))
}

/// Probe one post and rewrite its caption.
pub async fn process_message(app: &App, msg: &Message, candidate: &Candidate, flags: ScanFlags) -> Processed {
    let first_mb = if flags.failed_only { FALLBACK_MB } else { FIRST_ATTEMPT_MB };
    let mut used_fallback = false;

    let (mut report, whole_file) = match probe_prefix(app, candidate, first_mb).await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(msg_id = msg.message_id, size_mb = first_mb, error = %e, "Download failed");
            return Processed { outcome: Outcome::Error, used_fallback };
        }
    };

    if first_mb < FALLBACK_MB && needs_fallback(&report, whole_file) {
        tracing::info!(msg_id = msg.message_id, "5MB insufficient, trying 20MB fallback");
        used_fallback = true;
        report = match probe_prefix(app, candidate, FALLBACK_MB).await {
            Ok((r, _)) => r,
            Err(e) => {
                tracing::error!(msg_id = msg.message_id, error = %e, "Fallback download failed");
                return Processed { outcome: Outcome::Error, used_fallback };
            }
        };
    }

    if !report.has_content() {
        tracing::warn!(msg_id = msg.message_id, file = %candidate.file_name, "No usable metadata");
        return Processed { outcome: Outcome::Error, used_fallback };
    }

    let current = msg.caption.clone().unwrap_or_default();
    let base = if flags.rescan { strip_media_section(&current) } else { current.clone() };
    let caption = generate_caption(&base, &report);
    if !caption_changed(&current, &caption) {
        return Processed { outcome: Outcome::NoChange, used_fallback };
    }

    let edited = with_flood_retry(|| {
        app.bot.edit_message_caption(msg.chat.id, msg.message_id, &caption)
    })
    .await;
    let outcome = match edited {
        Ok(_) => {
            tracing::info!(msg_id = msg.message_id, fallback = used_fallback, "Caption updated");
            Outcome::Updated
        }
        Err(ApiError::NotModified) => Outcome::NoChange,
        Err(e) => {
            tracing::error!(msg_id = msg.message_id, error = %e, "Caption edit failed");
            Outcome::Error
        }
    };
    Processed { outcome, used_fallback }
}

enum Source {
    History(HistoryBatches),
    Retry(Option<Vec<Message>>),
}

impl Source {
    fn open(app: &App, channel_id: i64, flags: ScanFlags) -> Result<(Self, usize)> {
        if flags.failed_only {
            let failed: HashSet<i64> = app.store.get_failed_ids(channel_id)?.into_iter().collect();
            let messages: Vec<Message> = app
                .store
                .channel_history(channel_id)?
                .into_iter()
                .filter(|m| failed.contains(&m.message_id))
                .collect();
            let total = messages.len();
            return Ok((Source::Retry(Some(messages)), total));
        }
        let options = HistoryOptions { force: flags.rescan, ..Default::default() };
        let batches = HistoryBatches::open(Arc::clone(&app.store), channel_id, options)?;
        let total = batches.remaining();
        Ok((Source::History(batches), total))
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<Message>>> {
        match self {
            Source::History(batches) => batches.next_batch().await,
            Source::Retry(messages) => Ok(messages.take().filter(|m| !m.is_empty())),
        }
    }

    fn commit(&mut self) -> Result<()> {
        match self {
            Source::History(batches) => batches.commit(),
            Source::Retry(_) => Ok(()),
        }
    }
}

/// Walk one channel. Runs inside a spawned scan task.
pub async fn run_channel_scan(
    app: Arc<App>,
    mut control: ScanControl,
    chat: Chat,
    reply_chat: i64,
    user_id: i64,
    flags: ScanFlags,
) -> Result<ScanStats> {
    let _permit = app.tasks.limiter().acquire_owned().await?;
    let title = chat.display_name();
    tracing::info!(scan = %control.id, channel = chat.id, title = %title, ?flags, "MediaInfo scan started");

    let progress = output::say(
        &app.bot,
        reply_chat,
        &format!(
            "🔄 <b>Processing:</b> {}\n📊 <b>Method:</b> FFprobe with 5MB→20MB fallback\n🔍 <b>Step:</b> Scanning messages...",
            escape_html(&title)
        ),
    )
    .await?;

    let (mut source, total) = Source::open(&app, chat.id, flags)?;
    let guard = app.track_scan(ScanRecord {
        scan_id: control.id.clone(),
        channel_id: chat.id,
        user_id,
        total_messages: total,
        processed_messages: 0,
        chat_title: title.clone(),
    })?;

    let mut stats = ScanStats::default();
    let mut failed: BTreeSet<i64> = app.store.get_failed_ids(chat.id)?.into_iter().collect();

    while let Some(batch) = source.next_batch().await? {
        for msg in &batch {
            control.checkpoint().await;
            stats.total_messages += 1;

            match media_candidate(msg) {
                None => stats.skipped_no_media += 1,
                Some(_) if !flags.rescan && has_mediainfo(msg.caption.as_deref().unwrap_or_default()) => {
                    stats.skipped_already_processed += 1;
                }
                Some(candidate) => {
                    stats.media_found += 1;
                    tracing::debug!(msg_id = msg.message_id, file = %candidate.file_name, "Processing media");
                    let processed = process_message(&app, msg, &candidate, flags).await;
                    if processed.outcome == Outcome::Error {
                        failed.insert(msg.message_id);
                    } else {
                        failed.remove(&msg.message_id);
                    }
                    stats.record(processed);
                }
            }

            if stats.total_messages % PROGRESS_EVERY == 0 {
                guard.progress(stats.total_messages);
                output::edit_quietly(&app.bot, reply_chat, progress.message_id, &stats.progress_text(&title)).await;
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }
    source.commit()?;
    guard.progress(stats.total_messages);

    let failed: Vec<i64> = failed.into_iter().collect();
    app.store.save_failed_ids(chat.id, &failed)?;
    output::edit_quietly(&app.bot, reply_chat, progress.message_id, &stats.final_text(&title)).await;
    tracing::info!(
        channel = chat.id,
        updated = stats.updated,
        errors = stats.errors,
        fallback = stats.fallback_used,
        "MediaInfo scan complete"
    );
    Ok(stats)
}

/// `/updatemediainfo <channel>|reply [-rescan] [-f]`
pub async fn handle(app: Arc<App>, msg: Message, args: Vec<String>) -> Result<()> {
    let chat_id = msg.chat.id;
    let user_id = msg.sender_id().unwrap_or(chat_id);
    let (flags, positional) = ScanFlags::parse(&args);

    let targets = resolve_targets(&app.bot, &msg, &positional).await?;
    if targets.is_empty() {
        output::say(&app.bot, chat_id, USAGE).await?;
        return Ok(());
    }
    tracing::info!(count = targets.len(), ?flags, "Processing channels");

    for target in targets {
        let chat = match resolve_chat(&app.bot, &target).await {
            Ok(chat) => chat,
            Err(e) => {
                tracing::error!(target = %target, error = %e, "Channel not accessible");
                output::say(
                    &app.bot,
                    chat_id,
                    &format!(
                        "❌ <b>Access Error:</b> Cannot access {}\n<b>Reason:</b> {}",
                        escape_html(&target.to_string()),
                        escape_html(&format!("{e:#}"))
                    ),
                )
                .await?;
                continue;
            }
        };

        let scan_app = Arc::clone(&app);
        app.spawn_scan(chat.id, ScanKind::MediaInfo, move |control| async move {
            let channel = chat.id;
            if let Err(e) = run_channel_scan(Arc::clone(&scan_app), control, chat, chat_id, user_id, flags).await {
                tracing::error!(channel, error = %e, "MediaInfo scan failed");
                output::error(&scan_app.bot, chat_id, &format!("Scan of {channel} failed: {e:#}")).await;
            }
        });
    }
    Ok(())
}
