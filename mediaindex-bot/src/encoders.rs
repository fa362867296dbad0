//! Discovery of release-group tags that are not in the known encoder list.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::Result;
use mediaindex_sdk::client::with_flood_retry;
use mediaindex_sdk::escape_html;
use mediaindex_sdk::types::{Chat, Message};
use regex::Regex;

use crate::app::App;
use crate::history::{HistoryBatches, HistoryOptions};
use crate::output;
use crate::parser::{is_ignored_tag, is_known_encoder};
use crate::store::ScanRecord;
use crate::targets::{resolve_chat, resolve_targets};
use crate::tasks::{ScanControl, ScanKind};

const REPORT_TOP: usize = 50;

static EXTENSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.\w+$").expect("static regex"));
static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ ._\[\]()\-]+").expect("static regex"));
static EPISODE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^S\d{1,2}(E\d{1,3})?").expect("static regex"));
static RESOLUTION_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{3,4}P").expect("static regex"));
static YEAR_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}").expect("static regex"));

/// Tokens of a file name that could be an unknown encoder tag.
pub fn extract_potential_encoder_tags(file_name: &str) -> Vec<String> {
    let stem = EXTENSION.replace(file_name, "");
    SEPARATORS
        .split(&stem)
        .filter(|part| {
            let upper = part.to_uppercase();
            !upper.is_empty()
                && !is_known_encoder(&upper)
                && !is_ignored_tag(&upper)
                && !upper.chars().all(|c| c.is_ascii_digit())
                && upper.chars().count() > 2
                && !EPISODE_TAG.is_match(&upper)
                && !RESOLUTION_TAG.is_match(&upper)
                && !YEAR_TAG.is_match(&upper)
        })
        .map(str::to_string)
        .collect()
}

/// Tag counts, remembering first-seen order for ties.
#[derive(Debug, Default)]
pub struct EncoderTally {
    counts: Vec<(String, usize)>,
    index: HashMap<String, usize>,
}

impl EncoderTally {
    pub fn add(&mut self, tag: String) {
        match self.index.get(&tag) {
            Some(&i) => self.counts[i].1 += 1,
            None => {
                self.index.insert(tag.clone(), self.counts.len());
                self.counts.push((tag, 1));
            }
        }
    }

    pub fn extend(&mut self, tags: impl IntoIterator<Item = String>) {
        for tag in tags {
            self.add(tag);
        }
    }

    /// Number of distinct tags.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Highest counts first; equal counts keep first-seen order.
    pub fn most_common(&self, n: usize) -> Vec<(&str, usize)> {
        let mut sorted: Vec<(&str, usize)> =
            self.counts.iter().map(|(tag, count)| (tag.as_str(), *count)).collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1));
        sorted.truncate(n);
        sorted
    }

    /// Full tally as an `encoders.txt` body.
    pub fn to_report_file(&self) -> String {
        self.most_common(self.len())
            .into_iter()
            .map(|(tag, count)| format!("{tag}: {count}\n"))
            .collect()
    }
}

/// Name of a document or video post, the files release groups tag.
fn tagged_file_name(msg: &Message) -> Option<&str> {
    msg.document
        .as_ref()
        .or(msg.video.as_ref())
        .and_then(|f| f.file_name.as_deref())
}

pub fn report_text(tally: &EncoderTally, files: usize, channel_id: i64) -> String {
    if tally.is_empty() {
        return format!("<b>No potential encoders found in {files} files.</b>");
    }
    let mut text = format!(
        "<b>🔎 Found {} potential encoders from {files} files in channel {channel_id}:</b>\n\n",
        tally.len()
    );
    for (tag, count) in tally.most_common(REPORT_TOP) {
        text.push_str(&format!("<code>{}</code> ({count} times)\n", escape_html(tag)));
    }
    text
}

/// Walk the whole history without touching the processed cache.
pub async fn collect_tags(app: &Arc<App>, control: &mut ScanControl, chat: &Chat, user_id: i64) -> Result<(EncoderTally, usize)> {
    let options = HistoryOptions { track: false, pause: Duration::ZERO, ..Default::default() };
    let mut batches = HistoryBatches::open(Arc::clone(&app.store), chat.id, options)?;
    let guard = app.track_scan(ScanRecord {
        scan_id: control.id.clone(),
        channel_id: chat.id,
        user_id,
        total_messages: batches.total_messages,
        processed_messages: 0,
        chat_title: chat.display_name(),
    })?;

    let mut tally = EncoderTally::default();
    let mut files = 0;
    let mut scanned = 0;
    while let Some(batch) = batches.next_batch().await? {
        control.checkpoint().await;
        for name in batch.iter().filter_map(tagged_file_name) {
            files += 1;
            tally.extend(extract_potential_encoder_tags(name));
        }
        scanned += batch.len();
        guard.progress(scanned);
    }
    Ok((tally, files))
}

async fn run_find_encoders(app: Arc<App>, mut control: ScanControl, chat: Chat, reply_chat: i64, user_id: i64) -> Result<()> {
    let _permit = app.tasks.limiter().acquire_owned().await?;
    let (tally, files) = collect_tags(&app, &mut control, &chat, user_id).await?;
    tracing::info!(channel = chat.id, files, tags = tally.len(), "Encoder scan complete");

    output::say(&app.bot, reply_chat, &report_text(&tally, files, chat.id)).await?;
    if !tally.is_empty() {
        let body = tally.to_report_file().into_bytes();
        with_flood_retry(|| {
            app.bot.send_document(reply_chat, "encoders.txt", body.clone(), Some("Full encoder tally"))
        })
        .await?;
    }
    Ok(())
}

/// `/findencoders <channel>|reply`
pub async fn handle(app: Arc<App>, msg: Message, args: Vec<String>) -> Result<()> {
    let chat_id = msg.chat.id;
    let user_id = msg.sender_id().unwrap_or(chat_id);

    let targets = resolve_targets(&app.bot, &msg, &args).await?;
    let Some(target) = targets.into_iter().next() else {
        output::say(&app.bot, chat_id, "<b>Please reply to a message or provide a channel ID.</b>").await?;
        return Ok(());
    };
    let chat = resolve_chat(&app.bot, &target).await?;
    output::say(
        &app.bot,
        chat_id,
        &format!("<b>🔍 Started finding encoders in channel {}...</b>", chat.id),
    )
    .await?;

    let scan_app = Arc::clone(&app);
    app.spawn_scan(chat.id, ScanKind::Encoders, move |control| async move {
        let channel = chat.id;
        if let Err(e) = run_find_encoders(Arc::clone(&scan_app), control, chat, chat_id, user_id).await {
            tracing::error!(channel, error = %e, "Encoder scan failed");
            output::error(&scan_app.bot, chat_id, &format!("{e:#}")).await;
        }
    });
    Ok(())
}
