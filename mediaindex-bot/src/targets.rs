//! Command arguments shared by the channel scanning commands.

use std::path::Path;

use anyhow::{Context, Result};
use mediaindex_sdk::client::{Bot, with_flood_retry};
use mediaindex_sdk::types::{Chat, ChatTarget, Message};

use crate::parser::{extract_channel_list, parse_channel_target};

/// Bulk channel lists are small text files.
const MAX_LIST_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanFlags {
    /// `-rescan`: walk everything again.
    pub rescan: bool,
    /// `-f`: retry only the ids that failed last time.
    pub failed_only: bool,
}

impl ScanFlags {
    /// Split flags from positional arguments.
    pub fn parse(args: &[String]) -> (Self, Vec<String>) {
        let mut flags = Self::default();
        let mut rest = Vec::new();
        for arg in args {
            match arg.to_lowercase().as_str() {
                "-rescan" | "--rescan" => flags.rescan = true,
                "-f" | "--failed" => flags.failed_only = true,
                _ => rest.push(arg.clone()),
            }
        }
        (flags, rest)
    }
}

/// Channels named by the command: positional arguments first, then the
/// replied document or text holding one `-100…` id per line.
pub async fn resolve_targets(bot: &Bot, msg: &Message, positional: &[String]) -> Result<Vec<ChatTarget>> {
    if !positional.is_empty() {
        let mut targets = Vec::new();
        for arg in positional {
            match parse_channel_target(arg) {
                Some(target) => targets.push(target),
                None => tracing::warn!(arg = %arg, "Ignoring unparseable channel argument"),
            }
        }
        return Ok(targets);
    }

    let Some(reply) = msg.reply_to_message.as_deref() else {
        return Ok(Vec::new());
    };

    if let Some(document) = &reply.document {
        let content = read_list_document(bot, &document.file_id).await?;
        let ids = extract_channel_list(&content);
        tracing::info!(count = ids.len(), "Channel list read from document");
        return Ok(ids.into_iter().map(ChatTarget::Id).collect());
    }

    let text = reply.text.as_deref().or(reply.caption.as_deref()).unwrap_or_default();
    Ok(extract_channel_list(text).into_iter().map(ChatTarget::Id).collect())
}

async fn read_list_document(bot: &Bot, file_id: &str) -> Result<String> {
    let file = with_flood_retry(|| bot.get_file(file_id))
        .await
        .context("getFile failed for channel list")?;
    let path = file.file_path.context("Channel list has no download path")?;
    let bytes = if Path::new(&path).is_absolute() {
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Cannot read {path}"))?
    } else {
        bot.download_file_bytes(&path, MAX_LIST_BYTES)
            .await
            .context("Channel list download failed")?
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Look the channel up so the scan has its numeric id and title.
pub async fn resolve_chat(bot: &Bot, target: &ChatTarget) -> Result<Chat> {
    with_flood_retry(|| bot.get_chat(target))
        .await
        .with_context(|| format!("Cannot access {target}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flags_are_split_from_channel_ids() {
        let (flags, rest) = ScanFlags::parse(&strings(&["-1001234", "-f"]));
        assert_eq!(flags, ScanFlags { rescan: false, failed_only: true });
        assert_eq!(rest, strings(&["-1001234"]));

        let (flags, rest) = ScanFlags::parse(&strings(&["-Rescan", "@movies"]));
        assert!(flags.rescan);
        assert_eq!(rest, strings(&["@movies"]));
    }
}
