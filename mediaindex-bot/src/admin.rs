//! `/log` and `/stats`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use mediaindex_sdk::escape_html;
use mediaindex_sdk::types::Message;
use sysinfo::{Disks, Networks, System};

use crate::app::App;
use crate::format::format_bytes;
use crate::output;

const LOG_LINES: usize = 20;
/// Leaves room for the heading and `<pre>` tags in one message.
const MAX_LOG_CHARS: usize = 3800;

/// Last `n` lines of `content`.
pub fn tail_lines(content: &str, n: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

fn keep_last_chars(text: &str, max: usize) -> &str {
    let count = text.chars().count();
    if count <= max {
        return text;
    }
    let skip = count - max;
    match text.char_indices().nth(skip) {
        Some((i, _)) => &text[i..],
        None => text,
    }
}

pub async fn log_reply(path: &Path) -> String {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return "Log file not found. Make sure logging is configured correctly.".to_string();
        }
        Err(e) => return format!("Error reading log file: {}", escape_html(&e.to_string())),
    };
    let tail = tail_lines(&content, LOG_LINES);
    if tail.trim().is_empty() {
        return "Log file is empty.".to_string();
    }
    format!(
        "<b>Last {LOG_LINES} lines of log:</b>\n\n<pre>{}</pre>",
        escape_html(keep_last_chars(&tail, MAX_LOG_CHARS))
    )
}

/// `/log`
pub async fn handle_log(app: Arc<App>, msg: Message) -> Result<()> {
    let reply = log_reply(&app.config.log_file).await;
    output::say(&app.bot, msg.chat.id, &reply).await?;
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerStats {
    pub cpu_percent: f32,
    pub mem_used: u64,
    pub mem_total: u64,
    pub disk_used: u64,
    pub disk_total: u64,
    pub net_sent: u64,
    pub net_received: u64,
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 { 0.0 } else { used as f64 * 100.0 / total as f64 }
}

/// Sample the host. Blocks for the CPU measurement interval.
pub fn collect_stats() -> ServerStats {
    let mut sys = System::new();
    sys.refresh_cpu();
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu();
    sys.refresh_memory();

    let disks = Disks::new_with_refreshed_list();
    let (disk_total, disk_used) = disks
        .iter()
        .find(|d| d.mount_point() == Path::new("/"))
        .map(|d| (d.total_space(), d.total_space().saturating_sub(d.available_space())))
        .unwrap_or_default();

    let networks = Networks::new_with_refreshed_list();
    let (mut net_sent, mut net_received) = (0, 0);
    for (_name, data) in &networks {
        net_sent += data.total_transmitted();
        net_received += data.total_received();
    }

    ServerStats {
        cpu_percent: sys.global_cpu_info().cpu_usage(),
        mem_used: sys.used_memory(),
        mem_total: sys.total_memory(),
        disk_used,
        disk_total,
        net_sent,
        net_received,
    }
}

pub fn format_stats(stats: &ServerStats) -> String {
    format!(
        "<b>Server Resource Stats</b>\n\n\
         <b>CPU:</b> <code>{:.1}%</code>\n\
         <b>RAM:</b> <code>{} / {} ({:.1}%)</code>\n\
         <b>Disk:</b> <code>{} / {} ({:.1}%)</code>\n\n\
         <b>Network Traffic (since boot)</b>\n \
         Uploaded: <code>{}</code>\n \
         Downloaded: <code>{}</code>",
        stats.cpu_percent,
        format_bytes(stats.mem_used),
        format_bytes(stats.mem_total),
        percent(stats.mem_used, stats.mem_total),
        format_bytes(stats.disk_used),
        format_bytes(stats.disk_total),
        percent(stats.disk_used, stats.disk_total),
        format_bytes(stats.net_sent),
        format_bytes(stats.net_received),
    )
}

/// `/stats`
pub async fn handle_stats(app: Arc<App>, msg: Message) -> Result<()> {
    let stats = tokio::task::spawn_blocking(collect_stats)
        .await
        .context("Stats collection panicked")?;
    output::say(&app.bot, msg.chat.id, &format_stats(&stats)).await?;
    Ok(())
}
