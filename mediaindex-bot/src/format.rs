//! Index post rendering (Telegram HTML).

use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::{DateTime, TimeZone};
use mediaindex_sdk::escape_html;

use crate::store::{MediaData, MovieEntry};

/// Telegram's message length limit.
pub const MAX_MESSAGE_CHARS: usize = 4096;
const TRUNCATED_CHARS: usize = 4090;

/// `[1, 2, 3, 5, 7, 8]` → `E01-E03, E05, E07-E08`.
pub fn episode_range(episodes: &[u32]) -> String {
    let mut eps = episodes.to_vec();
    eps.sort_unstable();
    eps.dedup();
    let Some((&first, rest)) = eps.split_first() else {
        return "No episodes found".to_string();
    };

    let mut ranges = Vec::new();
    let (mut start, mut end) = (first, first);
    for &ep in rest {
        if ep == end + 1 {
            end = ep;
        } else {
            ranges.push(span(start, end));
            start = ep;
            end = ep;
        }
    }
    ranges.push(span(start, end));
    ranges.join(", ")
}

fn span(start: u32, end: u32) -> String {
    if start == end {
        format!("E{start:02}")
    } else {
        format!("E{start:02}-E{end:02}")
    }
}

/// `Mar 04, 2025 09:15 PM Asia/Kolkata`
pub fn timestamp_label<Tz: TimeZone>(now: &DateTime<Tz>, tz_label: &str) -> String
where
    Tz::Offset: Display,
{
    format!("{} {tz_label}", now.format("%b %d, %Y %I:%M %p"))
}

fn branch(i: usize, len: usize) -> &'static str {
    if i + 1 == len { "└─" } else { "├─" }
}

pub fn format_series_post(
    title: &str,
    data: &MediaData,
    expected: Option<&BTreeMap<u32, usize>>,
    updated: &str,
) -> String {
    let mut text = format!("<b>{}</b>\n\n", escape_html(title));

    for (season, season_data) in &data.seasons {
        let count = expected
            .and_then(|e| e.get(season).copied())
            .unwrap_or(season_data.episodes.len());
        text.push_str(&format!("<b>Season {season}</b> ({count} Episodes)\n"));

        let len = season_data.qualities.len();
        for (i, (key, episodes)) in season_data.qualities.iter().enumerate() {
            let eps: Vec<u32> = episodes.iter().copied().collect();
            let mut line = format!(
                "{} <b>{} {}</b>",
                branch(i, len),
                escape_html(&key.quality),
                escape_html(&key.codec)
            );
            if key.has_encoder() {
                line.push_str(&format!(" ({})", escape_html(&key.encoder)));
            }
            text.push_str(&format!("{line}: {}\n", episode_range(&eps)));
        }
    }

    text.push_str(&format!("\nLast Updated: {updated}"));
    text
}

pub fn format_movie_post(title: &str, data: &MediaData, updated: &str) -> String {
    let mut text = format!("<b>{}</b>\n\n", escape_html(title));

    let mut by_year: BTreeMap<u32, Vec<&MovieEntry>> = BTreeMap::new();
    for movie in &data.movies {
        by_year.entry(movie.year).or_default().push(movie);
    }

    for (year, movies) in &by_year {
        for (i, movie) in movies.iter().enumerate() {
            let mut quality = format!(
                "<b>{} {}</b>",
                escape_html(&movie.quality),
                escape_html(&movie.codec)
            );
            if movie.encoder != crate::parser::UNKNOWN {
                quality.push_str(&format!(" ({})", escape_html(&movie.encoder)));
            }
            text.push_str(&format!(
                "{} <b>{} ({year})</b>: {quality}\n",
                branch(i, movies.len()),
                escape_html(&movie.title)
            ));
        }
    }

    text.push_str(&format!("\nLast Updated: {updated}"));
    text
}

/// Series layout when any season is known, movie layout otherwise.
pub fn format_post(
    title: &str,
    data: &MediaData,
    expected: Option<&BTreeMap<u32, usize>>,
    updated: &str,
) -> String {
    if data.is_series() {
        format_series_post(title, data, expected, updated)
    } else {
        format_movie_post(title, data, updated)
    }
}

/// Cut an over-long post to 4090 characters plus `\n...`, without leaving
/// a half-written tag or entity, or an unclosed `<b>`.
pub fn truncate_post(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text.to_string();
    }
    let mut kept: String = text.chars().take(TRUNCATED_CHARS).collect();
    if let Some(open) = kept.rfind('<') {
        if kept[open..].find('>').is_none() {
            kept.truncate(open);
        }
    }
    if let Some(amp) = kept.rfind('&') {
        if !kept[amp..].contains(';') {
            kept.truncate(amp);
        }
    }
    if kept.matches("<b>").count() > kept.matches("</b>").count() {
        kept.push_str("</b>");
    }
    kept.push_str("\n...");
    kept
}

/// 1024-based size with two decimals: `1.50 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const LABELS: [&str; 5] = ["", "K", "M", "G", "T"];
    let mut value = bytes as f64;
    let mut n = 0;
    while value >= 1024.0 && n < LABELS.len() - 1 {
        value /= 1024.0;
        n += 1;
    }
    format!("{value:.2} {}B", LABELS[n])
}
