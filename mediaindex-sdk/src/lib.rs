//! mediaindex-sdk: a small typed client for the Telegram Bot API.
//!
//! Covers the subset the media indexing bot needs: long polling for
//! updates, sending and editing messages and captions, inline keyboards,
//! callback answers, and ranged file downloads.

pub mod client;
pub mod error;
pub mod event;
pub mod types;

pub use client::{Bot, PollConfig};
pub use error::{ApiError, ApiResult};
pub use event::Event;

/// Escape text for messages sent with `parse_mode = HTML`.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(escape_html("a < b && c > d"), "a &lt; b &amp;&amp; c &gt; d");
        assert_eq!(escape_html("Plain [Title] (2020)"), "Plain [Title] (2020)");
    }
}
