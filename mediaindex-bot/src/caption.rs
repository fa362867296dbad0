//! The `Video:` / `Audio:` section appended to media captions.

use crate::probe::ProbeReport;

/// Telegram allows 1024 characters; keep a little headroom.
pub const MAX_CAPTION_CHARS: usize = 1020;
const MAX_LANGUAGES_SHOWN: usize = 3;

/// Named tier for the frame height. Width alone says nothing about the tier,
/// so a missing or zero height gives an empty label.
pub fn resolution_label(height: Option<u32>) -> String {
    match height {
        Some(h) if h >= 2160 => "4K".to_string(),
        Some(h) if h >= 1440 => "1440p".to_string(),
        Some(h) if h >= 1080 => "1080p".to_string(),
        Some(h) if h >= 720 => "720p".to_string(),
        Some(h) if h >= 480 => "480p".to_string(),
        Some(h) if h > 0 => format!("{h}p"),
        _ => String::new(),
    }
}

/// Three letter display code for an audio language tag, or `None` for
/// untagged streams.
pub fn normalize_language(code: &str) -> Option<String> {
    let upper = code.trim().to_uppercase();
    if matches!(upper.as_str(), "" | "UNKNOWN" | "UND" | "UNDEFINED" | "N/A") {
        return None;
    }
    let mapped = match upper.as_str() {
        "EN" | "ENGLISH" => "ENG",
        "HI" | "HINDI" => "HIN",
        "ES" | "SPANISH" => "SPA",
        "FR" | "FRENCH" => "FRA",
        "DE" | "GERMAN" => "GER",
        "IT" | "ITALIAN" => "ITA",
        "JA" | "JAPANESE" => "JPN",
        "KO" | "KOREAN" => "KOR",
        "ZH" | "CHINESE" => "CHI",
        "AR" | "ARABIC" => "ARA",
        "RU" | "RUSSIAN" => "RUS",
        "PT" | "PORTUGUESE" => "POR",
        _ => return Some(upper),
    };
    Some(mapped.to_string())
}

/// The media section lines for a report, without the original caption.
pub fn media_lines(report: &ProbeReport) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(video) = report.video.as_ref().filter(|v| !v.codec.is_empty()) {
        let mut line = format!("Video: {}", video.codec.to_uppercase());
        let resolution = resolution_label(video.height);
        if !resolution.is_empty() {
            line.push(' ');
            line.push_str(&resolution);
        }
        lines.push(line);
    }

    if !report.audio.is_empty() {
        let mut languages: Vec<String> = Vec::new();
        for track in &report.audio {
            if let Some(lang) = normalize_language(&track.language) {
                if !languages.contains(&lang) {
                    languages.push(lang);
                }
            }
        }
        let mut line = format!("Audio: {}", report.audio.len());
        if !languages.is_empty() {
            let mut shown = languages
                .iter()
                .take(MAX_LANGUAGES_SHOWN)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            if languages.len() > MAX_LANGUAGES_SHOWN {
                shown.push_str(&format!(" (+{})", languages.len() - MAX_LANGUAGES_SHOWN));
            }
            line.push_str(&format!(" ({shown})"));
        }
        lines.push(line);
    }

    lines
}

/// Original caption plus the media section, cut to fit Telegram's limit.
/// The original text is shortened first; the media section is never cut.
pub fn generate_caption(original: &str, report: &ProbeReport) -> String {
    if !report.has_content() {
        return original.to_string();
    }
    let base = original.trim();
    let lines = media_lines(report);
    if lines.is_empty() {
        return base.to_string();
    }
    let body = lines.join("\n");
    if base.is_empty() {
        return body;
    }

    let section = format!("\n\n{body}");
    let caption = format!("{base}{section}");
    if caption.chars().count() <= MAX_CAPTION_CHARS {
        return caption;
    }

    let room = MAX_CAPTION_CHARS as isize - section.chars().count() as isize - 5;
    if room > 0 {
        let kept: String = base.chars().take(room as usize).collect();
        format!("{kept}...{section}")
    } else {
        section
    }
}

pub fn has_mediainfo(caption: &str) -> bool {
    caption.contains("Video:") && caption.contains("Audio:")
}

fn is_media_line(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("Video:") || line.starts_with("Audio:")
}

/// Remove a trailing media section so the caption can be regenerated.
pub fn strip_media_section(caption: &str) -> String {
    let lines: Vec<&str> = caption.lines().collect();
    let mut start = lines.len();
    while start > 0 && (lines[start - 1].trim().is_empty() || is_media_line(lines[start - 1])) {
        start -= 1;
    }
    if !lines[start..].iter().any(|l| is_media_line(l)) {
        return caption.to_string();
    }
    lines[..start].join("\n").trim_end().to_string()
}

/// Whether editing `current` to `new` is worth an API call.
pub fn caption_changed(current: &str, new: &str) -> bool {
    if current == new || current.trim() == new.trim() {
        return false;
    }
    new.contains("Video:") || new.contains("Audio:")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{AudioStream, VideoStream};

    fn report(height: Option<u32>, langs: &[&str]) -> ProbeReport {
        ProbeReport {
            video: Some(VideoStream {
                codec: "hevc".into(),
                width: Some(1920),
                height,
                ..Default::default()
            }),
            audio: langs
                .iter()
                .map(|l| AudioStream { codec: "aac".into(), channels: 2, language: l.to_string(), ..Default::default() })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn resolution_labels() {
        assert_eq!(resolution_label(Some(2160)), "4K");
        assert_eq!(resolution_label(Some(1440)), "1440p");
        assert_eq!(resolution_label(Some(1080)), "1080p");
        assert_eq!(resolution_label(Some(800)), "720p");
        assert_eq!(resolution_label(Some(480)), "480p");
        assert_eq!(resolution_label(Some(360)), "360p");
        assert_eq!(resolution_label(None), "");
        assert_eq!(resolution_label(Some(0)), "");
    }

    #[test]
    fn languages_are_normalized() {
        assert_eq!(normalize_language("en").as_deref(), Some("ENG"));
        assert_eq!(normalize_language("Hindi").as_deref(), Some("HIN"));
        assert_eq!(normalize_language("tam").as_deref(), Some("TAM"));
        assert_eq!(normalize_language("und"), None);
        assert_eq!(normalize_language("Unknown"), None);
        assert_eq!(normalize_language(""), None);
    }

    #[test]
    fn caption_gets_media_section() {
        let caption = generate_caption("  Show S01E01  ", &report(Some(1080), &["eng", "en", "hin"]));
        assert_eq!(caption, "Show S01E01\n\nVideo: HEVC 1080p\nAudio: 3 (ENG, HIN)");
    }

    #[test]
    fn more_than_three_languages_are_counted() {
        let caption = generate_caption("x", &report(Some(720), &["en", "hi", "ta", "te", "ml"]));
        assert!(caption.ends_with("Audio: 5 (ENG, HIN, TA (+2))"), "{caption}");
    }

    #[test]
    fn untagged_audio_shows_only_count() {
        let caption = generate_caption("", &report(Some(2160), &["und", "Unknown"]));
        assert_eq!(caption, "Video: HEVC 4K\nAudio: 2");
    }

    #[test]
    fn long_captions_are_cut_to_fit() {
        let original = "a".repeat(1500);
        let caption = generate_caption(&original, &report(Some(1080), &["en"]));
        assert!(caption.chars().count() <= MAX_CAPTION_CHARS);
        assert!(caption.ends_with("...\n\nVideo: HEVC 1080p\nAudio: 1 (ENG)"));
    }

    #[test]
    fn oversized_section_keeps_its_separator() {
        let mut huge = report(Some(1080), &["en"]);
        if let Some(video) = huge.video.as_mut() {
            video.codec = "x".repeat(1100);
        }
        let caption = generate_caption("Show S01E01", &huge);
        assert!(caption.starts_with("\n\nVideo: XXX"));
        assert!(!caption.contains("Show"));
        assert_eq!(strip_media_section(&caption), "");
    }

    #[test]
    fn no_content_keeps_original() {
        assert_eq!(generate_caption("keep me", &ProbeReport::default()), "keep me");
    }

    #[test]
    fn media_section_is_stripped_for_rescans() {
        let captioned = generate_caption("Show S01E01\nGroup", &report(Some(1080), &["en"]));
        assert_eq!(strip_media_section(&captioned), "Show S01E01\nGroup");
        assert_eq!(strip_media_section("Video: H264 720p\nAudio: 1"), "");
        assert_eq!(strip_media_section("no section here"), "no section here");
        let regenerated = generate_caption(&strip_media_section(&captioned), &report(Some(720), &["en"]));
        assert_eq!(regenerated, "Show S01E01\nGroup\n\nVideo: HEVC 720p\nAudio: 1 (ENG)");
    }

    #[test]
    fn change_detection() {
        assert!(has_mediainfo("x\n\nVideo: H264\nAudio: 1"));
        assert!(!has_mediainfo("Video: only"));
        assert!(!caption_changed("a", "a"));
        assert!(!caption_changed("a ", " a"));
        assert!(!caption_changed("a", "b"));
        assert!(caption_changed("a", "a\n\nVideo: H264"));
    }
}
