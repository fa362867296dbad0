//! File name and caption parsing.
//!
//! Release-style names (`Show.Name.S01E02.1080p.x265-GROUP.mkv`) are reduced
//! to a title, season/episodes (or a movie year), and the quality, codec and
//! encoder tags used to group files in index posts.

use std::collections::HashSet;
use std::sync::LazyLock;

use mediaindex_sdk::types::ChatTarget;
use regex::Regex;

/// Release groups recognised as encoders.
pub const KNOWN_ENCODERS: &[&str] = &[
    "GHOST", "AMBER", "ELITE", "BONE", "CELDRA", "MEGUSTA", "EDGE2020", "PAHE", "DARKFLIX",
    "D3G", "PHOCIS", "ZTR", "TIPEX", "PRIMEFIX", "CODSWALLOP", "RAWR", "STAR", "JFF", "HEEL",
    "CBFM", "XWT", "STC", "KITSUNE", "AFG", "EDITH", "MSD", "SDH", "AOC", "G66", "PSA",
    "Tigole", "QxR", "TEPES", "VXT", "Vyndros", "Telly", "HQMUX", "W4NK3R", "BETA",
    "BHDStudio", "FraMeSToR", "DON", "DRONES", "FGT", "SPARKS", "NoGroup", "KiNGDOM", "NTb",
    "NTG", "KOGi", "SKG", "EVO", "iON10", "mSD", "CMRG", "KiNGS", "MiNX", "FUM", "GalaxyRG",
    "GalaxyTV", "EMBER", "QOQ", "BaoBao", "YTS", "YIFY", "RARBG", "ETRG", "DHD", "MkvCage",
    "RARBGx", "RGXT", "TGx", "SAiNT", "DpR", "KaKa", "S4KK", "D-Z0N3", "PTer", "BBL", "BMF",
    "FASM", "SC4R", "4KiNGS", "HDX", "DEFLATE", "TERMiNAL", "PTP", "ROKiT", "SWTYBLZ",
    "HOMELANDER", "TombDoc", "Walter", "RZEROX",
];

/// Source, service and audio tags that are never encoders.
pub const IGNORED_TAGS: &[&str] = &[
    "WEB-DL", "WEBDL", "WEBRIP", "WEB", "BRRIP", "BLURAY", "BD", "BDRIP", "DVDRIP", "DVD",
    "HDTV", "PDTV", "SDTV", "REMUX", "UNTOUCHED", "AMZN", "NF", "NETFLIX", "HULU", "ATVP",
    "DSNP", "MAX", "CRAV", "PCOCK", "RTE", "EZTV", "ETTV", "HDR", "HDR10", "DV", "DOLBY",
    "VISION", "ATMOS", "DTS", "AAC", "DDP", "DDP2", "DDP5", "OPUS", "AC3", "10BIT", "UHD",
    "PROPER", "COMPLETE", "FULL SERIES", "INT", "RIP", "MULTI", "GB", "XVID",
];

static KNOWN_ENCODERS_UPPER: LazyLock<HashSet<String>> =
    LazyLock::new(|| KNOWN_ENCODERS.iter().map(|e| e.to_uppercase()).collect());

static IGNORED_TAGS_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| IGNORED_TAGS.iter().copied().collect());

pub fn is_known_encoder(tag: &str) -> bool {
    KNOWN_ENCODERS_UPPER.contains(&tag.to_uppercase())
}

pub fn is_ignored_tag(tag: &str) -> bool {
    IGNORED_TAGS_SET.contains(tag.to_uppercase().as_str())
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex")
}

static SPLIT_PART: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)^(.*)\.(mkv|mp4|avi|mov)\.(\d{3})$"));
static SEASON_EPISODE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)(.+?)[ ._\[(-]s(\d{1,2})[ ._]?e(\d{1,3})(?:-e?(\d{1,3}))?")
});
static CROSS_EPISODE: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)(.+?)[ ._\[(](\d{1,2})x(\d{1,3})"));
static EPISODE_ONLY: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)(.+?)[ ._]e(\d{1,3})"));
static EPISODE_WORD: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)(.+?)[ ._]episode[ ._](\d{1,3})"));
static SEASON_IN_TITLE: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)\bseason[ ._](\d{1,2})\b|\bs(\d{1,2})\b"));
static MOVIE_YEAR: LazyLock<Regex> =
    LazyLock::new(|| re(r"(.+?)[ ._\[(]((?:19|20)\d{2})(?:[ ._\])]|$)"));
static TITLE_SEPARATORS: LazyLock<Regex> = LazyLock::new(|| re(r"[._]"));
static QUALITY: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)\b(4K|2160p|1080p|720p|576p|540p|480p)\b"));
static CODEC_AV1: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)\bAV1\b"));
static CODEC_VP9: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)\bVP9\b"));
static CODEC_X265: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)\b(HEVC|x265|H\s*265)\b"));
static CODEC_X264: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)\b(AVC|x264|H\s*264)\b"));
static ENCODER_SPLIT: LazyLock<Regex> = LazyLock::new(|| re(r"[\s._\-]"));

pub const UNKNOWN: &str = "Unknown";

/// Series or movie, as far as the name tells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaClass {
    Series { season: u32, episodes: Vec<u32> },
    Movie { year: u32 },
}

/// Title plus structure, before metadata tags are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structure {
    pub title: String,
    pub class: MediaClass,
}

/// Everything the indexer needs from one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInfo {
    pub title: String,
    pub class: MediaClass,
    pub quality: String,
    pub codec: String,
    pub encoder: String,
    pub is_split: bool,
    pub base_name: String,
}

/// Parse a media file, preferring the caption's first line when it looks
/// like a file name.
pub fn parse_media_info(filename: &str, caption: Option<&str>) -> Option<ParsedInfo> {
    let first_line = caption.and_then(|c| c.lines().next()).unwrap_or("");
    let text = if first_line.contains(".mkv") || first_line.contains(".mp4") {
        first_line
    } else {
        filename
    };

    let (base_name, is_split) = get_base_name(text);
    let structure = extract_structural_info(&base_name)?;

    let combined = format!("{base_name} {}", caption.unwrap_or(""));
    Some(ParsedInfo {
        title: structure.title,
        class: structure.class,
        quality: get_quality(&combined),
        codec: get_codec(&combined),
        encoder: get_encoder(&combined),
        is_split,
        base_name,
    })
}

/// `Show.mkv.001` is part one of a split upload of `Show.mkv`.
pub fn get_base_name(filename: &str) -> (String, bool) {
    match SPLIT_PART.captures(filename) {
        Some(caps) => (format!("{}.{}", &caps[1], &caps[2]), true),
        None => (filename.to_string(), false),
    }
}

pub fn extract_structural_info(text: &str) -> Option<Structure> {
    if let Some(caps) = SEASON_EPISODE.captures(text) {
        let season: u32 = caps[2].parse().ok()?;
        let start: u32 = caps[3].parse().ok()?;
        let end: Option<u32> = caps.get(4).and_then(|m| m.as_str().parse().ok());
        let episodes = match end {
            Some(end) if end >= start => (start..=end).collect(),
            _ => vec![start],
        };
        return Some(Structure {
            title: clean_title(&caps[1]),
            class: MediaClass::Series { season, episodes },
        });
    }

    if let Some(caps) = CROSS_EPISODE.captures(text) {
        let season: u32 = caps[2].parse().ok()?;
        let episode: u32 = caps[3].parse().ok()?;
        return Some(Structure {
            title: clean_title(&caps[1]),
            class: MediaClass::Series { season, episodes: vec![episode] },
        });
    }

    for pattern in [&*EPISODE_ONLY, &*EPISODE_WORD] {
        if let Some(caps) = pattern.captures(text) {
            let episode: u32 = caps[2].parse().ok()?;
            let mut title = clean_title(&caps[1]);
            let mut season = 1;
            if let Some(s) = SEASON_IN_TITLE.captures(&title) {
                season = s
                    .get(1)
                    .or_else(|| s.get(2))
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(1);
                title = collapse_spaces(&SEASON_IN_TITLE.replace_all(&title, ""));
            }
            return Some(Structure {
                title,
                class: MediaClass::Series { season, episodes: vec![episode] },
            });
        }
    }

    let caps = MOVIE_YEAR.captures(text)?;
    let year: u32 = caps[2].parse().ok()?;
    let title = clean_title(&caps[1]);
    if title.is_empty() {
        return None;
    }
    Some(Structure { title, class: MediaClass::Movie { year } })
}

fn clean_title(raw: &str) -> String {
    let spaced = TITLE_SEPARATORS.replace_all(raw, " ");
    let trimmed = spaced.trim_matches(|c: char| c.is_whitespace() || "-[(".contains(c));
    title_case(&collapse_spaces(trimmed))
}

fn collapse_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Uppercase the first letter of every word, lowercase the rest.
/// A "word" starts after any non-letter, so `x-men` becomes `X-Men`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_letter = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_letter = true;
        } else {
            out.push(c);
            prev_letter = false;
        }
    }
    out
}

pub fn get_quality(text: &str) -> String {
    match QUALITY.captures(text) {
        Some(caps) => {
            let quality = caps[1].to_uppercase();
            if quality.contains("2160") { "4K".to_string() } else { quality }
        }
        None => UNKNOWN.to_string(),
    }
}

pub fn get_codec(text: &str) -> String {
    let codec = if CODEC_AV1.is_match(text) {
        "AV1"
    } else if CODEC_VP9.is_match(text) {
        "VP9"
    } else if CODEC_X265.is_match(text) {
        "X265"
    } else if CODEC_X264.is_match(text) {
        "X264"
    } else {
        UNKNOWN
    };
    codec.to_string()
}

/// First token that names a known release group.
pub fn get_encoder(text: &str) -> String {
    ENCODER_SPLIT
        .split(text)
        .find(|word| !word.is_empty() && is_known_encoder(word))
        .map(|word| word.to_uppercase())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Channel ids from a bulk list: one `-100…` id per line.
pub fn extract_channel_list(content: &str) -> Vec<i64> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| {
            line.strip_prefix("-100")
                .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        })
        .filter_map(|line| line.parse().ok())
        .collect()
}

/// Interpret a command argument as a channel: full `-100…` id, a bare id
/// (prefixed with `-100`), or a public username.
pub fn parse_channel_target(arg: &str) -> Option<ChatTarget> {
    let arg = arg.trim();
    if arg.is_empty() {
        return None;
    }
    if arg.starts_with("-100") {
        return arg.parse().ok().map(ChatTarget::Id);
    }
    if arg.chars().all(|c| c.is_ascii_digit()) {
        return format!("-100{arg}").parse().ok().map(ChatTarget::Id);
    }
    if arg.starts_with('-') {
        return arg.parse().ok().map(ChatTarget::Id);
    }
    let name = arg.trim_start_matches('@');
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some(ChatTarget::Username(format!("@{name}")))
}
