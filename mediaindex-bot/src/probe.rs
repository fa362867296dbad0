//! Stream metadata via ffprobe, with mediainfo as a second opinion.
//!
//! Both tools run on partial downloads, so truncation warnings on stderr are
//! expected and only logged.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {code:?}: {stderr}")]
    Failed {
        tool: &'static str,
        code: Option<i32>,
        stderr: String,
    },
    #[error("unreadable {tool} output: {source}")]
    Parse {
        tool: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoStream {
    pub codec: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub aspect_ratio: Option<String>,
    pub frame_rate: Option<String>,
    pub bit_rate: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioStream {
    pub codec: String,
    pub channels: u32,
    /// Raw language tag, `Unknown` when the stream has none.
    pub language: String,
    pub sample_rate: Option<u32>,
    pub bit_rate: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormatInfo {
    pub duration: Option<f64>,
    pub bit_rate: Option<u64>,
    pub size: Option<u64>,
}

/// What a probe learned about a (possibly partial) file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    pub video: Option<VideoStream>,
    pub audio: Vec<AudioStream>,
    pub format: FormatInfo,
}

impl ProbeReport {
    pub fn has_content(&self) -> bool {
        self.video.is_some() || !self.audio.is_empty()
    }

    /// Enough to write a caption: video with codec and resolution, or a
    /// first audio stream with a codec.
    pub fn is_complete(&self) -> bool {
        let video_complete = self
            .video
            .as_ref()
            .is_some_and(|v| !v.codec.is_empty() && v.width.is_some() && v.height.is_some());
        let audio_complete = self.audio.first().is_some_and(|a| !a.codec.is_empty());
        video_complete || audio_complete
    }
}

const LANGUAGE_TAGS: [&str; 4] = ["language", "lang", "LANGUAGE", "Language"];
const UNKNOWN: &str = "Unknown";

/// Binaries to run. `mediainfo` is `None` when the second opinion is off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTools {
    pub ffprobe: String,
    pub mediainfo: Option<String>,
}

impl Default for ProbeTools {
    fn default() -> Self {
        Self { ffprobe: "ffprobe".to_string(), mediainfo: Some("mediainfo".to_string()) }
    }
}

pub fn ffprobe_args(path: &Path) -> Vec<String> {
    [
        "-v",
        "error",
        "-analyzeduration",
        "15000000",
        "-probesize",
        "15000000",
        "-show_entries",
        "format=duration,bit_rate,size:stream=codec_type,codec_name,width,height,display_aspect_ratio,avg_frame_rate,channels,sample_rate,bit_rate,tags",
        "-print_format",
        "json",
    ]
    .iter()
    .map(|s| s.to_string())
    .chain(std::iter::once(path.display().to_string()))
    .collect()
}

pub fn mediainfo_args(path: &Path) -> Vec<String> {
    vec!["--Output=JSON".to_string(), path.display().to_string()]
}

/// Run a tool and return its stdout. A non-zero exit is only an error when
/// nothing was written to stdout.
async fn run_tool(tool: &'static str, binary: &str, args: &[String]) -> Result<Vec<u8>, ProbeError> {
    let output = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| ProbeError::Spawn { tool, source })?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !stderr.is_empty() {
        let lower = stderr.to_lowercase();
        if lower.contains("partial file") || lower.contains("truncated") {
            tracing::debug!(tool, "Partial or truncated input, continuing");
        } else {
            tracing::warn!(tool, stderr = %stderr, "Probe warnings");
        }
    }

    if !output.status.success() && output.stdout.is_empty() {
        return Err(ProbeError::Failed { tool, code: output.status.code(), stderr });
    }
    Ok(output.stdout)
}

pub async fn run_ffprobe(binary: &str, path: &Path) -> Result<ProbeReport, ProbeError> {
    let stdout = run_tool("ffprobe", binary, &ffprobe_args(path)).await?;
    let report = parse_ffprobe_json(&stdout)?;
    tracing::debug!(
        path = %path.display(),
        video = report.video.is_some(),
        audio_tracks = report.audio.len(),
        "ffprobe finished"
    );
    Ok(report)
}

pub async fn run_mediainfo(binary: &str, path: &Path) -> Result<ProbeReport, ProbeError> {
    let stdout = run_tool("mediainfo", binary, &mediainfo_args(path)).await?;
    parse_mediainfo_json(&stdout)
}

/// ffprobe first; when it finds nothing usable and mediainfo is configured,
/// ask mediainfo and keep whichever report is better.
pub async fn probe_file(path: &Path, tools: &ProbeTools) -> Result<ProbeReport, ProbeError> {
    let ffprobe = run_ffprobe(&tools.ffprobe, path).await;
    let Some(mediainfo) = tools.mediainfo.as_deref() else {
        return ffprobe;
    };
    if ffprobe.as_ref().is_ok_and(ProbeReport::is_complete) {
        return ffprobe;
    }

    let ffprobe_has_content = ffprobe.as_ref().is_ok_and(ProbeReport::has_content);
    match run_mediainfo(mediainfo, path).await {
        Ok(second) if second.is_complete() || (second.has_content() && !ffprobe_has_content) => {
            tracing::debug!(path = %path.display(), "Using mediainfo result");
            Ok(second)
        }
        Ok(_) => ffprobe,
        Err(e) => {
            tracing::debug!(error = %e, "mediainfo second opinion failed");
            ffprobe
        }
    }
}

// ── ffprobe JSON ────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: FfprobeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    display_aspect_ratio: Option<String>,
    avg_frame_rate: Option<String>,
    channels: Option<u32>,
    sample_rate: Option<Value>,
    bit_rate: Option<Value>,
    #[serde(default)]
    tags: HashMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<Value>,
    bit_rate: Option<Value>,
    size: Option<Value>,
}

pub fn parse_ffprobe_json(bytes: &[u8]) -> Result<ProbeReport, ProbeError> {
    let out: FfprobeOutput =
        serde_json::from_slice(bytes).map_err(|source| ProbeError::Parse { tool: "ffprobe", source })?;

    let mut report = ProbeReport::default();
    for stream in out.streams {
        match stream.codec_type.as_deref() {
            Some("video") if report.video.is_none() => {
                report.video = Some(VideoStream {
                    codec: stream.codec_name.unwrap_or_else(|| UNKNOWN.to_string()),
                    width: stream.width,
                    height: stream.height,
                    aspect_ratio: stream.display_aspect_ratio,
                    frame_rate: stream.avg_frame_rate,
                    bit_rate: stream.bit_rate.as_ref().and_then(number),
                });
            }
            Some("audio") => {
                let language = LANGUAGE_TAGS
                    .iter()
                    .find_map(|key| stream.tags.get(*key).and_then(Value::as_str))
                    .unwrap_or(UNKNOWN)
                    .to_string();
                report.audio.push(AudioStream {
                    codec: stream.codec_name.unwrap_or_else(|| UNKNOWN.to_string()),
                    channels: stream.channels.unwrap_or(1),
                    language,
                    sample_rate: stream.sample_rate.as_ref().and_then(number).map(|n| n as u32),
                    bit_rate: stream.bit_rate.as_ref().and_then(number),
                });
            }
            _ => {}
        }
    }
    report.format = FormatInfo {
        duration: out.format.duration.as_ref().and_then(float),
        bit_rate: out.format.bit_rate.as_ref().and_then(number),
        size: out.format.size.as_ref().and_then(number),
    };
    Ok(report)
}

// ── mediainfo JSON ──────────────────────────────────────────────────────

pub fn parse_mediainfo_json(bytes: &[u8]) -> Result<ProbeReport, ProbeError> {
    let root: Value = serde_json::from_slice(bytes)
        .map_err(|source| ProbeError::Parse { tool: "mediainfo", source })?;

    let mut report = ProbeReport::default();
    let tracks = root
        .pointer("/media/track")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for track in &tracks {
        let field = |name: &str| track.get(name).and_then(Value::as_str).map(str::to_string);
        match track.get("@type").and_then(Value::as_str) {
            Some("General") => {
                report.format = FormatInfo {
                    duration: track.get("Duration").and_then(float),
                    bit_rate: track.get("OverallBitRate").and_then(number),
                    size: track.get("FileSize").and_then(number),
                };
            }
            Some("Video") if report.video.is_none() => {
                report.video = Some(VideoStream {
                    codec: field("Format").map(|f| mediainfo_codec(&f)).unwrap_or_else(|| UNKNOWN.to_string()),
                    width: track.get("Width").and_then(number).map(|n| n as u32),
                    height: track.get("Height").and_then(number).map(|n| n as u32),
                    aspect_ratio: field("DisplayAspectRatio"),
                    frame_rate: field("FrameRate"),
                    bit_rate: track.get("BitRate").and_then(number),
                });
            }
            Some("Audio") => {
                report.audio.push(AudioStream {
                    codec: field("Format").map(|f| mediainfo_codec(&f)).unwrap_or_else(|| UNKNOWN.to_string()),
                    channels: track.get("Channels").and_then(number).map(|n| n as u32).unwrap_or(1),
                    language: field("Language").unwrap_or_else(|| UNKNOWN.to_string()),
                    sample_rate: track.get("SamplingRate").and_then(number).map(|n| n as u32),
                    bit_rate: track.get("BitRate").and_then(number),
                });
            }
            _ => {}
        }
    }
    Ok(report)
}

/// Map mediainfo format names onto ffprobe codec names.
fn mediainfo_codec(format: &str) -> String {
    match format {
        "AVC" => "h264",
        "HEVC" => "hevc",
        "AV1" => "av1",
        "VP9" => "vp9",
        "MPEG-4 Visual" => "mpeg4",
        "AAC" => "aac",
        "AC-3" => "ac3",
        "E-AC-3" => "eac3",
        "MPEG Audio" => "mp3",
        "DTS" => "dts",
        "Opus" => "opus",
        "FLAC" => "flac",
        "Vorbis" => "vorbis",
        other => return other.to_lowercase(),
    }
    .to_string()
}

/// Integers arrive as JSON numbers or as decimal strings.
fn number(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as u64)),
        _ => None,
    }
}

fn float(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FFPROBE: &str = r#"{
        "streams": [
            {"codec_type": "video", "codec_name": "hevc", "width": 1920, "height": 1080, "display_aspect_ratio": "16:9", "avg_frame_rate": "24000/1001", "bit_rate": "4000000"},
            {"codec_type": "video", "codec_name": "mjpeg", "width": 320, "height": 240},
            {"codec_type": "audio", "codec_name": "aac", "channels": 6, "sample_rate": "48000", "tags": {"language": "eng"}},
            {"codec_type": "audio", "codec_name": "ac3", "channels": 2, "tags": {"LANGUAGE": "hin"}},
            {"codec_type": "audio", "codec_name": "opus"},
            {"codec_type": "subtitle", "codec_name": "subrip"}
        ],
        "format": {"duration": "2640.5", "bit_rate": "4500000", "size": "5242880"}
    }"#;

    #[test]
    fn ffprobe_output_is_parsed() {
        let report = parse_ffprobe_json(FFPROBE.as_bytes()).unwrap();
        let video = report.video.as_ref().unwrap();
        assert_eq!(video.codec, "hevc");
        assert_eq!((video.width, video.height), (Some(1920), Some(1080)));
        assert_eq!(video.bit_rate, Some(4_000_000));
        assert_eq!(video.aspect_ratio.as_deref(), Some("16:9"));
        assert_eq!(video.frame_rate.as_deref(), Some("24000/1001"));

        let langs: Vec<&str> = report.audio.iter().map(|a| a.language.as_str()).collect();
        assert_eq!(langs, vec!["eng", "hin", "Unknown"]);
        assert_eq!(report.audio[0].channels, 6);
        assert_eq!(report.audio[0].sample_rate, Some(48_000));
        assert_eq!(report.audio[2].channels, 1);

        assert_eq!(report.format.duration, Some(2640.5));
        assert_eq!(report.format.size, Some(5_242_880));
        assert!(report.has_content());
        assert!(report.is_complete());
    }

    #[test]
    fn empty_ffprobe_output_has_no_content() {
        let report = parse_ffprobe_json(b"{}").unwrap();
        assert!(!report.has_content());
        assert!(!report.is_complete());
        assert!(matches!(
            parse_ffprobe_json(b"not json"),
            Err(ProbeError::Parse { tool: "ffprobe", .. })
        ));
    }

    #[test]
    fn video_without_resolution_is_incomplete() {
        let report = parse_ffprobe_json(br#"{"streams":[{"codec_type":"video","codec_name":"h264"}]}"#).unwrap();
        assert!(report.has_content());
        assert!(!report.is_complete());
    }

    #[test]
    fn mediainfo_output_is_parsed() {
        let json = r#"{"media": {"@ref": "x.mkv", "track": [
            {"@type": "General", "Duration": "120.000", "OverallBitRate": "900000", "FileSize": "1048576"},
            {"@type": "Video", "Format": "AVC", "Width": "1280", "Height": "720", "FrameRate": "23.976"},
            {"@type": "Audio", "Format": "E-AC-3", "Channels": "6", "Language": "en", "SamplingRate": "48000"},
            {"@type": "Text", "Format": "UTF-8"}
        ]}}"#;
        let report = parse_mediainfo_json(json.as_bytes()).unwrap();
        let video = report.video.as_ref().unwrap();
        assert_eq!(video.codec, "h264");
        assert_eq!(video.height, Some(720));
        assert_eq!(video.frame_rate.as_deref(), Some("23.976"));
        assert_eq!(report.audio.len(), 1);
        assert_eq!(report.audio[0].codec, "eac3");
        assert_eq!(report.audio[0].language, "en");
        assert_eq!(report.format.duration, Some(120.0));
        assert!(report.is_complete());
    }

    #[test]
    fn ffprobe_arguments() {
        let args = ffprobe_args(Path::new("/tmp/mediainfo/a.mkv"));
        assert_eq!(args[0..2], ["-v".to_string(), "error".to_string()]);
        assert!(args.contains(&"15000000".to_string()));
        let entries = &args[args.iter().position(|a| a == "-show_entries").unwrap() + 1];
        assert!(entries.contains("display_aspect_ratio,avg_frame_rate"));
        assert_eq!(args.last().unwrap(), "/tmp/mediainfo/a.mkv");
        assert_eq!(mediainfo_args(Path::new("a.mkv"))[0], "--Output=JSON");
    }
}
