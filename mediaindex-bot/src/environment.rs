//! Startup checks for the provisioned runtime.
//!
//! The bot shells out to ffprobe (and optionally mediainfo) and keeps
//! partial downloads in a scratch directory. Both must be in place before
//! the first command runs.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

/// Outcome of a single check.
#[derive(Debug, Clone)]
pub struct Check {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
    pub hint: Option<String>,
}

impl Check {
    pub fn ok(name: &str, detail: impl Into<String>) -> Self {
        Self { name: name.to_string(), status: CheckStatus::Ok, detail: detail.into(), hint: None }
    }

    pub fn warn(name: &str, detail: impl Into<String>, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warn,
            detail: detail.into(),
            hint: Some(hint.to_string()),
        }
    }

    pub fn fail(name: &str, detail: impl Into<String>, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Fail,
            detail: detail.into(),
            hint: Some(hint.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnvironmentReport {
    pub checks: Vec<Check>,
}

impl EnvironmentReport {
    /// No check failed.
    pub fn is_ready(&self) -> bool {
        self.checks.iter().all(|c| c.status != CheckStatus::Fail)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| c.status == CheckStatus::Fail)
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        for check in &self.checks {
            let mark = match check.status {
                CheckStatus::Ok => "ok",
                CheckStatus::Warn => "warn",
                CheckStatus::Fail => "FAIL",
            };
            out.push_str(&format!("[{mark}] {}: {}", check.name, check.detail));
            if let Some(hint) = &check.hint {
                if check.status != CheckStatus::Ok {
                    out.push_str(&format!(" ({hint})"));
                }
            }
            out.push('\n');
        }
        out
    }
}

/// An external binary the bot depends on.
#[derive(Debug, Clone)]
pub struct Tool {
    pub name: &'static str,
    /// Name on `PATH`, or a path to the binary.
    pub binary: String,
    pub version_flag: &'static str,
    pub required: bool,
}

pub fn default_tools(config: &Config) -> Vec<Tool> {
    vec![
        Tool { name: "ffmpeg", binary: "ffmpeg".to_string(), version_flag: "-version", required: true },
        Tool { name: "ffprobe", binary: config.ffprobe_bin.clone(), version_flag: "-version", required: true },
        Tool {
            name: "mediainfo",
            binary: config.mediainfo_bin.clone(),
            version_flag: "--version",
            required: config.mediainfo_enabled,
        },
    ]
}

/// Resolve a binary on `PATH`. Values containing a separator are taken as paths.
pub fn find_in_path(binary: &str) -> Option<PathBuf> {
    if binary.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(binary);
        return path.is_file().then_some(path);
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

/// Resolve the tool and run it with its version flag.
pub async fn probe_tool(tool: &Tool) -> Check {
    let missing = |detail: String| {
        let hint = "install ffmpeg and mediainfo (apt install ffmpeg mediainfo)";
        if tool.required {
            Check::fail(tool.name, detail, hint)
        } else {
            Check::warn(tool.name, detail, hint)
        }
    };

    let Some(path) = find_in_path(&tool.binary) else {
        return missing("not found on PATH".to_string());
    };

    let output = Command::new(&path)
        .arg(tool.version_flag)
        .stdin(Stdio::null())
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => {
            let stdout = String::from_utf8_lossy(&out.stdout);
            let first = stdout.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
            Check::ok(tool.name, format!("{} ({first})", path.display()))
        }
        Ok(out) => missing(format!(
            "{} {} exited with {}",
            path.display(),
            tool.version_flag,
            out.status.code().unwrap_or(-1)
        )),
        Err(e) => missing(format!("failed to run {}: {e}", path.display())),
    }
}

/// Create the scratch directory if needed and prove it is writable.
pub async fn ensure_scratch_dir(dir: &Path) -> Check {
    const NAME: &str = "scratch dir";
    const HINT: &str = "set DOWNLOAD_DIR to a writable directory";

    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        return Check::fail(NAME, format!("cannot create {}: {e}", dir.display()), HINT);
    }

    let probe = dir.join(format!(".write-probe-{}", std::process::id()));
    if let Err(e) = tokio::fs::write(&probe, b"ok").await {
        return Check::fail(NAME, format!("{} is not writable: {e}", dir.display()), HINT);
    }
    let _ = tokio::fs::remove_file(&probe).await;
    Check::ok(NAME, format!("{} is writable", dir.display()))
}

/// Compare the process `TZ` with the configured timezone.
pub fn check_timezone(configured: &str, tz_env: Option<&str>) -> Check {
    const HINT: &str = "set TZ to match TIMEZONE (build arg TIMEZONE in the image)";
    match tz_env {
        Some(tz) if tz == configured => Check::ok("timezone", tz.to_string()),
        Some(tz) => Check::warn(
            "timezone",
            format!("TZ={tz} but TIMEZONE={configured}; timestamps use TZ"),
            HINT,
        ),
        None => Check::warn("timezone", format!("TZ unset, TIMEZONE={configured}"), HINT),
    }
}

/// Run every startup check.
pub async fn check_environment(config: &Config) -> EnvironmentReport {
    let mut report = EnvironmentReport::default();
    for tool in default_tools(config) {
        report.checks.push(probe_tool(&tool).await);
    }
    report.checks.push(ensure_scratch_dir(&config.download_dir).await);
    let tz = std::env::var("TZ").ok();
    report.checks.push(check_timezone(&config.timezone, tz.as_deref()));
    report
}
