//! Runtime configuration.
//!
//! Every setting is a clap flag with an environment fallback. An optional
//! `config.env` file is folded into the process environment before parsing;
//! variables that are already set take precedence over the file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use clap::Parser;

use crate::probe::ProbeTools;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "mediaindex-bot",
    about = "Adds stream info to video captions and builds per-title channel indexes"
)]
pub struct Args {
    /// Bot API token from @BotFather
    #[arg(long, env = "BOT_TOKEN", default_value = "", hide_env_values = true)]
    pub bot_token: String,

    /// Telegram user id of the owner (always authorized)
    #[arg(long, env = "OWNER_ID", default_value_t = 0, allow_hyphen_values = true)]
    pub owner_id: i64,

    /// Comma separated user/chat ids allowed to run commands
    #[arg(long, env = "AUTHORIZED_CHATS", default_value = "")]
    pub authorized_chats: String,

    /// Channel that receives the per-title index posts (0 = not set)
    #[arg(long, env = "INDEX_CHANNEL_ID", default_value_t = 0, allow_hyphen_values = true)]
    pub index_channel_id: i64,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "mediaindex.db")]
    pub database_path: PathBuf,

    /// Timezone label used for "Last Updated" footers
    #[arg(long, env = "TIMEZONE", default_value = "Asia/Kolkata")]
    pub timezone: String,

    /// Ask mediainfo for a second opinion when ffprobe finds nothing
    #[arg(
        long,
        env = "MEDIAINFO_ENABLED",
        default_value = "true",
        value_parser = clap::builder::BoolishValueParser::new(),
        action = clap::ArgAction::Set
    )]
    pub mediainfo_enabled: bool,

    /// ffprobe binary (name on PATH or absolute path)
    #[arg(long, env = "FFPROBE_BIN", default_value = "ffprobe")]
    pub ffprobe_bin: String,

    /// mediainfo binary (name on PATH or absolute path)
    #[arg(long, env = "MEDIAINFO_BIN", default_value = "mediainfo")]
    pub mediainfo_bin: String,

    /// Maximum number of channel scans running at once
    #[arg(long, env = "MAX_CONCURRENT_TASKS", default_value_t = 5)]
    pub max_concurrent_tasks: usize,

    /// Scratch directory for partial downloads
    #[arg(long, env = "DOWNLOAD_DIR", default_value = "/tmp/mediainfo/")]
    pub download_dir: PathBuf,

    /// Log file served by /log
    #[arg(long, env = "LOG_FILE", default_value = "log.txt")]
    pub log_file: PathBuf,

    /// Bot API base URL
    #[arg(long, env = "API_URL", default_value = mediaindex_sdk::client::DEFAULT_API_URL)]
    pub api_url: String,

    /// TVMaze API base URL
    #[arg(long, env = "TVMAZE_URL", default_value = "https://api.tvmaze.com")]
    pub tvmaze_url: String,

    /// Refuse to start when a required tool or the scratch dir is missing
    #[arg(
        long,
        env = "REQUIRE_TOOLS",
        default_value = "true",
        value_parser = clap::builder::BoolishValueParser::new(),
        action = clap::ArgAction::Set
    )]
    pub require_tools: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
}

/// Validated configuration shared by every handler.
#[derive(Debug)]
pub struct Config {
    pub bot_token: String,
    pub owner_id: i64,
    pub authorized_ids: Vec<i64>,
    index_channel_id: AtomicI64,
    pub database_path: PathBuf,
    pub timezone: String,
    pub mediainfo_enabled: bool,
    pub ffprobe_bin: String,
    pub mediainfo_bin: String,
    pub max_concurrent_tasks: usize,
    pub download_dir: PathBuf,
    pub log_file: PathBuf,
    pub api_url: String,
    pub tvmaze_url: String,
    pub require_tools: bool,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        if args.bot_token.trim().is_empty() {
            missing.push("BOT_TOKEN");
        }
        if args.owner_id == 0 {
            missing.push("OWNER_ID");
        }
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        Ok(Self {
            bot_token: args.bot_token.trim().to_string(),
            owner_id: args.owner_id,
            authorized_ids: parse_id_list(&args.authorized_chats),
            index_channel_id: AtomicI64::new(args.index_channel_id),
            database_path: args.database_path,
            timezone: args.timezone,
            mediainfo_enabled: args.mediainfo_enabled,
            ffprobe_bin: args.ffprobe_bin,
            mediainfo_bin: args.mediainfo_bin,
            max_concurrent_tasks: args.max_concurrent_tasks.max(1),
            download_dir: args.download_dir,
            log_file: args.log_file,
            api_url: args.api_url,
            tvmaze_url: args.tvmaze_url,
            require_tools: args.require_tools,
        })
    }

    pub fn index_channel_id(&self) -> i64 {
        self.index_channel_id.load(Ordering::Relaxed)
    }

    pub fn set_index_channel_id(&self, id: i64) {
        self.index_channel_id.store(id, Ordering::Relaxed);
    }

    /// Binaries for probing; mediainfo is left out when it is disabled.
    pub fn probe_tools(&self) -> ProbeTools {
        ProbeTools {
            ffprobe: self.ffprobe_bin.clone(),
            mediainfo: self.mediainfo_enabled.then(|| self.mediainfo_bin.clone()),
        }
    }

    /// Owner, or listed in `AUTHORIZED_CHATS`.
    pub fn is_authorized(&self, id: i64) -> bool {
        id == self.owner_id || self.authorized_ids.contains(&id)
    }
}

/// Parse `"1, -100222,abc,"` leniently; entries that are not integers are skipped.
pub fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(entry = s, "Ignoring invalid AUTHORIZED_CHATS entry");
                None
            }
        })
        .collect()
}

/// Parse `KEY=VALUE` lines. Blank lines and `#` comments are skipped,
/// an optional `export ` prefix is allowed, and matching single or double
/// quotes around the value are removed.
pub fn parse_env_file(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let mut value = value.trim();
        for quote in ['"', '\''] {
            if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
                value = &value[1..value.len() - 1];
                break;
            }
        }
        pairs.push((key.to_string(), value.to_string()));
    }
    pairs
}

/// Fold `path` into the process environment. Returns how many variables
/// were applied; a missing file is not an error.
///
/// Must run before any other thread is started.
pub fn load_env_file(path: &Path) -> std::io::Result<usize> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut applied = 0;
    for (key, value) in parse_env_file(&content) {
        if std::env::var_os(&key).is_some() {
            continue;
        }
        // SAFETY: called from `main` before the async runtime or any other
        // thread exists, so nothing reads the environment concurrently.
        unsafe { std::env::set_var(&key, &value) };
        applied += 1;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["mediaindex-bot"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn missing_required_values_are_listed_together() {
        let mut a = args(&[]);
        a.bot_token = String::new();
        a.owner_id = 0;
        let err = Config::from_args(a).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required configuration: BOT_TOKEN, OWNER_ID"
        );
    }

    #[test]
    fn owner_and_listed_ids_are_authorized() {
        let mut a = args(&["--authorized-chats", "11, -100222,junk,"]);
        a.bot_token = "123:abc".into();
        a.owner_id = 7;
        let config = Config::from_args(a).unwrap();
        assert!(config.is_authorized(7));
        assert!(config.is_authorized(11));
        assert!(config.is_authorized(-100222));
        assert!(!config.is_authorized(12));
    }

    #[test]
    fn mediainfo_flag_accepts_mixed_case() {
        let a = args(&["--mediainfo-enabled", "False"]);
        assert!(!a.mediainfo_enabled);
        let a = args(&["--mediainfo-enabled", "TRUE"]);
        assert!(a.mediainfo_enabled);
    }

    #[test]
    fn disabled_mediainfo_is_not_run() {
        let mut a = args(&["--mediainfo-enabled", "false", "--ffprobe-bin", "/opt/ff/ffprobe"]);
        a.bot_token = "t".into();
        a.owner_id = 1;
        let tools = Config::from_args(a).unwrap().probe_tools();
        assert_eq!(tools.ffprobe, "/opt/ff/ffprobe");
        assert_eq!(tools.mediainfo, None);
    }

    #[test]
    fn index_channel_is_mutable_at_runtime() {
        let mut a = args(&["--index-channel-id", "-1001"]);
        a.bot_token = "t".into();
        a.owner_id = 1;
        let config = Config::from_args(a).unwrap();
        assert_eq!(config.index_channel_id(), -1001);
        config.set_index_channel_id(-1002);
        assert_eq!(config.index_channel_id(), -1002);
    }

    #[test]
    fn env_file_parsing() {
        let pairs = parse_env_file(
            "# comment\n\nBOT_TOKEN = \"123:abc\"\nexport OWNER_ID=42\nTIMEZONE='UTC'\nbroken line\n=nokey\n",
        );
        assert_eq!(
            pairs,
            vec![
                ("BOT_TOKEN".to_string(), "123:abc".to_string()),
                ("OWNER_ID".to_string(), "42".to_string()),
                ("TIMEZONE".to_string(), "UTC".to_string()),
            ]
        );
    }
}
