//! mediaindex-bot: stream info for channel captions and per-title indexes.
//!
//! Reads `config.env` (if present) and the process environment, checks
//! that ffprobe/mediainfo and the scratch directory are usable, then
//! long-polls the Bot API until Ctrl-C.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use mediaindex_sdk::client::Bot;

use mediaindex_bot::app::App;
use mediaindex_bot::config::{self, Args, Config};
use mediaindex_bot::environment::check_environment;
use mediaindex_bot::store::Store;
use mediaindex_bot::{dispatcher, logging, status};

fn main() -> Result<()> {
    // Before the runtime exists: this mutates the process environment.
    let applied = config::load_env_file(Path::new("config.env")).context("Cannot read config.env")?;

    let args = Args::parse();
    let _log_guard = logging::init(&args.log_file)?;
    if applied > 0 {
        tracing::info!(applied, "Loaded settings from config.env");
    }
    let config = Config::from_args(args)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Cannot start the async runtime")?
        .block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let report = check_environment(&config).await;
    for check in &report.checks {
        tracing::info!(check = %check.name, status = ?check.status, detail = %check.detail, "Environment check");
    }
    if !report.is_ready() {
        if config.require_tools {
            bail!("Environment is not ready:\n{}", report.summary());
        }
        tracing::warn!("Environment checks failed; continuing because REQUIRE_TOOLS is off");
    }

    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let store = Arc::new(Store::open(&config.database_path)?);

    tracing::info!(
        api = %config.api_url,
        database = %config.database_path.display(),
        max_tasks = config.max_concurrent_tasks,
        "Starting mediaindex-bot"
    );
    let bot = Bot::with_api_url(config.bot_token.clone(), &config.api_url);
    let app = App::new(bot, config, store);
    app.restore_settings()?;
    status::notify_interrupted_scans(&app).await?;

    dispatcher::run(app).await
}
