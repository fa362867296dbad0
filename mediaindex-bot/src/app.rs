//! Shared state handed to every handler.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use mediaindex_sdk::client::Bot;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::store::{ScanRecord, Store};
use crate::tasks::{ScanControl, ScanKind, TaskRegistry, UserStates};
use crate::tvmaze::TvMaze;

pub const INDEX_CHANNEL_SETTING: &str = "index_channel_id";

pub struct App {
    pub bot: Bot,
    pub config: Config,
    pub store: Arc<Store>,
    pub tasks: TaskRegistry,
    pub users: UserStates,
    pub tvmaze: TvMaze,
    pub(crate) refresher: Mutex<Option<JoinHandle<()>>>,
}

impl App {
    pub fn new(bot: Bot, config: Config, store: Arc<Store>) -> Arc<Self> {
        let tvmaze = TvMaze::new(&config.tvmaze_url, Arc::clone(&store));
        Arc::new(Self {
            bot,
            tasks: TaskRegistry::new(config.max_concurrent_tasks),
            users: UserStates::default(),
            tvmaze,
            store,
            config,
            refresher: Mutex::new(None),
        })
    }

    /// Apply settings persisted by `/settings` over the configured values.
    pub fn restore_settings(&self) -> Result<()> {
        if let Some(raw) = self.store.get_setting(INDEX_CHANNEL_SETTING)? {
            match raw.parse::<i64>() {
                Ok(id) => {
                    tracing::info!(index_channel = id, "Using stored index channel");
                    self.config.set_index_channel_id(id);
                }
                Err(_) => tracing::warn!(value = %raw, "Ignoring invalid stored index channel"),
            }
        }
        Ok(())
    }

    pub fn set_index_channel(&self, id: i64) -> Result<()> {
        self.store.set_setting(INDEX_CHANNEL_SETTING, &id.to_string())?;
        self.config.set_index_channel_id(id);
        Ok(())
    }

    /// Register a scan, spawn it, and keep its abort handle. Returns the scan id.
    ///
    /// The registry entry goes away when the task ends, whether it returned,
    /// failed before tracking itself, or was aborted.
    pub fn spawn_scan<F, Fut>(self: &Arc<Self>, channel_id: i64, kind: ScanKind, run: F) -> String
    where
        F: FnOnce(ScanControl) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.tasks.next_scan_id(channel_id);
        let control = self.tasks.register(&id, channel_id, kind);
        let finish = FinishOnDrop { app: Arc::clone(self), id: id.clone() };
        let scan = run(control);
        let handle = tokio::spawn(async move {
            let _finish = finish;
            scan.await;
        });
        self.tasks.attach(&id, handle.abort_handle());
        tracing::info!(scan = %id, channel = channel_id, kind = kind.label(), "Scan spawned");
        crate::status::ensure_refresher(self);
        id
    }

    /// Mirror a scan into the store until the guard drops (finished,
    /// failed or aborted).
    pub fn track_scan(self: &Arc<Self>, record: ScanRecord) -> Result<ScanGuard> {
        self.store.start_scan(&record)?;
        Ok(ScanGuard { app: Arc::clone(self), id: record.scan_id })
    }
}

/// Drops the registry entry of a spawned scan.
struct FinishOnDrop {
    app: Arc<App>,
    id: String,
}

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        self.app.tasks.finish(&self.id);
    }
}

pub struct ScanGuard {
    app: Arc<App>,
    id: String,
}

impl ScanGuard {
    pub fn progress(&self, processed: usize) {
        if let Err(e) = self.app.store.update_scan_progress(&self.id, processed) {
            tracing::warn!(scan = %self.id, error = %e, "Could not store scan progress");
        }
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        if let Err(e) = self.app.store.end_scan(&self.id) {
            tracing::warn!(scan = %self.id, error = %e, "Could not clear scan record");
        }
        self.app.tasks.finish(&self.id);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::{Args, Config};
    use clap::Parser;

    pub fn app_with(api_url: &str, store: Arc<Store>) -> Arc<App> {
        let mut args = Args::try_parse_from(["mediaindex-bot"]).unwrap();
        args.bot_token = "123:abc".into();
        args.owner_id = 1;
        args.tvmaze_url = api_url.into();
        let config = Config::from_args(args).unwrap();
        App::new(Bot::with_api_url("123:abc", api_url), config, store)
    }

    pub fn app() -> Arc<App> {
        app_with("http://127.0.0.1:9", Arc::new(Store::open_memory().unwrap()))
    }
}
