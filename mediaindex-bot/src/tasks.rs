//! In-process bookkeeping for running scans and user conversations.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Semaphore, watch};
use tokio::task::AbortHandle;

/// What a scan is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    MediaInfo,
    Index,
    Encoders,
}

impl ScanKind {
    pub fn label(&self) -> &'static str {
        match self {
            ScanKind::MediaInfo => "MediaInfo",
            ScanKind::Index => "Index",
            ScanKind::Encoders => "Encoders",
        }
    }
}

struct Entry {
    channel_id: i64,
    kind: ScanKind,
    pause_tx: watch::Sender<bool>,
    abort: Option<AbortHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanInfo {
    pub id: String,
    pub channel_id: i64,
    pub kind: ScanKind,
    pub paused: bool,
}

/// Handed to the scan itself so it can honour pause requests.
#[derive(Debug)]
pub struct ScanControl {
    pub id: String,
    pause_rx: watch::Receiver<bool>,
}

impl ScanControl {
    /// Returns immediately unless the scan is paused; then waits for resume.
    pub async fn checkpoint(&mut self) {
        loop {
            let paused = *self.pause_rx.borrow_and_update();
            if !paused {
                return;
            }
            tracing::debug!(scan = %self.id, "Scan paused");
            if self.pause_rx.changed().await.is_err() {
                return;
            }
        }
    }
}

pub struct TaskRegistry {
    scans: Mutex<HashMap<String, Entry>>,
    limit: Arc<Semaphore>,
}

impl TaskRegistry {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            scans: Mutex::new(HashMap::new()),
            limit: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Shared limit on concurrently running scans.
    pub fn limiter(&self) -> Arc<Semaphore> {
        Arc::clone(&self.limit)
    }

    /// `scan-<channel>-<unix ts>`, suffixed when the id is already taken.
    pub fn next_scan_id(&self, channel_id: i64) -> String {
        let base = format!("scan-{channel_id}-{}", chrono::Utc::now().timestamp());
        let scans = self.scans.lock();
        if !scans.contains_key(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let id = format!("{base}-{n}");
            if !scans.contains_key(&id) {
                return id;
            }
            n += 1;
        }
    }

    pub fn register(&self, id: &str, channel_id: i64, kind: ScanKind) -> ScanControl {
        let (pause_tx, pause_rx) = watch::channel(false);
        self.scans.lock().insert(
            id.to_string(),
            Entry { channel_id, kind, pause_tx, abort: None },
        );
        ScanControl { id: id.to_string(), pause_rx }
    }

    /// Remember how to abort a spawned scan.
    pub fn attach(&self, id: &str, abort: AbortHandle) {
        if let Some(entry) = self.scans.lock().get_mut(id) {
            entry.abort = Some(abort);
        }
    }

    /// Abort and forget a scan. Returns false for unknown ids.
    pub fn cancel(&self, id: &str) -> bool {
        match self.scans.lock().remove(id) {
            Some(entry) => {
                if let Some(abort) = entry.abort {
                    abort.abort();
                }
                true
            }
            None => false,
        }
    }

    pub fn set_paused(&self, id: &str, paused: bool) -> bool {
        match self.scans.lock().get(id) {
            Some(entry) => {
                entry.pause_tx.send_replace(paused);
                true
            }
            None => false,
        }
    }

    pub fn pause(&self, id: &str) -> bool {
        self.set_paused(id, true)
    }

    pub fn resume(&self, id: &str) -> bool {
        self.set_paused(id, false)
    }

    /// Flip the pause flag. `None` for unknown ids, else the new state.
    pub fn toggle_pause(&self, id: &str) -> Option<bool> {
        let scans = self.scans.lock();
        let entry = scans.get(id)?;
        let paused = !*entry.pause_tx.borrow();
        entry.pause_tx.send_replace(paused);
        Some(paused)
    }

    pub fn is_paused(&self, id: &str) -> bool {
        self.scans.lock().get(id).is_some_and(|e| *e.pause_tx.borrow())
    }

    /// Drop a scan that ended on its own.
    pub fn finish(&self, id: &str) {
        self.scans.lock().remove(id);
    }

    pub fn list(&self) -> Vec<ScanInfo> {
        let mut list: Vec<ScanInfo> = self
            .scans
            .lock()
            .iter()
            .map(|(id, e)| ScanInfo {
                id: id.clone(),
                channel_id: e.channel_id,
                kind: e.kind,
                paused: *e.pause_tx.borrow(),
            })
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub fn is_empty(&self) -> bool {
        self.scans.lock().is_empty()
    }
}

/// Multi-step conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserState {
    AwaitingIndexChannel,
}

#[derive(Default)]
pub struct UserStates {
    states: Mutex<HashMap<i64, UserState>>,
}

impl UserStates {
    pub fn set(&self, user_id: i64, state: UserState) {
        self.states.lock().insert(user_id, state);
    }

    pub fn get(&self, user_id: i64) -> Option<UserState> {
        self.states.lock().get(&user_id).copied()
    }

    pub fn take(&self, user_id: i64) -> Option<UserState> {
        self.states.lock().remove(&user_id)
    }
}
