//! Batched walk over a channel's recorded history.
//!
//! Batches come newest first. With tracking on, ids already in the
//! processed cache are skipped and every handed-out batch is added to the
//! cache once the caller asks for the next one (or calls [`HistoryBatches::commit`]).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use mediaindex_sdk::types::Message;

use crate::store::Store;

#[derive(Debug, Clone)]
pub struct HistoryOptions {
    /// Clear the processed cache first and walk everything.
    pub force: bool,
    /// Skip and record processed ids.
    pub track: bool,
    pub batch_size: usize,
    /// Pause between batches.
    pub pause: Duration,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self { force: false, track: true, batch_size: 100, pause: Duration::from_secs(2) }
    }
}

pub struct HistoryBatches {
    store: Arc<Store>,
    channel_id: i64,
    queue: VecDeque<Message>,
    handed_out: Vec<i64>,
    options: HistoryOptions,
    batches: usize,
    /// Messages recorded for the channel, before cache filtering.
    pub total_messages: usize,
}

impl HistoryBatches {
    pub fn open(store: Arc<Store>, channel_id: i64, options: HistoryOptions) -> Result<Self> {
        if options.force && options.track {
            let cleared = store.clear_cached_message_ids(channel_id)?;
            tracing::info!(channel = channel_id, cleared, "Cleared processed cache for rescan");
        }
        let history = store.channel_history(channel_id)?;
        let total_messages = history.len();
        let cached = if options.track && !options.force {
            store.cached_message_ids(channel_id)?
        } else {
            Default::default()
        };
        let queue: VecDeque<Message> = history
            .into_iter()
            .filter(|m| !cached.contains(&m.message_id))
            .collect();
        tracing::info!(
            channel = channel_id,
            total = total_messages,
            pending = queue.len(),
            force = options.force,
            "Streaming channel history"
        );
        Ok(Self {
            store,
            channel_id,
            queue,
            handed_out: Vec::new(),
            options,
            batches: 0,
            total_messages,
        })
    }

    /// Messages not yet handed out.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Record the last batch as processed.
    pub fn commit(&mut self) -> Result<()> {
        if self.options.track && !self.handed_out.is_empty() {
            self.store.cache_message_ids(self.channel_id, &self.handed_out)?;
        }
        self.handed_out.clear();
        Ok(())
    }

    pub async fn next_batch(&mut self) -> Result<Option<Vec<Message>>> {
        self.commit()?;
        if self.queue.is_empty() {
            return Ok(None);
        }
        if self.batches > 0 && !self.options.pause.is_zero() {
            tokio::time::sleep(self.options.pause).await;
        }
        let n = self.options.batch_size.max(1).min(self.queue.len());
        let batch: Vec<Message> = self.queue.drain(..n).collect();
        self.handed_out = batch.iter().map(|m| m.message_id).collect();
        self.batches += 1;
        tracing::debug!(channel = self.channel_id, size = batch.len(), "Yielding history batch");
        Ok(Some(batch))
    }
}
