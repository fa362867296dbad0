//! SQLite persistence.
//!
//! Holds the channel posts the bot has observed (the Bot API offers no
//! history call), the per-channel processed/failed message caches, active
//! scan bookkeeping, parsed media entries with their index posts, runtime
//! settings and the TVMaze response cache.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use mediaindex_sdk::types::Message;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

use crate::parser::{MediaClass, ParsedInfo, UNKNOWN};

pub struct Store {
    db: Mutex<Connection>,
}

/// A scan in progress, mirrored to the database so a restart can report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    pub scan_id: String,
    pub channel_id: i64,
    pub user_id: i64,
    pub total_messages: usize,
    pub processed_messages: usize,
    pub chat_title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPost {
    pub id: i64,
    pub title: String,
    pub channel_id: i64,
    pub message_id: Option<i64>,
}

/// One release variant of a title: `1080P X265 (GHOST)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualityKey {
    pub quality: String,
    pub codec: String,
    pub encoder: String,
}

impl std::fmt::Display for QualityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.quality, self.codec, self.encoder)
    }
}

impl QualityKey {
    pub fn has_encoder(&self) -> bool {
        self.encoder != UNKNOWN
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeasonData {
    pub episodes: BTreeSet<u32>,
    pub qualities: BTreeMap<QualityKey, BTreeSet<u32>>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MovieEntry {
    pub year: u32,
    pub title: String,
    pub quality: String,
    pub codec: String,
    pub encoder: String,
}

/// Everything stored for one title, across all scanned channels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaData {
    pub seasons: BTreeMap<u32, SeasonData>,
    pub movies: Vec<MovieEntry>,
}

impl MediaData {
    pub fn is_empty(&self) -> bool {
        self.seasons.is_empty() && self.movies.is_empty()
    }

    pub fn is_series(&self) -> bool {
        !self.seasons.is_empty()
    }
}

impl Store {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self { db: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database (tests).
    pub fn open_memory() -> Result<Self> {
        let store = Self { db: Mutex::new(Connection::open_in_memory()?) };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let db = self.db.lock();
        db.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS channels (
                channel_id INTEGER PRIMARY KEY,
                title TEXT,
                username TEXT
            );

            CREATE TABLE IF NOT EXISTS channel_messages (
                channel_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                date INTEGER NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (channel_id, message_id)
            );

            CREATE TABLE IF NOT EXISTS processed_ids (
                channel_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                PRIMARY KEY (channel_id, message_id)
            );

            CREATE TABLE IF NOT EXISTS failed_ids (
                channel_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                PRIMARY KEY (channel_id, message_id)
            );

            CREATE TABLE IF NOT EXISTS scans (
                scan_id TEXT PRIMARY KEY,
                channel_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                total_messages INTEGER NOT NULL,
                processed_messages INTEGER NOT NULL DEFAULT 0,
                chat_title TEXT NOT NULL,
                started_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS status_message (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                chat_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS media_entries (
                channel_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                season INTEGER,
                episodes TEXT,
                year INTEGER,
                quality TEXT NOT NULL,
                codec TEXT NOT NULL,
                encoder TEXT NOT NULL,
                file_size INTEGER NOT NULL DEFAULT 0,
                base_name TEXT NOT NULL,
                is_split INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (channel_id, message_id)
            );

            CREATE INDEX IF NOT EXISTS idx_media_entries_title ON media_entries(title);

            CREATE TABLE IF NOT EXISTS index_posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                channel_id INTEGER NOT NULL,
                message_id INTEGER,
                UNIQUE(title, channel_id)
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tvmaze_cache (
                key TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                fetched_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // ── Observed channel posts ──────────────────────────────────────────

    /// Remember a channel post (or its edited version).
    pub fn record_message(&self, msg: &Message) -> Result<()> {
        let payload = serde_json::to_string(msg)?;
        let db = self.db.lock();
        db.execute(
            "INSERT OR REPLACE INTO channel_messages (channel_id, message_id, date, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![msg.chat.id, msg.message_id, msg.date, payload],
        )?;
        db.execute(
            "INSERT INTO channels (channel_id, title, username) VALUES (?1, ?2, ?3)
             ON CONFLICT(channel_id) DO UPDATE SET title = excluded.title, username = excluded.username",
            params![msg.chat.id, msg.chat.title, msg.chat.username],
        )?;
        Ok(())
    }

    /// Recorded posts of a channel, newest first.
    pub fn channel_history(&self, channel_id: i64) -> Result<Vec<Message>> {
        let db = self.db.lock();
        let mut stmt = db.prepare(
            "SELECT payload FROM channel_messages WHERE channel_id = ?1 ORDER BY message_id DESC",
        )?;
        let payloads = stmt
            .query_map(params![channel_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(db);

        let mut messages = Vec::with_capacity(payloads.len());
        for payload in payloads {
            match serde_json::from_str::<Message>(&payload) {
                Ok(msg) => messages.push(msg),
                Err(e) => tracing::warn!(channel = channel_id, error = %e, "Skipping unreadable stored message"),
            }
        }
        Ok(messages)
    }

    pub fn message_count(&self, channel_id: i64) -> Result<usize> {
        let db = self.db.lock();
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM channel_messages WHERE channel_id = ?1",
            params![channel_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn channel_title(&self, channel_id: i64) -> Result<Option<String>> {
        let db = self.db.lock();
        let title = db
            .query_row(
                "SELECT title FROM channels WHERE channel_id = ?1",
                params![channel_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten();
        Ok(title)
    }

    // ── Processed message cache ─────────────────────────────────────────

    pub fn cached_message_ids(&self, channel_id: i64) -> Result<HashSet<i64>> {
        let db = self.db.lock();
        let mut stmt = db.prepare("SELECT message_id FROM processed_ids WHERE channel_id = ?1")?;
        let ids = stmt
            .query_map(params![channel_id], |row| row.get(0))?
            .collect::<Result<HashSet<i64>, _>>()?;
        Ok(ids)
    }

    pub fn cache_message_ids(&self, channel_id: i64, ids: &[i64]) -> Result<()> {
        let mut db = self.db.lock();
        let tx = db.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO processed_ids (channel_id, message_id) VALUES (?1, ?2)",
            )?;
            for id in ids {
                stmt.execute(params![channel_id, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn clear_cached_message_ids(&self, channel_id: i64) -> Result<usize> {
        let db = self.db.lock();
        let n = db.execute("DELETE FROM processed_ids WHERE channel_id = ?1", params![channel_id])?;
        Ok(n)
    }

    // ── Failed ids ──────────────────────────────────────────────────────

    /// Replace the failed set of a channel.
    pub fn save_failed_ids(&self, channel_id: i64, ids: &[i64]) -> Result<()> {
        let mut db = self.db.lock();
        let tx = db.transaction()?;
        tx.execute("DELETE FROM failed_ids WHERE channel_id = ?1", params![channel_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO failed_ids (channel_id, message_id) VALUES (?1, ?2)",
            )?;
            for id in ids {
                stmt.execute(params![channel_id, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Failed ids, newest first.
    pub fn get_failed_ids(&self, channel_id: i64) -> Result<Vec<i64>> {
        let db = self.db.lock();
        let mut stmt = db.prepare(
            "SELECT message_id FROM failed_ids WHERE channel_id = ?1 ORDER BY message_id DESC",
        )?;
        let ids = stmt
            .query_map(params![channel_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    pub fn clear_failed_ids(&self, channel_id: i64) -> Result<()> {
        let db = self.db.lock();
        db.execute("DELETE FROM failed_ids WHERE channel_id = ?1", params![channel_id])?;
        Ok(())
    }

    // ── Active scans ────────────────────────────────────────────────────

    pub fn start_scan(&self, scan: &ScanRecord) -> Result<()> {
        let db = self.db.lock();
        db.execute(
            "INSERT OR REPLACE INTO scans
                (scan_id, channel_id, user_id, total_messages, processed_messages, chat_title, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                scan.scan_id,
                scan.channel_id,
                scan.user_id,
                scan.total_messages as i64,
                scan.processed_messages as i64,
                scan.chat_title,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn update_scan_progress(&self, scan_id: &str, processed: usize) -> Result<()> {
        let db = self.db.lock();
        db.execute(
            "UPDATE scans SET processed_messages = ?2 WHERE scan_id = ?1",
            params![scan_id, processed as i64],
        )?;
        Ok(())
    }

    pub fn end_scan(&self, scan_id: &str) -> Result<()> {
        let db = self.db.lock();
        db.execute("DELETE FROM scans WHERE scan_id = ?1", params![scan_id])?;
        Ok(())
    }

    pub fn active_scans(&self) -> Result<Vec<ScanRecord>> {
        let db = self.db.lock();
        let mut stmt = db.prepare(
            "SELECT scan_id, channel_id, user_id, total_messages, processed_messages, chat_title
             FROM scans ORDER BY started_at ASC",
        )?;
        let scans = stmt
            .query_map([], |row| {
                Ok(ScanRecord {
                    scan_id: row.get(0)?,
                    channel_id: row.get(1)?,
                    user_id: row.get(2)?,
                    total_messages: row.get::<_, i64>(3)? as usize,
                    processed_messages: row.get::<_, i64>(4)? as usize,
                    chat_title: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(scans)
    }

    pub fn clear_all_scans(&self) -> Result<usize> {
        let db = self.db.lock();
        Ok(db.execute("DELETE FROM scans", [])?)
    }

    // ── Central status message ──────────────────────────────────────────

    /// `(chat_id, message_id)` of the live status message.
    pub fn get_status_message(&self) -> Result<Option<(i64, i64)>> {
        let db = self.db.lock();
        let loc = db
            .query_row("SELECT chat_id, message_id FROM status_message WHERE id = 1", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;
        Ok(loc)
    }

    pub fn set_status_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        let db = self.db.lock();
        db.execute(
            "INSERT OR REPLACE INTO status_message (id, chat_id, message_id) VALUES (1, ?1, ?2)",
            params![chat_id, message_id],
        )?;
        Ok(())
    }

    // ── Media entries ───────────────────────────────────────────────────

    /// Insert or replace the parsed entry for one message.
    pub fn add_media_entry(
        &self,
        channel_id: i64,
        message_id: i64,
        info: &ParsedInfo,
        file_size: u64,
    ) -> Result<()> {
        let (season, episodes, year) = match &info.class {
            MediaClass::Series { season, episodes } => {
                (Some(*season), Some(serde_json::to_string(episodes)?), None)
            }
            MediaClass::Movie { year } => (None, None, Some(*year)),
        };
        let db = self.db.lock();
        db.execute(
            "INSERT OR REPLACE INTO media_entries
                (channel_id, message_id, title, season, episodes, year,
                 quality, codec, encoder, file_size, base_name, is_split)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                channel_id,
                message_id,
                info.title,
                season,
                episodes,
                year,
                info.quality,
                info.codec,
                info.encoder,
                file_size as i64,
                info.base_name,
                info.is_split,
            ],
        )?;
        Ok(())
    }

    /// Aggregate every stored entry of `title`. `None` when nothing is stored.
    pub fn media_data(&self, title: &str) -> Result<Option<MediaData>> {
        let db = self.db.lock();
        let mut stmt = db.prepare(
            "SELECT season, episodes, year, quality, codec, encoder
             FROM media_entries WHERE title = ?1 ORDER BY message_id ASC",
        )?;
        let rows = stmt
            .query_map(params![title], |row| {
                Ok((
                    row.get::<_, Option<u32>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<u32>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut data = MediaData::default();
        for (season, episodes, year, quality, codec, encoder) in rows {
            match (season, year) {
                (Some(season), _) => {
                    let episodes: Vec<u32> = match episodes.as_deref() {
                        Some(raw) => serde_json::from_str(raw)
                            .with_context(|| format!("Corrupt episode list for '{title}'"))?,
                        None => Vec::new(),
                    };
                    let entry = data.seasons.entry(season).or_default();
                    let key = QualityKey { quality, codec, encoder };
                    entry.episodes.extend(episodes.iter().copied());
                    entry.qualities.entry(key).or_default().extend(episodes);
                }
                (None, Some(year)) => {
                    let movie = MovieEntry { year, title: title.to_string(), quality, codec, encoder };
                    if !data.movies.contains(&movie) {
                        data.movies.push(movie);
                    }
                }
                (None, None) => {}
            }
        }
        if data.is_empty() { Ok(None) } else { Ok(Some(data)) }
    }

    pub fn clear_media_entries(&self, channel_id: i64) -> Result<usize> {
        let db = self.db.lock();
        let n = db.execute("DELETE FROM media_entries WHERE channel_id = ?1", params![channel_id])?;
        Ok(n)
    }

    /// Distinct titles stored for a channel, sorted.
    pub fn titles(&self, channel_id: i64) -> Result<Vec<String>> {
        let db = self.db.lock();
        let mut stmt = db.prepare(
            "SELECT DISTINCT title FROM media_entries WHERE channel_id = ?1 ORDER BY title ASC",
        )?;
        let titles = stmt
            .query_map(params![channel_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(titles)
    }

    // ── Index posts ─────────────────────────────────────────────────────

    pub fn get_or_create_post(&self, title: &str, channel_id: i64) -> Result<IndexPost> {
        let db = self.db.lock();
        db.execute(
            "INSERT OR IGNORE INTO index_posts (title, channel_id) VALUES (?1, ?2)",
            params![title, channel_id],
        )?;
        let post = db.query_row(
            "SELECT id, title, channel_id, message_id FROM index_posts
             WHERE title = ?1 AND channel_id = ?2",
            params![title, channel_id],
            |row| {
                Ok(IndexPost {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    channel_id: row.get(2)?,
                    message_id: row.get(3)?,
                })
            },
        )?;
        Ok(post)
    }

    pub fn update_post_message_id(&self, post_id: i64, message_id: i64) -> Result<()> {
        let db = self.db.lock();
        db.execute(
            "UPDATE index_posts SET message_id = ?2 WHERE id = ?1",
            params![post_id, message_id],
        )?;
        Ok(())
    }

    // ── Settings ────────────────────────────────────────────────────────

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock();
        let value = db
            .query_row("SELECT value FROM settings WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let db = self.db.lock();
        db.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // ── TVMaze cache ────────────────────────────────────────────────────

    pub fn get_tvmaze_cache(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock();
        let data = db
            .query_row("SELECT data FROM tvmaze_cache WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(data)
    }

    pub fn set_tvmaze_cache(&self, key: &str, data: &str) -> Result<()> {
        let db = self.db.lock();
        db.execute(
            "INSERT OR REPLACE INTO tvmaze_cache (key, data, fetched_at) VALUES (?1, ?2, ?3)",
            params![key, data, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaindex_sdk::types::{Chat, MediaFile};

    fn post(channel: i64, id: i64, file_name: &str) -> Message {
        Message {
            message_id: id,
            date: 1_700_000_000 + id,
            chat: Chat {
                id: channel,
                kind: "channel".into(),
                title: Some("Shows".into()),
                username: None,
            },
            from: None,
            sender_chat: None,
            text: None,
            caption: None,
            video: Some(MediaFile {
                file_id: format!("f{id}"),
                file_name: Some(file_name.into()),
                ..Default::default()
            }),
            audio: None,
            document: None,
            animation: None,
            reply_to_message: None,
        }
    }

    fn series(title: &str, season: u32, episodes: &[u32], encoder: &str) -> ParsedInfo {
        ParsedInfo {
            title: title.into(),
            class: MediaClass::Series { season, episodes: episodes.to_vec() },
            quality: "1080P".into(),
            codec: "X265".into(),
            encoder: encoder.into(),
            is_split: false,
            base_name: format!("{title}.mkv"),
        }
    }

    #[test]
    fn history_is_newest_first_and_edits_replace() {
        let store = Store::open_memory().unwrap();
        store.record_message(&post(-100, 1, "a.mkv")).unwrap();
        store.record_message(&post(-100, 3, "c.mkv")).unwrap();
        store.record_message(&post(-100, 2, "b.mkv")).unwrap();
        store.record_message(&post(-100, 2, "b2.mkv")).unwrap();
        store.record_message(&post(-200, 9, "other.mkv")).unwrap();

        let history = store.channel_history(-100).unwrap();
        let ids: Vec<i64> = history.iter().map(|m| m.message_id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(history[1].video.as_ref().unwrap().file_name.as_deref(), Some("b2.mkv"));
        assert_eq!(store.message_count(-100).unwrap(), 3);
        assert_eq!(store.channel_title(-100).unwrap().as_deref(), Some("Shows"));
        assert_eq!(store.channel_title(-300).unwrap(), None);
    }

    #[test]
    fn processed_cache_roundtrip() {
        let store = Store::open_memory().unwrap();
        store.cache_message_ids(-100, &[1, 2, 2, 3]).unwrap();
        assert_eq!(store.cached_message_ids(-100).unwrap().len(), 3);
        assert!(store.cached_message_ids(-200).unwrap().is_empty());
        assert_eq!(store.clear_cached_message_ids(-100).unwrap(), 3);
        assert!(store.cached_message_ids(-100).unwrap().is_empty());
    }

    #[test]
    fn failed_ids_are_replaced_not_merged() {
        let store = Store::open_memory().unwrap();
        store.save_failed_ids(-100, &[5, 7]).unwrap();
        store.save_failed_ids(-100, &[9]).unwrap();
        assert_eq!(store.get_failed_ids(-100).unwrap(), vec![9]);
        store.clear_failed_ids(-100).unwrap();
        assert!(store.get_failed_ids(-100).unwrap().is_empty());
    }

    #[test]
    fn scans_track_progress_until_ended() {
        let store = Store::open_memory().unwrap();
        let scan = ScanRecord {
            scan_id: "scan--100-1".into(),
            channel_id: -100,
            user_id: 7,
            total_messages: 40,
            processed_messages: 0,
            chat_title: "Shows".into(),
        };
        store.start_scan(&scan).unwrap();
        store.update_scan_progress(&scan.scan_id, 25).unwrap();
        let active = store.active_scans().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].processed_messages, 25);
        store.end_scan(&scan.scan_id).unwrap();
        assert!(store.active_scans().unwrap().is_empty());

        store.start_scan(&scan).unwrap();
        assert_eq!(store.clear_all_scans().unwrap(), 1);
    }

    #[test]
    fn status_message_location_is_a_singleton() {
        let store = Store::open_memory().unwrap();
        assert_eq!(store.get_status_message().unwrap(), None);
        store.set_status_message(1, 10).unwrap();
        store.set_status_message(2, 20).unwrap();
        assert_eq!(store.get_status_message().unwrap(), Some((2, 20)));
    }

    #[test]
    fn media_data_groups_by_season_and_quality() {
        let store = Store::open_memory().unwrap();
        store.add_media_entry(-100, 1, &series("Show", 1, &[1], "GHOST"), 10).unwrap();
        store.add_media_entry(-100, 2, &series("Show", 1, &[2, 3], "GHOST"), 10).unwrap();
        store.add_media_entry(-100, 3, &series("Show", 1, &[2], "PAHE"), 10).unwrap();
        store.add_media_entry(-100, 4, &series("Show", 2, &[1], "GHOST"), 10).unwrap();
        // Re-adding the same message replaces it.
        store.add_media_entry(-100, 1, &series("Show", 1, &[1], "GHOST"), 10).unwrap();

        let data = store.media_data("Show").unwrap().unwrap();
        assert!(data.is_series());
        let s1 = &data.seasons[&1];
        assert_eq!(s1.episodes.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(s1.qualities.len(), 2);
        let ghost = QualityKey { quality: "1080P".into(), codec: "X265".into(), encoder: "GHOST".into() };
        assert_eq!(ghost.to_string(), "1080P X265 (GHOST)");
        assert_eq!(s1.qualities[&ghost].len(), 3);
        assert_eq!(data.seasons[&2].episodes.len(), 1);
        assert_eq!(store.media_data("Missing").unwrap(), None);

        assert_eq!(store.titles(-100).unwrap(), vec!["Show".to_string()]);
        assert_eq!(store.clear_media_entries(-100).unwrap(), 4);
        assert_eq!(store.media_data("Show").unwrap(), None);
    }

    #[test]
    fn movies_are_deduplicated() {
        let store = Store::open_memory().unwrap();
        let movie = ParsedInfo {
            title: "Dune".into(),
            class: MediaClass::Movie { year: 2021 },
            quality: "4K".into(),
            codec: "X265".into(),
            encoder: UNKNOWN.into(),
            is_split: false,
            base_name: "Dune.2021.mkv".into(),
        };
        store.add_media_entry(-100, 1, &movie, 1).unwrap();
        store.add_media_entry(-200, 5, &movie, 1).unwrap();
        let data = store.media_data("Dune").unwrap().unwrap();
        assert!(!data.is_series());
        assert_eq!(data.movies.len(), 1);
        assert_eq!(data.movies[0].year, 2021);
    }

    #[test]
    fn index_posts_are_created_once() {
        let store = Store::open_memory().unwrap();
        let first = store.get_or_create_post("Show", -100).unwrap();
        assert_eq!(first.message_id, None);
        store.update_post_message_id(first.id, 55).unwrap();
        let again = store.get_or_create_post("Show", -100).unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.message_id, Some(55));
        assert_ne!(store.get_or_create_post("Show", -200).unwrap().id, first.id);
    }

    #[test]
    fn settings_and_tvmaze_cache() {
        let store = Store::open_memory().unwrap();
        assert_eq!(store.get_setting("index_channel_id").unwrap(), None);
        store.set_setting("index_channel_id", "-1001").unwrap();
        store.set_setting("index_channel_id", "-1002").unwrap();
        assert_eq!(store.get_setting("index_channel_id").unwrap().as_deref(), Some("-1002"));

        store.set_tvmaze_cache("show:dune", "{\"id\":1}").unwrap();
        assert_eq!(store.get_tvmaze_cache("show:dune").unwrap().as_deref(), Some("{\"id\":1}"));
        assert_eq!(store.get_tvmaze_cache("show:x").unwrap(), None);
    }

    #[test]
    fn file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.db");
        {
            let store = Store::open(&path).unwrap();
            store.set_setting("k", "v").unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.get_setting("k").unwrap().as_deref(), Some("v"));
    }
}
