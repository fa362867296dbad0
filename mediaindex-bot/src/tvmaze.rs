//! TVMaze lookups for expected episode counts, cached in the store.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub season: u32,
    /// `None` for specials.
    pub number: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Embedded {
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Show {
    pub id: u64,
    pub name: String,
    #[serde(default, rename = "_embedded")]
    pub embedded: Option<Embedded>,
}

pub struct TvMaze {
    http: reqwest::Client,
    base_url: String,
    store: Arc<Store>,
}

fn show_key(title: &str) -> String {
    format!("show:{}", title.trim().to_lowercase())
}

fn episodes_key(maze_id: u64) -> String {
    format!("episodes:{maze_id}")
}

impl TvMaze {
    pub fn new(base_url: &str, store: Arc<Store>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
        }
    }

    /// Look a show up by title. Not found is `Ok(None)`.
    pub async fn search_show(&self, title: &str) -> Result<Option<Show>> {
        let key = show_key(title);
        if let Some(cached) = self.store.get_tvmaze_cache(&key)? {
            tracing::debug!(title, "TVMaze show cache hit");
            return Ok(Some(serde_json::from_str(&cached).context("Corrupt TVMaze cache entry")?));
        }

        let resp = self
            .http
            .get(format!("{}/singlesearch/shows", self.base_url))
            .query(&[("q", title), ("embed", "episodes")])
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::info!(title, "Show not found on TVMaze");
            return Ok(None);
        }
        let show: Show = resp.error_for_status()?.json().await?;

        self.store.set_tvmaze_cache(&key, &serde_json::to_string(&show)?)?;
        if let Some(embedded) = &show.embedded {
            self.store
                .set_tvmaze_cache(&episodes_key(show.id), &serde_json::to_string(&embedded.episodes)?)?;
        }
        Ok(Some(show))
    }

    pub async fn episodes(&self, maze_id: u64) -> Result<Vec<Episode>> {
        let key = episodes_key(maze_id);
        if let Some(cached) = self.store.get_tvmaze_cache(&key)? {
            return Ok(serde_json::from_str(&cached).context("Corrupt TVMaze cache entry")?);
        }

        let episodes: Vec<Episode> = self
            .http
            .get(format!("{}/shows/{maze_id}/episodes", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        self.store.set_tvmaze_cache(&key, &serde_json::to_string(&episodes)?)?;
        Ok(episodes)
    }

    /// Regular (non-special) episode count per season. `None` when the show
    /// is unknown or TVMaze cannot be reached.
    pub async fn season_episode_counts(&self, title: &str) -> Option<BTreeMap<u32, usize>> {
        let show = match self.search_show(title).await {
            Ok(Some(show)) => show,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(title, error = %e, "TVMaze lookup failed");
                return None;
            }
        };

        let episodes = match show.embedded {
            Some(embedded) if !embedded.episodes.is_empty() => embedded.episodes,
            _ => match self.episodes(show.id).await {
                Ok(eps) => eps,
                Err(e) => {
                    tracing::warn!(title, maze_id = show.id, error = %e, "TVMaze episode fetch failed");
                    return None;
                }
            },
        };
        let counts = count_by_season(&episodes);
        if counts.is_empty() { None } else { Some(counts) }
    }
}

pub fn count_by_season(episodes: &[Episode]) -> BTreeMap<u32, usize> {
    let mut counts = BTreeMap::new();
    for ep in episodes.iter().filter(|e| e.number.is_some()) {
        *counts.entry(ep.season).or_insert(0) += 1;
    }
    counts
}
