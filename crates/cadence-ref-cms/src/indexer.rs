//! Search indexing agents.
//!
//! Artist writes schedule an `index-artist` task on the pool instead of
//! indexing inline, so a slow index never holds up the command bus.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use cadence_agents::Agent;
use cadence_contracts::{
    error::{CadenceError, CadenceResult},
    task::AgentTask,
};

use crate::catalogue::Artist;

pub const INDEX_ARTIST: &str = "index-artist";
pub const PUBLISH_INDEX: &str = "publish-index";

/// Lower-cased word → IDs of artists whose name, genres or bio contain it.
#[derive(Debug, Default)]
pub struct SearchIndex {
    terms: RwLock<BTreeMap<String, BTreeSet<String>>>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self, artist_id: &str, text: &str) -> usize {
        let mut terms = self.terms.write().unwrap_or_else(PoisonError::into_inner);
        let mut added = 0;
        for word in tokens(text) {
            if terms.entry(word).or_default().insert(artist_id.to_string()) {
                added += 1;
            }
        }
        added
    }

    pub fn remove(&self, artist_id: &str) {
        let mut terms = self.terms.write().unwrap_or_else(PoisonError::into_inner);
        terms.retain(|_, ids| {
            ids.remove(artist_id);
            !ids.is_empty()
        });
    }

    /// IDs matching every word of `query`.
    pub fn search(&self, query: &str) -> Vec<String> {
        let terms = self.terms.read().unwrap_or_else(PoisonError::into_inner);
        let mut matches: Option<BTreeSet<String>> = None;
        for word in tokens(query) {
            let ids = terms.get(&word).cloned().unwrap_or_default();
            matches = Some(match matches {
                Some(acc) => acc.intersection(&ids).cloned().collect(),
                None => ids,
            });
        }
        matches.map(|ids| ids.into_iter().collect()).unwrap_or_default()
    }

    pub fn term_count(&self) -> usize {
        self.terms.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1)
        .map(str::to_lowercase)
}

/// Indexes one artist. Input is the serialized `Artist`.
pub struct IndexArtistAgent {
    index: Arc<SearchIndex>,
    latency: Duration,
}

impl IndexArtistAgent {
    pub fn new(index: Arc<SearchIndex>) -> Self {
        Self {
            index,
            latency: Duration::from_millis(5),
        }
    }

    /// Simulated time spent per task.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl Agent for IndexArtistAgent {
    fn task_type(&self) -> &str {
        INDEX_ARTIST
    }

    async fn execute(&self, task: &AgentTask, cancel: CancellationToken) -> CadenceResult<Value> {
        let artist: Artist = serde_json::from_value(task.input.clone())?;

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(CadenceError::Cancelled { task_id: task.id.to_string() });
            }
            _ = tokio::time::sleep(self.latency) => {}
        }

        // Re-indexing replaces whatever an earlier version contributed.
        self.index.remove(&artist.id);
        let text = format!("{} {} {}", artist.name, artist.genres.join(" "), artist.bio);
        let terms = self.index.index(&artist.id, &text);
        debug!(artist_id = %artist.id, terms, "artist indexed");

        Ok(json!({ "artistId": artist.id, "terms": terms }))
    }
}

/// Reports the index size once the tasks it depends on have finished.
pub struct PublishIndexAgent {
    index: Arc<SearchIndex>,
}

impl PublishIndexAgent {
    pub fn new(index: Arc<SearchIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Agent for PublishIndexAgent {
    fn task_type(&self) -> &str {
        PUBLISH_INDEX
    }

    async fn execute(&self, task: &AgentTask, _cancel: CancellationToken) -> CadenceResult<Value> {
        Ok(json!({
            "terms": self.index.term_count(),
            "dependencies": task.dependencies.len(),
        }))
    }
}
