//! In-memory artist catalogue.
//!
//! Stands in for the relational store a real deployment would use. The
//! handlers in `handlers` own all reads and writes; nothing else in the
//! runtime touches it.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub bio: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields an update may change. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtistChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genres: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

#[derive(Debug, Default)]
pub struct ArtistStore {
    artists: RwLock<BTreeMap<String, Artist>>,
}

impl ArtistStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-loaded with [`seed_artists`].
    pub fn seeded() -> Self {
        let store = Self::new();
        for artist in seed_artists() {
            store.insert(artist);
        }
        store
    }

    pub fn insert(&self, artist: Artist) {
        self.artists
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(artist.id.clone(), artist);
    }

    pub fn create(&self, name: String, genres: Vec<String>, bio: String) -> Artist {
        let now = Utc::now();
        let artist = Artist {
            id: format!("artist-{}", uuid::Uuid::new_v4().simple()),
            name,
            genres,
            bio,
            created_at: now,
            updated_at: now,
        };
        self.insert(artist.clone());
        artist
    }

    /// Apply `changes` and return `(before, after)`, or `None` for an
    /// unknown ID.
    pub fn update(&self, id: &str, changes: ArtistChanges) -> Option<(Artist, Artist)> {
        let mut artists = self.artists.write().unwrap_or_else(PoisonError::into_inner);
        let artist = artists.get_mut(id)?;
        let before = artist.clone();

        if let Some(name) = changes.name {
            artist.name = name;
        }
        if let Some(genres) = changes.genres {
            artist.genres = genres;
        }
        if let Some(bio) = changes.bio {
            artist.bio = bio;
        }
        artist.updated_at = Utc::now();

        Some((before, artist.clone()))
    }

    pub fn remove(&self, id: &str) -> Option<Artist> {
        self.artists
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Artist> {
        self.artists
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Artists ordered by name, optionally restricted to one genre
    /// (case-insensitive).
    pub fn list(&self, genre: Option<&str>) -> Vec<Artist> {
        let mut artists: Vec<Artist> = self
            .artists
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|a| match genre {
                Some(g) => a.genres.iter().any(|x| x.eq_ignore_ascii_case(g)),
                None => true,
            })
            .cloned()
            .collect();
        artists.sort_by(|a, b| a.name.cmp(&b.name));
        artists
    }

    pub fn len(&self) -> usize {
        self.artists.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The artist as the audit trail's data-change tracker sees it.
pub fn audit_view(artist: &Artist) -> Value {
    serde_json::json!({
        "name": artist.name,
        "genres": artist.genres,
        "bio": artist.bio,
    })
}

// ── Seed data ─────────────────────────────────────────────────────────────────

/// Three fictional artists used by the demo scenarios.
pub fn seed_artists() -> Vec<Artist> {
    let now = Utc::now();
    let artist = |id: &str, name: &str, genres: &[&str], bio: &str| Artist {
        id: id.to_string(),
        name: name.to_string(),
        genres: genres.iter().map(|g| g.to_string()).collect(),
        bio: bio.to_string(),
        created_at: now,
        updated_at: now,
    };

    vec![
        artist(
            "artist-seed-1",
            "Ada Lumen",
            &["ambient", "electronic"],
            "Long-form synthesiser pieces recorded in disused water towers.",
        ),
        artist(
            "artist-seed-2",
            "The Quiet Harbour",
            &["folk"],
            "A four-piece playing songs about ferries and weather.",
        ),
        artist(
            "artist-seed-3",
            "Marek Vossberg",
            &["jazz", "electronic"],
            "Trumpet over drum machines.",
        ),
    ]
}
