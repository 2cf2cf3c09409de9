//! Boundaries to the rest of the backend.
//!
//! The relational schema, the media catalog, and the download engine are
//! external collaborators; the pipeline consumes them through these traits.
//! [`MemorySourceRepository`] backs tests and embedders running without a
//! database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use uuid::Uuid;

use cineflux_model::{MovieRef, PersistedSource, SourceMetadata, SwarmStats};

use crate::error::{Result, SourceError};

/// Persistence boundary for discovered sources.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SourceRepository: Send + Sync {
    async fn find_sources_for_movie(&self, movie_id: Uuid) -> Result<Vec<PersistedSource>>;

    /// Stores newly discovered sources, deduplicating by hash: an existing
    /// row keeps its identity and schedule, only its popularity counters are
    /// refreshed. Returns the full set of rows for the movie afterwards.
    async fn upsert_sources(
        &self,
        movie_id: Uuid,
        directory: &str,
        sources: &[SourceMetadata],
    ) -> Result<Vec<PersistedSource>>;

    /// Sources whose stats are due for a refresh (never checked, or past
    /// their scheduled time), oldest due first.
    async fn find_sources_needing_stats_check(&self, limit: usize)
        -> Result<Vec<PersistedSource>>;

    async fn update_stats_check_schedule(
        &self,
        source_id: Uuid,
        next_check_at: DateTime<Utc>,
        interval_ms: u64,
    ) -> Result<()>;

    async fn update_popularity(
        &self,
        source_id: Uuid,
        broadcasters: u32,
        watchers: u32,
    ) -> Result<()>;
}

/// Read/annotate access to the movie catalog.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MediaLookup: Send + Sync {
    async fn movie_ref(&self, movie_id: Uuid) -> Result<Option<MovieRef>>;

    /// Next movie no directory has been searched for yet, if any.
    async fn find_movie_pending_search(&self) -> Result<Option<MovieRef>>;

    /// Records that `directory` has been searched for this movie.
    async fn mark_searched(&self, movie_id: Uuid, directory: &str) -> Result<()>;

    async fn set_trailer(&self, movie_id: Uuid, trailer_code: &str) -> Result<()>;
}

/// Swarm stat probe of the download engine. A black box here.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SwarmStatsProvider: Send + Sync {
    async fn fetch_stats(&self, hash: &str) -> Result<SwarmStats>;
}

/// In-memory [`SourceRepository`].
#[derive(Debug, Default)]
pub struct MemorySourceRepository {
    rows: Mutex<HashMap<Uuid, Vec<PersistedSource>>>,
}

impl MemorySourceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Vec<PersistedSource>>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_source<T>(
        &self,
        source_id: Uuid,
        f: impl FnOnce(&mut PersistedSource) -> T,
    ) -> Result<T> {
        let mut rows = self.lock();
        rows.values_mut()
            .flat_map(|sources| sources.iter_mut())
            .find(|source| source.id == source_id)
            .map(f)
            .ok_or_else(|| SourceError::Repository(format!("unknown source {source_id}")))
    }
}

#[async_trait]
impl SourceRepository for MemorySourceRepository {
    async fn find_sources_for_movie(&self, movie_id: Uuid) -> Result<Vec<PersistedSource>> {
        Ok(self.lock().get(&movie_id).cloned().unwrap_or_default())
    }

    async fn upsert_sources(
        &self,
        movie_id: Uuid,
        directory: &str,
        sources: &[SourceMetadata],
    ) -> Result<Vec<PersistedSource>> {
        let mut rows = self.lock();
        let existing = rows.entry(movie_id).or_default();
        for metadata in sources {
            if let Some(row) = existing.iter_mut().find(|r| r.hash == metadata.hash) {
                row.broadcasters = metadata.broadcasters;
                row.watchers = metadata.watchers;
                row.score = metadata.score;
            } else {
                existing.push(PersistedSource::from_metadata(
                    movie_id,
                    directory,
                    metadata.clone(),
                ));
            }
        }
        Ok(existing.clone())
    }

    async fn find_sources_needing_stats_check(
        &self,
        limit: usize,
    ) -> Result<Vec<PersistedSource>> {
        let now = Utc::now();
        let mut due: Vec<PersistedSource> = self
            .lock()
            .values()
            .flatten()
            .filter(|source| {
                !source.rejected
                    && source
                        .next_stats_check_at
                        .map(|at| at <= now)
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        due.sort_by_key(|source| source.next_stats_check_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn update_stats_check_schedule(
        &self,
        source_id: Uuid,
        next_check_at: DateTime<Utc>,
        interval_ms: u64,
    ) -> Result<()> {
        self.with_source(source_id, |source| {
            source.next_stats_check_at = Some(next_check_at);
            source.last_stats_check_interval_ms = Some(interval_ms);
        })
    }

    async fn update_popularity(
        &self,
        source_id: Uuid,
        broadcasters: u32,
        watchers: u32,
    ) -> Result<()> {
        self.with_source(source_id, |source| {
            source.broadcasters = broadcasters;
            source.watchers = watchers;
        })
    }
}
