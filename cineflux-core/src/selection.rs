//! Embedder-facing entry points: picking a source to stream and the
//! background acquisition sweep.

use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cineflux_model::{MovieRef, PersistedSource, Quality};

use crate::config::SearchConfig;
use crate::directories::ContentDirectoryService;
use crate::error::Result;
use crate::ports::{MediaLookup, SourceRepository};
use crate::scoring::{compare_sources, partition_streamable, rank_sources};

/// Requested quality for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityPreference {
    /// Take the best-ranked source.
    Auto,
    /// Prefer an exact quality match, falling back to the best-ranked one.
    Exact(Quality),
}

/// Runs the directory search for a movie and persists whatever it finds.
///
/// Directories that were queried and came back empty are recorded as
/// searched so later attempts skip them; a hard search error records
/// nothing, leaving the movie eligible for a retry.
async fn search_and_persist(
    repository: Arc<dyn SourceRepository>,
    media: Arc<dyn MediaLookup>,
    directories: Arc<ContentDirectoryService>,
    movie: MovieRef,
    high_priority: bool,
) -> Result<Vec<PersistedSource>> {
    let Some(imdb_id) = movie.imdb_id.as_deref() else {
        warn!(movie_id = %movie.id, title = %movie.title, "movie has no IMDb id, skipping search");
        return Ok(Vec::new());
    };

    info!(movie_id = %movie.id, imdb_id, title = %movie.title, "searching sources");
    let outcome = directories
        .search_sources_for_movie(imdb_id, high_priority, &movie.content_directories_searched)
        .await?;

    let names = directories.directory_names();
    let queried =
        names.iter().filter(|name| !movie.has_searched(name));

    match outcome {
        Some(result) => {
            let ranked = rank_sources(result.sources);
            info!(
                movie_id = %movie.id,
                directory = %result.directory,
                count = ranked.len(),
                "persisting sources"
            );
            let persisted = repository
                .upsert_sources(movie.id, &result.directory, &ranked)
                .await?;

            if !result.trailer_code.is_empty() {
                media.set_trailer(movie.id, &result.trailer_code).await?;
            }
            // The winner and every directory tried before it are done.
            for name in queried {
                media.mark_searched(movie.id, name).await?;
                if **name == result.directory {
                    break;
                }
            }
            Ok(persisted)
        }
        None => {
            debug!(movie_id = %movie.id, "no directory had sources");
            for name in queried {
                media.mark_searched(movie.id, name).await?;
            }
            Ok(Vec::new())
        }
    }
}

/// Picks the best persisted source for streaming, searching on demand when
/// the movie has none yet.
pub struct StreamSelection {
    repository: Arc<dyn SourceRepository>,
    media: Arc<dyn MediaLookup>,
    directories: Arc<ContentDirectoryService>,
    config: SearchConfig,
}

impl std::fmt::Debug for StreamSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSelection")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StreamSelection {
    pub fn new(
        repository: Arc<dyn SourceRepository>,
        media: Arc<dyn MediaLookup>,
        directories: Arc<ContentDirectoryService>,
        config: SearchConfig,
    ) -> Self {
        Self {
            repository,
            media,
            directories,
            config,
        }
    }

    /// Returns the best source for the movie, or `None` when nothing is
    /// available yet.
    ///
    /// When the movie has no persisted sources, an on-demand search runs for
    /// at most the configured budget. On budget expiry the caller gets the
    /// empty answer immediately while the search keeps running in the
    /// background and persists its findings for the next request. Search
    /// failures degrade to "no sources", never to an error.
    pub async fn best_source_for_streaming(
        &self,
        movie_id: Uuid,
        quality: QualityPreference,
        allow_hevc: bool,
    ) -> Result<Option<PersistedSource>> {
        let Some(movie) = self.media.movie_ref(movie_id).await? else {
            warn!(%movie_id, "movie not found");
            return Ok(None);
        };

        let mut sources = self.repository.find_sources_for_movie(movie_id).await?;

        if sources.is_empty() && movie.imdb_id.is_some() {
            sources = self.search_within_budget(movie).await;
        }
        if sources.is_empty() {
            return Ok(None);
        }

        let (mut streamable, excluded) = partition_streamable(&sources, allow_hevc);
        if streamable.is_empty() {
            if !excluded.is_empty() {
                warn!(
                    %movie_id,
                    excluded = excluded.len(),
                    "only HEVC sources available and the player cannot decode them"
                );
            }
            return Ok(None);
        }
        streamable.sort_by(compare_sources);

        let best = match quality {
            QualityPreference::Auto => streamable.into_iter().next(),
            QualityPreference::Exact(wanted) => {
                let exact = streamable.iter().position(|s| s.quality == Some(wanted));
                match exact {
                    Some(idx) => streamable.into_iter().nth(idx),
                    None => {
                        debug!(%movie_id, ?wanted, "exact quality not available, using best ranked");
                        streamable.into_iter().next()
                    }
                }
            }
        };
        Ok(best)
    }

    /// Spawns the search and waits for it up to the budget. The task is
    /// detached, not cancelled, when the budget expires.
    async fn search_within_budget(&self, movie: MovieRef) -> Vec<PersistedSource> {
        let movie_id = movie.id;
        let task = tokio::spawn(search_and_persist(
            Arc::clone(&self.repository),
            Arc::clone(&self.media),
            Arc::clone(&self.directories),
            movie,
            true,
        ));

        match timeout(self.config.on_demand_budget, task).await {
            Ok(Ok(Ok(persisted))) => persisted,
            Ok(Ok(Err(err))) => {
                warn!(%movie_id, error = %err, "on-demand search failed");
                Vec::new()
            }
            Ok(Err(join_err)) => {
                warn!(%movie_id, error = %join_err, "on-demand search task failed");
                Vec::new()
            }
            Err(_) => {
                info!(%movie_id, "on-demand search exceeded its budget, continuing in background");
                Vec::new()
            }
        }
    }
}

/// Background acquisition sweep: one pending movie per call, meant to be
/// driven by a periodic job.
pub struct SourceAcquisition {
    repository: Arc<dyn SourceRepository>,
    media: Arc<dyn MediaLookup>,
    directories: Arc<ContentDirectoryService>,
}

impl std::fmt::Debug for SourceAcquisition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceAcquisition").finish_non_exhaustive()
    }
}

impl SourceAcquisition {
    pub fn new(
        repository: Arc<dyn SourceRepository>,
        media: Arc<dyn MediaLookup>,
        directories: Arc<ContentDirectoryService>,
    ) -> Self {
        Self {
            repository,
            media,
            directories,
        }
    }

    /// Searches sources for the next movie nothing has been searched for.
    /// Returns the movie id when one was processed, `None` when the backlog
    /// is empty.
    pub async fn search_sources_for_pending_movie(&self) -> Result<Option<Uuid>> {
        let Some(movie) = self.media.find_movie_pending_search().await? else {
            return Ok(None);
        };
        let movie_id = movie.id;

        let persisted = search_and_persist(
            Arc::clone(&self.repository),
            Arc::clone(&self.media),
            Arc::clone(&self.directories),
            movie,
            false,
        )
        .await?;

        if persisted.is_empty() {
            info!(%movie_id, "no sources found");
        }
        Ok(Some(movie_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use mockall::predicate::eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use cineflux_model::{
        quality_to_resolution, DirectoryStatus, SourceMetadata, VideoCodec,
    };

    use crate::directories::{ContentDirectory, DirectoryMovie};
    use crate::error::SourceError;
    use crate::ports::{MemorySourceRepository, MockMediaLookup};

    fn movie_ref(imdb: Option<&str>) -> MovieRef {
        MovieRef {
            id: Uuid::new_v4(),
            imdb_id: imdb.map(str::to_owned),
            title: "Example Movie".into(),
            content_directories_searched: Vec::new(),
        }
    }

    fn sample_source(hash: &str, quality: Quality, codec: VideoCodec) -> SourceMetadata {
        SourceMetadata {
            hash: hash.into(),
            magnet_link: format!("magnet:?xt=urn:btih:{hash}"),
            url: None,
            quality: Some(quality),
            video_codec: Some(codec),
            audio_codec: None,
            source: None,
            resolution: quality_to_resolution(Some(quality)),
            size: 1024,
            broadcasters: 10,
            watchers: 2,
            bitrate_kbps: 0,
            language: vec![],
            upload_date: Utc::now(),
            score: 0.0,
        }
    }

    struct ScriptedDirectory {
        name: &'static str,
        sources: Vec<SourceMetadata>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedDirectory {
        fn new(name: &'static str, sources: Vec<SourceMetadata>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name,
                sources,
                delay,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ContentDirectory for ScriptedDirectory {
        fn name(&self) -> &'static str {
            self.name
        }
        fn status(&self) -> DirectoryStatus {
            DirectoryStatus {
                name: self.name.to_owned(),
                queue: 0,
                successes: 0,
                failures: 0,
                last_request: None,
            }
        }
        async fn get_movie(&self, _: &str, _: bool) -> Result<DirectoryMovie> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(DirectoryMovie {
                sources: self.sources.clone(),
                trailer_code: String::new(),
            })
        }
    }

    fn selection(
        repo: Arc<MemorySourceRepository>,
        media: MockMediaLookup,
        directory: Arc<ScriptedDirectory>,
    ) -> StreamSelection {
        StreamSelection::new(
            repo,
            Arc::new(media),
            Arc::new(ContentDirectoryService::new(vec![
                directory as Arc<dyn ContentDirectory>,
            ])),
            SearchConfig::default(),
        )
    }

    #[tokio::test]
    async fn picks_best_ranked_source_on_auto() {
        let repo = Arc::new(MemorySourceRepository::new());
        let movie = movie_ref(Some("tt0000001"));
        let movie_id = movie.id;
        repo.upsert_sources(
            movie_id,
            "YTS",
            &[
                sample_source("low", Quality::Hd, VideoCodec::X264),
                sample_source("high", Quality::FourK, VideoCodec::X265),
            ],
        )
        .await
        .unwrap();

        let mut media = MockMediaLookup::new();
        media
            .expect_movie_ref()
            .with(eq(movie_id))
            .returning(move |_| Ok(Some(movie.clone())));

        let selection = selection(
            repo,
            media,
            ScriptedDirectory::new("YTS", vec![], Duration::ZERO),
        );
        let best = selection
            .best_source_for_streaming(movie_id, QualityPreference::Auto, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(best.hash, "high");
    }

    #[tokio::test]
    async fn exact_quality_wins_over_rank() {
        let repo = Arc::new(MemorySourceRepository::new());
        let movie = movie_ref(Some("tt0000001"));
        let movie_id = movie.id;
        repo.upsert_sources(
            movie_id,
            "YTS",
            &[
                sample_source("fourk", Quality::FourK, VideoCodec::X265),
                sample_source("hd", Quality::Hd, VideoCodec::X264),
            ],
        )
        .await
        .unwrap();

        let mut media = MockMediaLookup::new();
        media
            .expect_movie_ref()
            .returning(move |_| Ok(Some(movie.clone())));

        let selection = selection(
            repo,
            media,
            ScriptedDirectory::new("YTS", vec![], Duration::ZERO),
        );

        let exact = selection
            .best_source_for_streaming(movie_id, QualityPreference::Exact(Quality::Hd), true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exact.hash, "hd");

        // Unavailable exact quality falls back to the best ranked source.
        let fallback = selection
            .best_source_for_streaming(movie_id, QualityPreference::Exact(Quality::EightK), true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fallback.hash, "fourk");
    }

    #[tokio::test]
    async fn hevc_only_catalog_yields_none_when_disallowed() {
        let repo = Arc::new(MemorySourceRepository::new());
        let movie = movie_ref(Some("tt0000001"));
        let movie_id = movie.id;
        repo.upsert_sources(
            movie_id,
            "YTS",
            &[sample_source("hevc", Quality::FourK, VideoCodec::X265)],
        )
        .await
        .unwrap();

        let mut media = MockMediaLookup::new();
        media
            .expect_movie_ref()
            .returning(move |_| Ok(Some(movie.clone())));

        let selection = selection(
            repo,
            media,
            ScriptedDirectory::new("YTS", vec![], Duration::ZERO),
        );
        let best = selection
            .best_source_for_streaming(movie_id, QualityPreference::Auto, false)
            .await
            .unwrap();
        assert!(best.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn on_demand_search_persists_within_budget() {
        let repo = Arc::new(MemorySourceRepository::new());
        let movie = movie_ref(Some("tt0000001"));
        let movie_id = movie.id;

        let mut media = MockMediaLookup::new();
        media
            .expect_movie_ref()
            .returning(move |_| Ok(Some(movie.clone())));
        media
            .expect_mark_searched()
            .with(eq(movie_id), eq("YTS"))
            .times(1)
            .returning(|_, _| Ok(()));

        let directory = ScriptedDirectory::new(
            "YTS",
            vec![sample_source("found", Quality::Fhd, VideoCodec::X264)],
            Duration::from_millis(100),
        );
        let selection = selection(Arc::clone(&repo), media, directory);

        let best = selection
            .best_source_for_streaming(movie_id, QualityPreference::Auto, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(best.hash, "found");
        assert_eq!(repo.find_sources_for_movie(movie_id).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_expiry_returns_empty_and_persists_in_background() {
        let repo = Arc::new(MemorySourceRepository::new());
        let movie = movie_ref(Some("tt0000001"));
        let movie_id = movie.id;

        let mut media = MockMediaLookup::new();
        media
            .expect_movie_ref()
            .returning(move |_| Ok(Some(movie.clone())));
        media.expect_mark_searched().returning(|_, _| Ok(()));

        // Slower than the 3s budget.
        let directory = ScriptedDirectory::new(
            "YTS",
            vec![sample_source("late", Quality::Fhd, VideoCodec::X264)],
            Duration::from_secs(10),
        );
        let selection = selection(Arc::clone(&repo), media, directory);

        let best = selection
            .best_source_for_streaming(movie_id, QualityPreference::Auto, true)
            .await
            .unwrap();
        assert!(best.is_none());

        // The detached search finishes later and persists for next time.
        tokio::time::sleep(Duration::from_secs(15)).await;
        let persisted = repo.find_sources_for_movie(movie_id).await.unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].hash, "late");
    }

    #[tokio::test]
    async fn search_failure_degrades_to_no_sources() {
        struct FailingDirectory;

        #[async_trait]
        impl ContentDirectory for FailingDirectory {
            fn name(&self) -> &'static str {
                "BROKEN"
            }
            fn status(&self) -> DirectoryStatus {
                DirectoryStatus {
                    name: "BROKEN".into(),
                    queue: 0,
                    successes: 0,
                    failures: 0,
                    last_request: None,
                }
            }
            async fn get_movie(&self, _: &str, _: bool) -> Result<DirectoryMovie> {
                Err(SourceError::Api {
                    directory: "BROKEN",
                    status: 503,
                    message: "down".into(),
                })
            }
        }

        let repo = Arc::new(MemorySourceRepository::new());
        let movie = movie_ref(Some("tt0000001"));
        let movie_id = movie.id;

        let mut media = MockMediaLookup::new();
        media
            .expect_movie_ref()
            .returning(move |_| Ok(Some(movie.clone())));
        // A failed search must not mark anything searched.
        media.expect_mark_searched().times(0);

        let selection = StreamSelection::new(
            repo,
            Arc::new(media),
            Arc::new(ContentDirectoryService::new(vec![Arc::new(
                FailingDirectory,
            )])),
            SearchConfig::default(),
        );

        let best = selection
            .best_source_for_streaming(movie_id, QualityPreference::Auto, true)
            .await
            .unwrap();
        assert!(best.is_none());
    }

    #[tokio::test]
    async fn acquisition_marks_all_queried_when_everything_is_empty() {
        let repo = Arc::new(MemorySourceRepository::new());
        let movie = movie_ref(Some("tt0000001"));
        let movie_id = movie.id;

        let mut media = MockMediaLookup::new();
        media
            .expect_find_movie_pending_search()
            .return_once(move || Ok(Some(movie)));
        media
            .expect_mark_searched()
            .with(eq(movie_id), eq("A"))
            .times(1)
            .returning(|_, _| Ok(()));
        media
            .expect_mark_searched()
            .with(eq(movie_id), eq("B"))
            .times(1)
            .returning(|_, _| Ok(()));

        let service = ContentDirectoryService::new(vec![
            ScriptedDirectory::new("A", vec![], Duration::ZERO) as Arc<dyn ContentDirectory>,
            ScriptedDirectory::new("B", vec![], Duration::ZERO),
        ]);

        let acquisition =
            SourceAcquisition::new(repo, Arc::new(media), Arc::new(service));
        let processed = acquisition.search_sources_for_pending_movie().await.unwrap();
        assert_eq!(processed, Some(movie_id));
    }

    #[tokio::test]
    async fn acquisition_with_empty_backlog_is_none() {
        let mut media = MockMediaLookup::new();
        media
            .expect_find_movie_pending_search()
            .return_once(|| Ok(None));

        let acquisition = SourceAcquisition::new(
            Arc::new(MemorySourceRepository::new()),
            Arc::new(media),
            Arc::new(ContentDirectoryService::new(vec![])),
        );
        assert_eq!(
            acquisition.search_sources_for_pending_movie().await.unwrap(),
            None
        );
    }
}
