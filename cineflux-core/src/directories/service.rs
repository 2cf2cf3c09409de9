use std::sync::Arc;

use tracing::{debug, info, warn};

use cineflux_model::{DirectoryStatus, SourceMetadata};

use crate::directories::ContentDirectory;
use crate::error::Result;
use crate::singleflight::SingleFlight;

/// Outcome of a directory search: the winning provider and what it returned.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectorySearchResult {
    pub sources: Vec<SourceMetadata>,
    pub trailer_code: String,
    pub directory: String,
}

/// Fans a movie search out across the configured directories in priority
/// order, stopping at the first one that yields sources.
///
/// Searches are deduplicated by IMDb id: concurrent callers for the same
/// movie join one in-flight search.
pub struct ContentDirectoryService {
    directories: Arc<Vec<Arc<dyn ContentDirectory>>>,
    flight: Arc<SingleFlight<Option<DirectorySearchResult>>>,
}

impl std::fmt::Debug for ContentDirectoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentDirectoryService")
            .field(
                "directories",
                &self.directories.iter().map(|d| d.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl ContentDirectoryService {
    /// `directories` is the priority order: earlier entries win.
    pub fn new(directories: Vec<Arc<dyn ContentDirectory>>) -> Self {
        Self {
            directories: Arc::new(directories),
            flight: Arc::new(SingleFlight::new()),
        }
    }

    /// Health snapshot of every configured directory.
    pub fn status(&self) -> Vec<DirectoryStatus> {
        self.directories.iter().map(|d| d.status()).collect()
    }

    /// Directory names in priority order.
    pub fn directory_names(&self) -> Vec<&'static str> {
        self.directories.iter().map(|d| d.name()).collect()
    }

    /// Searches directories for `imdb_id`, skipping names in
    /// `already_searched`, and returns the first non-empty result.
    ///
    /// `Ok(None)` means every queried directory came back empty. A hard
    /// provider error aborts the whole attempt: with a directory down,
    /// continuing would wrongly record the movie as exhausted there.
    pub async fn search_sources_for_movie(
        &self,
        imdb_id: &str,
        high_priority: bool,
        already_searched: &[String],
    ) -> Result<Option<DirectorySearchResult>> {
        let directories = Arc::clone(&self.directories);
        let imdb_id_owned = imdb_id.to_owned();
        let skip: Vec<String> = already_searched.to_vec();

        self.flight
            .run(imdb_id, move || async move {
                search_directories(&directories, &imdb_id_owned, high_priority, &skip).await
            })
            .await
    }
}

async fn search_directories(
    directories: &[Arc<dyn ContentDirectory>],
    imdb_id: &str,
    high_priority: bool,
    already_searched: &[String],
) -> Result<Option<DirectorySearchResult>> {
    for directory in directories {
        let name = directory.name();
        if already_searched.iter().any(|d| d == name) {
            debug!(imdb_id, directory = name, "skipping already searched directory");
            continue;
        }

        let movie = directory
            .get_movie(imdb_id, high_priority)
            .await
            .inspect_err(|err| {
                warn!(imdb_id, directory = name, error = %err, "directory search failed");
            })?;

        if !movie.sources.is_empty() {
            info!(
                imdb_id,
                directory = name,
                count = movie.sources.len(),
                "found sources"
            );
            return Ok(Some(DirectorySearchResult {
                sources: movie.sources,
                trailer_code: movie.trailer_code,
                directory: name.to_owned(),
            }));
        }
        debug!(imdb_id, directory = name, "directory returned no sources");
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use cineflux_model::quality_to_resolution;

    use crate::directories::DirectoryMovie;
    use crate::error::SourceError;

    enum Behavior {
        Sources(usize),
        Empty,
        Fail,
    }

    struct FakeDirectory {
        name: &'static str,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl FakeDirectory {
        fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn sample_source(hash: &str) -> SourceMetadata {
        SourceMetadata {
            hash: hash.into(),
            magnet_link: format!("magnet:?xt=urn:btih:{hash}"),
            url: None,
            quality: None,
            video_codec: None,
            audio_codec: None,
            source: None,
            resolution: quality_to_resolution(None),
            size: 0,
            broadcasters: 0,
            watchers: 0,
            bitrate_kbps: 0,
            language: vec![],
            upload_date: Utc::now(),
            score: 0.0,
        }
    }

    #[async_trait]
    impl ContentDirectory for FakeDirectory {
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

        async fn get_movie(&self, _imdb_id: &str, _hp: bool) -> Result<DirectoryMovie> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Sources(n) => Ok(DirectoryMovie {
                    sources: (0..n).map(|i| sample_source(&format!("h{i}"))).collect(),
                    trailer_code: "trailer".into(),
                }),
                Behavior::Empty => Ok(DirectoryMovie::default()),
                Behavior::Fail => Err(SourceError::Api {
                    directory: self.name,
                    status: 503,
                    message: "down".into(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn first_non_empty_directory_wins() {
        let empty = FakeDirectory::new("A", Behavior::Empty);
        let full = FakeDirectory::new("B", Behavior::Sources(3));
        let never = FakeDirectory::new("C", Behavior::Sources(9));
        let service = ContentDirectoryService::new(vec![
            empty.clone(),
            full.clone(),
            never.clone(),
        ]);

        let result = service
            .search_sources_for_movie("tt0000001", false, &[])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.directory, "B");
        assert_eq!(result.sources.len(), 3);
        assert_eq!(empty.calls(), 1);
        assert_eq!(full.calls(), 1);
        assert_eq!(never.calls(), 0);
    }

    #[tokio::test]
    async fn already_searched_directories_are_skipped() {
        let skipped = FakeDirectory::new("A", Behavior::Sources(5));
        let queried = FakeDirectory::new("B", Behavior::Sources(2));
        let service = ContentDirectoryService::new(vec![skipped.clone(), queried.clone()]);

        let result = service
            .search_sources_for_movie("tt0000001", false, &["A".to_owned()])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.directory, "B");
        assert_eq!(skipped.calls(), 0);
        assert_eq!(queried.calls(), 1);
    }

    #[tokio::test]
    async fn all_empty_is_ok_none() {
        let a = FakeDirectory::new("A", Behavior::Empty);
        let b = FakeDirectory::new("B", Behavior::Empty);
        let service = ContentDirectoryService::new(vec![a, b]);

        let result = service
            .search_sources_for_movie("tt0000001", false, &[])
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn provider_error_aborts_the_attempt() {
        let failing = FakeDirectory::new("A", Behavior::Fail);
        let fallback = FakeDirectory::new("B", Behavior::Sources(1));
        let service = ContentDirectoryService::new(vec![failing.clone(), fallback.clone()]);

        let result = service
            .search_sources_for_movie("tt0000001", false, &[])
            .await;
        assert!(result.is_err());
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_searches_for_one_movie_collapse() {
        struct SlowDirectory {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl ContentDirectory for SlowDirectory {
            fn name(&self) -> &'static str {
                "SLOW"
            }
            fn status(&self) -> DirectoryStatus {
                DirectoryStatus {
                    name: "SLOW".into(),
                    queue: 0,
                    successes: 0,
                    failures: 0,
                    last_request: None,
                }
            }
            async fn get_movie(&self, _: &str, _: bool) -> Result<DirectoryMovie> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                Ok(DirectoryMovie {
                    sources: vec![sample_source("aaa")],
                    trailer_code: String::new(),
                })
            }
        }

        let slow = Arc::new(SlowDirectory {
            calls: AtomicUsize::new(0),
        });
        let service = Arc::new(ContentDirectoryService::new(vec![slow.clone()]));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .search_sources_for_movie("tt0000001", false, &[])
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_some());
        }
        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
    }
}
