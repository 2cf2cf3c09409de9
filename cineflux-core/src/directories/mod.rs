//! Content directory clients and the search service that fans out across
//! them.

pub mod challenge;
pub mod service;
pub mod therarbg;
mod tracker;
pub mod yts;

use async_trait::async_trait;

use cineflux_model::{DirectoryStatus, SourceMetadata};

use crate::error::Result;

pub use service::{ContentDirectoryService, DirectorySearchResult};
pub use therarbg::TheRarbgDirectory;
pub use tracker::RequestTracker;
pub use yts::YtsDirectory;

/// One provider's answer for a movie lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryMovie {
    pub sources: Vec<SourceMetadata>,
    pub trailer_code: String,
}

/// Capability contract every content directory client implements.
#[async_trait]
pub trait ContentDirectory: Send + Sync {
    /// Stable identifier, used as the skip key in the already-searched set.
    fn name(&self) -> &'static str;

    /// Current health snapshot. Must not touch the network.
    fn status(&self) -> DirectoryStatus;

    /// Looks up a movie by IMDb id and returns normalized sources.
    ///
    /// "Not found" is `Ok` with empty sources; `Err` is reserved for
    /// transport failures and provider outages. `high_priority` selects a
    /// less restricted rate limit tier for user-facing lookups.
    async fn get_movie(&self, imdb_id: &str, high_priority: bool) -> Result<DirectoryMovie>;
}
