use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The acquisition pipeline's view of a movie.
///
/// `content_directories_searched` records which directories have already been
/// queried for this movie so repeat searches can skip them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieRef {
    pub id: Uuid,
    pub imdb_id: Option<String>,
    pub title: String,
    pub content_directories_searched: Vec<String>,
}

impl MovieRef {
    pub fn has_searched(&self, directory: &str) -> bool {
        self.content_directories_searched
            .iter()
            .any(|d| d == directory)
    }
}
