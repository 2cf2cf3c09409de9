use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health snapshot for a single content directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryStatus {
    pub name: String,
    /// Requests currently in flight.
    pub queue: u32,
    /// Successful requests inside the tracking window.
    pub successes: u32,
    /// Failed requests inside the tracking window.
    pub failures: u32,
    pub last_request: Option<DateTime<Utc>>,
}
