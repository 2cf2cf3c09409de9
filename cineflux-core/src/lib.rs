//! Source acquisition, ranking, and swarm stats refresh for Cineflux.
//!
//! The crate is organized around a small set of components:
//! - [`metadata`] normalizes raw release strings into model enums;
//! - [`scoring`] ranks candidate sources for streaming;
//! - [`directories`] holds the content directory clients and the search
//!   service that fans out across them;
//! - [`ratelimit`] and [`singleflight`] provide the concurrency plumbing the
//!   clients and the service rely on;
//! - [`ports`] defines the persistence and lookup boundaries;
//! - [`scheduler`] keeps swarm stats fresh with adaptive backoff;
//! - [`selection`] is the embedder-facing entry point for picking a source.

pub mod config;
pub mod directories;
pub mod error;
pub mod metadata;
pub mod ports;
pub mod ratelimit;
pub mod scheduler;
pub mod scoring;
pub mod selection;
pub mod singleflight;

pub use config::CinefluxConfig;
pub use error::{Result, SourceError};
