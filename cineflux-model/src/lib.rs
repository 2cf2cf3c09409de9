//! Core data model definitions shared across Cineflux crates.

pub mod codecs;
pub mod movie;
pub mod quality;
pub mod source;
pub mod status;

// Intentionally curated re-exports for downstream consumers.
pub use codecs::{AudioCodec, VideoCodec};
pub use movie::MovieRef;
pub use quality::{quality_to_resolution, Quality, Resolution};
pub use source::{
    Language, PersistedSource, SourceMetadata, SourceStatus, SourceType, SwarmStats,
};
pub use status::DirectoryStatus;
