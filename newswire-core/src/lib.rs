//! # Newswire Core
//!
//! The feed-aggregation pipeline: parallel download of publisher RSS/Atom
//! feeds, per-item normalization, dedup and freshness filtering, image
//! verification with a sandboxed thumbnail cache, HTML scrubbing, and
//! variety-aware recency scoring, producing a single JSON feed plus a
//! per-feed diagnostic report.
//!
//! The pipeline is a value ([`FeedPipeline`]) constructed at run start;
//! nothing here reads the environment or holds process-global state.

pub mod aggregate;
pub mod download;
pub mod error;
pub mod fetch;
pub mod html;
pub mod image_cache;
pub mod item;
pub mod normalize;
pub mod profanity;
pub mod registry;
pub mod report;
pub mod sandbox;
pub mod scrape;
pub mod store;
pub mod thumbnail;

pub use aggregate::{FeedPipeline, PipelineOptions, shard_by_category};
pub use error::{NewsError, Result};
pub use item::{Enclosure, NormalizedItem, RawItem};
pub use registry::{PublisherRecord, RegistryArtifacts, SourceRecord};
pub use report::{FeedStats, RunReport, check_report};
pub use store::{ObjectStore, S3Store};
