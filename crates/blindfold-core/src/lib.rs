//! Blindfold Core - in-memory image de-identification.
//!
//! Blindfold takes encoded image buffers and returns new buffers with the
//! embedded metadata removed and every detected face blurred out.
//!
//! # Architecture
//!
//! ```text
//! bytes → Validate → Strip metadata → Detect faces → Blur → bytes + stats
//! ```
//!
//! The [`Scrubber`] runs that pipeline for one image and propagates the first
//! stage error. The [`BulkOrchestrator`] runs it over a batch on threads or
//! child processes, keeps input order, and substitutes the original bytes for
//! any item that fails.
//!
//! # Usage
//!
//! ```rust,ignore
//! use blindfold_core::{BulkOrchestrator, Config, Parallelism, Scrubber};
//!
//! #[tokio::main]
//! async fn main() -> blindfold_core::Result<()> {
//!     let config = Config::load()?;
//!
//!     let scrubber = Scrubber::new(&config.scrubber_config());
//!     let (clean, stats) = scrubber.process(&std::fs::read("photo.jpg")?)?;
//!     println!("Blurred {} face(s)", stats.faces_detected);
//!
//!     let bulk = BulkOrchestrator::new(config.scrubber_config());
//!     let outputs = bulk.bulk_process(vec![clean], Parallelism::Threads, None).await;
//!     assert_eq!(outputs.len(), 1);
//!     Ok(())
//! }
//! ```

pub mod bulk;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod types;

#[cfg(test)]
mod test_support;

pub use bulk::{BulkItem, BulkOrchestrator, Parallelism};
pub use config::Config;
pub use error::{BlindfoldError, ConfigError, Result, ScrubError, ScrubResult, WorkerError};
pub use output::{OutputFormat, OutputWriter};
pub use pipeline::{
    DiscoveredFile, FileDiscovery, Hasher, IdentityCheck, MetadataInspector, Scrubber,
    ScrubberConfig,
};
pub use types::{ExifData, FaceRegion, ImageBuffer, ProcessingStats, ScrubSummary};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
