//! vulnfeeds: vulnerability feed collection, normalization and join pipeline.
//!
//! The crate pulls vulnerability data from several external feeds (NVD CVE
//! yearly feeds, CWE ranked catalogs, Microsoft/Intel/Adobe advisories, an
//! exploit-tracking feed, EPSS scores and a social-media mention stream),
//! normalizes each into a tabular row format, writes per-feed CSV tables and
//! joins everything into one denormalized vulnerability table keyed by CVE
//! id.
//!
//! # Example
//!
//! ```no_run
//! use vulnfeeds::{Config, FeedPipeline};
//!
//! # async fn run() -> vulnfeeds::error::Result<()> {
//! let config = Config::from_env()?;
//! FeedPipeline::new(config).run().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod join;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod sources;
pub mod writer;

pub use config::Config;
pub use error::FeedError;
pub use pipeline::FeedPipeline;
