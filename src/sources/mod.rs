//! Feed source adapters.
//!
//! This module contains implementations for fetching raw records from the
//! external feeds and normalizing them into the row types of
//! [`crate::models`]. Each source implements the [`FeedSource`] trait.
//!
//! # Available Sources
//!
//! - [`nvd::CveFeedSource`] - NVD yearly CVE JSON feeds
//! - [`cwe::WeaknessCatalogSource`] - CWE ranked-view catalogs (MITRE Top-25, OWASP Top-10)
//! - [`microsoft::MicrosoftAdvisorySource`] - Microsoft CVRF security advisories
//! - [`intel::IntelAdvisorySource`] - Intel security-center advisories
//! - [`adobe::AdobeAdvisorySource`] - Adobe security bulletins
//! - [`exploits::ExploitFeedSource`] - exploit-tracking CSV feed
//! - [`epss::EpssSource`] - FIRST EPSS daily score feed
//! - [`mentions::MentionStreamSource`] - social-media mention stream

pub mod adobe;
pub mod cwe;
pub mod epss;
pub mod exploits;
pub mod intel;
pub mod mentions;
pub mod microsoft;
pub mod nvd;

use crate::error::Result;
use async_trait::async_trait;

/// Trait for feed data sources.
///
/// A fetch covers the source's whole configured range (years, months, one
/// catalog snapshot); transient failures inside the range are logged and
/// that unit of work contributes nothing, so `fetch` only errors when the
/// source is unusable as a whole.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Normalized row type this source emits.
    type Record;

    /// Fetch and normalize all records in the configured range.
    async fn fetch(&self) -> Result<Vec<Self::Record>>;

    /// Get the name of this source (used for logging and metadata).
    fn name(&self) -> &str;
}

/// Build the shared HTTP client: timeouts plus bounded exponential-backoff
/// retries for transient failures.
pub(crate) fn http_client() -> reqwest_middleware::ClientWithMiddleware {
    let raw_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .connect_timeout(std::time::Duration::from_secs(30))
        .build()
        .unwrap_or_default();

    let retry_policy = reqwest_retry::policies::ExponentialBackoff::builder()
        .build_with_max_retries(3);

    reqwest_middleware::ClientBuilder::new(raw_client)
        .with(reqwest_retry::RetryTransientMiddleware::new_with_policy(
            retry_policy,
        ))
        .build()
}
