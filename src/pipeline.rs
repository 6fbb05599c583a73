//! Pipeline orchestration.
//!
//! One run fetches every configured feed in sequence, writes each per-feed
//! table, then joins everything into the combined vulnerability table. A
//! source that fails contributes an empty table and the run continues; only
//! unusable configuration aborts a run.

use crate::config::Config;
use crate::error::Result;
use crate::join::{BandLabels, JOINED_HEADER, JoinInputs, join_feeds};
use crate::models::WeaknessCatalog;
use crate::sources::adobe::AdobeAdvisorySource;
use crate::sources::cwe::{WeaknessCatalogSource, WeaknessView};
use crate::sources::epss::EpssSource;
use crate::sources::exploits::ExploitFeedSource;
use crate::sources::intel::IntelAdvisorySource;
use crate::sources::mentions::{MentionStreamSource, aggregate_mentions};
use crate::sources::microsoft::MicrosoftAdvisorySource;
use crate::sources::nvd::CveFeedSource;
use crate::sources::FeedSource;
use crate::writer::{MicrosoftAdvisoryRow, RowWriter};
use std::time::Duration;
use tracing::{info, warn};

pub struct FeedPipeline {
    config: Config,
}

impl FeedPipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the whole collection-and-join cycle once.
    pub async fn run(&self) -> Result<()> {
        let writer = RowWriter::create(&self.config.output_dir)?;

        let cves = fetch_or_empty(&CveFeedSource::new(
            &self.config.cve_feed_url,
            self.config.cve_year_begin,
            self.config.cve_year_end,
        ))
        .await;
        writer.write_table("cves.csv", &cves)?;
        writer.write_json("cves.json", &cves)?;

        let catalog = self.collect_catalog(&writer).await?;

        let microsoft = fetch_or_empty(&MicrosoftAdvisorySource::new(
            &self.config.microsoft_api_url,
            self.config.microsoft_year_begin,
            self.config.microsoft_year_end,
        ))
        .await;
        let microsoft_rows: Vec<MicrosoftAdvisoryRow> =
            microsoft.iter().map(MicrosoftAdvisoryRow).collect();
        writer.write_table("microsoft_advisory.csv", &microsoft_rows)?;

        let intel = fetch_or_empty(&IntelAdvisorySource::new(
            &self.config.intel_base_url,
            &self.config.intel_security_center_path,
        ))
        .await;
        writer.write_table("intel_advisory.csv", &intel)?;

        let adobe = fetch_or_empty(&AdobeAdvisorySource::new(
            &self.config.adobe_base_url,
            &self.config.adobe_bulletin_path,
        ))
        .await;
        writer.write_table("adobe_advisory.csv", &adobe)?;

        let exploits = fetch_or_empty(&ExploitFeedSource::new(&self.config.exploit_feed_url)).await;
        writer.write_table("exploits.csv", &exploits)?;

        let epss = fetch_or_empty(&EpssSource::new(&self.config.epss_feed_url)).await;
        writer.write_table("epss.csv", &epss)?;

        let mentions = match &self.config.mentions_bearer_token {
            Some(token) => {
                let raw = fetch_or_empty(&MentionStreamSource::new(
                    &self.config.mentions_stream_url,
                    token,
                    Duration::from_secs(self.config.mentions_duration_secs),
                ))
                .await;
                aggregate_mentions(&raw)
            }
            None => {
                info!("No bearer token configured, skipping the mention stream");
                Vec::new()
            }
        };
        writer.write_table("tweets.csv", &mentions)?;

        let inputs = JoinInputs {
            cves,
            catalog,
            exploits,
            epss,
            advisories: vec![microsoft, intel, adobe],
            mentions,
        };
        let today = chrono::Utc::now().date_naive();
        let rows = join_feeds(&inputs, today);

        let labels = BandLabels::pt_br();
        writer.write_rows(
            "vulns.csv",
            JOINED_HEADER,
            rows.iter().map(|row| row.fields_with(&labels)),
        )?;

        info!("Pipeline run complete: {} combined rows", rows.len());
        Ok(())
    }

    /// Download both ranked CWE views, pass the raw CSVs through and build
    /// the membership catalog.
    async fn collect_catalog(&self, writer: &RowWriter) -> Result<WeaknessCatalog> {
        let source = WeaknessCatalogSource::new(
            &self.config.cwe_feed_url,
            vec![
                self.config.mitre_view_id.clone(),
                self.config.owasp_view_id.clone(),
            ],
        );
        let views = fetch_or_empty(&source).await;

        let mut catalog = WeaknessCatalog::default();
        for WeaknessView {
            view_id,
            raw_csv,
            cwe_ids,
        } in views
        {
            if view_id == self.config.mitre_view_id {
                writer.write_raw("cwe_top_25.csv", &raw_csv)?;
                catalog.mitre_top_25 = cwe_ids;
            } else if view_id == self.config.owasp_view_id {
                writer.write_raw("owasp_top_10.csv", &raw_csv)?;
                catalog.owasp_top_10 = cwe_ids;
            }
        }
        Ok(catalog)
    }
}

/// Fetch one source, degrading to an empty table on failure.
async fn fetch_or_empty<S: FeedSource>(source: &S) -> Vec<S::Record> {
    match source.fetch().await {
        Ok(records) => records,
        Err(err) => {
            warn!("Source {} failed, continuing without it: {}", source.name(), err);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedError;
    use async_trait::async_trait;

    struct FailingSource;

    #[async_trait]
    impl FeedSource for FailingSource {
        type Record = ();

        async fn fetch(&self) -> Result<Vec<()>> {
            Err(FeedError::fetch("Failing", "boom"))
        }

        fn name(&self) -> &str {
            "Failing"
        }
    }

    #[tokio::test]
    async fn test_failed_source_degrades_to_empty_table() {
        assert!(fetch_or_empty(&FailingSource).await.is_empty());
    }
}
