//! FIRST EPSS score feed source.
//!
//! Daily gzipped CSV of `cve,epss,percentile` scores. The file opens with
//! `#`-prefixed metadata lines (model version, score date) that precede the
//! header and are stripped before parsing.

use super::FeedSource;
use crate::error::{FeedError, Result};
use crate::models::EpssRecord;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use std::io::Read;
use tracing::info;

pub struct EpssSource {
    client: ClientWithMiddleware,
    feed_url: String,
}

impl EpssSource {
    pub fn new(feed_url: impl Into<String>) -> Self {
        Self {
            client: super::http_client(),
            feed_url: feed_url.into(),
        }
    }
}

#[async_trait]
impl FeedSource for EpssSource {
    type Record = EpssRecord;

    async fn fetch(&self) -> Result<Vec<EpssRecord>> {
        let response = self.client.get(&self.feed_url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::fetch(
                "EPSS",
                format!("HTTP {} for score feed", response.status()),
            ));
        }

        let compressed = response.bytes().await?;
        let mut decoder = GzDecoder::new(compressed.as_ref());
        let mut body = String::new();
        decoder.read_to_string(&mut body)?;

        let records = parse_scores(&body)?;
        info!("EPSS: {} scored CVEs", records.len());
        Ok(records)
    }

    fn name(&self) -> &str {
        "EPSS"
    }
}

fn parse_scores(body: &str) -> Result<Vec<EpssRecord>> {
    let without_comments: String = body
        .lines()
        .filter(|line| !line.starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = csv::Reader::from_reader(without_comments.as_bytes());
    let mut records = Vec::new();
    for row in reader.deserialize() {
        let row: ScoreRow = row?;
        records.push(EpssRecord {
            cve_id: row.cve,
            epss: row.epss,
            percentile: row.percentile,
        });
    }
    Ok(records)
}

#[derive(Deserialize)]
struct ScoreRow {
    cve: String,
    epss: f64,
    percentile: f64,
}
