//! NVD yearly CVE feed source.
//!
//! Downloads the gzipped NVD 1.1 JSON feed for each configured year and
//! normalizes every entry into a [`VulnerabilityRecord`] through the shared
//! extractors. A year that fails to download contributes nothing; a record
//! with an unparseable date is logged and skipped.

use super::FeedSource;
use crate::error::{FeedError, Result};
use crate::extract::cpe::{CpeMatch, CpeNode};
use crate::extract::{ImpactBlock, ProblemType, extract_cpe, extract_cvss, extract_cwe};
use crate::models::VulnerabilityRecord;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use flate2::read::GzDecoder;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use std::io::Read;
use tracing::{debug, info, warn};

pub struct CveFeedSource {
    client: ClientWithMiddleware,
    /// Feed URL template; `{}` is replaced with the year.
    feed_url: String,
    year_begin: i32,
    year_end: i32,
}

impl CveFeedSource {
    pub fn new(feed_url: impl Into<String>, year_begin: i32, year_end: i32) -> Self {
        Self {
            client: super::http_client(),
            feed_url: feed_url.into(),
            year_begin,
            year_end,
        }
    }

    async fn fetch_year(&self, year: i32) -> Result<Vec<VulnerabilityRecord>> {
        let url = self.feed_url.replace("{}", &year.to_string());
        debug!("Fetching CVE feed for {}", year);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::fetch(
                "NVD",
                format!("HTTP {} for year {}", response.status(), year),
            ));
        }

        let compressed = response.bytes().await?;
        let mut decoder = GzDecoder::new(compressed.as_ref());
        let mut body = Vec::new();
        decoder.read_to_end(&mut body)?;

        let feed: NvdFeed = serde_json::from_slice(&body)?;

        let mut records = Vec::new();
        for item in &feed.cve_items {
            match normalize(item) {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!("Skipping {}: {}", item.cve.meta.id, err);
                }
            }
        }

        info!("Year {}: {} CVE records", year, records.len());
        Ok(records)
    }
}

#[async_trait]
impl FeedSource for CveFeedSource {
    type Record = VulnerabilityRecord;

    async fn fetch(&self) -> Result<Vec<VulnerabilityRecord>> {
        let mut records = Vec::new();

        for year in self.year_begin..self.year_end {
            match self.fetch_year(year).await {
                Ok(mut year_records) => records.append(&mut year_records),
                Err(err) => {
                    warn!("Could not download CVE feed for {}: {}", year, err);
                }
            }
        }

        Ok(records)
    }

    fn name(&self) -> &str {
        "NVD"
    }
}

fn normalize(item: &NvdItem) -> Result<VulnerabilityRecord> {
    let cwe_ids = extract_cwe(&item.cve.problemtype);
    let (parts, vendors, products) = extract_cpe(&config_tree(&item.configurations.nodes));
    let cvss = extract_cvss(&item.impact);

    Ok(VulnerabilityRecord {
        id: item.cve.meta.id.clone(),
        cwe_ids,
        parts,
        vendors,
        products,
        cvss,
        published_date: parse_feed_date(&item.published_date)?,
        last_modified_date: parse_feed_date(&item.last_modified_date)?,
    })
}

fn config_tree(nodes: &[RawNode]) -> Vec<CpeNode> {
    nodes.iter().map(to_cpe_node).collect()
}

fn to_cpe_node(raw: &RawNode) -> CpeNode {
    let matches = raw
        .cpe_match
        .iter()
        .map(|m| CpeMatch {
            vulnerable: m.vulnerable,
            uri: m.cpe23_uri.clone(),
        })
        .collect();

    if raw.operator == "AND" {
        CpeNode::And {
            children: raw.children.iter().map(to_cpe_node).collect(),
            matches,
        }
    } else {
        CpeNode::Or { matches }
    }
}

/// Parse NVD feed timestamps (e.g. `2021-12-10T10:15Z`).
fn parse_feed_date(raw: &str) -> Result<NaiveDate> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%MZ") {
        return Ok(dt.date());
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%SZ") {
        return Ok(dt.date());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.date_naive());
    }

    Err(FeedError::parse(format!("unparseable feed date: {raw}")))
}

// Minimal NVD 1.1 feed structs
#[derive(Deserialize)]
struct NvdFeed {
    #[serde(rename = "CVE_Items")]
    cve_items: Vec<NvdItem>,
}

#[derive(Deserialize)]
struct NvdItem {
    cve: NvdCve,
    #[serde(default)]
    configurations: Configurations,
    #[serde(default)]
    impact: ImpactBlock,
    #[serde(rename = "publishedDate")]
    published_date: String,
    #[serde(rename = "lastModifiedDate")]
    last_modified_date: String,
}

#[derive(Deserialize)]
struct NvdCve {
    #[serde(rename = "CVE_data_meta")]
    meta: CveMeta,
    #[serde(default)]
    problemtype: ProblemType,
}

#[derive(Deserialize)]
struct CveMeta {
    #[serde(rename = "ID")]
    id: String,
}

#[derive(Default, Deserialize)]
struct Configurations {
    #[serde(default)]
    nodes: Vec<RawNode>,
}

#[derive(Deserialize)]
struct RawNode {
    #[serde(default)]
    operator: String,
    #[serde(default)]
    children: Vec<RawNode>,
    #[serde(default)]
    cpe_match: Vec<RawCpeMatch>,
}

#[derive(Deserialize)]
struct RawCpeMatch {
    #[serde(default)]
    vulnerable: bool,
    #[serde(rename = "cpe23Uri")]
    cpe23_uri: String,
}
