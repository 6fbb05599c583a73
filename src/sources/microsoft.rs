//! Microsoft CVRF advisory source.
//!
//! The MSRC API publishes one CVRF document per bulletin month at
//! `{base}/{year}-{Mon}`. Each vulnerability entry carries threat records of
//! two kinds: type 0 holds the impact phrase, type 1 holds `key:value`
//! exploitability metadata. KB article ids are regexed out of the remediation
//! URLs and deduplicated into the advisory reference. The published date is
//! pinned to the first of the bulletin month.

use super::FeedSource;
use crate::error::{FeedError, Result};
use crate::extract::impact::microsoft_impact;
use crate::models::AdvisoryRecord;
use async_trait::async_trait;
use chrono::NaiveDate;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::num::NonZeroU32;
use tracing::{debug, info, warn};

static KB_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"KB\d+").unwrap());
static CVE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^CVE-\d{4}-\d{4,}$").unwrap());

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub struct MicrosoftAdvisorySource {
    client: ClientWithMiddleware,
    limiter: DefaultDirectRateLimiter,
    api_url: String,
    year_begin: i32,
    year_end: i32,
}

impl MicrosoftAdvisorySource {
    pub fn new(api_url: impl Into<String>, year_begin: i32, year_end: i32) -> Self {
        // NonZeroU32::new(2) is trivially Some
        let quota = Quota::per_second(NonZeroU32::new(2).unwrap_or(NonZeroU32::MIN));
        Self {
            client: super::http_client(),
            limiter: RateLimiter::direct(quota),
            api_url: api_url.into(),
            year_begin,
            year_end,
        }
    }

    async fn fetch_month(&self, year: i32, month: usize) -> Result<Vec<AdvisoryRecord>> {
        self.limiter.until_ready().await;

        let url = format!("{}/{}-{}", self.api_url, year, MONTHS[month]);
        debug!("Fetching Microsoft bulletin {}-{}", year, MONTHS[month]);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FeedError::fetch(
                "Microsoft",
                format!("HTTP {} for {}-{}", response.status(), year, MONTHS[month]),
            ));
        }

        let document: CvrfDocument = response.json().await?;

        // month is zero-based over a fixed 12-entry table
        let published_date = NaiveDate::from_ymd_opt(year, month as u32 + 1, 1)
            .ok_or_else(|| FeedError::parse(format!("invalid bulletin month {year}-{month}")))?;

        Ok(document
            .vulnerabilities
            .iter()
            .filter(|v| CVE_REGEX.is_match(&v.cve))
            .map(|v| normalize(v, published_date))
            .collect())
    }
}

#[async_trait]
impl FeedSource for MicrosoftAdvisorySource {
    type Record = AdvisoryRecord;

    async fn fetch(&self) -> Result<Vec<AdvisoryRecord>> {
        let mut records = Vec::new();

        for year in self.year_begin..self.year_end {
            for month in 0..MONTHS.len() {
                match self.fetch_month(year, month).await {
                    Ok(mut month_records) => records.append(&mut month_records),
                    Err(err) => {
                        // months without a bulletin 404; not fatal
                        warn!(
                            "Could not download Microsoft bulletin {}-{}: {}",
                            year, MONTHS[month], err
                        );
                    }
                }
            }
        }

        info!("Microsoft: {} advisory rows", records.len());
        Ok(records)
    }

    fn name(&self) -> &str {
        "Microsoft"
    }
}

fn normalize(vuln: &CvrfVulnerability, published_date: NaiveDate) -> AdvisoryRecord {
    let impact = vuln
        .threats
        .iter()
        .filter(|t| t.kind == 0)
        .map(|t| t.description.value.as_str())
        .find(|v| !v.is_empty())
        .map(microsoft_impact)
        .unwrap_or(crate::extract::impact::OTHER)
        .to_string();

    let metadata = vuln
        .threats
        .iter()
        .filter(|t| t.kind == 1)
        .map(|t| parse_metadata(&t.description.value))
        .fold(ThreatMetadata::default(), ThreatMetadata::merge);

    let kb_ids: BTreeSet<&str> = vuln
        .remediations
        .iter()
        .flat_map(|r| KB_REGEX.find_iter(&r.url))
        .map(|m| m.as_str())
        .collect();

    let exploitation_likelihood = metadata.exploitation_likelihood();
    AdvisoryRecord {
        cve_id: vuln.cve.clone(),
        published_date,
        impact,
        reference: kb_ids.into_iter().collect::<Vec<_>>().join(","),
        publicly_disclosed: metadata.publicly_disclosed,
        exploited: metadata.exploited,
        exploitation_likelihood,
        dos: metadata.dos,
    }
}

/// Exploitability metadata gathered across a vulnerability's type-1 threat
/// records. The two release-branch likelihoods usually arrive in separate
/// records, so they stay separate until [`exploitation_likelihood`] resolves
/// them.
///
/// [`exploitation_likelihood`]: ThreatMetadata::exploitation_likelihood
#[derive(Default)]
struct ThreatMetadata {
    publicly_disclosed: Option<String>,
    exploited: Option<String>,
    latest_release_likelihood: Option<String>,
    older_release_likelihood: Option<String>,
    dos: Option<String>,
}

impl ThreatMetadata {
    fn merge(mut self, other: ThreatMetadata) -> ThreatMetadata {
        self.publicly_disclosed = self.publicly_disclosed.or(other.publicly_disclosed);
        self.exploited = self.exploited.or(other.exploited);
        self.latest_release_likelihood = self
            .latest_release_likelihood
            .or(other.latest_release_likelihood);
        self.older_release_likelihood = self
            .older_release_likelihood
            .or(other.older_release_likelihood);
        self.dos = self.dos.or(other.dos);
        self
    }

    /// The latest-release likelihood when present, otherwise the older one.
    fn exploitation_likelihood(&self) -> Option<String> {
        self.latest_release_likelihood
            .clone()
            .or_else(|| self.older_release_likelihood.clone())
    }
}

/// Parse a type-1 threat description, a `;`-separated list of `key:value`
/// pairs (e.g. `Publicly Disclosed:No;Exploited:No;DOS:N/A`).
fn parse_metadata(description: &str) -> ThreatMetadata {
    let mut metadata = ThreatMetadata::default();

    for pair in description.split(';') {
        let Some((key, value)) = pair.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "Publicly Disclosed" => metadata.publicly_disclosed = Some(value),
            "Exploited" => metadata.exploited = Some(value),
            "Latest Software Release" => metadata.latest_release_likelihood = Some(value),
            "Older Software Release" => metadata.older_release_likelihood = Some(value),
            "DOS" => metadata.dos = Some(value),
            _ => {}
        }
    }

    metadata
}

#[derive(Deserialize)]
struct CvrfDocument {
    #[serde(rename = "Vulnerability", default)]
    vulnerabilities: Vec<CvrfVulnerability>,
}

#[derive(Deserialize)]
struct CvrfVulnerability {
    #[serde(rename = "CVE", default)]
    cve: String,
    #[serde(rename = "Threats", default)]
    threats: Vec<CvrfThreat>,
    #[serde(rename = "Remediations", default)]
    remediations: Vec<CvrfRemediation>,
}

#[derive(Deserialize)]
struct CvrfThreat {
    #[serde(rename = "Type", default)]
    kind: i64,
    #[serde(rename = "Description", default)]
    description: ThreatDescription,
}

#[derive(Default, Deserialize)]
struct ThreatDescription {
    #[serde(rename = "Value", default)]
    value: String,
}

#[derive(Deserialize)]
struct CvrfRemediation {
    #[serde(rename = "URL", default)]
    url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn bulletin_body() -> serde_json::Value {
        json!({
            "Vulnerability": [
                {
                    "CVE": "CVE-2021-34527",
                    "Threats": [
                        { "Type": 0, "Description": { "Value": "Remote Code Execution" } },
                        {
                            "Type": 1,
                            "Description": {
                                "Value": "Publicly Disclosed:Yes;Exploited:Yes;Latest Software Release:Exploitation Detected;DOS:N/A"
                            }
                        }
                    ],
                    "Remediations": [
                        { "URL": "https://support.microsoft.com/help/KB5004945" },
                        { "URL": "https://support.microsoft.com/help/KB5004945" },
                        { "URL": "https://support.microsoft.com/help/KB5004946" }
                    ]
                },
                {
                    "CVE": "ADV210003",
                    "Threats": [],
                    "Remediations": []
                }
            ]
        })
    }

    #[tokio::test]
    async fn test_fetch_month_parses_threat_records() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/2021-Jul"))
            .respond_with(ResponseTemplate::new(200).set_body_json(bulletin_body()))
            .mount(&mock_server)
            .await;
        // every other month of the range is empty
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let source = MicrosoftAdvisorySource::new(mock_server.uri(), 2021, 2022);
        let records = source.fetch().await.unwrap();

        // the ADV row has no CVE id and is dropped
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.cve_id, "CVE-2021-34527");
        assert_eq!(record.impact, "code_execution");
        assert_eq!(
            record.published_date,
            NaiveDate::from_ymd_opt(2021, 7, 1).unwrap()
        );
        assert_eq!(record.publicly_disclosed.as_deref(), Some("Yes"));
        assert_eq!(record.exploited.as_deref(), Some("Yes"));
        assert_eq!(
            record.exploitation_likelihood.as_deref(),
            Some("Exploitation Detected")
        );
        assert_eq!(record.dos.as_deref(), Some("N/A"));
        // KB ids deduplicated and sorted
        assert_eq!(record.reference, "KB5004945,KB5004946");
    }

    #[test]
    fn test_parse_metadata_prefers_latest_release_likelihood() {
        let metadata = parse_metadata(
            "Publicly Disclosed:No;Exploited:No;Older Software Release:Exploitation Less Likely;Latest Software Release:Exploitation More Likely",
        );
        assert_eq!(
            metadata.exploitation_likelihood().as_deref(),
            Some("Exploitation More Likely")
        );
    }

    #[test]
    fn test_parse_metadata_falls_back_to_older_release() {
        let metadata = parse_metadata("Older Software Release:Exploitation Unlikely;DOS:Yes");
        assert_eq!(
            metadata.exploitation_likelihood().as_deref(),
            Some("Exploitation Unlikely")
        );
        assert_eq!(metadata.dos.as_deref(), Some("Yes"));
    }

    #[test]
    fn test_latest_release_wins_across_separate_threats() {
        // the common CVRF shape: one type-1 threat per release branch, the
        // older branch listed first
        let vuln: CvrfVulnerability = serde_json::from_value(json!({
            "CVE": "CVE-2021-1",
            "Threats": [
                {
                    "Type": 1,
                    "Description": { "Value": "Older Software Release:Exploitation Less Likely" }
                },
                {
                    "Type": 1,
                    "Description": { "Value": "Latest Software Release:Exploitation More Likely" }
                }
            ],
            "Remediations": []
        }))
        .unwrap();

        let record = normalize(&vuln, NaiveDate::from_ymd_opt(2021, 7, 1).unwrap());
        assert_eq!(
            record.exploitation_likelihood.as_deref(),
            Some("Exploitation More Likely")
        );
    }

    #[test]
    fn test_metadata_without_separator_is_ignored() {
        let metadata = parse_metadata("not a key value pair");
        assert!(metadata.publicly_disclosed.is_none());
        assert!(metadata.dos.is_none());
    }
}
