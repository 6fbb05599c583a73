//! Exploit-tracking CSV feed source.
//!
//! The feed is one flat CSV listing published exploits; the `codes` column
//! carries the external ids (CVE among them) and `date_published` the
//! publication date. Rows are grouped by CVE id into one [`ExploitRecord`]
//! per CVE with the exploit count and the earliest publication date.

use super::FeedSource;
use crate::error::{FeedError, Result};
use crate::models::ExploitRecord;
use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use reqwest_middleware::ClientWithMiddleware;
use std::collections::BTreeMap;
use tracing::info;

static CVE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"CVE-\d{4}-\d{4,}").unwrap());

pub struct ExploitFeedSource {
    client: ClientWithMiddleware,
    feed_url: String,
}

impl ExploitFeedSource {
    pub fn new(feed_url: impl Into<String>) -> Self {
        Self {
            client: super::http_client(),
            feed_url: feed_url.into(),
        }
    }
}

#[async_trait]
impl FeedSource for ExploitFeedSource {
    type Record = ExploitRecord;

    async fn fetch(&self) -> Result<Vec<ExploitRecord>> {
        let response = self.client.get(&self.feed_url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::fetch(
                "Exploits",
                format!("HTTP {} for exploit feed", response.status()),
            ));
        }

        let body = response.text().await?;
        let records = group_by_cve(&body)?;

        info!("Exploits: {} CVEs with published exploits", records.len());
        Ok(records)
    }

    fn name(&self) -> &str {
        "Exploits"
    }
}

fn group_by_cve(csv_body: &str) -> Result<Vec<ExploitRecord>> {
    let mut reader = csv::Reader::from_reader(csv_body.as_bytes());
    let headers = reader.headers()?;
    let codes_column = headers
        .iter()
        .position(|h| h == "codes")
        .ok_or_else(|| FeedError::schema("Exploits", "feed CSV has no codes column"))?;
    let date_column = headers.iter().position(|h| h == "date_published");

    let mut grouped: BTreeMap<String, (u32, Option<NaiveDate>)> = BTreeMap::new();
    for record in reader.records() {
        let record = record?;
        let Some(codes) = record.get(codes_column) else {
            continue;
        };
        let published = date_column
            .and_then(|i| record.get(i))
            .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok());

        for cve in CVE_REGEX.find_iter(codes) {
            let entry = grouped.entry(cve.as_str().to_string()).or_insert((0, None));
            entry.0 += 1;
            entry.1 = match (entry.1, published) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }
    }

    Ok(grouped
        .into_iter()
        .map(|(cve_id, (exploit_count, published_date))| ExploitRecord {
            cve_id,
            exploit_count,
            published_date,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = "\
id,file,description,date_published,codes
50592,exploits/java/remote/50592.py,Log4Shell RCE,2021-12-14,CVE-2021-44228
50590,exploits/java/remote/50590.rb,Log4Shell scanner,2021-12-12,CVE-2021-44228;OSVDB-99999
50001,exploits/linux/local/50001.c,Something else,2021-03-01,CVE-2021-3156
49999,exploits/misc/49999.txt,No code refs,2021-01-01,
";

    #[test]
    fn test_group_counts_and_earliest_date() {
        let records = group_by_cve(FEED).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].cve_id, "CVE-2021-3156");
        assert_eq!(records[0].exploit_count, 1);
        assert_eq!(records[1].cve_id, "CVE-2021-44228");
        assert_eq!(records[1].exploit_count, 2);
        assert_eq!(
            records[1].published_date,
            NaiveDate::from_ymd_opt(2021, 12, 12)
        );
    }

    #[test]
    fn test_missing_codes_column_is_schema_error() {
        assert!(group_by_cve("id,file\n1,x\n").is_err());
    }

    #[tokio::test]
    async fn test_fetch_parses_remote_feed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/files_exploits.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .mount(&mock_server)
            .await;

        let source = ExploitFeedSource::new(format!("{}/files_exploits.csv", mock_server.uri()));
        let records = source.fetch().await.unwrap();
        assert_eq!(records.len(), 2);
    }
}
