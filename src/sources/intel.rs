//! Intel security-center advisory source.
//!
//! The security-center index page links every published advisory
//! (`intel-sa-*` pages). Each advisory page carries a feature table with the
//! impact phrase and original release date; every CVE id found anywhere in
//! the page text becomes one advisory row referencing the INTEL-SA id.

use super::FeedSource;
use crate::error::{FeedError, Result};
use crate::extract::impact::intel_impact;
use crate::models::AdvisoryRecord;
use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use reqwest_middleware::ClientWithMiddleware;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

static CVE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"CVE-\d{4}-\d{4,}").unwrap());
static SA_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"INTEL-SA-\d+").unwrap());

pub struct IntelAdvisorySource {
    client: ClientWithMiddleware,
    base_url: String,
    security_center_path: String,
}

impl IntelAdvisorySource {
    pub fn new(base_url: impl Into<String>, security_center_path: impl Into<String>) -> Self {
        Self {
            client: super::http_client(),
            base_url: base_url.into(),
            security_center_path: security_center_path.into(),
        }
    }

    async fn advisory_links(&self) -> Result<Vec<String>> {
        let url = format!("{}/{}", self.base_url, self.security_center_path);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::fetch(
                "Intel",
                format!("HTTP {} for security-center index", response.status()),
            ));
        }

        let page = Html::parse_document(&response.text().await?);
        let link_selector = Selector::parse("a[href]")
            .map_err(|e| FeedError::parse(format!("bad link selector: {e}")))?;

        let mut seen = BTreeSet::new();
        let links = page
            .select(&link_selector)
            .filter_map(|a| a.value().attr("href"))
            .filter(|href| href.contains("intel-sa-"))
            .filter(|href| seen.insert(href.to_string()))
            .map(|href| {
                if href.starts_with("http") {
                    href.to_string()
                } else {
                    format!("{}/{}", self.base_url, href.trim_start_matches('/'))
                }
            })
            .collect();
        Ok(links)
    }

    async fn fetch_advisory(&self, url: &str) -> Result<Vec<AdvisoryRecord>> {
        debug!("Fetching Intel advisory {}", url);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::fetch(
                "Intel",
                format!("HTTP {} for {}", response.status(), url),
            ));
        }

        let body = response.text().await?;
        let page = Html::parse_document(&body);
        let text: String = page.root_element().text().collect();

        let sa_id = SA_REGEX
            .find(&text)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| FeedError::schema("Intel", format!("no INTEL-SA id in {url}")))?;

        let impact = feature_value(&page, "Impact of vulnerability")?
            .map(|phrase| intel_impact(&phrase))
            .unwrap_or(crate::extract::impact::OTHER)
            .to_string();

        let release = feature_value(&page, "Original release")?
            .ok_or_else(|| FeedError::schema("Intel", format!("no release date in {sa_id}")))?;
        let published_date = NaiveDate::parse_from_str(release.trim(), "%m/%d/%Y")
            .map_err(|_| FeedError::parse(format!("bad release date in {sa_id}: {release}")))?;

        let cve_ids: BTreeSet<&str> = CVE_REGEX.find_iter(&text).map(|m| m.as_str()).collect();

        Ok(cve_ids
            .into_iter()
            .map(|cve_id| AdvisoryRecord {
                cve_id: cve_id.to_string(),
                published_date,
                impact: impact.clone(),
                reference: sa_id.clone(),
                publicly_disclosed: None,
                exploited: None,
                exploitation_likelihood: None,
                dos: None,
            })
            .collect())
    }
}

#[async_trait]
impl FeedSource for IntelAdvisorySource {
    type Record = AdvisoryRecord;

    async fn fetch(&self) -> Result<Vec<AdvisoryRecord>> {
        let mut records = Vec::new();

        for link in self.advisory_links().await? {
            match self.fetch_advisory(&link).await {
                Ok(mut advisory_records) => records.append(&mut advisory_records),
                Err(err) => {
                    warn!("Could not download Intel advisory {}: {}", link, err);
                }
            }
        }

        info!("Intel: {} advisory rows", records.len());
        Ok(records)
    }

    fn name(&self) -> &str {
        "Intel"
    }
}

/// Look up a value cell in the advisory feature table by its label cell.
fn feature_value(page: &Html, label: &str) -> Result<Option<String>> {
    let row_selector =
        Selector::parse("tr").map_err(|e| FeedError::parse(format!("bad row selector: {e}")))?;
    let cell_selector =
        Selector::parse("td").map_err(|e| FeedError::parse(format!("bad cell selector: {e}")))?;

    for row in page.select(&row_selector) {
        let cells: Vec<String> = row
            .select(&cell_selector)
            .map(|td| td.text().collect::<String>().trim().to_string())
            .collect();
        if let [key, value, ..] = cells.as_slice()
            && key.starts_with(label)
        {
            return Ok(Some(value.clone()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ADVISORY_PAGE: &str = r#"<html><body>
        <h1>INTEL-SA-00537</h1>
        <table>
            <tr><td>Impact of vulnerability:</td><td>Escalation of Privilege</td></tr>
            <tr><td>Severity rating:</td><td>HIGH</td></tr>
            <tr><td>Original release:</td><td>11/09/2021</td></tr>
        </table>
        <p>Affected: CVE-2021-0157, CVE-2021-0158 and CVE-2021-0157 again.</p>
    </body></html>"#;

    fn index_page(advisory_path: &str) -> String {
        format!(
            r#"<html><body><table>
                <tr><td><a href="{advisory_path}">INTEL-SA-00537</a></td></tr>
                <tr><td><a href="{advisory_path}">duplicate link</a></td></tr>
                <tr><td><a href="/other/page.html">unrelated</a></td></tr>
            </table></body></html>"#
        )
    }

    #[tokio::test]
    async fn test_fetch_emits_one_row_per_cve() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/security-center/default.html"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(index_page("/advisory/intel-sa-00537.html")),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/advisory/intel-sa-00537.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ADVISORY_PAGE))
            .mount(&mock_server)
            .await;

        let source =
            IntelAdvisorySource::new(mock_server.uri(), "security-center/default.html");
        let records = source.fetch().await.unwrap();

        // two distinct CVE ids, duplicate index link deduplicated
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.reference == "INTEL-SA-00537"));
        assert!(records.iter().all(|r| r.impact == "privilege_escalation"));
        assert!(
            records
                .iter()
                .all(|r| r.published_date == NaiveDate::from_ymd_opt(2021, 11, 9).unwrap())
        );
        assert_eq!(records[0].cve_id, "CVE-2021-0157");
        assert_eq!(records[1].cve_id, "CVE-2021-0158");
    }

    #[tokio::test]
    async fn test_broken_advisory_page_is_not_fatal() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/security-center/default.html"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(index_page("/advisory/intel-sa-00001.html")),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/advisory/intel-sa-00001.html"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let source =
            IntelAdvisorySource::new(mock_server.uri(), "security-center/default.html");
        let records = source.fetch().await.unwrap();
        assert!(records.is_empty());
    }
}
