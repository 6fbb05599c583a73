//! Adobe security bulletin source.
//!
//! The bulletin index page tables link the individual `apsb*` bulletin
//! pages. Bulletin pages are plain HTML tables: the first table is the
//! summary (bulletin id, publication date), the last one lists the
//! vulnerabilities (impact phrase, CVE numbers). Cells listing several CVE
//! ids are split into one advisory row per id.

use super::FeedSource;
use crate::error::{FeedError, Result};
use crate::extract::impact::adobe_impact;
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

pub struct AdobeAdvisorySource {
    client: ClientWithMiddleware,
    base_url: String,
    bulletin_path: String,
}

impl AdobeAdvisorySource {
    pub fn new(base_url: impl Into<String>, bulletin_path: impl Into<String>) -> Self {
        Self {
            client: super::http_client(),
            base_url: base_url.into(),
            bulletin_path: bulletin_path.into(),
        }
    }

    async fn bulletin_links(&self) -> Result<Vec<String>> {
        let url = format!("{}/{}", self.base_url, self.bulletin_path);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::fetch(
                "Adobe",
                format!("HTTP {} for bulletin index", response.status()),
            ));
        }

        let page = Html::parse_document(&response.text().await?);
        let link_selector = Selector::parse("a[href]")
            .map_err(|e| FeedError::parse(format!("bad link selector: {e}")))?;

        let mut seen = BTreeSet::new();
        let links = page
            .select(&link_selector)
            .filter_map(|a| a.value().attr("href"))
            .filter(|href| href.to_ascii_lowercase().contains("apsb"))
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

    async fn fetch_bulletin(&self, url: &str) -> Result<Vec<AdvisoryRecord>> {
        debug!("Fetching Adobe bulletin {}", url);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::fetch(
                "Adobe",
                format!("HTTP {} for {}", response.status(), url),
            ));
        }

        let page = Html::parse_document(&response.text().await?);
        let tables = extract_tables(&page)?;
        if tables.len() < 2 {
            return Err(FeedError::schema(
                "Adobe",
                format!("expected summary and detail tables in {url}"),
            ));
        }

        let summary = &tables[0];
        let bulletin_id = column_value(summary, "Bulletin ID")
            .ok_or_else(|| FeedError::schema("Adobe", format!("no bulletin id in {url}")))?;
        let date_raw = column_value(summary, "Date Published")
            .ok_or_else(|| FeedError::schema("Adobe", format!("no publication date in {url}")))?;
        let published_date = parse_bulletin_date(&date_raw)
            .ok_or_else(|| FeedError::parse(format!("bad date in {bulletin_id}: {date_raw}")))?;

        // first table is the summary; the vulnerability list is always last
        let details = &tables[tables.len() - 1];
        let header = details
            .first()
            .ok_or_else(|| FeedError::schema("Adobe", format!("empty detail table in {url}")))?;
        let impact_column = header
            .iter()
            .position(|h| h.contains("Impact"))
            .ok_or_else(|| FeedError::schema("Adobe", format!("no impact column in {url}")))?;
        let cve_column = header
            .iter()
            .position(|h| h.contains("CVE"))
            .ok_or_else(|| FeedError::schema("Adobe", format!("no CVE column in {url}")))?;

        let mut records = Vec::new();
        for row in &details[1..] {
            let (Some(impact_cell), Some(cve_cell)) = (row.get(impact_column), row.get(cve_column))
            else {
                continue;
            };
            let impact = adobe_impact(impact_cell.trim());
            for cve in CVE_REGEX.find_iter(cve_cell) {
                records.push(AdvisoryRecord {
                    cve_id: cve.as_str().to_string(),
                    published_date,
                    impact: impact.to_string(),
                    reference: bulletin_id.clone(),
                    publicly_disclosed: None,
                    exploited: None,
                    exploitation_likelihood: None,
                    dos: None,
                });
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl FeedSource for AdobeAdvisorySource {
    type Record = AdvisoryRecord;

    async fn fetch(&self) -> Result<Vec<AdvisoryRecord>> {
        let mut records = Vec::new();

        for link in self.bulletin_links().await? {
            match self.fetch_bulletin(&link).await {
                Ok(mut bulletin_records) => records.append(&mut bulletin_records),
                Err(err) => {
                    warn!("Could not download Adobe bulletin {}: {}", link, err);
                }
            }
        }

        info!("Adobe: {} advisory rows", records.len());
        Ok(records)
    }

    fn name(&self) -> &str {
        "Adobe"
    }
}

/// Flatten every `<table>` into rows of trimmed cell text (`th` and `td`).
fn extract_tables(page: &Html) -> Result<Vec<Vec<Vec<String>>>> {
    let table_selector = Selector::parse("table")
        .map_err(|e| FeedError::parse(format!("bad table selector: {e}")))?;
    let row_selector =
        Selector::parse("tr").map_err(|e| FeedError::parse(format!("bad row selector: {e}")))?;
    let cell_selector = Selector::parse("th, td")
        .map_err(|e| FeedError::parse(format!("bad cell selector: {e}")))?;

    Ok(page
        .select(&table_selector)
        .map(|table| {
            table
                .select(&row_selector)
                .map(|row| {
                    row.select(&cell_selector)
                        .map(|cell| cell.text().collect::<String>().trim().to_string())
                        .collect()
                })
                .collect()
        })
        .collect())
}

/// Read the value under a named column of a header-plus-one-row table.
fn column_value(table: &[Vec<String>], column: &str) -> Option<String> {
    let header = table.first()?;
    let index = header.iter().position(|h| h.contains(column))?;
    table.get(1)?.get(index).cloned()
}

fn parse_bulletin_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%B %d, %Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
        .ok()
}
