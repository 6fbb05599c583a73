//! CWE ranked-view catalog source.
//!
//! The CWE site publishes ranked weakness views (MITRE Top-25, OWASP Top-10)
//! as zipped CSV files linked from a downloads page. This source scrapes the
//! page for each view's archive link, extracts `{view}.csv` and keeps both
//! the raw CSV bytes (passed through to the output directory unchanged) and
//! the ranked list of CWE ids parsed from the `CWE-ID` column.

use super::FeedSource;
use crate::error::{FeedError, Result};
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use scraper::{Html, Selector};
use std::io::{Cursor, Read};
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// One ranked view: raw CSV plus the parsed id list.
pub struct WeaknessView {
    pub view_id: String,
    pub raw_csv: Vec<u8>,
    pub cwe_ids: Vec<String>,
}

pub struct WeaknessCatalogSource {
    client: ClientWithMiddleware,
    downloads_url: String,
    view_ids: Vec<String>,
}

impl WeaknessCatalogSource {
    pub fn new(downloads_url: impl Into<String>, view_ids: Vec<String>) -> Self {
        Self {
            client: super::http_client(),
            downloads_url: downloads_url.into(),
            view_ids,
        }
    }

    /// Locate the archive link for each requested view on the downloads
    /// page. Synchronous on purpose: the parsed page is not `Send` and must
    /// not be held across an await.
    fn resolve_archives(&self, page_body: &str) -> Vec<(String, String)> {
        let page = Html::parse_document(page_body);
        self.view_ids
            .iter()
            .filter_map(|view_id| match archive_link(&page, view_id) {
                Ok(href) => Some((
                    view_id.clone(),
                    resolve_url(&self.downloads_url, &href),
                )),
                Err(err) => {
                    warn!("Could not locate CWE view {}: {}", view_id, err);
                    None
                }
            })
            .collect()
    }

    async fn fetch_view(&self, view_id: &str, archive_url: &str) -> Result<WeaknessView> {
        debug!("Downloading CWE view {} from {}", view_id, archive_url);

        let response = self.client.get(archive_url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::fetch(
                "CWE",
                format!("HTTP {} for view {}", response.status(), view_id),
            ));
        }

        let archive = response.bytes().await?;
        let raw_csv = extract_csv(archive.as_ref(), view_id)?;
        let cwe_ids = parse_cwe_ids(&raw_csv)?;

        info!("View {}: {} ranked weaknesses", view_id, cwe_ids.len());
        Ok(WeaknessView {
            view_id: view_id.to_string(),
            raw_csv,
            cwe_ids,
        })
    }
}

#[async_trait]
impl FeedSource for WeaknessCatalogSource {
    type Record = WeaknessView;

    async fn fetch(&self) -> Result<Vec<WeaknessView>> {
        let response = self.client.get(&self.downloads_url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::fetch(
                "CWE",
                format!("HTTP {} for downloads page", response.status()),
            ));
        }
        let archives = self.resolve_archives(&response.text().await?);

        let mut views = Vec::new();
        for (view_id, archive_url) in &archives {
            match self.fetch_view(view_id, archive_url).await {
                Ok(view) => views.push(view),
                Err(err) => {
                    warn!("Could not download CWE view {}: {}", view_id, err);
                }
            }
        }

        Ok(views)
    }

    fn name(&self) -> &str {
        "CWE"
    }
}

/// Find the `CSV.zip` link inside the downloads-page row for one view.
fn archive_link(page: &Html, view_id: &str) -> Result<String> {
    let row_selector = Selector::parse(&format!("tr#cwe{view_id}"))
        .map_err(|e| FeedError::parse(format!("bad row selector: {e}")))?;
    let link_selector = Selector::parse("a[href]")
        .map_err(|e| FeedError::parse(format!("bad link selector: {e}")))?;

    let row = page
        .select(&row_selector)
        .next()
        .ok_or_else(|| FeedError::schema("CWE", format!("no downloads row for view {view_id}")))?;

    row.select(&link_selector)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| href.ends_with("CSV.zip"))
        .map(str::to_string)
        .ok_or_else(|| FeedError::schema("CWE", format!("no CSV archive link for view {view_id}")))
}

fn resolve_url(page_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }

    // origin is everything up to the first '/' after the scheme
    let origin = page_url
        .find("://")
        .and_then(|i| page_url[i + 3..].find('/').map(|j| &page_url[..i + 3 + j]))
        .unwrap_or(page_url);
    format!("{}/{}", origin, href.trim_start_matches('/'))
}

fn extract_csv(archive: &[u8], view_id: &str) -> Result<Vec<u8>> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    let mut file = zip.by_name(&format!("{view_id}.csv"))?;
    let mut csv = Vec::new();
    file.read_to_end(&mut csv)?;
    Ok(csv)
}

/// Parse the `CWE-ID` column into `CWE-{n}` ids, in file (rank) order.
fn parse_cwe_ids(raw_csv: &[u8]) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_reader(raw_csv);
    let id_column = reader
        .headers()?
        .iter()
        .position(|h| h == "CWE-ID")
        .ok_or_else(|| FeedError::schema("CWE", "view CSV has no CWE-ID column"))?;

    let mut ids = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(value) = record.get(id_column) {
            ids.push(format!("CWE-{value}"));
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use zip::write::SimpleFileOptions;

    const VIEW_CSV: &str = "\
Rank,ID,CWE-ID,Name
1,1,79,Cross-site Scripting
2,2,787,Out-of-bounds Write
";

    fn view_archive(view_id: &str) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file(format!("{view_id}.csv"), SimpleFileOptions::default())
            .unwrap();
        zip.write_all(VIEW_CSV.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    fn downloads_page() -> String {
        r#"<html><body><table>
            <tr id="cwe1337"><td>Top 25</td>
                <td><a href="/top25/archive/1337.csv.zip_CSV.zip">CSV.zip</a></td></tr>
            <tr id="cwe1344"><td>OWASP</td>
                <td><a href="/owasp/archive/1344.csv.zip_CSV.zip">CSV.zip</a></td></tr>
        </table></body></html>"#
            .to_string()
    }

    #[tokio::test]
    async fn test_fetch_extracts_ranked_ids() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/downloads.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(downloads_page()))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/top25/archive/1337.csv.zip_CSV.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(view_archive("1337")))
            .mount(&mock_server)
            .await;

        let source = WeaknessCatalogSource::new(
            format!("{}/data/downloads.html", mock_server.uri()),
            vec!["1337".to_string()],
        );

        let views = source.fetch().await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].view_id, "1337");
        assert_eq!(views[0].cwe_ids, vec!["CWE-79", "CWE-787"]);
        assert_eq!(views[0].raw_csv, VIEW_CSV.as_bytes());
    }

    #[tokio::test]
    async fn test_fetch_downloads_every_requested_view() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/downloads.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(downloads_page()))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/top25/archive/1337.csv.zip_CSV.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(view_archive("1337")))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/owasp/archive/1344.csv.zip_CSV.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(view_archive("1344")))
            .mount(&mock_server)
            .await;

        let source = WeaknessCatalogSource::new(
            format!("{}/data/downloads.html", mock_server.uri()),
            vec!["1337".to_string(), "1344".to_string()],
        );

        let views = source.fetch().await.unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].view_id, "1337");
        assert_eq!(views[1].view_id, "1344");
    }

    #[tokio::test]
    async fn test_missing_view_row_is_not_fatal() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/downloads.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(downloads_page()))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/owasp/archive/1344.csv.zip_CSV.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(view_archive("1344")))
            .mount(&mock_server)
            .await;

        // view 9999 has no downloads row; 1344 still comes through
        let source = WeaknessCatalogSource::new(
            format!("{}/data/downloads.html", mock_server.uri()),
            vec!["9999".to_string(), "1344".to_string()],
        );

        let views = source.fetch().await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].view_id, "1344");
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url("https://cwe.mitre.org/data/downloads.html", "/top25/x.zip"),
            "https://cwe.mitre.org/top25/x.zip"
        );
        assert_eq!(
            resolve_url("https://cwe.mitre.org/data/downloads.html", "https://other/x.zip"),
            "https://other/x.zip"
        );
    }
}
