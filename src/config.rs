//! Pipeline configuration.
//!
//! All knobs are plain values: remote feed URLs, year ranges and output
//! paths, plus the bearer credential for the mention stream. Values come from
//! the process environment (with `.env` support via `dotenvy`); everything
//! except the bearer token has a default matching the public feeds.

use crate::error::{FeedError, Result};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory all per-feed tables and the combined table are written to.
    pub output_dir: String,

    /// NVD yearly feed URL template; `{}` is replaced with the year.
    pub cve_feed_url: String,
    pub cve_year_begin: i32,
    pub cve_year_end: i32,

    /// CWE downloads page listing the ranked-view CSV archives.
    pub cwe_feed_url: String,
    /// View id of the MITRE Top-25 list.
    pub mitre_view_id: String,
    /// View id of the OWASP Top-10 list.
    pub owasp_view_id: String,

    /// Microsoft CVRF API base; documents live at `{base}/{year}-{mon}`.
    pub microsoft_api_url: String,
    pub microsoft_year_begin: i32,
    pub microsoft_year_end: i32,

    pub intel_base_url: String,
    pub intel_security_center_path: String,

    pub adobe_base_url: String,
    pub adobe_bulletin_path: String,

    pub exploit_feed_url: String,
    pub epss_feed_url: String,

    /// Bearer token for the mention stream. The mention collector is skipped
    /// when unset.
    pub mentions_bearer_token: Option<String>,
    pub mentions_stream_url: String,
    /// Wall-clock duration the stream connection is held open, in seconds.
    pub mentions_duration_secs: u64,

    pub log_to_file: bool,
    pub log_dir: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let cve_year_begin = parse_year("VULNFEEDS__CVES__YEAR_BEGIN", 2016)?;
        let cve_year_end = parse_year("VULNFEEDS__CVES__YEAR_END", 2022)?;

        if cve_year_begin > cve_year_end {
            return Err(FeedError::config(format!(
                "CVE year range is inverted: {cve_year_begin} > {cve_year_end}"
            )));
        }

        Ok(Self {
            output_dir: var_or("VULNFEEDS__OUTPUT_DIR", "output"),
            cve_feed_url: var_or(
                "VULNFEEDS__CVES__FEED_URL",
                "https://nvd.nist.gov/feeds/json/cve/1.1/nvdcve-1.1-{}.json.gz",
            ),
            cve_year_begin,
            cve_year_end,
            cwe_feed_url: var_or(
                "VULNFEEDS__CWES__FEED_URL",
                "https://cwe.mitre.org/data/downloads.html",
            ),
            mitre_view_id: var_or("VULNFEEDS__CWES__MITRE_VIEW_ID", "1337"),
            owasp_view_id: var_or("VULNFEEDS__CWES__OWASP_VIEW_ID", "1344"),
            microsoft_api_url: var_or(
                "VULNFEEDS__MICROSOFT__API_URL",
                "https://api.msrc.microsoft.com/cvrf/v2.0/cvrf",
            ),
            microsoft_year_begin: parse_year("VULNFEEDS__MICROSOFT__YEAR_BEGIN", 2017)?,
            microsoft_year_end: parse_year("VULNFEEDS__MICROSOFT__YEAR_END", 2022)?,
            intel_base_url: var_or("VULNFEEDS__INTEL__BASE_URL", "https://www.intel.com"),
            intel_security_center_path: var_or(
                "VULNFEEDS__INTEL__SECURITY_CENTER_PATH",
                "content/www/us/en/security-center/default.html",
            ),
            adobe_base_url: var_or("VULNFEEDS__ADOBE__BASE_URL", "https://helpx.adobe.com"),
            adobe_bulletin_path: var_or(
                "VULNFEEDS__ADOBE__BULLETIN_PATH",
                "security/security-bulletin.html",
            ),
            exploit_feed_url: var_or(
                "VULNFEEDS__EXPLOITS__FEED_URL",
                "https://gitlab.com/exploit-database/exploitdb/-/raw/main/files_exploits.csv",
            ),
            epss_feed_url: var_or(
                "VULNFEEDS__EPSS__FEED_URL",
                "https://epss.cyentia.com/epss_scores-current.csv.gz",
            ),
            mentions_bearer_token: env::var("VULNFEEDS__MENTIONS__BEARER_TOKEN").ok(),
            mentions_stream_url: var_or(
                "VULNFEEDS__MENTIONS__STREAM_URL",
                "https://api.twitter.com/2/tweets/search/stream",
            ),
            mentions_duration_secs: env::var("VULNFEEDS__MENTIONS__DURATION_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(86_400),
            log_to_file: env::var("VULNFEEDS__LOG_TO_FILE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            log_dir: var_or("VULNFEEDS__LOG_DIR", "logs"),
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_year(key: &str, default: i32) -> Result<i32> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| FeedError::config(format!("{key} is not a valid year: {raw}"))),
        Err(_) => Ok(default),
    }
}
