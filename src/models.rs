//! Core data models for the feed pipeline.
//!
//! This module defines the canonical row types produced by the source
//! adapters and consumed by the join engine: one [`VulnerabilityRecord`] per
//! CVE, one [`AdvisoryRecord`] per (CVE, vendor) pair, the ranked
//! [`WeaknessCatalog`]s, exploit and EPSS rows, and the per-CVE
//! [`MentionAggregate`] built from raw stream items.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The CPE "part" component of an affected platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Part {
    Hardware,
    OperatingSystem,
    Application,
}

impl Part {
    /// Parse the single-letter part tag from a CPE 2.3 URI.
    ///
    /// Unknown tags (including the `*` and `-` wildcards) yield `None`.
    pub fn from_cpe_tag(tag: &str) -> Option<Self> {
        match tag {
            "h" => Some(Self::Hardware),
            "o" => Some(Self::OperatingSystem),
            "a" => Some(Self::Application),
            _ => None,
        }
    }

    /// Human-readable label used in the combined table.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Hardware => "hardware",
            Self::OperatingSystem => "operating system",
            Self::Application => "application",
        }
    }
}

/// Which CVSS metric set a record's scores were taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CvssVersion {
    #[serde(rename = "2")]
    V2,
    #[serde(rename = "3")]
    V3,
    #[default]
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl fmt::Display for CvssVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V2 => write!(f, "2"),
            Self::V3 => write!(f, "3"),
            Self::NotApplicable => write!(f, "N/A"),
        }
    }
}

/// CVSS base metrics selected from a record's impact block.
///
/// Qualitative fields keep the upstream spelling (`NETWORK`, `HIGH`, ...);
/// the `"N/A"` sentinel marks fields the selected metric version does not
/// define. Scores are `None` when no metric block was present at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CvssMetrics {
    pub version: CvssVersion,
    pub attack_vector: String,
    pub attack_complexity: String,
    pub privileges_required: String,
    pub user_interaction: String,
    pub scope: String,
    pub confidentiality_impact: String,
    pub integrity_impact: String,
    pub availability_impact: String,
    pub base_score: Option<f64>,
    pub base_severity: String,
    pub exploitability_score: Option<f64>,
    pub impact_score: Option<f64>,
}

impl CvssMetrics {
    /// All-sentinel metrics for records carrying no CVSS data.
    pub fn not_applicable() -> Self {
        Self {
            version: CvssVersion::NotApplicable,
            attack_vector: "N/A".into(),
            attack_complexity: "N/A".into(),
            privileges_required: "N/A".into(),
            user_interaction: "N/A".into(),
            scope: "N/A".into(),
            confidentiality_impact: "N/A".into(),
            integrity_impact: "N/A".into(),
            availability_impact: "N/A".into(),
            base_score: None,
            base_severity: "N/A".into(),
            exploitability_score: None,
            impact_score: None,
        }
    }
}

/// One row per CVE identifier, produced by the CVE feed adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    /// CVE identifier (`CVE-YYYY-NNNNN+`), the join key everywhere.
    pub id: String,
    /// Weakness identifiers, deduplicated. May be empty.
    pub cwe_ids: BTreeSet<String>,
    /// Affected platform parts.
    pub parts: BTreeSet<Part>,
    pub vendors: BTreeSet<String>,
    pub products: BTreeSet<String>,
    pub cvss: CvssMetrics,
    pub published_date: NaiveDate,
    pub last_modified_date: NaiveDate,
}

/// One row per (CVE, source vendor) pair from a vendor advisory feed.
///
/// The four optional fields are populated by the Microsoft adapter only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryRecord {
    pub cve_id: String,
    pub published_date: NaiveDate,
    /// Impact phrase mapped into the controlled vocabulary (`"other"` default).
    pub impact: String,
    /// Free-text bulletin or KB identifier. Empty when the advisory had none.
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publicly_disclosed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exploited: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exploitation_likelihood: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dos: Option<String>,
}

/// Ranked CWE views downloaded from the weakness catalog feed.
///
/// Membership is decided by id value; rank itself is never used downstream.
#[derive(Debug, Clone, Default)]
pub struct WeaknessCatalog {
    /// CWE ids (`CWE-79`, ...) of the MITRE Top-25 view, in rank order.
    pub mitre_top_25: Vec<String>,
    /// CWE ids of the OWASP Top-10 view, in rank order.
    pub owasp_top_10: Vec<String>,
}

impl WeaknessCatalog {
    pub fn in_mitre_top_25(&self, cwe_id: &str) -> bool {
        self.mitre_top_25.iter().any(|id| id == cwe_id)
    }

    pub fn in_owasp_top_10(&self, cwe_id: &str) -> bool {
        self.owasp_top_10.iter().any(|id| id == cwe_id)
    }
}

/// Per-CVE aggregate over an exploit-tracking feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExploitRecord {
    pub cve_id: String,
    /// Number of distinct exploit entries referencing the CVE.
    pub exploit_count: u32,
    /// Earliest publication date among those entries.
    pub published_date: Option<NaiveDate>,
}

/// EPSS probability score for one CVE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpssRecord {
    pub cve_id: String,
    /// Exploitation probability (0.0 - 1.0).
    pub epss: f64,
    /// Percentile relative to all scored CVEs (0.0 - 1.0).
    pub percentile: f64,
}

/// One raw item from the social-media mention stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionRecord {
    pub cve_id: String,
    /// Publication timestamp as reported by the stream (RFC 3339).
    pub published_date: String,
    pub lang: String,
    pub post_id: String,
    pub retweet_count: u64,
    pub author_id: String,
    pub author_followers: u64,
    /// Populated when the item is a repost of another item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_retweet_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_author_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_author_followers: Option<u64>,
    /// Attack-type classification carried by some stream revisions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attack_type: Option<String>,
}

/// Per-CVE aggregate over all matching mention records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionAggregate {
    pub cve_id: String,
    /// Maximum publication timestamp across all mentions.
    pub latest_mention_date: String,
    /// Union of languages seen.
    pub languages: BTreeSet<String>,
    /// Number of distinct posts (reposts count their original once).
    pub mention_count: u64,
    /// Sum of per-original-post maximum retweet counts.
    pub total_engagement: u64,
    /// Sum of follower counts over distinct authors (first value wins).
    pub total_audience: u64,
    /// Last attack type seen across the CVE's mentions, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attack_type: Option<String>,
}
