//! Join/aggregation engine.
//!
//! Merges the per-feed tables into one denormalized vulnerability table
//! keyed by CVE identifier. Every input table is deduplicated by key first
//! (first occurrence in file order wins), then left-joined onto the CVE
//! table: secondary tables never introduce new keys, and a CVE with no match
//! anywhere still yields a row with empty joined columns.

use crate::models::{
    AdvisoryRecord, EpssRecord, ExploitRecord, MentionAggregate, VulnerabilityRecord,
    WeaknessCatalog,
};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

/// Age band for a published date, bucketed by days elapsed.
///
/// The five bands are a total, non-overlapping partition of the non-negative
/// day counts. Labels live in a separate [`BandLabels`] table so output
/// locale never leaks into classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DayBand {
    /// 60 days or fewer.
    UpToThreeMonths,
    /// More than 60 and up to 180 days.
    ThreeToSixMonths,
    /// More than 180 and up to 270 days.
    SixToNineMonths,
    /// More than 270 and up to 365 days.
    NineToTwelveMonths,
    /// More than 365 days.
    OverTwelveMonths,
}

impl DayBand {
    /// Classify an elapsed day count into its band.
    pub fn classify(days: i64) -> Self {
        if days <= 60 {
            Self::UpToThreeMonths
        } else if days <= 180 {
            Self::ThreeToSixMonths
        } else if days <= 270 {
            Self::SixToNineMonths
        } else if days <= 365 {
            Self::NineToTwelveMonths
        } else {
            Self::OverTwelveMonths
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::UpToThreeMonths => 0,
            Self::ThreeToSixMonths => 1,
            Self::SixToNineMonths => 2,
            Self::NineToTwelveMonths => 3,
            Self::OverTwelveMonths => 4,
        }
    }
}

/// Localized labels for the five [`DayBand`]s.
#[derive(Debug, Clone)]
pub struct BandLabels {
    labels: [&'static str; 5],
}

impl BandLabels {
    /// Labels used by the original dataset (Brazilian Portuguese).
    pub fn pt_br() -> Self {
        Self {
            labels: [
                "menos de 3 meses",
                "entre 3 e 6 meses",
                "entre 6 e 9 meses",
                "entre 9 e 12 meses",
                "mais de 12 meses",
            ],
        }
    }

    pub fn en() -> Self {
        Self {
            labels: [
                "under 3 months",
                "3 to 6 months",
                "6 to 9 months",
                "9 to 12 months",
                "over 12 months",
            ],
        }
    }

    pub fn label(&self, band: DayBand) -> &'static str {
        self.labels[band.index()]
    }
}

impl Default for BandLabels {
    fn default() -> Self {
        Self::pt_br()
    }
}

/// The per-feed tables consumed by [`join_feeds`].
///
/// `advisories` holds one table per vendor in precedence order
/// (Microsoft, Intel, Adobe); they are concatenated before deduplication.
#[derive(Debug, Default)]
pub struct JoinInputs {
    pub cves: Vec<VulnerabilityRecord>,
    pub catalog: WeaknessCatalog,
    pub exploits: Vec<ExploitRecord>,
    pub epss: Vec<EpssRecord>,
    pub advisories: Vec<Vec<AdvisoryRecord>>,
    pub mentions: Vec<MentionAggregate>,
}

/// One row of the combined vulnerability table.
#[derive(Debug, Clone)]
pub struct JoinedRow {
    pub cve_id: String,
    pub part: String,
    pub vendor: String,
    pub base_score: Option<f64>,
    pub confidentiality_impact: String,
    pub integrity_impact: String,
    pub availability_impact: String,
    pub cve_published_date: NaiveDate,
    pub cve_published_days: DayBand,
    pub mitre_top_25: bool,
    pub owasp_top_10: bool,
    pub exploit_count: Option<u32>,
    pub epss: Option<f64>,
    pub exploit_published_date: Option<NaiveDate>,
    pub exploit_published_days: Option<DayBand>,
    pub attack_type: Option<String>,
    pub updatable: bool,
    pub audience: Option<u64>,
    pub audience_percentile: Option<String>,
}

/// Fixed column order of the combined table.
pub const JOINED_HEADER: &[&str] = &[
    "cve_id",
    "part",
    "vendor",
    "base_score",
    "confidentiality_impact",
    "integrity_impact",
    "availability_impact",
    "cve_published_date",
    "cve_published_days",
    "mitre_top_25",
    "owasp_top_10",
    "exploit_count",
    "epss",
    "exploit_published_date",
    "exploit_published_days",
    "attack_type",
    "updatable",
    "audience",
    "audience_percentile",
];

impl JoinedRow {
    /// Render the row under [`JOINED_HEADER`] with the given band labels.
    pub fn fields_with(&self, labels: &BandLabels) -> Vec<String> {
        vec![
            self.cve_id.clone(),
            self.part.clone(),
            self.vendor.clone(),
            self.base_score.map(|s| s.to_string()).unwrap_or_default(),
            self.confidentiality_impact.clone(),
            self.integrity_impact.clone(),
            self.availability_impact.clone(),
            self.cve_published_date.format("%Y-%m-%d").to_string(),
            labels.label(self.cve_published_days).to_string(),
            if self.mitre_top_25 { "1" } else { "0" }.to_string(),
            if self.owasp_top_10 { "1" } else { "0" }.to_string(),
            self.exploit_count.map(|c| c.to_string()).unwrap_or_default(),
            self.epss.map(|e| e.to_string()).unwrap_or_default(),
            self.exploit_published_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            self.exploit_published_days
                .map(|band| labels.label(band).to_string())
                .unwrap_or_default(),
            self.attack_type.clone().unwrap_or_default(),
            if self.updatable { "1" } else { "0" }.to_string(),
            self.audience.map(|a| a.to_string()).unwrap_or_default(),
            self.audience_percentile.clone().unwrap_or_default(),
        ]
    }
}

/// Join all per-feed tables into the combined vulnerability table.
///
/// `today` anchors the day-bucketing so results are reproducible for a fixed
/// input dataset.
pub fn join_feeds(inputs: &JoinInputs, today: NaiveDate) -> Vec<JoinedRow> {
    let cves = dedup_by_key(&inputs.cves, |record| &record.id);

    let exploits: HashMap<&str, &ExploitRecord> = first_by_key(&inputs.exploits, |r| &r.cve_id);
    let epss: HashMap<&str, &EpssRecord> = first_by_key(&inputs.epss, |r| &r.cve_id);
    let mentions: HashMap<&str, &MentionAggregate> = first_by_key(&inputs.mentions, |r| &r.cve_id);

    // Vendor advisory tables concatenate in precedence order before the
    // first-occurrence dedup, so an earlier vendor's row wins.
    let mut advisories: HashMap<&str, &AdvisoryRecord> = HashMap::new();
    for table in &inputs.advisories {
        for advisory in table {
            advisories.entry(&advisory.cve_id).or_insert(advisory);
        }
    }

    let top_vendors = top_vendors(&cves, 10);
    let max_audience = max_audience(&cves, &mentions);

    cves.iter()
        .map(|record| {
            let mitre_top_25 = record
                .cwe_ids
                .iter()
                .any(|cwe| inputs.catalog.in_mitre_top_25(cwe));
            let owasp_top_10 = record
                .cwe_ids
                .iter()
                .any(|cwe| inputs.catalog.in_owasp_top_10(cwe));

            let part = record
                .parts
                .iter()
                .last()
                .map(|p| p.label().to_string())
                .unwrap_or_default();

            let mut vendor = "other".to_string();
            for candidate in &record.vendors {
                if top_vendors.contains(candidate) {
                    vendor = candidate.clone();
                }
            }

            let exploit = exploits.get(record.id.as_str());
            let advisory = advisories.get(record.id.as_str());
            let mention = mentions.get(record.id.as_str());

            // Mention-derived attack type overwrites the advisory impact
            // when present; a quirk of the upstream dataset kept as-is.
            let mut attack_type = advisory.map(|a| a.impact.clone());
            if let Some(mention) = mention
                && let Some(mention_attack) = &mention.attack_type
            {
                attack_type = Some(mention_attack.clone());
            }

            let updatable = advisory.map(|a| !a.reference.is_empty()).unwrap_or(false);

            let exploit_published_date = exploit.and_then(|e| e.published_date);

            let audience = mention.map(|m| m.total_audience);
            let audience_percentile = audience.map(|value| {
                if max_audience == 0 {
                    "0.00000".to_string()
                } else {
                    format!("{:.5}", value as f64 / max_audience as f64)
                }
            });

            JoinedRow {
                cve_id: record.id.clone(),
                part,
                vendor,
                base_score: record.cvss.base_score,
                confidentiality_impact: record.cvss.confidentiality_impact.clone(),
                integrity_impact: record.cvss.integrity_impact.clone(),
                availability_impact: record.cvss.availability_impact.clone(),
                cve_published_date: record.published_date,
                cve_published_days: DayBand::classify(
                    (today - record.published_date).num_days(),
                ),
                mitre_top_25,
                owasp_top_10,
                exploit_count: exploit.map(|e| e.exploit_count),
                epss: epss.get(record.id.as_str()).map(|e| e.epss),
                exploit_published_date,
                exploit_published_days: exploit_published_date
                    .map(|date| DayBand::classify((today - date).num_days())),
                attack_type,
                updatable,
                audience,
                audience_percentile,
            }
        })
        .collect()
}

/// Deduplicate a table by key, keeping the first occurrence in file order.
fn dedup_by_key<'a, T, F>(rows: &'a [T], key: F) -> Vec<&'a T>
where
    F: Fn(&T) -> &String,
{
    let mut seen = HashSet::new();
    rows.iter().filter(|row| seen.insert(key(row).clone())).collect()
}

/// Index a table by key, keeping the first occurrence per key.
fn first_by_key<'a, T, F>(rows: &'a [T], key: F) -> HashMap<&'a str, &'a T>
where
    F: Fn(&'a T) -> &'a String,
{
    let mut index = HashMap::new();
    for row in rows {
        index.entry(key(row).as_str()).or_insert(row);
    }
    index
}

/// Compute the `n` most frequent vendors across the whole dataset.
///
/// Counting order follows row order (and set order within a row), and ties
/// break by first-seen order, so the result is deterministic for a fixed
/// input.
fn top_vendors(cves: &[&VulnerabilityRecord], n: usize) -> HashSet<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut first_seen: Vec<&str> = Vec::new();

    for record in cves {
        for vendor in &record.vendors {
            let count = counts.entry(vendor.as_str()).or_insert(0);
            if *count == 0 {
                first_seen.push(vendor.as_str());
            }
            *count += 1;
        }
    }

    let mut ranked: Vec<&str> = first_seen.clone();
    // Stable sort preserves first-seen order among equal counts.
    ranked.sort_by_key(|vendor| std::cmp::Reverse(counts[vendor]));

    ranked.into_iter().take(n).map(str::to_string).collect()
}

/// Maximum audience over the mention aggregates whose key appears in the
/// CVE table.
fn max_audience(
    cves: &[&VulnerabilityRecord],
    mentions: &HashMap<&str, &MentionAggregate>,
) -> u64 {
    cves.iter()
        .filter_map(|record| mentions.get(record.id.as_str()))
        .map(|m| m.total_audience)
        .max()
        .unwrap_or(0)
}
