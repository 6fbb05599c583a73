//! Tabular output sinks.
//!
//! Every run rebuilds its outputs wholesale: [`RowWriter`] recreates the
//! output directory and truncates any prior file before writing. Tables go
//! out as CSV under an explicit header; the CVE table is additionally
//! mirrored to JSON, and the weakness catalogs pass through as raw bytes.

use crate::error::Result;
use crate::models::{
    AdvisoryRecord, EpssRecord, ExploitRecord, MentionAggregate, VulnerabilityRecord,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// A record that projects onto a fixed CSV column set.
pub trait TableRow {
    fn header() -> &'static [&'static str];
    fn fields(&self) -> Vec<String>;
}

/// CSV/JSON sink rooted at one output directory.
pub struct RowWriter {
    dir: PathBuf,
}

impl RowWriter {
    /// Create a writer, making the output directory if needed.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    /// Write a table as CSV, replacing any previous file.
    pub fn write_table<R: TableRow>(&self, file_name: &str, rows: &[R]) -> Result<()> {
        self.write_rows(file_name, R::header(), rows.iter().map(TableRow::fields))
    }

    /// Write pre-rendered rows as CSV under an explicit header.
    pub fn write_rows<I>(&self, file_name: &str, header: &[&str], rows: I) -> Result<()>
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let path = self.prepare(file_name)?;
        let mut writer = csv::Writer::from_path(&path)?;

        writer.write_record(header)?;
        let mut count = 0usize;
        for row in rows {
            writer.write_record(&row)?;
            count += 1;
        }
        writer.flush()?;

        info!("Wrote {} rows to {}", count, path.display());
        Ok(())
    }

    /// Mirror a table to pretty-printed JSON.
    pub fn write_json<T: Serialize>(&self, file_name: &str, rows: &[T]) -> Result<()> {
        let path = self.prepare(file_name)?;
        let file = fs::File::create(&path)?;
        serde_json::to_writer_pretty(file, rows)?;

        info!("Wrote {} records to {}", rows.len(), path.display());
        Ok(())
    }

    /// Pass raw bytes through unchanged (upstream CSV kept verbatim).
    pub fn write_raw(&self, file_name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.prepare(file_name)?;
        fs::write(&path, bytes)?;

        info!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    fn prepare(&self, file_name: &str) -> Result<PathBuf> {
        let path = self.dir.join(file_name);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(path)
    }
}

fn date_field(date: &chrono::NaiveDate) -> String {
    date.format("%m/%d/%Y").to_string()
}

fn opt_field(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

impl TableRow for VulnerabilityRecord {
    fn header() -> &'static [&'static str] {
        &[
            "cve_id",
            "cwe",
            "part",
            "vendor",
            "product",
            "cvss_type",
            "attack_vector",
            "attack_complexity",
            "privileges_required",
            "user_interaction",
            "scope",
            "confidentiality_impact",
            "integrity_impact",
            "availability_impact",
            "base_score",
            "base_severity",
            "exploitability_score",
            "impact_score",
            "cve_published_date",
            "last_modified_date",
        ]
    }

    fn fields(&self) -> Vec<String> {
        let set_field = |items: Vec<String>| format!("{items:?}");
        vec![
            self.id.clone(),
            set_field(self.cwe_ids.iter().cloned().collect()),
            set_field(self.parts.iter().map(|p| p.label().to_string()).collect()),
            set_field(self.vendors.iter().cloned().collect()),
            set_field(self.products.iter().cloned().collect()),
            self.cvss.version.to_string(),
            self.cvss.attack_vector.clone(),
            self.cvss.attack_complexity.clone(),
            self.cvss.privileges_required.clone(),
            self.cvss.user_interaction.clone(),
            self.cvss.scope.clone(),
            self.cvss.confidentiality_impact.clone(),
            self.cvss.integrity_impact.clone(),
            self.cvss.availability_impact.clone(),
            self.cvss
                .base_score
                .map(|s| s.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            self.cvss.base_severity.clone(),
            self.cvss
                .exploitability_score
                .map(|s| s.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            self.cvss
                .impact_score
                .map(|s| s.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            date_field(&self.published_date),
            date_field(&self.last_modified_date),
        ]
    }
}

impl TableRow for AdvisoryRecord {
    fn header() -> &'static [&'static str] {
        &["cve_id", "published_date", "impact", "reference"]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.cve_id.clone(),
            date_field(&self.published_date),
            self.impact.clone(),
            self.reference.clone(),
        ]
    }
}

/// Microsoft advisories carry four extra columns; a newtype keeps the plain
/// [`AdvisoryRecord`] projection for the other vendors.
pub struct MicrosoftAdvisoryRow<'a>(pub &'a AdvisoryRecord);

impl TableRow for MicrosoftAdvisoryRow<'_> {
    fn header() -> &'static [&'static str] {
        &[
            "cve_id",
            "published_date",
            "publicly_disclosed",
            "exploited",
            "exploitation_likelihood",
            "dos",
            "impact",
            "reference",
        ]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.0.cve_id.clone(),
            date_field(&self.0.published_date),
            opt_field(&self.0.publicly_disclosed),
            opt_field(&self.0.exploited),
            opt_field(&self.0.exploitation_likelihood),
            opt_field(&self.0.dos),
            self.0.impact.clone(),
            self.0.reference.clone(),
        ]
    }
}

impl TableRow for ExploitRecord {
    fn header() -> &'static [&'static str] {
        &["cve_id", "exploit_count", "exploit_published_date"]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.cve_id.clone(),
            self.exploit_count.to_string(),
            self.published_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        ]
    }
}

impl TableRow for EpssRecord {
    fn header() -> &'static [&'static str] {
        &["cve_id", "epss", "percentile"]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.cve_id.clone(),
            self.epss.to_string(),
            self.percentile.to_string(),
        ]
    }
}

impl TableRow for MentionAggregate {
    fn header() -> &'static [&'static str] {
        &[
            "cve_id",
            "tweet_published_date",
            "lang",
            "impact",
            "tweets",
            "retweets",
            "audience",
        ]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.cve_id.clone(),
            self.latest_mention_date.clone(),
            format!("{:?}", self.languages.iter().collect::<Vec<_>>()),
            self.attack_type.clone().unwrap_or_default(),
            self.mention_count.to_string(),
            self.total_engagement.to_string(),
            self.total_audience.to_string(),
        ]
    }
}
