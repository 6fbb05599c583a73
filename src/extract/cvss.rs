//! CVSS metric selection.
//!
//! NVD records expose up to two base metric blocks. v3 is preferred over v2;
//! records with neither yield an all-`"N/A"` metric set. The two versions
//! disagree on field names (`attackVector` vs `accessVector`) and field sets
//! (`scope` and `userInteraction` exist only in v3), so v2 fields are mapped
//! onto the v3 column layout here.

use crate::models::{CvssMetrics, CvssVersion};
use serde::Deserialize;

/// The `impact` block of an NVD 1.1 record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactBlock {
    pub base_metric_v3: Option<BaseMetricV3>,
    pub base_metric_v2: Option<BaseMetricV2>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseMetricV3 {
    pub cvss_v3: CvssV3,
    pub exploitability_score: Option<f64>,
    pub impact_score: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvssV3 {
    pub attack_vector: String,
    pub attack_complexity: String,
    pub privileges_required: String,
    pub user_interaction: String,
    pub scope: String,
    pub confidentiality_impact: String,
    pub integrity_impact: String,
    pub availability_impact: String,
    pub base_score: f64,
    pub base_severity: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseMetricV2 {
    pub cvss_v2: CvssV2,
    pub severity: Option<String>,
    pub exploitability_score: Option<f64>,
    pub impact_score: Option<f64>,
    pub user_interaction_required: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvssV2 {
    pub access_vector: String,
    pub access_complexity: String,
    pub authentication: String,
    pub confidentiality_impact: String,
    pub integrity_impact: String,
    pub availability_impact: String,
    pub base_score: f64,
}

/// Select CVSS metrics from an impact block, preferring v3 over v2.
pub fn extract_cvss(impact: &ImpactBlock) -> CvssMetrics {
    if let Some(v3) = &impact.base_metric_v3 {
        return CvssMetrics {
            version: CvssVersion::V3,
            attack_vector: v3.cvss_v3.attack_vector.clone(),
            attack_complexity: v3.cvss_v3.attack_complexity.clone(),
            privileges_required: v3.cvss_v3.privileges_required.clone(),
            user_interaction: v3.cvss_v3.user_interaction.clone(),
            scope: v3.cvss_v3.scope.clone(),
            confidentiality_impact: v3.cvss_v3.confidentiality_impact.clone(),
            integrity_impact: v3.cvss_v3.integrity_impact.clone(),
            availability_impact: v3.cvss_v3.availability_impact.clone(),
            base_score: Some(v3.cvss_v3.base_score),
            base_severity: v3.cvss_v3.base_severity.clone(),
            exploitability_score: v3.exploitability_score,
            impact_score: v3.impact_score,
        };
    }

    if let Some(v2) = &impact.base_metric_v2 {
        // v2 has no userInteraction metric; the sibling boolean flag stands
        // in for it. scope does not exist under v2 at all.
        let user_interaction = match v2.user_interaction_required {
            Some(true) => "Required".to_string(),
            Some(false) => "None".to_string(),
            None => "N/A".to_string(),
        };

        return CvssMetrics {
            version: CvssVersion::V2,
            attack_vector: v2.cvss_v2.access_vector.clone(),
            attack_complexity: v2.cvss_v2.access_complexity.clone(),
            privileges_required: v2.cvss_v2.authentication.clone(),
            user_interaction,
            scope: "N/A".to_string(),
            confidentiality_impact: v2.cvss_v2.confidentiality_impact.clone(),
            integrity_impact: v2.cvss_v2.integrity_impact.clone(),
            availability_impact: v2.cvss_v2.availability_impact.clone(),
            base_score: Some(v2.cvss_v2.base_score),
            base_severity: v2.severity.clone().unwrap_or_else(|| "N/A".to_string()),
            exploitability_score: v2.exploitability_score,
            impact_score: v2.impact_score,
        };
    }

    CvssMetrics::not_applicable()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn impact_from(value: serde_json::Value) -> ImpactBlock {
        serde_json::from_value(value).unwrap()
    }

    fn v3_block() -> serde_json::Value {
        json!({
            "cvssV3": {
                "attackVector": "NETWORK",
                "attackComplexity": "LOW",
                "privilegesRequired": "NONE",
                "userInteraction": "NONE",
                "scope": "UNCHANGED",
                "confidentialityImpact": "HIGH",
                "integrityImpact": "HIGH",
                "availabilityImpact": "HIGH",
                "baseScore": 9.8,
                "baseSeverity": "CRITICAL"
            },
            "exploitabilityScore": 3.9,
            "impactScore": 5.9
        })
    }

    fn v2_block(interaction_required: Option<bool>) -> serde_json::Value {
        let mut block = json!({
            "cvssV2": {
                "accessVector": "NETWORK",
                "accessComplexity": "MEDIUM",
                "authentication": "NONE",
                "confidentialityImpact": "PARTIAL",
                "integrityImpact": "PARTIAL",
                "availabilityImpact": "PARTIAL",
                "baseScore": 6.8
            },
            "severity": "MEDIUM",
            "exploitabilityScore": 8.6,
            "impactScore": 6.4
        });
        if let Some(required) = interaction_required {
            block["userInteractionRequired"] = json!(required);
        }
        block
    }

    #[test]
    fn test_prefers_v3_when_both_present() {
        let impact = impact_from(json!({
            "baseMetricV3": v3_block(),
            "baseMetricV2": v2_block(Some(true)),
        }));

        let metrics = extract_cvss(&impact);
        assert_eq!(metrics.version, CvssVersion::V3);
        assert_eq!(metrics.base_score, Some(9.8));
        assert_eq!(metrics.base_severity, "CRITICAL");
        assert_eq!(metrics.scope, "UNCHANGED");
        assert_eq!(metrics.user_interaction, "NONE");
    }

    #[test]
    fn test_v2_user_interaction_required() {
        let impact = impact_from(json!({ "baseMetricV2": v2_block(Some(true)) }));

        let metrics = extract_cvss(&impact);
        assert_eq!(metrics.version, CvssVersion::V2);
        assert_eq!(metrics.user_interaction, "Required");
        assert_eq!(metrics.scope, "N/A");
        assert_eq!(metrics.attack_vector, "NETWORK");
        assert_eq!(metrics.privileges_required, "NONE");
    }

    #[test]
    fn test_v2_user_interaction_not_required() {
        let impact = impact_from(json!({ "baseMetricV2": v2_block(Some(false)) }));

        let metrics = extract_cvss(&impact);
        assert_eq!(metrics.user_interaction, "None");
    }

    #[test]
    fn test_v2_user_interaction_flag_absent() {
        let impact = impact_from(json!({ "baseMetricV2": v2_block(None) }));

        let metrics = extract_cvss(&impact);
        assert_eq!(metrics.user_interaction, "N/A");
        assert_eq!(metrics.base_score, Some(6.8));
        assert_eq!(metrics.base_severity, "MEDIUM");
    }

    #[test]
    fn test_empty_impact_block_is_all_sentinel() {
        let metrics = extract_cvss(&ImpactBlock::default());
        assert_eq!(metrics.version, CvssVersion::NotApplicable);
        assert_eq!(metrics.attack_vector, "N/A");
        assert!(metrics.base_score.is_none());
        assert!(metrics.exploitability_score.is_none());
    }
}
