//! CWE flattening.
//!
//! NVD records list weaknesses under `problemtype.problemtype_data[].description[]`.
//! All identifiers across all descriptions collapse into one deduplicated set.

use serde::Deserialize;
use std::collections::BTreeSet;

/// The `problemtype` block of an NVD 1.1 record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProblemType {
    #[serde(default)]
    pub problemtype_data: Vec<ProblemTypeData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProblemTypeData {
    #[serde(default)]
    pub description: Vec<WeaknessDescription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeaknessDescription {
    pub value: String,
}

/// Flatten all weakness identifiers across all problem-type descriptions.
pub fn extract_cwe(problem_type: &ProblemType) -> BTreeSet<String> {
    problem_type
        .problemtype_data
        .iter()
        .flat_map(|data| data.description.iter())
        .map(|desc| desc.value.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flattens_across_descriptions() {
        let problem_type: ProblemType = serde_json::from_value(json!({
            "problemtype_data": [
                { "description": [ { "lang": "en", "value": "CWE-79" } ] },
                { "description": [ { "lang": "en", "value": "CWE-89" }, { "lang": "en", "value": "CWE-79" } ] }
            ]
        }))
        .unwrap();

        let cwes = extract_cwe(&problem_type);
        assert_eq!(cwes, BTreeSet::from(["CWE-79".to_string(), "CWE-89".to_string()]));
    }

    #[test]
    fn test_empty_problem_type() {
        let cwes = extract_cwe(&ProblemType::default());
        assert!(cwes.is_empty());
    }
}
