//! Vendor impact vocabularies.
//!
//! Each vendor phrases impact categories differently; these total functions
//! map the free-text phrases onto one controlled vocabulary. Anything
//! unrecognized maps to [`OTHER`] rather than failing.

/// Default bucket for unmapped impact phrases.
pub const OTHER: &str = "other";

/// Map a Microsoft threat description onto the controlled vocabulary.
pub fn microsoft_impact(phrase: &str) -> &'static str {
    match phrase {
        "Remote Code Execution" => "code_execution",
        "Elevation of Privilege" => "privilege_escalation",
        "Information Disclosure" => "information_disclosure",
        "Denial of Service" => "denial_of_service",
        "Security Feature Bypass" => "security_bypass",
        "Spoofing" => "spoofing",
        "Tampering" => "tampering",
        _ => OTHER,
    }
}

/// Map an Intel advisory impact phrase onto the controlled vocabulary.
pub fn intel_impact(phrase: &str) -> &'static str {
    match phrase {
        "Escalation of Privilege" => "privilege_escalation",
        "Denial of Service" => "denial_of_service",
        "Information Disclosure" => "information_disclosure",
        _ => OTHER,
    }
}

/// Map an Adobe bulletin impact phrase onto the controlled vocabulary.
pub fn adobe_impact(phrase: &str) -> &'static str {
    match phrase {
        "Arbitrary code execution" | "Arbitrary Code Execution" => "code_execution",
        "Privilege escalation" | "Privilege Escalation" => "privilege_escalation",
        "Information disclosure" | "Information Disclosure" => "information_disclosure",
        "Memory leak" | "Memory Leak" => "information_disclosure",
        "Security feature bypass" | "Security Feature Bypass" => "security_bypass",
        "Application denial-of-service" | "Denial of service" => "denial_of_service",
        _ => OTHER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_microsoft_known_phrases() {
        assert_eq!(microsoft_impact("Remote Code Execution"), "code_execution");
        assert_eq!(
            microsoft_impact("Elevation of Privilege"),
            "privilege_escalation"
        );
        assert_eq!(microsoft_impact("Denial of Service"), "denial_of_service");
    }

    #[test]
    fn test_intel_known_phrases() {
        assert_eq!(intel_impact("Escalation of Privilege"), "privilege_escalation");
        assert_eq!(intel_impact("Information Disclosure"), "information_disclosure");
    }

    #[test]
    fn test_adobe_case_variants() {
        assert_eq!(adobe_impact("Arbitrary code execution"), "code_execution");
        assert_eq!(adobe_impact("Arbitrary Code Execution"), "code_execution");
        assert_eq!(adobe_impact("Memory leak"), "information_disclosure");
    }

    #[test]
    fn test_unmapped_phrases_default_to_other() {
        assert_eq!(microsoft_impact("Quantum Entanglement"), OTHER);
        assert_eq!(intel_impact(""), OTHER);
        assert_eq!(adobe_impact("Something new"), OTHER);
    }
}
