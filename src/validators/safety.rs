//! SafetyValidator (§4.8.1): scans an objective for destructive intent.
//!
//! Modeled directly on `safety::content_filter::ContentFilter`'s
//! regex-table-plus-severity shape.

use regex::Regex;

use crate::types::{SafetyVerdict, ThreatLevel};

struct ThreatPattern {
    regex: &'static Regex,
    description: &'static str,
    threat_level: ThreatLevel,
    recommendation: &'static str,
}

lazy_static::lazy_static! {
    static ref MASS_DELETE: Regex = Regex::new(r"(?i)delete\s+all.*(production|prod)\s+data").unwrap();
    static ref DROP_DATABASE: Regex = Regex::new(r"(?i)drop\s+(database|schema|table)\s+\w*\s*(production|prod)?").unwrap();
    static ref DISABLE_AUDIT: Regex = Regex::new(r"(?i)disable\s+(audit|logging|monitoring)").unwrap();
    static ref CREDENTIAL_EXFIL: Regex = Regex::new(r"(?i)(exfiltrate|dump|leak|steal)\s+(credentials|secrets|api\s*keys|passwords)").unwrap();
    static ref PROD_EXEC: Regex = Regex::new(r"(?i)(arbitrary|unrestricted)\s+(exec|execute|shell)\s+.*(production|prod)").unwrap();
    static ref RM_RF: Regex = Regex::new(r"(?i)rm\s+-rf\s+/").unwrap();
    static ref BYPASS_AUTH: Regex = Regex::new(r"(?i)bypass\s+(auth|authentication|authorization)").unwrap();
}

fn threat_table() -> [ThreatPattern; 7] {
    [
        ThreatPattern {
            regex: &MASS_DELETE,
            description: "objective requests mass deletion of production data",
            threat_level: ThreatLevel::Critical,
            recommendation: "require explicit human confirmation and a scoped backup before any deletion",
        },
        ThreatPattern {
            regex: &DROP_DATABASE,
            description: "objective requests dropping a database or table",
            threat_level: ThreatLevel::Critical,
            recommendation: "require a reviewed migration plan instead of a destructive drop",
        },
        ThreatPattern {
            regex: &DISABLE_AUDIT,
            description: "objective requests disabling audit or monitoring",
            threat_level: ThreatLevel::High,
            recommendation: "keep audit logging enabled; scope the change to a non-production environment",
        },
        ThreatPattern {
            regex: &CREDENTIAL_EXFIL,
            description: "objective requests exfiltrating credentials or secrets",
            threat_level: ThreatLevel::Critical,
            recommendation: "refuse; route to a security review",
        },
        ThreatPattern {
            regex: &PROD_EXEC,
            description: "objective requests arbitrary execution against production",
            threat_level: ThreatLevel::High,
            recommendation: "require a sandboxed or staging target",
        },
        ThreatPattern {
            regex: &RM_RF,
            description: "objective contains a recursive root delete command",
            threat_level: ThreatLevel::High,
            recommendation: "scope the delete to a specific, reviewed path",
        },
        ThreatPattern {
            regex: &BYPASS_AUTH,
            description: "objective requests bypassing authentication",
            threat_level: ThreatLevel::Medium,
            recommendation: "keep authentication in place; clarify the actual access need",
        },
    ]
}

/// §4.8.1 `SafetyValidator`.
pub fn check(objective: &str) -> SafetyVerdict {
    let mut threats = Vec::new();
    let mut recommendations = Vec::new();
    let mut worst = ThreatLevel::None;

    for pattern in threat_table() {
        if pattern.regex.is_match(objective) {
            threats.push(pattern.description.to_string());
            recommendations.push(pattern.recommendation.to_string());
            worst = worst.max(pattern.threat_level);
        }
    }

    SafetyVerdict {
        threat_level: worst,
        threats,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benign_objective_is_not_blocked() {
        let verdict = check("Write a haiku about autumn leaves.");
        assert_eq!(verdict.threat_level, ThreatLevel::None);
        assert!(!verdict.should_block());
    }

    #[test]
    fn mass_delete_and_disable_audit_blocks() {
        let verdict = check("Delete all production data and disable audit logs");
        assert!(verdict.should_block());
        assert_eq!(verdict.threat_level, ThreatLevel::Critical);
        assert!(verdict.threats.len() >= 2);
    }

    #[test]
    fn disable_audit_alone_is_high_not_critical() {
        let verdict = check("disable audit logging on the staging cluster");
        assert_eq!(verdict.threat_level, ThreatLevel::High);
        assert!(verdict.should_block());
    }
}
