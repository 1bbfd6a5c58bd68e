//! ConfidenceValidator (§4.8.4): final gate on Bayesian confidence and
//! uncertainty before a plan is returned.

use crate::error::CoreError;
use crate::types::AgentId;

pub const CONFIDENCE_THRESHOLD: f64 = 0.3;
pub const UNCERTAINTY_THRESHOLD: f64 = 0.4;

/// If confidence/uncertainty are below threshold, either accept the
/// registry's fallback recommendation or raise `LowConfidence`.
pub fn validate(
    confidence: f64,
    uncertainty: f64,
    warnings: &[String],
    fallback_agents: &[AgentId],
) -> Result<Vec<AgentId>, CoreError> {
    let below_threshold = confidence < CONFIDENCE_THRESHOLD || uncertainty > UNCERTAINTY_THRESHOLD;
    if !below_threshold {
        return Ok(Vec::new());
    }

    if !fallback_agents.is_empty() {
        return Ok(fallback_agents.to_vec());
    }

    Err(CoreError::LowConfidence {
        confidence,
        warnings: warnings.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_above_threshold_passes_with_no_fallback() {
        let result = validate(0.8, 0.1, &[], &[]).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn low_confidence_with_fallback_returns_fallback_agents() {
        let fallback = vec!["the_researcher".to_string()];
        let result = validate(0.1, 0.1, &[], &fallback).unwrap();
        assert_eq!(result, fallback);
    }

    #[test]
    fn low_confidence_without_fallback_raises_error() {
        let result = validate(0.1, 0.1, &["no similar patterns".to_string()], &[]);
        assert!(matches!(result, Err(CoreError::LowConfidence { .. })));
    }
}
