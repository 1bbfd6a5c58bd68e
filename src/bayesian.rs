//! BayesianConfidenceEngine (§4.5): calibrated success probability,
//! confidence interval, and uncertainty for a candidate agent list.

use crate::types::AgentCapability;

/// 90% quantile z-score for a normal approximation to the posterior.
const Z_90: f64 = 1.645;
const MIN_SIMILAR_PATTERNS: usize = 3;
const STALE_HEALTH_THRESHOLD: f64 = 0.3;
const MIN_AGENT_EXECUTIONS: u64 = 5;
const BRIER_SHRINK_THRESHOLD: f64 = 0.25;

#[derive(Debug, Clone)]
pub struct ConfidenceResult {
    pub confidence: f64,
    pub confidence_interval: (f64, f64),
    pub uncertainty: f64,
    pub calibration_score: f64,
    pub warnings: Vec<String>,
}

/// Beta(alpha, beta) posterior mean and variance for one agent.
fn beta_moments(successes: u64, total: u64) -> (f64, f64) {
    let alpha = 1.0 + successes as f64;
    let beta = 1.0 + (total.saturating_sub(successes)) as f64;
    let mean = alpha / (alpha + beta);
    let variance = (alpha * beta) / ((alpha + beta).powi(2) * (alpha + beta + 1.0));
    (mean, variance)
}

/// §4.5 `calculateConfidence`. `conflict_free_probability` comes from the
/// ConflictDetector, `similar_pattern_count`/`pattern_health` from
/// PatternMemory+TemporalDecayEngine, `calibration` tracks running Brier.
pub fn calculate_confidence(
    agents: &[AgentCapability],
    conflict_free_probability: f64,
    similar_pattern_count: usize,
    pattern_health: f64,
    calibration: &Calibration,
) -> ConfidenceResult {
    let mut warnings = Vec::new();

    if agents.is_empty() {
        return ConfidenceResult {
            confidence: 0.0,
            confidence_interval: (0.0, 0.0),
            uncertainty: 0.0,
            calibration_score: calibration.score(),
            warnings: vec!["no candidate agents to score".to_string()],
        };
    }

    let mut joint_mean = conflict_free_probability.clamp(0.0, 1.0);
    let mut relative_variance_sum = 0.0;

    for agent in agents {
        let (mean, variance) = beta_moments(agent.successes, agent.total);
        joint_mean *= mean;
        if mean > 0.0 {
            relative_variance_sum += variance / (mean * mean);
        }
        if agent.total < MIN_AGENT_EXECUTIONS {
            warnings.push(format!("agent {} has fewer than {MIN_AGENT_EXECUTIONS} observed executions", agent.id));
        }
    }

    if similar_pattern_count < MIN_SIMILAR_PATTERNS {
        warnings.push(format!("fewer than {MIN_SIMILAR_PATTERNS} similar historical patterns found"));
    }
    if pattern_health < STALE_HEALTH_THRESHOLD {
        warnings.push("historical patterns for this context are mostly stale".to_string());
    }

    // Delta-method variance approximation for a product of independent
    // (approximately) random variables.
    let joint_variance = joint_mean.powi(2) * relative_variance_sum;
    let std = joint_variance.max(0.0).sqrt();

    let brier = calibration.score();
    let confidence = if brier > BRIER_SHRINK_THRESHOLD {
        let shrink = ((brier - BRIER_SHRINK_THRESHOLD) / (1.0 - BRIER_SHRINK_THRESHOLD)).clamp(0.0, 1.0);
        joint_mean + (0.5 - joint_mean) * shrink
    } else {
        joint_mean
    };

    let lo = (confidence - Z_90 * std).clamp(0.0, 1.0);
    let hi = (confidence + Z_90 * std).clamp(0.0, 1.0);

    ConfidenceResult {
        confidence: confidence.clamp(0.0, 1.0),
        confidence_interval: (lo, hi),
        uncertainty: (hi - lo) / 2.0,
        calibration_score: brier,
        warnings,
    }
}

/// Running Brier-score calibration tracker (§4.11 step 3).
#[derive(Debug, Clone, Default)]
pub struct Calibration {
    sum_squared_error: f64,
    count: u64,
}

impl Calibration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, predicted_confidence: f64, actual_success: bool) {
        let outcome = if actual_success { 1.0 } else { 0.0 };
        self.sum_squared_error += (predicted_confidence - outcome).powi(2);
        self.count += 1;
    }

    /// Brier score: mean squared error between predicted confidence and
    /// observed outcome. 0 = perfectly calibrated, 1 = worst possible.
    pub fn score(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_squared_error / self.count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(successes: u64, total: u64) -> AgentCapability {
        let mut cap = AgentCapability::new("agent", "test");
        cap.successes = successes;
        cap.total = total;
        cap
    }

    #[test]
    fn well_performing_agents_yield_high_confidence() {
        let agents = vec![agent(95, 100), agent(90, 100)];
        let calibration = Calibration::new();
        let result = calculate_confidence(&agents, 0.95, 10, 0.8, &calibration);
        assert!(result.confidence > 0.6);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn new_agents_with_no_history_warn_and_score_near_prior() {
        let agents = vec![agent(0, 0)];
        let calibration = Calibration::new();
        let result = calculate_confidence(&agents, 1.0, 0, 0.1, &calibration);
        assert!(!result.warnings.is_empty());
        assert!((result.confidence - 0.5).abs() < 0.2);
    }

    #[test]
    fn poor_calibration_shrinks_confidence_toward_half() {
        let agents = vec![agent(95, 100)];
        let mut calibration = Calibration::new();
        for _ in 0..10 {
            calibration.record(0.95, false);
        }
        assert!(calibration.score() > BRIER_SHRINK_THRESHOLD);

        let result = calculate_confidence(&agents, 1.0, 10, 0.9, &calibration);
        assert!(result.confidence < 0.95);
    }

    #[test]
    fn empty_agent_list_yields_zero_confidence_with_warning() {
        let calibration = Calibration::new();
        let result = calculate_confidence(&[], 1.0, 0, 0.0, &calibration);
        assert_eq!(result.confidence, 0.0);
        assert!(!result.warnings.is_empty());
    }
}
