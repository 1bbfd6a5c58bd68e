//! ParetoOptimizer (§4.7): computes the Pareto frontier across accuracy,
//! cost, and latency for a set of candidate agent lists, and a recommended
//! pick from a learned weight vector updated by gradient step on observed
//! utility.

#[derive(Debug, Clone)]
pub struct Candidate<T> {
    pub plan: T,
    pub accuracy: f64,
    pub estimated_tokens: u64,
    pub estimated_duration_ms: u64,
}

/// Weights for (accuracy, cost, latency), always clamped to sum to 1 (§4.7).
#[derive(Debug, Clone, Copy)]
pub struct Weights {
    pub accuracy: f64,
    pub cost: f64,
    pub latency: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self { accuracy: 0.6, cost: 0.2, latency: 0.2 }
    }
}

impl Weights {
    fn normalize(mut self) -> Self {
        let sum = self.accuracy + self.cost + self.latency;
        if sum > 0.0 {
            self.accuracy /= sum;
            self.cost /= sum;
            self.latency /= sum;
        } else {
            self = Self::default();
        }
        self
    }

    /// Gradient step toward observed post-hoc utility (§4.11 step 7).
    pub fn gradient_step(self, observed_utility: (f64, f64, f64), learning_rate: f64) -> Self {
        let (acc_signal, cost_signal, latency_signal) = observed_utility;
        Weights {
            accuracy: self.accuracy + learning_rate * acc_signal,
            cost: self.cost + learning_rate * cost_signal,
            latency: self.latency + learning_rate * latency_signal,
        }
        .clamp_nonnegative()
        .normalize()
    }

    fn clamp_nonnegative(mut self) -> Self {
        self.accuracy = self.accuracy.max(0.0);
        self.cost = self.cost.max(0.0);
        self.latency = self.latency.max(0.0);
        self
    }
}

fn dominates<T>(a: &Candidate<T>, b: &Candidate<T>) -> bool {
    let a_cost = -(a.estimated_tokens as f64);
    let b_cost = -(b.estimated_tokens as f64);
    let a_latency = -(a.estimated_duration_ms as f64);
    let b_latency = -(b.estimated_duration_ms as f64);

    let at_least_as_good = a.accuracy >= b.accuracy && a_cost >= b_cost && a_latency >= b_latency;
    let strictly_better = a.accuracy > b.accuracy || a_cost > b_cost || a_latency > b_latency;
    at_least_as_good && strictly_better
}

/// Drops dominated candidates, returning the Pareto frontier.
pub fn frontier<T: Clone>(candidates: Vec<Candidate<T>>) -> Vec<Candidate<T>> {
    candidates
        .iter()
        .enumerate()
        .filter(|(i, c)| !candidates.iter().enumerate().any(|(j, other)| *i != j && dominates(other, c)))
        .map(|(_, c)| c.clone())
        .collect()
}

fn score<T>(candidate: &Candidate<T>, weights: Weights, max_tokens: f64, max_duration: f64) -> f64 {
    let normalized_cost = if max_tokens > 0.0 { 1.0 - candidate.estimated_tokens as f64 / max_tokens } else { 1.0 };
    let normalized_latency = if max_duration > 0.0 { 1.0 - candidate.estimated_duration_ms as f64 / max_duration } else { 1.0 };
    weights.accuracy * candidate.accuracy + weights.cost * normalized_cost + weights.latency * normalized_latency
}

/// Recommends the frontier member with the highest weighted score.
pub fn recommend<T: Clone>(candidates: Vec<Candidate<T>>, weights: Weights) -> Option<Candidate<T>> {
    let frontier = frontier(candidates);
    if frontier.is_empty() {
        return None;
    }
    let max_tokens = frontier.iter().map(|c| c.estimated_tokens).max().unwrap_or(1) as f64;
    let max_duration = frontier.iter().map(|c| c.estimated_duration_ms).max().unwrap_or(1) as f64;

    frontier
        .into_iter()
        .max_by(|a, b| {
            score(a, weights, max_tokens, max_duration)
                .partial_cmp(&score(b, weights, max_tokens, max_duration))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(label: &'static str, accuracy: f64, tokens: u64, duration: u64) -> Candidate<&'static str> {
        Candidate { plan: label, accuracy, estimated_tokens: tokens, estimated_duration_ms: duration }
    }

    #[test]
    fn dominated_candidate_is_dropped_from_frontier() {
        let candidates = vec![
            candidate("best", 0.9, 100, 100),
            candidate("worse", 0.8, 200, 200),
        ];
        let result = frontier(candidates);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].plan, "best");
    }

    #[test]
    fn tradeoff_candidates_both_survive() {
        let candidates = vec![
            candidate("accurate", 0.95, 500, 500),
            candidate("cheap", 0.7, 100, 100),
        ];
        let result = frontier(candidates);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn weights_always_sum_to_one_after_gradient_step() {
        let weights = Weights::default().gradient_step((0.3, -0.1, 0.05), 0.1);
        let sum = weights.accuracy + weights.cost + weights.latency;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn recommend_prefers_accuracy_under_default_weights() {
        let candidates = vec![
            candidate("accurate", 0.95, 500, 500),
            candidate("cheap", 0.5, 100, 100),
        ];
        let picked = recommend(candidates, Weights::default()).unwrap();
        assert_eq!(picked.plan, "accurate");
    }
}
