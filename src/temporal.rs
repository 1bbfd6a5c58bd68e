//! TemporalDecayEngine (§4.4): attaches a temporal relevance to patterns
//! based on domain-specific half-lives, pure functions operating on owned
//! data per §9.

use chrono::{DateTime, Utc};

use crate::types::Domain;

/// Half-lives in days, keyed by domain (§4.4).
fn half_life_days(domain: Domain) -> f64 {
    match domain {
        Domain::Infrastructure => 45.0,
        Domain::Security => 60.0,
        Domain::Testing => 90.0,
        Domain::Code => 180.0,
        Domain::Architecture => 365.0,
        Domain::Documentation => 365.0,
        Domain::Data => 180.0,
        Domain::UiUx => 120.0,
        Domain::Research => 180.0,
        Domain::Creative => 730.0,
    }
}

/// Relevance = 0.5 ^ ((now − timestamp) / half_life).
pub fn relevance(domain: Domain, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - timestamp).num_seconds() as f64 / 86_400.0;
    let half_life = half_life_days(domain);
    0.5_f64.powf(age_days.max(0.0) / half_life)
}

#[derive(Debug, Clone, Copy)]
pub struct Health {
    pub health_score: f64,
    pub fresh: usize,
    pub stale: usize,
}

/// §4.4 `enrich`: attaches relevance to each (domain, timestamp) pair.
pub fn enrich(entries: &[(Domain, DateTime<Utc>)], now: DateTime<Utc>) -> Vec<f64> {
    entries.iter().map(|(domain, ts)| relevance(*domain, *ts, now)).collect()
}

/// §4.4 `calculateHealth`.
pub fn calculate_health(relevances: &[f64]) -> Health {
    if relevances.is_empty() {
        return Health { health_score: 0.0, fresh: 0, stale: 0 };
    }
    let fresh = relevances.iter().filter(|r| **r >= 0.5).count();
    let stale = relevances.iter().filter(|r| **r < 0.2).count();
    let health_score = relevances.iter().sum::<f64>() / relevances.len() as f64;
    Health { health_score, fresh, stale }
}

/// Relevance below 0.2 is dropped before the Bayesian engine consumes
/// similar-pattern candidates (§4.9 step 6c).
pub fn is_stale(relevance: f64) -> bool {
    relevance < 0.2
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn relevance_is_one_at_zero_age() {
        let now = Utc::now();
        assert!((relevance(Domain::Infrastructure, now, now) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn relevance_halves_at_domain_half_life() {
        let now = Utc::now();
        let ts = now - Duration::days(45);
        let r = relevance(Domain::Infrastructure, ts, now);
        assert!((r - 0.5).abs() < 0.01);
    }

    #[test]
    fn creative_patterns_decay_much_slower_than_infrastructure() {
        let now = Utc::now();
        let ts = now - Duration::days(45);
        let infra = relevance(Domain::Infrastructure, ts, now);
        let creative = relevance(Domain::Creative, ts, now);
        assert!(creative > infra);
    }

    #[test]
    fn health_classifies_fresh_and_stale() {
        let health = calculate_health(&[0.9, 0.5, 0.1, 0.05]);
        assert_eq!(health.fresh, 2);
        assert_eq!(health.stale, 2);
    }
}
