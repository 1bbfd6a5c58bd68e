//! 12-dimensional feature extraction for [`super::PatternMemory`] (§4.3).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::Timelike;

use crate::types::{Complexity, Domain, ExecutionPattern, Intent, TaskType};

pub const FEATURE_DIMS: usize = 12;

fn hash_bucket(s: &str, buckets: u64) -> f64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    (hasher.finish() % buckets) as f64 / buckets as f64
}

fn intent_scalar(intent: Intent) -> f64 {
    let ordinal = match intent {
        Intent::Deploy => 0,
        Intent::CreateNew => 1,
        Intent::Investigate => 2,
        Intent::Validate => 3,
        Intent::FixIssue => 4,
        Intent::ModifyExisting => 5,
        Intent::Document => 6,
        Intent::Optimize => 7,
        Intent::Design => 8,
    };
    ordinal as f64 / 8.0
}

fn domain_scalar(domain: Domain) -> f64 {
    let ordinal = match domain {
        Domain::Creative => 0,
        Domain::Security => 1,
        Domain::Infrastructure => 2,
        Domain::Testing => 3,
        Domain::UiUx => 4,
        Domain::Data => 5,
        Domain::Documentation => 6,
        Domain::Architecture => 7,
        Domain::Research => 8,
        Domain::Code => 9,
    };
    ordinal as f64 / 9.0
}

fn task_type_scalar(task_type: TaskType) -> f64 {
    let ordinal = match task_type {
        TaskType::Creative => 0,
        TaskType::Communicative => 1,
        TaskType::Analytical => 2,
        TaskType::Operational => 3,
        TaskType::Technical => 4,
    };
    ordinal as f64 / 4.0
}

fn complexity_scalar(complexity: Complexity) -> f64 {
    match complexity {
        Complexity::Simple => 0.0,
        Complexity::Moderate => 0.5,
        Complexity::Complex => 1.0,
    }
}

/// Builds the 12-dim feature vector for an `ExecutionPattern`, given the
/// analysis that was derived from its objective at insertion time.
pub fn extract(
    pattern: &ExecutionPattern,
    intent: Intent,
    domain: Domain,
    task_type: TaskType,
    complexity: Complexity,
) -> [f64; FEATURE_DIMS] {
    let len_bucket = (pattern.objective.split_whitespace().count() as f64 / 50.0).min(1.0);
    let agents_bucket = (pattern.agents_used.len() as f64 / 10.0).min(1.0);
    let success = if pattern.success { 1.0 } else { 0.0 };
    let duration_bucket = (pattern.total_duration_ms as f64 / 600_000.0).min(1.0);
    let token_bucket = (pattern.total_tokens as f64 / 50_000.0).min(1.0);
    let project_bucket = hash_bucket(&pattern.project_context, 64);
    let tag_bucket = hash_bucket(&pattern.tags.join(","), 64);
    let hour_norm = pattern.timestamp.hour() as f64 / 24.0;

    [
        len_bucket,
        intent_scalar(intent),
        domain_scalar(domain),
        task_type_scalar(task_type),
        complexity_scalar(complexity),
        agents_bucket,
        success,
        duration_bucket,
        token_bucket,
        project_bucket,
        tag_bucket,
        hour_norm,
    ]
}

/// Builds a query vector for an objective that hasn't executed yet (§4.9
/// step 4's pattern-reuse lookup), using the same projections as `extract`
/// but with the execution-only dimensions (agents/success/duration/tokens)
/// left at zero since no run has happened.
pub fn extract_for_query(
    objective: &str,
    project_context: &str,
    tags: &[String],
    intent: Intent,
    domain: Domain,
    task_type: TaskType,
    complexity: Complexity,
    now: chrono::DateTime<chrono::Utc>,
) -> [f64; FEATURE_DIMS] {
    let len_bucket = (objective.split_whitespace().count() as f64 / 50.0).min(1.0);
    let project_bucket = hash_bucket(project_context, 64);
    let tag_bucket = hash_bucket(&tags.join(","), 64);
    let hour_norm = now.hour() as f64 / 24.0;

    [
        len_bucket,
        intent_scalar(intent),
        domain_scalar(domain),
        task_type_scalar(task_type),
        complexity_scalar(complexity),
        0.0,
        0.0,
        0.0,
        0.0,
        project_bucket,
        tag_bucket,
        hour_norm,
    ]
}

pub fn cosine(a: &[f64; FEATURE_DIMS], b: &[f64; FEATURE_DIMS]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

/// Dims 6-9 (agents used, success, duration, tokens): set by `extract` from
/// a completed run but always left at zero by `extract_for_query`, since an
/// objective that hasn't executed yet can't know them.
const EXECUTION_ONLY_DIMS: [usize; 4] = [5, 6, 7, 8];

/// Cosine similarity restricted to the semantic/context dimensions (length,
/// intent, domain, task_type, complexity, project, tag, hour-of-day).
/// `find_similar` always compares a not-yet-executed query vector against
/// stored pattern vectors, so the execution-only dims would otherwise just
/// dilute the score with a guaranteed mismatch; the outcome's own success is
/// folded back in separately via the `0.5 + 0.5 * success_indicator` weight.
pub fn cosine_semantic(a: &[f64; FEATURE_DIMS], b: &[f64; FEATURE_DIMS]) -> f64 {
    let mask = |v: &[f64; FEATURE_DIMS]| {
        let mut out = *v;
        for &i in &EXECUTION_ONLY_DIMS {
            out[i] = 0.0;
        }
        out
    };
    cosine(&mask(a), &mask(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_cosine_one() {
        let v = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0, 0.1, 0.2];
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_vector_has_zero_cosine() {
        let zero = [0.0; FEATURE_DIMS];
        let v = [0.1; FEATURE_DIMS];
        assert_eq!(cosine(&zero, &v), 0.0);
    }
}
