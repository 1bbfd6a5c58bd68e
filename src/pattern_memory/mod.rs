//! PatternMemory (§4.3): stores every completed [`ExecutionPattern`] and
//! supports kNN retrieval over a 12-dim feature vector, with rolling-window
//! aggregates and failure-chain detection.
//!
//! Grounded on `memory::indexer::CodebaseIndexer`'s `Arc<RwLock<..>>`
//! incremental index shape; cosine similarity reuses the normalize/
//! dot-product idiom of `memory::vector::VectorMemory`.

pub mod feature;
pub mod kdtree;

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::types::{
    AggregateStats, Complexity, Domain, ExecutionPattern, FailureContext, Intent, PatternMatch, TaskType,
};
use feature::FEATURE_DIMS;
use kdtree::KdTree;

const ROLLING_WINDOW_DAYS: i64 = 7;
const SOFT_CAP: usize = 10_000;
const EVICTION_REBUILD_FRACTION: f64 = 0.10;
const SIMILARITY_THRESHOLD: f64 = 0.3;
const FAILURE_CHAIN_LOOKBACK: usize = 5;
const FAILURE_CHAIN_MIN_SHARED: usize = 3;
const FAILURE_CHAIN_WINDOW_MINUTES: i64 = 60;

struct Inner {
    patterns: HashMap<String, ExecutionPattern>,
    /// Insertion order, oldest first — mirrors the id-keyed map per §3.
    order: Vec<String>,
    tree: KdTree,
    /// Feature vectors kept alongside the map so an eviction-triggered
    /// rebuild has real coordinates for every survivor, not just its id.
    vectors: HashMap<String, [f64; FEATURE_DIMS]>,
    stats: AggregateStats,
}

/// Process-wide singleton (§5) guarded by a single `RwLock`.
pub struct PatternMemory {
    inner: RwLock<Inner>,
}

impl Default for PatternMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternMemory {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                patterns: HashMap::new(),
                order: Vec::new(),
                tree: KdTree::new(),
                vectors: HashMap::new(),
                stats: AggregateStats::default(),
            }),
        }
    }

    /// §4.3 `record`: insert into both the KD-tree and the id-map, then
    /// update aggregates incrementally; lazily evict patterns aged past the
    /// rolling window.
    pub async fn record(&self, mut pattern: ExecutionPattern, intent: Intent, domain: Domain, task_type: TaskType, complexity: Complexity) {
        let mut inner = self.inner.write().await;

        if !pattern.success {
            if let Some(chain_id) = Self::tag_failure_chain(&inner, &pattern) {
                debug!(
                    "failure chain {} detected in project {}",
                    chain_id, pattern.project_context
                );
                pattern.failure_chain_id = Some(chain_id.clone());
                for id in inner.order.iter().rev().take(FAILURE_CHAIN_LOOKBACK) {
                    if let Some(prior) = inner.patterns.get_mut(id) {
                        if !prior.success
                            && prior.project_context == pattern.project_context
                            && prior.agents_used.last() == pattern.agents_used.last()
                        {
                            prior.failure_chain_id.get_or_insert_with(|| chain_id.clone());
                        }
                    }
                }
            }
        }

        let vector = feature::extract(&pattern, intent, domain, task_type, complexity);
        let id = pattern.id.clone();

        inner.tree.insert(id.clone(), vector);
        inner.vectors.insert(id.clone(), vector);
        inner.order.push(id.clone());
        inner.patterns.insert(id, pattern);

        Self::update_aggregates(&mut inner);
        Self::maybe_evict(&mut inner);

        debug_assert_eq!(inner.tree.len(), inner.patterns.len(), "KD-tree/id-map must stay consistent");
    }

    /// Returns a fresh `failure_chain_id` when this failure joins a run of
    /// `FAILURE_CHAIN_MIN_SHARED` same-agent failures in the same project
    /// within `FAILURE_CHAIN_WINDOW_MINUTES`.
    fn tag_failure_chain(inner: &Inner, pattern: &ExecutionPattern) -> Option<String> {
        let window_start = pattern.timestamp - ChronoDuration::minutes(FAILURE_CHAIN_WINDOW_MINUTES);
        let candidates: Vec<&ExecutionPattern> = inner
            .order
            .iter()
            .rev()
            .take(FAILURE_CHAIN_LOOKBACK)
            .filter_map(|id| inner.patterns.get(id))
            .filter(|p| {
                p.project_context == pattern.project_context
                    && !p.success
                    && p.timestamp >= window_start
            })
            .collect();

        let failed_agent = pattern.agents_used.last();
        let shared = failed_agent
            .map(|agent| candidates.iter().filter(|p| p.agents_used.last() == Some(agent)).count())
            .unwrap_or(0);

        if shared + 1 >= FAILURE_CHAIN_MIN_SHARED {
            let existing = failed_agent.and_then(|agent| {
                candidates
                    .iter()
                    .filter(|p| p.agents_used.last() == Some(agent))
                    .find_map(|p| p.failure_chain_id.clone())
            });
            Some(existing.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()))
        } else {
            None
        }
    }

    fn update_aggregates(inner: &mut Inner) {
        let window_start = Utc::now() - ChronoDuration::days(ROLLING_WINDOW_DAYS);
        let windowed: Vec<&ExecutionPattern> = inner
            .patterns
            .values()
            .filter(|p| p.timestamp >= window_start)
            .collect();

        let total = windowed.len() as u64;
        let successes = windowed.iter().filter(|p| p.success).count() as f64;
        let mut agent_usage = HashMap::new();
        let mut hourly_success = [(0.0_f64, 0u64); 24];
        let mut total_duration = 0.0;
        let mut total_tokens = 0.0;

        for p in &windowed {
            for agent in &p.agents_used {
                *agent_usage.entry(agent.clone()).or_insert(0u64) += 1;
            }
            total_duration += p.total_duration_ms as f64;
            total_tokens += p.total_tokens as f64;
            let hour = chrono::Timelike::hour(&p.timestamp) as usize;
            hourly_success[hour].1 += 1;
            if p.success {
                hourly_success[hour].0 += 1.0;
            }
        }

        let mut error_frequency = HashMap::new();
        for p in &windowed {
            if let Some(reason) = &p.failure_reason {
                let category = crate::validators::error_category::classify(reason);
                *error_frequency.entry(category).or_insert(0u64) += 1;
            }
        }

        let hourly_success_rate = std::array::from_fn(|i| {
            let (s, n) = hourly_success[i];
            if n > 0 {
                s / n as f64
            } else {
                0.0
            }
        });

        inner.stats = AggregateStats {
            total_executions: total,
            success_rate: if total > 0 { successes / total as f64 } else { 0.0 },
            avg_duration_ms: if total > 0 { total_duration / total as f64 } else { 0.0 },
            avg_tokens: if total > 0 { total_tokens / total as f64 } else { 0.0 },
            agent_usage,
            error_frequency,
            hourly_success_rate,
        };
    }

    fn maybe_evict(inner: &mut Inner) {
        if inner.patterns.len() <= SOFT_CAP {
            return;
        }
        let window_start = Utc::now() - ChronoDuration::days(ROLLING_WINDOW_DAYS);
        let before = inner.patterns.len();
        let evicted: Vec<String> = inner
            .patterns
            .iter()
            .filter(|(_, p)| p.timestamp < window_start)
            .map(|(id, _)| id.clone())
            .collect();

        if evicted.is_empty() {
            return;
        }

        Self::update_aggregates(inner);

        for id in &evicted {
            inner.patterns.remove(id);
            inner.vectors.remove(id);
        }
        inner.order.retain(|id| !evicted.contains(id));

        let evicted_fraction = evicted.len() as f64 / before as f64;
        if evicted_fraction >= EVICTION_REBUILD_FRACTION {
            warn!("rebuilding pattern KD-tree after evicting {} of {} patterns", evicted.len(), before);
            let points: Vec<(String, [f64; FEATURE_DIMS])> = inner
                .order
                .iter()
                .filter_map(|id| inner.vectors.get(id).map(|v| (id.clone(), *v)))
                .collect();
            inner.tree = KdTree::rebuild(points);
        }
    }

    /// §4.3 `findSimilar`.
    pub async fn find_similar(&self, target_vector: [f64; FEATURE_DIMS], k: usize) -> Vec<PatternMatch> {
        let inner = self.inner.read().await;
        let neighbors = inner.tree.knn(&target_vector, k.max(1) * 2);

        let mut matches: Vec<PatternMatch> = neighbors
            .into_iter()
            .filter_map(|(id, _sq_dist)| {
                let pattern = inner.patterns.get(&id)?.clone();
                let vector = inner.vectors.get(&id).copied().unwrap_or_else(|| {
                    feature::extract(&pattern, Intent::Investigate, pattern.objective_type, TaskType::Analytical, Complexity::Moderate)
                });
                Some((pattern, vector))
            })
            .map(|(pattern, vector)| {
                let cos = feature::cosine_semantic(&target_vector, &vector);
                let success_indicator = if pattern.success { 1.0 } else { 0.0 };
                let similarity_score = cos * (0.5 + 0.5 * success_indicator);
                PatternMatch { pattern, similarity_score }
            })
            .filter(|m| m.similarity_score >= SIMILARITY_THRESHOLD)
            .collect();

        matches.sort_by(|a, b| b.similarity_score.partial_cmp(&a.similarity_score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(k);
        matches
    }

    pub async fn get_aggregate_stats(&self) -> AggregateStats {
        self.inner.read().await.stats.clone()
    }

    pub async fn get_recent_failures(&self, k: usize) -> Vec<FailureContext> {
        let inner = self.inner.read().await;
        let mut failures: Vec<&ExecutionPattern> = inner.patterns.values().filter(|p| !p.success).collect();
        failures.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        failures
            .into_iter()
            .take(k)
            .map(|p| FailureContext {
                pattern_id: p.id.clone(),
                objective: p.objective.clone(),
                failed_agent: p.agents_used.last().cloned().unwrap_or_default(),
                error_message: p.failure_reason.clone().unwrap_or_default(),
                error_category: crate::validators::error_category::classify(p.failure_reason.as_deref().unwrap_or("")),
                error_severity: crate::validators::error_category::severity(
                    crate::validators::error_category::classify(p.failure_reason.as_deref().unwrap_or("")),
                    p.failure_reason.as_deref().unwrap_or(""),
                ),
                error_domain: p.objective_type,
                preceding_agents: p.agents_used.clone(),
                recovery_strategy: crate::validators::error_category::recovery_strategy(
                    crate::validators::error_category::classify(p.failure_reason.as_deref().unwrap_or("")),
                    p.failure_reason.as_deref().unwrap_or(""),
                ),
                is_recoverable: crate::validators::error_category::is_recoverable(
                    crate::validators::error_category::classify(p.failure_reason.as_deref().unwrap_or("")),
                ),
                learned_avoidance_rule: None,
                timestamp: p.timestamp,
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.patterns.len()
    }

    pub async fn tree_len(&self) -> usize {
        self.inner.read().await.tree.len()
    }

    /// Seeds ~100 synthetic bootstrap patterns (§3); flagged `synthetic` so
    /// they never participate in persistence.
    pub async fn seed_synthetic(&self, patterns: Vec<(ExecutionPattern, Intent, Domain, TaskType, Complexity)>) {
        for (mut pattern, intent, domain, task_type, complexity) in patterns {
            pattern.synthetic = true;
            self.record(pattern, intent, domain, task_type, complexity).await;
        }
    }

    pub async fn timestamp_of(&self, id: &str) -> Option<DateTime<Utc>> {
        self.inner.read().await.patterns.get(id).map(|p| p.timestamp)
    }
}
