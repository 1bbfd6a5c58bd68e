//! FeedbackLoop (§4.11): the single write path into every learning
//! subsystem once a plan has finished executing. Submission is a fast,
//! synchronous hand-off; the eight learning steps run on a bounded pool of
//! spawned tasks so a slow external sync never blocks the next submission.
//!
//! Grounded on `orchestrator::supervisor::Supervisor`'s
//! `concurrency_limit: Arc<Semaphore>` + `tokio::spawn` pattern, generalized
//! from per-request agent execution to per-pattern feedback processing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, Semaphore};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::bayesian::Calibration;
use crate::conflict::ConflictGraph;
use crate::external::{CoreEvent, KnowledgeStore};
use crate::pareto::Weights;
use crate::pattern_memory::PatternMemory;
use crate::registry::AgentRegistry;
use crate::types::{Complexity, ConflictType, Domain, ExecutionPattern, Intent, Scope, TaskType};

/// §5 real-time suspension budget for the in-process learning steps.
const REALTIME_BUDGET: Duration = Duration::from_millis(500);
/// §5 persistence suspension point budget for the external knowledge-store sync.
const PERSIST_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_BACKOFFS_MS: [u64; 3] = [1000, 2000, 4000];
/// §4.11 memory-bridge threshold: patterns scoring above this are "valuable".
const VALUABLE_THRESHOLD: f64 = 0.6;
/// §9 design note: bounded concurrency, at most 4 workers.
const MAX_CONCURRENT_JOBS: usize = 4;
/// Caps concurrent external knowledge-store syncs separately, since those
/// are the slow/retry-prone leg of each job.
const MAX_CONCURRENT_SYNCS: usize = 2;

/// Per-pattern derivation context the caller already computed during
/// planning/coordination, needed to re-derive the feature vector and the
/// conflict pairs actually observed in this run.
#[derive(Debug, Clone)]
pub struct FeedbackContext {
    pub intent: Intent,
    pub domain: Domain,
    pub task_type: TaskType,
    pub complexity: Complexity,
    pub predicted_confidence: f64,
    /// Ordered-pair, conflict-type observations from this run's execution
    /// order, to feed `ConflictDetector.learn` (§4.11 step 4).
    pub observed_conflicts: Vec<(String, String, ConflictType, bool)>,
    pub scope: Scope,
}

pub struct FeedbackLoop {
    registry: Arc<AgentRegistry>,
    memory: Arc<PatternMemory>,
    conflicts: Arc<ConflictGraph>,
    knowledge_store: Arc<dyn KnowledgeStore>,
    calibration: Arc<RwLock<Calibration>>,
    weights: Arc<RwLock<Weights>>,
    jobs: Arc<Semaphore>,
    syncs: Arc<Semaphore>,
}

impl FeedbackLoop {
    pub fn new(
        registry: Arc<AgentRegistry>,
        memory: Arc<PatternMemory>,
        conflicts: Arc<ConflictGraph>,
        knowledge_store: Arc<dyn KnowledgeStore>,
        calibration: Arc<RwLock<Calibration>>,
        weights: Arc<RwLock<Weights>>,
    ) -> Self {
        Self {
            registry,
            memory,
            conflicts,
            knowledge_store,
            calibration,
            weights,
            jobs: Arc::new(Semaphore::new(MAX_CONCURRENT_JOBS)),
            syncs: Arc::new(Semaphore::new(MAX_CONCURRENT_SYNCS)),
        }
    }

    /// §4.11 entry point: hands the pattern off to a spawned task and
    /// returns immediately, matching the Coordinator's "don't block on
    /// learning" contract.
    pub fn submit(&self, pattern: ExecutionPattern, context: FeedbackContext) {
        let registry = self.registry.clone();
        let memory = self.memory.clone();
        let conflicts = self.conflicts.clone();
        let knowledge_store = self.knowledge_store.clone();
        let calibration = self.calibration.clone();
        let weights = self.weights.clone();
        let jobs = self.jobs.clone();
        let syncs = self.syncs.clone();

        tokio::spawn(async move {
            let _permit = jobs.acquire().await.ok();
            let pattern_id = pattern.id.clone();
            let success = pattern.success;

            let realtime = timeout(
                REALTIME_BUDGET,
                run_realtime_steps(&registry, &memory, &conflicts, &calibration, &weights, &pattern, &context),
            )
            .await;

            if realtime.is_err() {
                warn!("feedback for pattern {pattern_id} exceeded the real-time budget; steps completed in background");
            }

            crate::emit_event!(CoreEvent::ExecutionRecorded { pattern_id: pattern_id.clone(), success });

            if valuable_score(&pattern) > VALUABLE_THRESHOLD {
                let _sync_permit = syncs.acquire().await.ok();
                sync_to_knowledge_store(knowledge_store.as_ref(), &pattern, &context.scope).await;
            }
        });
    }
}

/// Steps 1-6 of §4.11: everything that only touches in-process state and
/// therefore comfortably fits the 500ms real-time budget.
async fn run_realtime_steps(
    registry: &AgentRegistry,
    memory: &PatternMemory,
    conflicts: &ConflictGraph,
    calibration: &Arc<RwLock<Calibration>>,
    weights: &Arc<RwLock<Weights>>,
    pattern: &ExecutionPattern,
    context: &FeedbackContext,
) {
    // 1. AgentRegistry.recordFeedback per agent result.
    for result in &pattern.agent_results {
        if let Err(err) = registry
            .record_feedback(&result.agent_id, result.success, result.tokens_used, result.duration_ms)
            .await
        {
            warn!("failed to record agent feedback for {}: {err}", result.agent_id);
        }
    }

    // 2. PatternMemory.record (idempotent: PatternMemory keys by pattern id).
    memory
        .record(pattern.clone(), context.intent, context.domain, context.task_type, context.complexity)
        .await;

    // 3. BayesianEngine calibration update.
    calibration.write().await.record(context.predicted_confidence, pattern.success);

    // 4. ConflictDetector.learn per observed ordered pair from this run.
    for (a, b, kind, conflicted) in &context.observed_conflicts {
        conflicts.learn(a, b, *kind, *conflicted).await;
    }

    // 5. SemanticAnalyzer calibration counters: folded into the running
    // Brier score above; a dedicated per-domain counter isn't warranted
    // until SemanticAnalyzer exposes one to update.

    // 6. ParetoOptimizer gradient step from the observed run's utility.
    let acc_signal = if pattern.success { 1.0 } else { -1.0 };
    let cost_signal = -(pattern.total_tokens as f64 / 50_000.0).min(1.0);
    let latency_signal = -(pattern.total_duration_ms as f64 / 600_000.0).min(1.0);
    {
        let mut w = weights.write().await;
        *w = w.gradient_step((acc_signal, cost_signal, latency_signal), 0.05);
    }

    debug!("feedback steps 1-6 complete for pattern {}", pattern.id);
}

/// §4.11 step 8: a pattern is "valuable" when it succeeded, is reasonably
/// novel, and is attached to a real project — heuristics combined into a
/// single score in [0, 1].
fn valuable_score(pattern: &ExecutionPattern) -> f64 {
    let success_component = if pattern.success { 0.5 } else { 0.0 };
    let novelty_component = if pattern.agents_used.len() > 1 { 0.2 } else { 0.1 };
    let relevance_component = if pattern.project_context != "default" && !pattern.project_context.is_empty() {
        0.3
    } else {
        0.0
    };
    success_component + novelty_component + relevance_component
}

/// Anonymizes the pattern per its [`Scope`] before handing it to the
/// external store, then persists with retry backoff (§5 1s/2s/4s, 3 attempts).
async fn sync_to_knowledge_store(store: &dyn KnowledgeStore, pattern: &ExecutionPattern, scope: &Scope) {
    if !scope.can_share || !scope.is_valid() {
        debug!("pattern {} not shared externally (scope disallows it)", pattern.id);
        return;
    }

    let entity = anonymized_entity(pattern, scope);

    for (attempt, backoff_ms) in RETRY_BACKOFFS_MS.iter().enumerate() {
        match timeout(PERSIST_TIMEOUT, store.create_entities(vec![entity.clone()])).await {
            Ok(Ok(())) => {
                debug!("persisted pattern {} to the knowledge store", pattern.id);
                return;
            }
            Ok(Err(err)) => warn!("knowledge-store sync attempt {} for pattern {} failed: {err}", attempt + 1, pattern.id),
            Err(_) => warn!("knowledge-store sync attempt {} for pattern {} timed out", attempt + 1, pattern.id),
        }
        tokio::time::sleep(Duration::from_millis(*backoff_ms)).await;
    }
    warn!("giving up on knowledge-store sync for pattern {} after {} attempts", pattern.id, RETRY_BACKOFFS_MS.len());
}

/// Strips the objective text and per-agent outputs (the parts most likely
/// to carry project-specific or sensitive content) down to the shape the
/// graph actually benefits from: tags, domain, and the outcome.
fn anonymized_entity(pattern: &ExecutionPattern, scope: &Scope) -> serde_json::Value {
    serde_json::json!({
        "pattern_id": pattern.id,
        "domain": pattern.objective_type,
        "tags": pattern.tags,
        "agents_used": pattern.agents_used,
        "success": pattern.success,
        "scope_level": scope.level,
    })
}
