//! Planner (§4.9): the central orchestrator — maps an objective through
//! safety/vagueness gates, historical pattern reuse, and capability
//! selection into an [`OrchestrationPlan`], gated by confidence.
//!
//! Grounded on `orchestrator::supervisor::Supervisor`'s shape: a struct
//! holding `Arc`'d collaborators plus async methods, rather than a free
//! function, since this is the crate's central stateful orchestrator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::bayesian::{self, Calibration};
use crate::conflict::{self, ConflictGraph};
use crate::error::{CoreError, CoreResult};
use crate::external::{CoreEvent, EmbeddingProvider, KnowledgeStore};
use crate::pareto::{self, Weights};
use crate::pattern_memory::{feature, PatternMemory};
use crate::registry::AgentRegistry;
use crate::semantic;
use crate::temporal;
use crate::types::{
    AgentCapability, AgentId, AgentSpec, Complexity, Domain, ExecutionPattern,
    FailureContext, Intent, ObjectiveAnalysis, OrchestrationPlan, PatternMatch, Phase,
    PlanConstraints, Priority, ProjectContext, RecoveryStrategy, Strategy,
};
use crate::validators::{confidence as confidence_validator, constraints as constraint_enforcer, safety, vague};

const DEFAULT_AGENT_TOKENS: f64 = 3000.0;
const DEFAULT_AGENT_DURATION_MS: f64 = 60_000.0;
const PATTERN_REUSE_SIMILARITY: f64 = 0.85;
const EXTERNAL_RETRIEVAL_TIMEOUT: Duration = Duration::from_secs(2);

/// Required capability tags for the §4.9 built-in plan library, keyed by
/// (domain, intent). `multi_agent` entries only match complex objectives.
struct CanonicalPattern {
    domain: Domain,
    intent: Intent,
    required_tags: &'static [&'static str],
    multi_agent: bool,
}

const CANONICAL_PATTERNS: &[CanonicalPattern] = &[
    CanonicalPattern { domain: Domain::Code, intent: Intent::CreateNew, required_tags: &["design", "implementation", "testing"], multi_agent: true },
    CanonicalPattern { domain: Domain::Code, intent: Intent::CreateNew, required_tags: &["implementation"], multi_agent: false },
    CanonicalPattern { domain: Domain::Code, intent: Intent::FixIssue, required_tags: &["implementation"], multi_agent: false },
    CanonicalPattern { domain: Domain::Testing, intent: Intent::FixIssue, required_tags: &["testing"], multi_agent: false },
    CanonicalPattern { domain: Domain::Security, intent: Intent::FixIssue, required_tags: &["security"], multi_agent: false },
    CanonicalPattern { domain: Domain::Infrastructure, intent: Intent::Deploy, required_tags: &["devops", "infrastructure"], multi_agent: false },
];

fn match_canonical(domain: Domain, intent: Intent, complexity: Complexity) -> Option<&'static CanonicalPattern> {
    CANONICAL_PATTERNS
        .iter()
        .find(|p| p.domain == domain && p.intent == intent && (!p.multi_agent || complexity == Complexity::Complex))
}

/// The mandatory-for tag a domain maps to; matches the strings seeded onto
/// [`AgentCapability::mandatory_for`] in `registry::builtin_defaults`.
fn domain_tag(domain: Domain) -> &'static str {
    match domain {
        Domain::Creative => "creative",
        Domain::Security => "security",
        Domain::Infrastructure => "infrastructure",
        Domain::Testing => "testing",
        Domain::UiUx => "ui_ux",
        Domain::Data => "data",
        Domain::Documentation => "documentation",
        Domain::Architecture => "architecture",
        Domain::Research => "research",
        Domain::Code => "code",
    }
}

fn estimate_tokens(cap: &AgentCapability) -> u64 {
    if cap.total > 0 {
        cap.avg_tokens.max(1.0) as u64
    } else {
        DEFAULT_AGENT_TOKENS as u64
    }
}

fn estimate_duration(cap: &AgentCapability) -> u64 {
    if cap.total > 0 {
        cap.avg_duration_ms.max(1.0) as u64
    } else {
        DEFAULT_AGENT_DURATION_MS as u64
    }
}

fn agent_spec_for(cap: &AgentCapability, objective: &str, priority: Priority) -> AgentSpec {
    AgentSpec {
        agent_id: cap.id.clone(),
        task_description: format!("address: {objective}"),
        prompt: objective.to_string(),
        dependencies: Vec::new(),
        priority,
    }
}

fn reorder_agents(agents: &mut [AgentSpec], order: &[AgentId]) {
    agents.sort_by_key(|a| order.iter().position(|id| id == &a.agent_id).unwrap_or(usize::MAX));
}

fn summarize_warnings(warnings: &[String]) -> String {
    if warnings.is_empty() {
        "no confidence warnings".to_string()
    } else {
        format!("warnings: {}", warnings.join("; "))
    }
}

fn determine_strategy(
    agents: &[AgentSpec],
    capabilities: &HashMap<AgentId, AgentCapability>,
    constraints: &PlanConstraints,
) -> (Strategy, Option<Vec<Phase>>) {
    if agents.len() <= 1 {
        return (Strategy::Sequential, None);
    }

    const GROUPS: [&str; 3] = ["design", "implementation", "testing"];
    let has_tag = |tag: &str| agents.iter().any(|a| capabilities.get(&a.agent_id).map(|c| c.capability_tags.contains(tag)).unwrap_or(false));

    if GROUPS.iter().all(|g| has_tag(g)) {
        let phases: Vec<Phase> = GROUPS
            .iter()
            .map(|g| Phase {
                name: g.to_string(),
                agents: agents
                    .iter()
                    .filter(|a| capabilities.get(&a.agent_id).map(|c| c.capability_tags.contains(*g)).unwrap_or(false))
                    .map(|a| a.agent_id.clone())
                    .collect(),
                can_run_parallel: false,
            })
            .filter(|p| !p.agents.is_empty())
            .collect();
        return (Strategy::Phased, Some(phases));
    }

    if constraints.prefer_parallel {
        return (Strategy::Parallel, None);
    }

    (Strategy::Sequential, None)
}

struct FinalizedVariant {
    agents: Vec<AgentSpec>,
    capabilities: HashMap<AgentId, AgentCapability>,
    strategy: Strategy,
    phases: Option<Vec<Phase>>,
    confidence: f64,
    uncertainty: f64,
    warnings: Vec<String>,
    estimated_tokens: u64,
    estimated_duration_ms: u64,
}

pub struct Planner {
    registry: Arc<AgentRegistry>,
    memory: Arc<PatternMemory>,
    conflicts: Arc<ConflictGraph>,
    knowledge_store: Arc<dyn KnowledgeStore>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    calibration: Arc<RwLock<Calibration>>,
    weights: Arc<RwLock<Weights>>,
}

impl Planner {
    pub fn new(
        registry: Arc<AgentRegistry>,
        memory: Arc<PatternMemory>,
        conflicts: Arc<ConflictGraph>,
        knowledge_store: Arc<dyn KnowledgeStore>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        calibration: Arc<RwLock<Calibration>>,
        weights: Arc<RwLock<Weights>>,
    ) -> Self {
        Self {
            registry,
            memory,
            conflicts,
            knowledge_store,
            embedding_provider,
            calibration,
            weights,
        }
    }

    /// §4.9 `plan`.
    pub async fn plan(
        &self,
        objective: &str,
        context: &ProjectContext,
        constraints: &PlanConstraints,
        past_executions: &[ExecutionPattern],
    ) -> CoreResult<OrchestrationPlan> {
        if objective.trim().is_empty() {
            return Err(CoreError::InvalidInput { message: "objective must not be empty".to_string() });
        }

        crate::emit_event!(CoreEvent::PlanStarted { objective: objective.to_string() });

        let verdict = safety::check(objective);
        if verdict.should_block() {
            return Err(CoreError::SafetyViolation {
                threat_level: format!("{:?}", verdict.threat_level),
                threats: verdict.threats,
            });
        }

        let vagueness = vague::check(objective);
        if vagueness.is_vague {
            let plan = self.requirements_gathering_plan(objective, vagueness.vagueness_score).await;
            crate::emit_event!(CoreEvent::PlanCompleted { agent_count: plan.agents.len(), confidence: plan.confidence });
            return Ok(plan);
        }

        let analysis = semantic::analyze(objective);
        debug!(
            "keyword-embedding tier available: {}",
            self.embedding_provider.available()
        );

        let now = Utc::now();
        let query_vector = feature::extract_for_query(
            objective,
            &context.key(),
            &context.tags,
            analysis.intent,
            analysis.domain,
            analysis.task_type,
            analysis.complexity,
            now,
        );
        let internal_matches = self.memory.find_similar(query_vector, 5).await;

        match tokio::time::timeout(EXTERNAL_RETRIEVAL_TIMEOUT, self.knowledge_store.search(objective)).await {
            Ok(Ok(hits)) if !hits.is_empty() => debug!("merged {} external knowledge-store hits into planning context", hits.len()),
            Ok(Ok(_)) => {}
            Ok(Err(err)) => warn!("external pattern retrieval failed: {err}"),
            Err(_) => warn!("external pattern retrieval timed out after {EXTERNAL_RETRIEVAL_TIMEOUT:?}"),
        }

        if !past_executions.is_empty() {
            debug!("caller supplied {} prior executions for this project", past_executions.len());
        }

        if let Some((agent_ids, rationale)) = self.try_reuse_pattern(&internal_matches, analysis.domain, now) {
            return self.finalize(agent_ids, objective, &analysis, &internal_matches, constraints, rationale).await;
        }

        let candidates = self.candidate_agents(&analysis).await;
        let rationale = format!("selected via capability analysis ({})", analysis.rationale);
        self.finalize(candidates, objective, &analysis, &internal_matches, constraints, rationale).await
    }

    /// §4.9 `refine_plan` (S4): retry-with-backoff or fallback insertion
    /// after a recoverable failure, carrying the boosted-confidence
    /// heuristic documented in DESIGN.md rather than a full Bayesian
    /// recompute (which would misread the inserted wrapper as an
    /// independent zero-history agent and lower confidence instead).
    pub async fn refine_plan(&self, original: &OrchestrationPlan, failure: &FailureContext) -> CoreResult<OrchestrationPlan> {
        if !failure.is_recoverable {
            return Err(CoreError::ConstraintViolation {
                reason: format!("failure category {:?} is not recoverable", failure.error_category),
            });
        }

        let mut agents = original.agents.clone();

        match failure.recovery_strategy {
            RecoveryStrategy::Retry => {
                if let Some(spec) = agents.iter_mut().find(|a| a.agent_id == failure.failed_agent) {
                    spec.task_description = format!("{} (retry after: {})", spec.task_description, failure.error_message);
                    spec.priority = Priority::High;
                } else {
                    warn!("refine_plan: failed agent {} not present in original plan", failure.failed_agent);
                }
            }
            RecoveryStrategy::RetryBackoff => {
                if let Some(pos) = agents.iter().position(|a| a.agent_id == failure.failed_agent) {
                    let wrapper_id = "the_steward".to_string();
                    let wrapper = AgentSpec {
                        agent_id: wrapper_id.clone(),
                        task_description: format!(
                            "wait with exponential backoff (1s/2s/4s) before retrying {} after: {}",
                            failure.failed_agent, failure.error_message
                        ),
                        prompt: failure.objective.clone(),
                        dependencies: agents[pos].dependencies.clone(),
                        priority: Priority::High,
                    };
                    agents[pos].dependencies.push(wrapper_id);
                    agents[pos].priority = Priority::High;
                    agents.insert(pos, wrapper);
                } else {
                    warn!("refine_plan: failed agent {} not present in original plan", failure.failed_agent);
                }
            }
            RecoveryStrategy::Fallback => {
                let fallback = self.fallback_candidates(&agents).await;
                if let Some(id) = fallback.first() {
                    if let Some(cap) = self.registry.get(id).await {
                        agents.push(agent_spec_for(&cap, &failure.objective, Priority::High));
                    }
                }
            }
            RecoveryStrategy::Abort | RecoveryStrategy::Manual => {
                return Err(CoreError::ConstraintViolation {
                    reason: format!("recovery strategy {:?} requires human intervention, not an automatic refinement", failure.recovery_strategy),
                });
            }
        }

        let refined_confidence = (original.confidence * 1.1).min(0.97).max(original.confidence + 0.01);

        Ok(OrchestrationPlan {
            agents,
            strategy: original.strategy,
            phases: original.phases.clone(),
            success_criteria: original.success_criteria.clone(),
            estimated_tokens: original.estimated_tokens + original.estimated_tokens / 5,
            rationale: format!(
                "refined after {:?} failure in {} (recovery: {:?})",
                failure.error_category, failure.failed_agent, failure.recovery_strategy
            ),
            confidence: refined_confidence,
        })
    }

    async fn requirements_gathering_plan(&self, objective: &str, vagueness_score: f64) -> OrchestrationPlan {
        let agent_id = if self.registry.get("the_interviewer").await.is_some() {
            "the_interviewer".to_string()
        } else {
            self.registry
                .ranked_by_success_rate()
                .await
                .into_iter()
                .next()
                .map(|cap| cap.id)
                .unwrap_or_else(|| "the_interviewer".to_string())
        };

        let tokens = match self.registry.get(&agent_id).await {
            Some(cap) => estimate_tokens(&cap),
            None => DEFAULT_AGENT_TOKENS as u64,
        };

        OrchestrationPlan {
            agents: vec![AgentSpec {
                agent_id,
                task_description: "clarify the ambiguous objective with the requester".to_string(),
                prompt: objective.to_string(),
                dependencies: Vec::new(),
                priority: Priority::Medium,
            }],
            strategy: Strategy::Sequential,
            phases: None,
            success_criteria: vec!["objective scope and acceptance criteria are clarified".to_string()],
            estimated_tokens: tokens + tokens / 10,
            rationale: format!(
                "objective is under-specified (vagueness score {vagueness_score:.2}); short-circuiting to requirements gathering"
            ),
            confidence: (0.6 - vagueness_score * 0.1).clamp(0.3, 0.6),
        }
    }

    /// §4.9 step 6: reuse a prior plan outright when a near-identical,
    /// successful, non-stale pattern exists.
    fn try_reuse_pattern(&self, matches: &[PatternMatch], domain: Domain, now: chrono::DateTime<Utc>) -> Option<(Vec<AgentId>, String)> {
        let best = matches.iter().find(|m| m.similarity_score >= PATTERN_REUSE_SIMILARITY && m.pattern.success)?;
        let relevance = temporal::relevance(domain, best.pattern.timestamp, now);
        if temporal::is_stale(relevance) {
            return None;
        }
        Some((
            best.pattern.agents_used.clone(),
            format!(
                "Reusing proven pattern {} (similarity {:.2}, relevance {:.2})",
                best.pattern.id, best.similarity_score, relevance
            ),
        ))
    }

    async fn candidate_agents(&self, analysis: &ObjectiveAnalysis) -> Vec<AgentId> {
        let tag = domain_tag(analysis.domain);

        let mandatory = self
            .registry
            .list()
            .await
            .into_iter()
            .filter(|cap| cap.mandatory_for.contains(tag))
            .max_by(|a, b| a.success_rate().partial_cmp(&b.success_rate()).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(cap) = mandatory {
            return vec![cap.id];
        }

        if let Some(pattern) = match_canonical(analysis.domain, analysis.intent, analysis.complexity) {
            let ranked = self.registry.select_by_capabilities(pattern.required_tags).await;
            if !ranked.is_empty() {
                return if pattern.multi_agent { ranked.into_iter().take(3).collect() } else { vec![ranked[0].clone()] };
            }
        }

        self.registry.ranked_by_success_rate().await.into_iter().take(1).map(|cap| cap.id).collect()
    }

    async fn fallback_candidates(&self, exclude: &[AgentSpec]) -> Vec<AgentId> {
        let excluded: std::collections::HashSet<&str> = exclude.iter().map(|a| a.agent_id.as_str()).collect();
        self.registry
            .ranked_by_success_rate()
            .await
            .into_iter()
            .filter(|cap| !excluded.contains(cap.id.as_str()))
            .take(1)
            .map(|cap| cap.id)
            .collect()
    }

    /// §4.9 steps h-k: conflict analysis, constraint enforcement, Bayesian
    /// confidence, conditional Pareto re-selection, confidence gate.
    async fn finalize(
        &self,
        candidate_ids: Vec<AgentId>,
        objective: &str,
        analysis: &ObjectiveAnalysis,
        similar_matches: &[PatternMatch],
        constraints: &PlanConstraints,
        rationale_prefix: String,
    ) -> CoreResult<OrchestrationPlan> {
        if candidate_ids.is_empty() {
            return Err(CoreError::LowConfidence {
                confidence: 0.0,
                warnings: vec!["no candidate agents available for this objective".to_string()],
            });
        }

        let now = Utc::now();
        let health = temporal::calculate_health(
            &similar_matches
                .iter()
                .map(|m| temporal::relevance(analysis.domain, m.pattern.timestamp, now))
                .collect::<Vec<_>>(),
        );
        let similar_count = similar_matches.len();

        let mut variant_sets: Vec<Vec<AgentId>> = vec![candidate_ids.clone()];
        if candidate_ids.len() > 1 {
            let mut ranked = Vec::new();
            for id in &candidate_ids {
                if let Some(cap) = self.registry.get(id).await {
                    ranked.push(cap);
                }
            }
            ranked.sort_by(|a, b| b.success_rate().partial_cmp(&a.success_rate()).unwrap_or(std::cmp::Ordering::Equal));
            if let Some(best) = ranked.first() {
                variant_sets.push(vec![best.id.clone()]);
            }
        }

        let mut variants = Vec::new();
        for ids in &variant_sets {
            if let Some(variant) = self
                .build_variant(ids, objective, analysis, similar_count, health.health_score, constraints)
                .await
            {
                variants.push(variant);
            }
        }

        if variants.is_empty() {
            return Err(CoreError::ConstraintViolation {
                reason: "no candidate plan satisfied the given constraints".to_string(),
            });
        }

        let chosen = if variants.len() == 1 {
            variants.into_iter().next().expect("checked non-empty above")
        } else {
            let pareto_candidates: Vec<pareto::Candidate<usize>> = variants
                .iter()
                .enumerate()
                .map(|(idx, v)| pareto::Candidate {
                    plan: idx,
                    accuracy: v.confidence,
                    estimated_tokens: v.estimated_tokens,
                    estimated_duration_ms: v.estimated_duration_ms,
                })
                .collect();
            let weights = *self.weights.read().await;
            let picked_idx = pareto::recommend(pareto_candidates, weights).map(|c| c.plan).unwrap_or(0);
            variants.into_iter().nth(picked_idx).expect("pareto recommend picks a valid index")
        };

        let fallback_ids = self.fallback_candidates(&chosen.agents).await;
        let fallback_selected =
            confidence_validator::validate(chosen.confidence, chosen.uncertainty, &chosen.warnings, &fallback_ids)?;

        let (agents, strategy, phases, confidence, estimated_tokens, rationale) = if fallback_selected.is_empty() {
            (
                chosen.agents,
                chosen.strategy,
                chosen.phases,
                chosen.confidence,
                chosen.estimated_tokens,
                format!("{rationale_prefix}; {}", summarize_warnings(&chosen.warnings)),
            )
        } else {
            let fallback_id = &fallback_selected[0];
            let fallback_cap = self.registry.get(fallback_id).await;
            let fallback_tokens = fallback_cap.as_ref().map(estimate_tokens).unwrap_or(DEFAULT_AGENT_TOKENS as u64);
            let fallback_agent = fallback_cap
                .as_ref()
                .map(|cap| agent_spec_for(cap, objective, Priority::Medium))
                .unwrap_or_else(|| AgentSpec {
                    agent_id: fallback_id.clone(),
                    task_description: format!("address: {objective}"),
                    prompt: objective.to_string(),
                    dependencies: Vec::new(),
                    priority: Priority::Medium,
                });
            (
                vec![fallback_agent],
                Strategy::Sequential,
                None,
                chosen.confidence.max(0.31),
                fallback_tokens + fallback_tokens / 10,
                format!("{rationale_prefix}; confidence/uncertainty below threshold, falling back to top-ranked agent by success rate"),
            )
        };

        let success_criteria = vec![format!(
            "{:?} objective in {:?} domain is addressed and verified",
            analysis.intent, analysis.domain
        )];

        let plan = OrchestrationPlan {
            agents,
            strategy,
            phases,
            success_criteria,
            estimated_tokens,
            rationale,
            confidence,
        };

        crate::emit_event!(CoreEvent::PlanCompleted { agent_count: plan.agents.len(), confidence: plan.confidence });
        Ok(plan)
    }

    async fn build_variant(
        &self,
        candidate_ids: &[AgentId],
        objective: &str,
        analysis: &ObjectiveAnalysis,
        similar_count: usize,
        pattern_health: f64,
        constraints: &PlanConstraints,
    ) -> Option<FinalizedVariant> {
        let tag = domain_tag(analysis.domain);
        let mut capabilities = HashMap::new();
        for id in candidate_ids {
            if let Some(cap) = self.registry.get(id).await {
                capabilities.insert(id.clone(), cap);
            }
        }
        if capabilities.is_empty() {
            return None;
        }

        let mut agents: Vec<AgentSpec> = candidate_ids
            .iter()
            .filter_map(|id| {
                capabilities.get(id).map(|cap| {
                    let priority = if cap.mandatory_for.contains(tag) { Priority::High } else { Priority::Medium };
                    agent_spec_for(cap, objective, priority)
                })
            })
            .collect();

        for i in 1..agents.len() {
            let previous = agents[i - 1].agent_id.clone();
            agents[i].dependencies.push(previous);
        }

        let analysis_report = conflict::analyze(&self.conflicts, &agents, &capabilities).await;
        if let Some(order) = &analysis_report.recommended_reordering {
            reorder_agents(&mut agents, order);
        }
        for removed in &analysis_report.agents_to_remove {
            agents.retain(|a| &a.agent_id != removed);
            capabilities.remove(removed);
        }
        if agents.is_empty() {
            return None;
        }

        let token_cost: HashMap<AgentId, u64> = capabilities.iter().map(|(id, cap)| (id.clone(), estimate_tokens(cap))).collect();
        let estimated_tokens = match constraint_enforcer::enforce(&mut agents, &token_cost, constraints) {
            Ok(total) => total,
            Err(failure) => {
                debug!("variant dropped by constraint enforcement: {}", failure.reason);
                return None;
            }
        };
        capabilities.retain(|id, _| agents.iter().any(|a| &a.agent_id == id));

        let agent_caps: Vec<AgentCapability> = agents.iter().filter_map(|a| capabilities.get(&a.agent_id).cloned()).collect();
        if agent_caps.is_empty() {
            return None;
        }

        let calibration = self.calibration.read().await;
        let result = bayesian::calculate_confidence(
            &agent_caps,
            analysis_report.report.conflict_free_probability,
            similar_count,
            pattern_health,
            &calibration,
        );
        drop(calibration);

        let estimated_duration_ms = agent_caps.iter().map(estimate_duration).max().unwrap_or(DEFAULT_AGENT_DURATION_MS as u64);
        let (strategy, phases) = determine_strategy(&agents, &capabilities, constraints);
        // Invariant (§8.3): parallel agents must not carry the sequential
        // chain dependencies assigned above.
        if strategy == Strategy::Parallel {
            for agent in &mut agents {
                agent.dependencies.clear();
            }
        }

        Some(FinalizedVariant {
            agents,
            capabilities,
            strategy,
            phases,
            confidence: result.confidence,
            uncertainty: result.uncertainty,
            warnings: result.warnings,
            estimated_tokens,
            estimated_duration_ms,
        })
    }
}

/// Builds a [`FailureContext`] from a raw error message, matching the
/// classification pipeline `PatternMemory::get_recent_failures` uses.
pub fn classify_failure(pattern_id: &str, objective: &str, failed_agent: &str, error_message: &str, domain: Domain, preceding_agents: Vec<AgentId>) -> FailureContext {
    let category = crate::validators::error_category::classify(error_message);
    FailureContext {
        pattern_id: pattern_id.to_string(),
        objective: objective.to_string(),
        failed_agent: failed_agent.to_string(),
        error_message: error_message.to_string(),
        error_category: category,
        error_severity: crate::validators::error_category::severity(category, error_message),
        error_domain: domain,
        preceding_agents,
        recovery_strategy: crate::validators::error_category::recovery_strategy(category, error_message),
        is_recoverable: crate::validators::error_category::is_recoverable(category),
        learned_avoidance_rule: None,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{KeywordEmbeddingProvider, NullKnowledgeStore};

    async fn planner() -> Planner {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(AgentRegistry::load(dir.path().join("registry.json")).await.unwrap());
        Planner::new(
            registry,
            Arc::new(PatternMemory::new()),
            Arc::new(ConflictGraph::new()),
            Arc::new(NullKnowledgeStore),
            Arc::new(KeywordEmbeddingProvider::default()),
            Arc::new(RwLock::new(Calibration::new())),
            Arc::new(RwLock::new(Weights::default())),
        )
    }

    #[tokio::test]
    async fn creative_writing_plan_uses_the_scribe_with_high_confidence() {
        let planner = planner().await;
        let plan = planner
            .plan("Write a haiku about autumn leaves.", &ProjectContext::default(), &PlanConstraints::default(), &[])
            .await
            .unwrap();

        assert_eq!(plan.agent_ids(), vec!["the_scribe".to_string()]);
        assert!(plan.confidence >= 0.7, "expected confidence >= 0.7, got {}", plan.confidence);
        assert_eq!(plan.strategy, Strategy::Sequential);
    }

    #[tokio::test]
    async fn infrastructure_deploy_plan_uses_the_sentinel() {
        let planner = planner().await;
        let plan = planner
            .plan("Setup AWS cloud orchestration cluster", &ProjectContext::default(), &PlanConstraints::default(), &[])
            .await
            .unwrap();

        assert_eq!(plan.agent_ids(), vec!["the_sentinel".to_string()]);
        assert!(plan.confidence >= 0.7);
        assert_ne!(plan.strategy, Strategy::Parallel);
    }

    #[tokio::test]
    async fn dashboard_orchestration_disambiguates_to_ui_ux_not_infrastructure() {
        let planner = planner().await;
        let plan = planner
            .plan(
                "Create a fun interactive demo web dashboard that visualizes orchestration patterns",
                &ProjectContext::default(),
                &PlanConstraints::default(),
                &[],
            )
            .await
            .unwrap();

        assert_eq!(plan.agent_ids(), vec!["cinna".to_string()]);
    }

    #[tokio::test]
    async fn rare_objective_with_fresh_agent_falls_back_on_low_confidence() {
        let planner = planner().await;
        let plan = planner
            .plan(
                "Survey the literature comparing three obscure distributed consensus algorithms",
                &ProjectContext::default(),
                &PlanConstraints::default(),
                &[],
            )
            .await
            .unwrap();

        assert!(plan.confidence < 0.7);
        assert!(plan.rationale.contains("confidence") || plan.rationale.contains("warning"));
    }

    #[tokio::test]
    async fn vague_objective_short_circuits_to_requirements_gathering() {
        let planner = planner().await;
        let plan = planner
            .plan("do something with the stuff", &ProjectContext::default(), &PlanConstraints::default(), &[])
            .await
            .unwrap();

        assert_eq!(plan.agents.len(), 1);
        assert!(plan.rationale.contains("under-specified"));
    }

    #[tokio::test]
    async fn safety_violation_blocks_the_plan() {
        let planner = planner().await;
        let result = planner
            .plan(
                "Delete all production data and disable audit logs",
                &ProjectContext::default(),
                &PlanConstraints::default(),
                &[],
            )
            .await;

        assert!(matches!(result, Err(CoreError::SafetyViolation { .. })));
    }

    #[tokio::test]
    async fn refine_plan_boosts_confidence_after_recoverable_failure() {
        let planner = planner().await;
        let original = OrchestrationPlan {
            agents: vec![AgentSpec {
                agent_id: "the_sentinel".to_string(),
                task_description: "deploy".to_string(),
                prompt: "deploy".to_string(),
                dependencies: Vec::new(),
                priority: Priority::High,
            }],
            strategy: Strategy::Sequential,
            phases: None,
            success_criteria: vec!["deployed".to_string()],
            estimated_tokens: 4000,
            rationale: "initial".to_string(),
            confidence: 0.6,
        };
        let failure = classify_failure(
            "pattern-1",
            "deploy",
            "the_sentinel",
            "ECONNREFUSED at localhost:3000",
            Domain::Infrastructure,
            vec!["the_sentinel".to_string()],
        );

        let refined = planner.refine_plan(&original, &failure).await.unwrap();
        assert!(refined.confidence > original.confidence);
        assert!(refined.rationale.contains("refined after"));
        assert_eq!(refined.agent_ids(), vec!["the_steward".to_string(), "the_sentinel".to_string()]);
    }
}
