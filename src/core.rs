//! Core (§4.1 / §6): the process-wide entry point a host talks to. Owns
//! every long-lived singleton, wires them into the
//! [`Planner`]/[`Coordinator`]/[`FeedbackLoop`] trio, and exposes the tool
//! surface described in §6.
//!
//! Grounded on `orchestrator::supervisor::Supervisor::new`'s shape: a
//! single constructor composing every collaborator from config plus
//! injected external services, rather than a builder or DI container.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::bayesian::Calibration;
use crate::config::{ConfigLoader, CoreConfig};
use crate::conflict::ConflictGraph;
use crate::coordinator::{CoordinationResult, Coordinator, RunContext};
use crate::error::{CoreError, CoreResult};
use crate::external::{EmbeddingProvider, KeywordEmbeddingProvider, KnowledgeStore, NullKnowledgeStore};
use crate::feedback::FeedbackLoop;
use crate::pareto::Weights;
use crate::pattern_memory::{feature, PatternMemory};
use crate::planner::{self, Planner};
use crate::registry::AgentRegistry;
use crate::semantic;
use crate::temporal;
use crate::types::{
    AgentCapability, AgentId, AgentResult, Domain, ExecutionPattern, FailureContext,
    OrchestrationPlan, PlanConstraints, ProjectContext,
};

/// §6 `analyze`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalysisResult {
    pub health_score: f64,
    pub critical_issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub suggested_agents: Vec<AgentId>,
}

/// §6 `record_feedback`.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackReport {
    pub agent_id: AgentId,
    pub success: bool,
    pub tokens_used: Option<u64>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackAck {
    pub ok: bool,
}

/// §6 `predict_agents`.
#[derive(Debug, Clone, Serialize)]
pub struct AgentPrediction {
    pub agent_id: AgentId,
    pub predicted_success_rate: f64,
    pub confidence: f64,
    pub similar_executions: usize,
}

/// §6 `analyze_failure`.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestedFix {
    pub description: String,
    pub recovery_strategy: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureAnalysis {
    pub context: FailureContext,
    pub suggested_fixes: Vec<SuggestedFix>,
}

/// §6 `refine_plan`.
#[derive(Debug, Clone, Serialize)]
pub struct RefinedPlan {
    pub refined_plan: OrchestrationPlan,
    pub changes_made: Vec<String>,
    pub reasoning: String,
    pub confidence: f64,
}

/// §6 `find_patterns`.
#[derive(Debug, Clone, Serialize)]
pub struct PatternHit {
    pub pattern_id: String,
    pub objective: String,
    pub similarity_score: f64,
    pub success: bool,
    pub timestamp: chrono::DateTime<Utc>,
}

/// The process-wide aggregate (§5). One instance per host process; every
/// collaborator below is an `Arc`'d singleton shared with the planner,
/// coordinator, and feedback loop.
pub struct Core {
    registry: Arc<AgentRegistry>,
    memory: Arc<PatternMemory>,
    conflicts: Arc<ConflictGraph>,
    calibration: Arc<RwLock<Calibration>>,
    weights: Arc<RwLock<Weights>>,
    config: CoreConfig,
    planner: Planner,
    coordinator: Coordinator,
    feedback: Arc<FeedbackLoop>,
}

impl Core {
    /// Wires every collaborator from the given cache/config paths and
    /// injected external services.
    pub async fn new(
        registry_cache_path: impl Into<PathBuf>,
        config_path: impl Into<PathBuf>,
        knowledge_store: Arc<dyn KnowledgeStore>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
    ) -> CoreResult<Self> {
        let registry = Arc::new(AgentRegistry::load(registry_cache_path).await?);
        let config = ConfigLoader::new(config_path).load().await?;
        let memory = Arc::new(PatternMemory::new());
        let conflicts = Arc::new(ConflictGraph::new());
        let calibration = Arc::new(RwLock::new(Calibration::new()));
        let weights = Arc::new(RwLock::new(Weights::default()));

        let feedback = Arc::new(FeedbackLoop::new(
            registry.clone(),
            memory.clone(),
            conflicts.clone(),
            knowledge_store.clone(),
            calibration.clone(),
            weights.clone(),
        ));
        let planner = Planner::new(
            registry.clone(),
            memory.clone(),
            conflicts.clone(),
            knowledge_store,
            embedding_provider,
            calibration.clone(),
            weights.clone(),
        );
        let coordinator = Coordinator::new(conflicts.clone(), feedback.clone());

        Ok(Self {
            registry,
            memory,
            conflicts,
            calibration,
            weights,
            config,
            planner,
            coordinator,
            feedback,
        })
    }

    /// Convenience constructor for hosts that don't have a real knowledge
    /// store or embedding service yet: the keyword embedder and a
    /// no-op external store (§6 "always-available fallback").
    pub async fn bootstrap(registry_cache_path: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> CoreResult<Self> {
        Self::new(
            registry_cache_path,
            config_path,
            Arc::new(NullKnowledgeStore),
            Arc::new(KeywordEmbeddingProvider::default()),
        )
        .await
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// §6 `plan`.
    pub async fn plan(
        &self,
        objective: &str,
        context: Option<ProjectContext>,
        constraints: Option<PlanConstraints>,
        past_executions: Option<Vec<ExecutionPattern>>,
    ) -> CoreResult<OrchestrationPlan> {
        let context = context.unwrap_or_default();
        let constraints = constraints.unwrap_or_default();
        let past_executions = past_executions.unwrap_or_default();
        self.planner.plan(objective, &context, &constraints, &past_executions).await
    }

    /// §6 `coordinate`.
    pub async fn coordinate(
        &self,
        objective: &str,
        agent_results: Vec<AgentResult>,
        plan: Option<OrchestrationPlan>,
        project_context: Option<ProjectContext>,
    ) -> CoreResult<CoordinationResult> {
        let project_context = project_context.unwrap_or_default();
        let analysis = semantic::analyze(objective);

        let plan = match plan {
            Some(plan) => plan,
            None => {
                // Build a minimal synthetic plan from the reported results so
                // gap/conflict detection still has something to reason over.
                OrchestrationPlan {
                    agents: agent_results
                        .iter()
                        .map(|r| crate::types::AgentSpec {
                            agent_id: r.agent_id.clone(),
                            task_description: format!("address: {objective}"),
                            prompt: objective.to_string(),
                            dependencies: Vec::new(),
                            priority: crate::types::Priority::Medium,
                        })
                        .collect(),
                    strategy: crate::types::Strategy::Sequential,
                    phases: None,
                    success_criteria: Vec::new(),
                    estimated_tokens: 0,
                    rationale: "synthesized from reported results; no plan supplied".to_string(),
                    confidence: 0.5,
                }
            }
        };

        let mut capabilities = std::collections::HashMap::new();
        for id in plan.agent_ids() {
            if let Some(cap) = self.registry.get(&id).await {
                capabilities.insert(id, cap);
            }
        }

        let run = RunContext {
            objective,
            intent: analysis.intent,
            domain: analysis.domain,
            task_type: analysis.task_type,
            complexity: analysis.complexity,
            project_context: &project_context,
            tags: project_context.tags.clone(),
            scope: self.config.cross_project_scope.clone(),
        };

        Ok(self.coordinator.coordinate(&plan, &agent_results, &capabilities, run).await)
    }

    /// §6 `analyze`: a read-only health snapshot over the rolling window,
    /// built from [`PatternMemory::get_aggregate_stats`] and
    /// [`AgentRegistry::ranked_by_success_rate`].
    pub async fn analyze(&self, context: Option<ProjectContext>) -> AnalysisResult {
        let _ = context;
        let stats = self.memory.get_aggregate_stats().await;
        let recent_failures = self.memory.get_recent_failures(5).await;

        let health_score = if stats.total_executions > 0 {
            let hourly_avg = stats.hourly_success_rate.iter().sum::<f64>() / stats.hourly_success_rate.len() as f64;
            (stats.success_rate * 0.7 + hourly_avg * 0.3).clamp(0.0, 1.0)
        } else {
            0.5
        };

        let mut critical_issues: Vec<String> = stats
            .error_frequency
            .iter()
            .filter(|(_, count)| **count >= 3)
            .map(|(category, count)| format!("{category:?} failures recurring ({count} in the rolling window)"))
            .collect();
        for failure in &recent_failures {
            if failure.error_severity == crate::types::ErrorSeverity::Critical {
                critical_issues.push(format!("critical failure in {}: {}", failure.failed_agent, failure.error_message));
            }
        }
        critical_issues.sort();
        critical_issues.dedup();

        let mut recommendations = Vec::new();
        if stats.total_executions > 0 && stats.success_rate < 0.5 {
            recommendations.push("success rate is below 50% over the rolling window; review recent failures before planning further work".to_string());
        }
        if recent_failures.iter().any(|f| f.recovery_strategy == crate::types::RecoveryStrategy::Manual) {
            recommendations.push("at least one recent failure requires manual intervention".to_string());
        }
        if recommendations.is_empty() {
            recommendations.push("no action needed; recent executions are within normal bounds".to_string());
        }

        let suggested_agents = self
            .registry
            .ranked_by_success_rate()
            .await
            .into_iter()
            .take(3)
            .map(|cap| cap.id)
            .collect();

        AnalysisResult {
            health_score,
            critical_issues,
            recommendations,
            suggested_agents,
        }
    }

    /// §6 `record_feedback`: a direct, single-agent write distinct from the
    /// whole-pattern [`FeedbackLoop::submit`] the coordinator drives.
    pub async fn record_feedback(&self, report: FeedbackReport) -> CoreResult<FeedbackAck> {
        if let Some(error) = &report.error {
            warn!("recording feedback for {} with error: {error}", report.agent_id);
        }
        self.registry
            .record_feedback(&report.agent_id, report.success, report.tokens_used.unwrap_or(0), report.duration_ms.unwrap_or(0))
            .await?;
        Ok(FeedbackAck { ok: true })
    }

    /// §6 `predict_agents`.
    pub async fn predict_agents(
        &self,
        agent_ids: &[AgentId],
        objective: &str,
        context: Option<ProjectContext>,
    ) -> Vec<AgentPrediction> {
        let context = context.unwrap_or_default();
        let analysis = semantic::analyze(objective);
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
        let matches = self.memory.find_similar(query_vector, 10).await;
        let health = temporal::calculate_health(
            &matches
                .iter()
                .map(|m| temporal::relevance(analysis.domain, m.pattern.timestamp, now))
                .collect::<Vec<_>>(),
        );

        let calibration = self.calibration.read().await;
        let mut predictions = Vec::with_capacity(agent_ids.len());
        for id in agent_ids {
            let cap = self
                .registry
                .get(id)
                .await
                .unwrap_or_else(|| AgentCapability::new(id.clone(), "unspecialized"));
            let similar_executions = matches.iter().filter(|m| m.pattern.agents_used.contains(id)).count();
            let result = crate::bayesian::calculate_confidence(&[cap.clone()], 1.0, similar_executions, health.health_score, &calibration);
            predictions.push(AgentPrediction {
                agent_id: id.clone(),
                predicted_success_rate: cap.success_rate(),
                confidence: result.confidence,
                similar_executions,
            });
        }
        predictions
    }

    /// §6 `analyze_failure`.
    pub async fn analyze_failure(
        &self,
        objective: &str,
        failed_agent_id: &AgentId,
        error: &str,
        preceding_agents: Vec<AgentId>,
        context: Option<ProjectContext>,
    ) -> FailureAnalysis {
        let _ = context;
        let analysis = semantic::analyze(objective);
        let pattern_id = Uuid::new_v4().to_string();
        let failure_context = planner::classify_failure(&pattern_id, objective, failed_agent_id, error, analysis.domain, preceding_agents);

        let suggested_fixes = match failure_context.recovery_strategy {
            crate::types::RecoveryStrategy::Retry => vec![SuggestedFix {
                description: format!("retry {failed_agent_id} once more; the failure category is transient"),
                recovery_strategy: "retry".to_string(),
            }],
            crate::types::RecoveryStrategy::RetryBackoff => vec![SuggestedFix {
                description: format!("retry {failed_agent_id} with exponential backoff (1s/2s/4s)"),
                recovery_strategy: "retry_backoff".to_string(),
            }],
            crate::types::RecoveryStrategy::Fallback => vec![SuggestedFix {
                description: format!("substitute {failed_agent_id} with the next-best agent by success rate"),
                recovery_strategy: "fallback".to_string(),
            }],
            crate::types::RecoveryStrategy::Abort => vec![SuggestedFix {
                description: "abort the plan; this failure category is not safely recoverable".to_string(),
                recovery_strategy: "abort".to_string(),
            }],
            crate::types::RecoveryStrategy::Manual => vec![SuggestedFix {
                description: format!("escalate {failed_agent_id}'s failure to a human operator"),
                recovery_strategy: "manual".to_string(),
            }],
        };

        FailureAnalysis {
            context: failure_context,
            suggested_fixes,
        }
    }

    /// §6 `refine_plan`.
    pub async fn refine_plan(
        &self,
        original_plan: &OrchestrationPlan,
        failure_context: &FailureContext,
        objective: &str,
        project_context: Option<ProjectContext>,
    ) -> CoreResult<RefinedPlan> {
        let _ = (objective, project_context);
        let refined_plan = self.planner.refine_plan(original_plan, failure_context).await?;

        let before: std::collections::HashSet<&AgentId> = original_plan.agents.iter().map(|a| &a.agent_id).collect();
        let after: std::collections::HashSet<&AgentId> = refined_plan.agents.iter().map(|a| &a.agent_id).collect();
        let mut changes_made: Vec<String> = after
            .difference(&before)
            .map(|id| format!("added agent {id}"))
            .collect();
        changes_made.extend(before.difference(&after).map(|id| format!("removed agent {id}")));
        if changes_made.is_empty() {
            changes_made.push(format!("adjusted {}'s task description and priority in place", failure_context.failed_agent));
        }
        changes_made.sort();

        Ok(RefinedPlan {
            reasoning: refined_plan.rationale.clone(),
            confidence: refined_plan.confidence,
            refined_plan,
            changes_made,
        })
    }

    /// §6 `find_patterns`.
    pub async fn find_patterns(&self, objective: &str, context: Option<ProjectContext>, limit: Option<usize>) -> Vec<PatternHit> {
        let context = context.unwrap_or_default();
        let limit = limit.unwrap_or(5);
        let analysis = semantic::analyze(objective);
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
        self.memory
            .find_similar(query_vector, limit)
            .await
            .into_iter()
            .map(|m| PatternHit {
                pattern_id: m.pattern.id.clone(),
                objective: m.pattern.objective.clone(),
                similarity_score: m.similarity_score,
                success: m.pattern.success,
                timestamp: m.pattern.timestamp,
            })
            .collect()
    }

    /// §6 `discover_agents`: registers host-declared agents the registry
    /// doesn't already know about.
    pub async fn discover_agents(&self, agents: Vec<AgentCapability>) -> CoreResult<()> {
        self.registry.discover(&agents).await?;
        Ok(())
    }

    /// §6 `list_learned_agents`.
    pub async fn list_learned_agents(&self, ranked: bool) -> Vec<AgentCapability> {
        if ranked {
            self.registry.ranked_by_success_rate().await
        } else {
            self.registry.list().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentSpec, Priority, Strategy};

    async fn core(dir: &tempfile::TempDir) -> Core {
        Core::bootstrap(dir.path().join("registry.json"), dir.path().join("config.json"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn plan_returns_a_plan_whose_agents_are_all_registered() {
        let dir = tempfile::tempdir().unwrap();
        let core = core(&dir).await;

        let plan = core.plan("deploy the staging cluster", None, None, None).await.unwrap();
        let known = core.list_learned_agents(false).await;
        let known_ids: std::collections::HashSet<_> = known.iter().map(|c| c.id.clone()).collect();
        for agent in &plan.agents {
            assert!(known_ids.contains(&agent.agent_id));
        }
    }

    #[tokio::test]
    async fn record_feedback_and_analyze_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let core = core(&dir).await;

        let ack = core
            .record_feedback(FeedbackReport {
                agent_id: "the_mechanic".to_string(),
                success: true,
                tokens_used: Some(1200),
                duration_ms: Some(800),
                error: None,
            })
            .await
            .unwrap();
        assert!(ack.ok);

        let analysis = core.analyze(None).await;
        assert!(analysis.health_score >= 0.0 && analysis.health_score <= 1.0);
        assert!(!analysis.suggested_agents.is_empty());
    }

    #[tokio::test]
    async fn refine_plan_reports_the_inserted_wrapper_agent_as_a_change() {
        let dir = tempfile::tempdir().unwrap();
        let core = core(&dir).await;

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
            rationale: "initial plan".to_string(),
            confidence: 0.8,
        };
        let failure = planner::classify_failure(
            "p1",
            "deploy",
            "the_sentinel",
            "connection timed out while waiting for a response",
            Domain::Infrastructure,
            Vec::new(),
        );

        let refined = core.refine_plan(&original, &failure, "deploy", None).await.unwrap();
        assert!(refined.changes_made.iter().any(|c| c.contains("the_steward")));
    }

    #[tokio::test]
    async fn predict_agents_returns_one_entry_per_requested_agent() {
        let dir = tempfile::tempdir().unwrap();
        let core = core(&dir).await;

        let predictions = core
            .predict_agents(&["the_mechanic".to_string(), "the_verifier".to_string()], "fix the bug", None)
            .await;
        assert_eq!(predictions.len(), 2);
        for p in &predictions {
            assert!(p.confidence >= 0.0 && p.confidence <= 1.0);
        }
    }
}
