//! Coordinator (§4.10): synthesizes the results of a completed plan run
//! into a summary, detects conflicts and gaps left behind, and hands the
//! run to the FeedbackLoop for learning before returning to the caller.
//!
//! Grounded on `orchestrator::supervisor::Supervisor`'s composition shape,
//! same as [`crate::planner::Planner`] — a struct of `Arc`'d collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use uuid::Uuid;

use crate::conflict::{self, ConflictGraph};
use crate::feedback::{FeedbackContext, FeedbackLoop};
use crate::types::{
    AgentCapability, AgentId, AgentResult, Complexity, ConflictType, Domain, ExecutionPattern,
    Intent, OrchestrationPlan, PredictedConflict, ProjectContext, Scope, TaskType,
};

/// A missing follow-up step detected in a completed run (§4.10 gap detection).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Gap {
    pub description: String,
    pub suggested_action: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CoordinationResult {
    pub synthesis: String,
    pub conflicts: Vec<PredictedConflict>,
    pub gaps: Vec<Gap>,
    pub recommendations: Vec<String>,
    pub verification_needed: bool,
}

/// Everything about a finished run the Coordinator doesn't get handed
/// directly in `coordinate`'s signature but still needs, either to build
/// the `ExecutionPattern` it feeds the FeedbackLoop or to score confidence
/// calibration against what was actually predicted.
pub struct RunContext<'a> {
    pub objective: &'a str,
    pub intent: Intent,
    pub domain: Domain,
    pub task_type: TaskType,
    pub complexity: Complexity,
    pub project_context: &'a ProjectContext,
    pub tags: Vec<String>,
    pub scope: Scope,
}

pub struct Coordinator {
    conflicts: Arc<ConflictGraph>,
    feedback: Arc<FeedbackLoop>,
}

impl Coordinator {
    pub fn new(conflicts: Arc<ConflictGraph>, feedback: Arc<FeedbackLoop>) -> Self {
        Self { conflicts, feedback }
    }

    /// §4.10 `coordinate`.
    pub async fn coordinate(
        &self,
        plan: &OrchestrationPlan,
        results: &[AgentResult],
        capabilities: &HashMap<AgentId, AgentCapability>,
        run: RunContext<'_>,
    ) -> CoordinationResult {
        let failed: Vec<&AgentResult> = results.iter().filter(|r| !r.success).collect();

        let synthesis = if !failed.is_empty() {
            failure_report(&failed)
        } else {
            phase_summary(plan, results)
        };

        let participating: HashMap<AgentId, AgentCapability> = plan
            .agent_ids()
            .into_iter()
            .filter_map(|id| capabilities.get(&id).map(|cap| (id, cap.clone())))
            .collect();
        let conflict_report = conflict::predict(&self.conflicts, &participating).await;
        let conflicts: Vec<PredictedConflict> = conflict_report
            .predicted_conflicts
            .into_iter()
            .filter(|c| both_ran(c, results))
            .collect();

        let gaps = detect_gaps(plan, results, capabilities);
        let verification_needed = !ran_and_passed_verifier(plan, results, capabilities);
        let recommendations = build_recommendations(&gaps, &conflicts, verification_needed);

        let observed_conflicts = observed_conflict_pairs(plan, results, &conflicts);
        let pattern = build_execution_pattern(plan, results, &gaps, verification_needed, &run);
        let context = FeedbackContext {
            intent: run.intent,
            domain: run.domain,
            task_type: run.task_type,
            complexity: run.complexity,
            predicted_confidence: plan.confidence,
            observed_conflicts,
            scope: run.scope,
        };
        self.feedback.submit(pattern, context);

        CoordinationResult { synthesis, conflicts, gaps, recommendations, verification_needed }
    }
}

fn both_ran(conflict: &PredictedConflict, results: &[AgentResult]) -> bool {
    let ran: HashSet<AgentId> = results.iter().map(|r| r.agent_id.clone()).collect();
    ran.contains(&conflict.agent_a) && ran.contains(&conflict.agent_b)
}

fn failure_report(failed: &[&AgentResult]) -> String {
    let mut report = String::from("## Run failed\n\n");
    for result in failed {
        report.push_str(&format!("- **{}** failed: {}\n", result.agent_id, truncate(&result.output, 240)));
    }
    report
}

/// Groups by `plan.phases` when present (falling back to one phase over
/// the plan's whole agent list), concatenating each agent's `## Summary`
/// section when its output has one, or its first paragraph otherwise.
fn phase_summary(plan: &OrchestrationPlan, results: &[AgentResult]) -> String {
    let by_agent: HashMap<&AgentId, &AgentResult> = results.iter().map(|r| (&r.agent_id, r)).collect();
    let mut out = String::new();

    let phases = plan.phases.clone().unwrap_or_else(|| {
        vec![crate::types::Phase {
            name: "execution".to_string(),
            agents: plan.agent_ids(),
            can_run_parallel: false,
        }]
    });

    for phase in &phases {
        out.push_str(&format!("## {}\n\n", phase.name));
        for agent_id in &phase.agents {
            if let Some(result) = by_agent.get(agent_id) {
                out.push_str(&format!("**{agent_id}**: {}\n\n", extract_summary(&result.output)));
            }
        }
    }
    out
}

fn extract_summary(output: &str) -> String {
    if let Some(idx) = output.find("## Summary") {
        let rest = &output[idx + "## Summary".len()..];
        let section = rest.split("\n##").next().unwrap_or(rest);
        return truncate(section.trim(), 400);
    }
    let first_paragraph = output.split("\n\n").next().unwrap_or(output);
    truncate(first_paragraph.trim(), 400)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    }
}

fn has_tag(capabilities: &HashMap<AgentId, AgentCapability>, results: &[AgentResult], tag: &str) -> bool {
    results
        .iter()
        .filter(|r| r.success)
        .filter_map(|r| capabilities.get(&r.agent_id))
        .any(|cap| cap.capability_tags.contains(tag))
}

/// §4.10 gap detection: three fixed, named gaps, each with a fixed
/// suggested action.
fn detect_gaps(
    plan: &OrchestrationPlan,
    results: &[AgentResult],
    capabilities: &HashMap<AgentId, AgentCapability>,
) -> Vec<Gap> {
    let mut gaps = Vec::new();

    let implemented = has_tag(capabilities, results, "implementation") || has_tag(capabilities, results, "code");
    let verified = has_tag(capabilities, results, "testing") || has_tag(capabilities, results, "verification");
    if implemented && !verified {
        gaps.push(Gap {
            description: "implementation completed without verification".to_string(),
            suggested_action: "run the_verifier to validate the change before it ships".to_string(),
        });
    }

    let documented = has_tag(capabilities, results, "documentation");
    if implemented && !documented {
        gaps.push(Gap {
            description: "new functionality shipped without documentation".to_string(),
            suggested_action: "run the_archivist to document the change".to_string(),
        });
    }

    let deployed = plan.agent_ids().iter().any(|id| {
        capabilities
            .get(id)
            .map(|cap| cap.capability_tags.contains("infrastructure") || cap.capability_tags.contains("deployment"))
            .unwrap_or(false)
    });
    let has_ci = has_tag(capabilities, results, "ci") || has_tag(capabilities, results, "testing");
    if deployed && !has_ci {
        gaps.push(Gap {
            description: "deployment ran without a CI/CD pipeline step".to_string(),
            suggested_action: "add the_sentinel's pipeline provisioning step ahead of future deploys".to_string(),
        });
    }

    gaps
}

fn ran_and_passed_verifier(
    plan: &OrchestrationPlan,
    results: &[AgentResult],
    capabilities: &HashMap<AgentId, AgentCapability>,
) -> bool {
    plan.agent_ids().iter().any(|id| {
        let is_verifier = capabilities
            .get(id)
            .map(|cap| cap.capability_tags.contains("testing") || cap.capability_tags.contains("verification"))
            .unwrap_or(false);
        is_verifier && results.iter().any(|r| &r.agent_id == id && r.success)
    })
}

fn build_recommendations(gaps: &[Gap], conflicts: &[PredictedConflict], verification_needed: bool) -> Vec<String> {
    let mut recs: Vec<String> = gaps.iter().map(|g| g.suggested_action.clone()).collect();
    for conflict in conflicts {
        recs.push(format!(
            "{} and {} showed a {:?} conflict risk ({:.0}%); consider reordering if re-run",
            conflict.agent_a,
            conflict.agent_b,
            conflict.conflict_type,
            conflict.probability * 100.0
        ));
    }
    if verification_needed {
        recs.push("no agent in this run verified the result; request manual review before relying on it".to_string());
    }
    recs
}

/// Derives ordering-pair observations from the plan's actual agent
/// sequence, to feed `ConflictGraph.learn` (§4.11 step 4) — a conflict
/// record per adjacent pair, `true` if either agent failed or the pair
/// was already flagged by the post-hoc detection pass above.
fn observed_conflict_pairs(
    plan: &OrchestrationPlan,
    results: &[AgentResult],
    detected: &[PredictedConflict],
) -> Vec<(String, String, ConflictType, bool)> {
    let by_agent: HashMap<&AgentId, &AgentResult> = results.iter().map(|r| (&r.agent_id, r)).collect();
    let ids = plan.agent_ids();
    let mut observed = Vec::new();

    for window in ids.windows(2) {
        let (a, b) = (&window[0], &window[1]);
        let either_failed = [a, b].iter().any(|id| by_agent.get(*id).map(|r| !r.success).unwrap_or(false));
        let flagged = detected.iter().any(|c| {
            (c.agent_a == *a && c.agent_b == *b) || (c.agent_a == *b && c.agent_b == *a)
        });
        observed.push((a.clone(), b.clone(), ConflictType::Ordering, either_failed || flagged));
    }
    observed
}

fn build_execution_pattern(
    plan: &OrchestrationPlan,
    results: &[AgentResult],
    gaps: &[Gap],
    verification_needed: bool,
    run: &RunContext<'_>,
) -> ExecutionPattern {
    let success = results.iter().all(|r| r.success);
    let total_duration_ms = results.iter().map(|r| r.duration_ms).max().unwrap_or(0);
    let total_tokens = results.iter().map(|r| r.tokens_used).sum();
    let failure_reason = results.iter().find(|r| !r.success).map(|r| truncate(&r.output, 240));

    ExecutionPattern {
        id: Uuid::new_v4().to_string(),
        timestamp: chrono::Utc::now(),
        objective: run.objective.to_string(),
        objective_type: run.domain,
        project_context: run.project_context.key(),
        agents_used: plan.agent_ids(),
        execution_order: plan.agent_ids(),
        agent_results: results.to_vec(),
        success,
        total_duration_ms,
        total_tokens,
        conflicts: Vec::new(),
        gaps: gaps.iter().map(|g| g.description.clone()).collect(),
        verification_passed: !verification_needed,
        failure_reason,
        tags: run.tags.clone(),
        synthetic: false,
        failure_chain_id: None,
    }
}
