//! Literal end-to-end scenarios (§8 "Literal end-to-end scenarios" S1-S6).

use std::sync::Arc;

use agency_planner::bayesian::Calibration;
use agency_planner::conflict::ConflictGraph;
use agency_planner::external::{KeywordEmbeddingProvider, NullKnowledgeStore};
use agency_planner::pareto::Weights;
use agency_planner::pattern_memory::PatternMemory;
use agency_planner::planner::{self, Planner};
use agency_planner::registry::AgentRegistry;
use agency_planner::types::{
    AgentResult, Complexity, Domain, ExecutionPattern, Intent, PlanConstraints, ProjectContext,
    Strategy, TaskType,
};
use tokio::sync::RwLock;

struct Harness {
    planner: Planner,
    registry: Arc<AgentRegistry>,
    memory: Arc<PatternMemory>,
}

async fn harness(dir: &tempfile::TempDir) -> Harness {
    let registry = Arc::new(AgentRegistry::load(dir.path().join("registry.json")).await.unwrap());
    let memory = Arc::new(PatternMemory::new());
    let conflicts = Arc::new(ConflictGraph::new());
    let knowledge_store = Arc::new(NullKnowledgeStore);
    let embedding_provider = Arc::new(KeywordEmbeddingProvider::default());
    let calibration = Arc::new(RwLock::new(Calibration::new()));
    let weights = Arc::new(RwLock::new(Weights::default()));
    let planner = Planner::new(
        registry.clone(),
        memory.clone(),
        conflicts,
        knowledge_store,
        embedding_provider,
        calibration,
        weights,
    );
    Harness { planner, registry, memory }
}

// S1 - Creative short-circuit.
#[tokio::test]
async fn s1_creative_short_circuit() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(&dir).await;

    let analysis = agency_planner::semantic::analyze("Write a haiku about autumn leaves.");
    assert_eq!(analysis.intent, Intent::CreateNew);
    assert_eq!(analysis.domain, Domain::Creative);
    assert_eq!(analysis.task_type, TaskType::Creative);

    let plan = h
        .planner
        .plan("Write a haiku about autumn leaves.", &ProjectContext::default(), &PlanConstraints::default(), &[])
        .await
        .unwrap();

    let has_creative_writer = plan.agents.iter().any(|a| a.agent_id == "the_scribe");
    assert!(has_creative_writer, "expected the_scribe in {:?}", plan.agents);
    let has_verifier = plan.agents.iter().any(|a| a.agent_id == "the_verifier");
    assert!(!has_verifier, "a creative one-liner should not pull in verification");
    assert!(plan.estimated_tokens <= 20_000);
    assert!(plan.confidence >= 0.7, "confidence was {}", plan.confidence);
}

// S2 - Infrastructure deploy.
#[tokio::test]
async fn s2_infrastructure_deploy() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(&dir).await;

    let analysis = agency_planner::semantic::analyze("Setup AWS cloud orchestration cluster");
    assert_eq!(analysis.intent, Intent::Deploy);
    assert_eq!(analysis.domain, Domain::Infrastructure);

    let plan = h
        .planner
        .plan("Setup AWS cloud orchestration cluster", &ProjectContext::default(), &PlanConstraints::default(), &[])
        .await
        .unwrap();

    assert!(plan.agents.iter().any(|a| a.agent_id == "the_sentinel"));
    assert!(!plan.agents.iter().any(|a| a.agent_id == "cinna"));
    assert!(matches!(plan.strategy, Strategy::Sequential | Strategy::Phased));
    assert!(plan.rationale.to_lowercase().contains("infrastructure") || analysis.rationale.to_lowercase().contains("infrastructure"));
}

// S3 - Dashboard disambiguation.
#[tokio::test]
async fn s3_dashboard_disambiguation() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(&dir).await;

    let objective = "Create a fun interactive demo web dashboard that visualizes orchestration patterns";
    let analysis = agency_planner::semantic::analyze(objective);
    assert_eq!(analysis.domain, Domain::UiUx);

    let plan = h
        .planner
        .plan(objective, &ProjectContext::default(), &PlanConstraints::default(), &[])
        .await
        .unwrap();

    assert!(plan.agents.iter().any(|a| a.agent_id == "cinna"));
    assert!(!plan.agents.iter().any(|a| a.agent_id == "the_sentinel"));
}

// S4 - Failure refinement.
#[tokio::test]
async fn s4_failure_refinement() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(&dir).await;

    let failure = planner::classify_failure(
        "pattern-1",
        "deploy the staging cluster",
        "the_sentinel",
        "ECONNREFUSED at localhost:3000",
        Domain::Infrastructure,
        Vec::new(),
    );
    assert_eq!(failure.error_category, agency_planner::types::ErrorCategory::NetworkError);
    assert_eq!(failure.recovery_strategy, agency_planner::types::RecoveryStrategy::RetryBackoff);
    assert!(failure.is_recoverable);

    let original = h
        .planner
        .plan("deploy the staging cluster", &ProjectContext::default(), &PlanConstraints::default(), &[])
        .await
        .unwrap();
    let refined = h.planner.refine_plan(&original, &failure).await.unwrap();

    let wrapper_pos = refined.agents.iter().position(|a| a.agent_id == "the_steward");
    let failed_pos = refined.agents.iter().position(|a| a.agent_id == "the_sentinel");
    assert!(wrapper_pos.is_some() && failed_pos.is_some());
    assert!(wrapper_pos.unwrap() < failed_pos.unwrap(), "the backoff wrapper must precede the failed agent");
    assert!(refined.confidence > original.confidence);
}

// S5 - Pattern reuse.
#[tokio::test]
async fn s5_pattern_reuse() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(&dir).await;

    let seeded_objective = "Add TypeScript support to a JavaScript project";
    let seeded_agents = vec!["the_mechanic".to_string()];
    let pattern = ExecutionPattern {
        id: "seed-1".to_string(),
        timestamp: chrono::Utc::now(),
        objective: seeded_objective.to_string(),
        objective_type: Domain::Code,
        project_context: "default".to_string(),
        agents_used: seeded_agents.clone(),
        execution_order: seeded_agents.clone(),
        agent_results: vec![AgentResult {
            agent_id: "the_mechanic".to_string(),
            output: "added tsconfig and converted sources".to_string(),
            success: true,
            duration_ms: 12_000,
            tokens_used: 4_000,
        }],
        success: true,
        total_duration_ms: 12_000,
        total_tokens: 4_000,
        conflicts: Vec::new(),
        gaps: Vec::new(),
        verification_passed: true,
        failure_reason: None,
        tags: Vec::new(),
        synthetic: false,
        failure_chain_id: None,
    };
    h.memory
        .record(pattern, Intent::ModifyExisting, Domain::Code, TaskType::Technical, Complexity::Moderate)
        .await;

    let plan = h
        .planner
        .plan("Add TypeScript support to my JS codebase", &ProjectContext::default(), &PlanConstraints::default(), &[])
        .await
        .unwrap();

    assert_eq!(plan.agents.iter().map(|a| a.agent_id.clone()).collect::<Vec<_>>(), seeded_agents);
    assert!(plan.rationale.starts_with("Reusing proven pattern"), "rationale was: {}", plan.rationale);
}

// S6 - Low confidence fallback.
#[tokio::test]
async fn s6_low_confidence_fallback_or_error() {
    let dir = tempfile::tempdir().unwrap();

    // Direct check of the confidence/validate pipeline the planner's
    // `finalize` step drives: with an empty PatternMemory (no similar
    // patterns) and a multi-agent candidate set that has never been
    // observed, the joint Beta(1,1) mean for three independent zero-history
    // agents drops well below the 0.3 threshold.
    let zero_history = |id: &str| agency_planner::types::AgentCapability::new(id, "unspecialized");
    let agents = vec![zero_history("a"), zero_history("b"), zero_history("c")];
    let calibration = Calibration::new();
    let confidence = agency_planner::bayesian::calculate_confidence(&agents, 1.0, 0, 0.0, &calibration);
    assert!(confidence.confidence < agency_planner::validators::confidence::CONFIDENCE_THRESHOLD);
    assert!(!confidence.warnings.is_empty());

    let outcome = agency_planner::validators::confidence::validate(
        confidence.confidence,
        confidence.uncertainty,
        &confidence.warnings,
        &["the_researcher".to_string()],
    );
    match outcome {
        Ok(fallback) => assert_eq!(fallback, vec!["the_researcher".to_string()]),
        Err(agency_planner::error::CoreError::LowConfidence { warnings, .. }) => {
            assert!(!warnings.is_empty(), "LowConfidence must enumerate warnings")
        }
        Err(other) => panic!("expected Ok(fallback) or LowConfidence, got {other:?}"),
    }

    // Planner-level smoke check: a rare objective against a freshly seeded
    // registry either succeeds (falling back to a known-good agent) or
    // raises LowConfidence with warnings — never panics.
    let rare = harness(&dir).await;
    let result = rare
        .planner
        .plan(
            "reticulate the splines for an obscure legacy mainframe subsystem",
            &ProjectContext::default(),
            &PlanConstraints::default(),
            &[],
        )
        .await;
    match result {
        Ok(plan) => assert!(!plan.agents.is_empty(), "a fallback plan must still name an agent"),
        Err(agency_planner::error::CoreError::LowConfidence { warnings, .. }) => {
            assert!(!warnings.is_empty(), "LowConfidence must enumerate warnings")
        }
        Err(other) => panic!("expected Ok or LowConfidence, got {other:?}"),
    }
}
