//! Core data model (§3). All entities are value types unless noted mutable
//! in their own module. Serde derives make every type usable directly as
//! the JSON payloads crossing the §6 tool surface.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type AgentId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Deploy,
    CreateNew,
    Investigate,
    Validate,
    FixIssue,
    ModifyExisting,
    Document,
    Optimize,
    Design,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Creative,
    Security,
    Infrastructure,
    Testing,
    UiUx,
    Data,
    Documentation,
    Architecture,
    Research,
    Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Creative,
    Communicative,
    Analytical,
    Operational,
    Technical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Sequential,
    Parallel,
    Phased,
}

/// §3 `AgentCapability` — mutable capability+stats record owned by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCapability {
    pub id: AgentId,
    pub specialization: String,
    pub capability_tags: HashSet<String>,
    pub tool_tags: HashSet<String>,
    pub use_case_tags: HashSet<String>,
    pub avg_tokens: f64,
    pub avg_duration_ms: f64,
    pub successes: u64,
    pub total: u64,
    pub mandatory_for: HashSet<String>,
}

impl AgentCapability {
    pub fn new(id: impl Into<String>, specialization: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            specialization: specialization.into(),
            capability_tags: HashSet::new(),
            tool_tags: HashSet::new(),
            use_case_tags: HashSet::new(),
            avg_tokens: 0.0,
            avg_duration_ms: 0.0,
            successes: 0,
            total: 0,
            mandatory_for: HashSet::new(),
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.capability_tags
            .extend(tags.iter().map(|t| t.to_string()));
        self
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.tool_tags.extend(tools.iter().map(|t| t.to_string()));
        self
    }

    pub fn with_use_cases(mut self, cases: &[&str]) -> Self {
        self.use_case_tags
            .extend(cases.iter().map(|t| t.to_string()));
        self
    }

    pub fn mandatory_for(mut self, domains: &[&str]) -> Self {
        self.mandatory_for
            .extend(domains.iter().map(|t| t.to_string()));
        self
    }

    /// Seeds a track record for an established agent rather than leaving it
    /// at the zero-history prior (§4.2 built-in defaults for named agents
    /// referenced by the §8 worked examples).
    pub fn with_history(mut self, successes: u64, total: u64, avg_tokens: f64, avg_duration_ms: f64) -> Self {
        self.successes = successes;
        self.total = total;
        self.avg_tokens = avg_tokens;
        self.avg_duration_ms = avg_duration_ms;
        self
    }

    /// successes/total if total>0 else prior (0.5), per §3 invariant.
    pub fn success_rate(&self) -> f64 {
        if self.total > 0 {
            self.successes as f64 / self.total as f64
        } else {
            0.5
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectiveAnalysis {
    pub intent: Intent,
    pub domain: Domain,
    pub task_type: TaskType,
    pub complexity: Complexity,
    pub recommended_agents: Vec<AgentId>,
    pub confidence: f64,
    pub rationale: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticEmbedding {
    pub intent_scores: HashMap<Intent, f64>,
    pub domain_scores: HashMap<Domain, f64>,
    pub complexity_score: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub agent_id: AgentId,
    pub task_description: String,
    pub prompt: String,
    pub dependencies: Vec<AgentId>,
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    pub agents: Vec<AgentId>,
    pub can_run_parallel: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationPlan {
    pub agents: Vec<AgentSpec>,
    pub strategy: Strategy,
    pub phases: Option<Vec<Phase>>,
    pub success_criteria: Vec<String>,
    pub estimated_tokens: u64,
    pub rationale: String,
    pub confidence: f64,
}

impl OrchestrationPlan {
    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.agents.iter().map(|a| a.agent_id.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_id: AgentId,
    pub output: String,
    pub success: bool,
    pub duration_ms: u64,
    pub tokens_used: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    ToolOverlap,
    Resource,
    Semantic,
    Ordering,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictedConflict {
    pub agent_a: AgentId,
    pub agent_b: AgentId,
    pub conflict_type: ConflictType,
    pub probability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPattern {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub objective: String,
    pub objective_type: Domain,
    pub project_context: String,
    pub agents_used: Vec<AgentId>,
    pub execution_order: Vec<AgentId>,
    pub agent_results: Vec<AgentResult>,
    pub success: bool,
    pub total_duration_ms: u64,
    pub total_tokens: u64,
    pub conflicts: Vec<PredictedConflict>,
    pub gaps: Vec<String>,
    pub verification_passed: bool,
    pub failure_reason: Option<String>,
    pub tags: Vec<String>,
    /// Synthetic bootstrap patterns are flagged and excluded from persistence (§4.3).
    #[serde(default)]
    pub synthetic: bool,
    /// Set when this pattern joins a run of ≥3 same-agent failures in the
    /// same project within an hour (§4.3 failure-chain detection).
    #[serde(default)]
    pub failure_chain_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    MissingDependency,
    VersionMismatch,
    ConfigurationError,
    CompilationError,
    SyntaxError,
    NetworkError,
    Timeout,
    ApiRateLimit,
    AuthenticationError,
    PermissionError,
    ResourceExhausted,
    LogicError,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    Retry,
    RetryBackoff,
    Fallback,
    Abort,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    pub pattern_id: String,
    pub objective: String,
    pub failed_agent: AgentId,
    pub error_message: String,
    pub error_category: ErrorCategory,
    pub error_severity: ErrorSeverity,
    pub error_domain: Domain,
    pub preceding_agents: Vec<AgentId>,
    pub recovery_strategy: RecoveryStrategy,
    pub is_recoverable: bool,
    pub learned_avoidance_rule: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
    User,
    Project,
    Org,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    Public,
    Internal,
    Confidential,
    Restricted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub level: ScopeLevel,
    pub identifier: String,
    pub can_share: bool,
    pub sensitivity: Sensitivity,
}

impl Scope {
    /// §3 invariant: restricted ⇒ user-level only; confidential ⇒ project-level only.
    pub fn is_valid(&self) -> bool {
        match self.sensitivity {
            Sensitivity::Restricted => self.level == ScopeLevel::User,
            Sensitivity::Confidential => self.level == ScopeLevel::Project,
            _ => true,
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self {
            level: ScopeLevel::User,
            identifier: "default".to_string(),
            can_share: false,
            sensitivity: Sensitivity::Internal,
        }
    }
}

/// Host-supplied constraints for a single `plan` call (§4.8.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanConstraints {
    pub max_agents: Option<usize>,
    pub max_tokens: Option<u64>,
    pub prefer_parallel: bool,
}

/// §3 `AggregateStats` — derived solely from rolling-window patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_executions: u64,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub avg_tokens: f64,
    pub agent_usage: HashMap<AgentId, u64>,
    pub error_frequency: HashMap<ErrorCategory, u64>,
    pub hourly_success_rate: [f64; 24],
}

impl Default for AggregateStats {
    fn default() -> Self {
        Self {
            total_executions: 0,
            success_rate: 0.0,
            avg_duration_ms: 0.0,
            avg_tokens: 0.0,
            agent_usage: HashMap::new(),
            error_frequency: HashMap::new(),
            hourly_success_rate: [0.0; 24],
        }
    }
}

/// A pattern-memory kNN hit (§4.3 `findSimilar`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub pattern: ExecutionPattern,
    pub similarity_score: f64,
}

/// §4.8.1 SafetyValidator threat level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub threat_level: ThreatLevel,
    pub threats: Vec<String>,
    pub recommendations: Vec<String>,
}

impl SafetyVerdict {
    pub fn should_block(&self) -> bool {
        matches!(self.threat_level, ThreatLevel::High | ThreatLevel::Critical)
    }
}

/// Host-supplied project metadata accompanying an objective.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectContext {
    pub project_type: Option<String>,
    pub project_id: Option<String>,
    pub tags: Vec<String>,
}

impl ProjectContext {
    pub fn key(&self) -> String {
        self.project_id.clone().unwrap_or_else(|| "default".to_string())
    }
}
