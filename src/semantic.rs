//! SemanticAnalyzer (§4.1): maps a free-text objective to a discrete
//! [`ObjectiveAnalysis`] and a multi-label [`SemanticEmbedding`].
//!
//! Implemented as plain functions rather than a stateful struct, per §9's
//! directive to keep validators/analyzers/optimizers as pure functions and
//! reserve stateful singletons for the `Core` aggregate. Mirrors the
//! teacher's `orchestrator::planner` module in shape: small owned-string
//! helpers, no hidden state, inline literal-objective test tables.

use std::collections::HashMap;

use crate::types::{Complexity, Domain, Intent, ObjectiveAnalysis, SemanticEmbedding, TaskType};

struct Rule {
    keywords: &'static [&'static str],
    weight: f64,
}

const DEPLOY_RULES: &[Rule] = &[
    Rule { keywords: &["deploy", "release", "ship to", "publish to"], weight: 1.0 },
    Rule { keywords: &["setup", "provision", "stand up"], weight: 0.8 },
];

const CREATE_RULES: &[Rule] = &[
    Rule { keywords: &["create", "build", "scaffold", "new project", "write a"], weight: 1.0 },
    Rule { keywords: &["add a", "generate"], weight: 0.7 },
];

const INVESTIGATE_RULES: &[Rule] = &[
    Rule { keywords: &["investigate", "why does", "figure out", "diagnose"], weight: 1.0 },
    Rule { keywords: &["explore", "understand"], weight: 0.6 },
];

const VALIDATE_RULES: &[Rule] = &[
    Rule { keywords: &["validate", "verify", "check that", "test that"], weight: 1.0 },
];

const FIX_RULES: &[Rule] = &[
    Rule { keywords: &["fix", "bug", "broken", "failing", "error"], weight: 1.0 },
];

const MODIFY_RULES: &[Rule] = &[
    Rule { keywords: &["modify", "update", "change", "refactor"], weight: 1.0 },
];

const DOCUMENT_RULES: &[Rule] = &[
    Rule { keywords: &["document", "write docs", "readme", "changelog"], weight: 1.0 },
];

const OPTIMIZE_RULES: &[Rule] = &[
    Rule { keywords: &["optimize", "speed up", "improve performance", "reduce latency"], weight: 1.0 },
];

const DESIGN_RULES: &[Rule] = &[
    Rule { keywords: &["design", "architect", "propose an approach"], weight: 1.0 },
];

/// Priority order from §4.1: DEPLOY checked before CREATE_NEW so
/// "setup infrastructure" routes to deploy, not creation.
const INTENT_CASCADE: &[(Intent, &[Rule])] = &[
    (Intent::Deploy, DEPLOY_RULES),
    (Intent::CreateNew, CREATE_RULES),
    (Intent::Investigate, INVESTIGATE_RULES),
    (Intent::Validate, VALIDATE_RULES),
    (Intent::FixIssue, FIX_RULES),
    (Intent::ModifyExisting, MODIFY_RULES),
    (Intent::Document, DOCUMENT_RULES),
    (Intent::Optimize, OPTIMIZE_RULES),
    (Intent::Design, DESIGN_RULES),
];

const CREATIVE_RULES: &[Rule] = &[
    Rule { keywords: &["poem", "haiku", "story", "song", "art", "creative writing"], weight: 1.0 },
];
const SECURITY_RULES: &[Rule] = &[
    Rule { keywords: &["security", "vulnerability", "exploit", "auth", "credential", "encrypt"], weight: 1.0 },
];
const INFRA_RULES: &[Rule] = &[
    Rule { keywords: &["cloud", "aws", "gcp", "azure", "cluster", "container", "docker", "kubernetes", "terraform", "ci/cd"], weight: 1.0 },
];
const TESTING_RULES: &[Rule] = &[
    Rule { keywords: &["test", "unit test", "integration test", "coverage"], weight: 1.0 },
];
const UIUX_RULES: &[Rule] = &[
    Rule { keywords: &["dashboard", "ui", "ux", "frontend", "interface", "visualize", "visualization", "design a page"], weight: 1.0 },
];
const DATA_RULES: &[Rule] = &[
    Rule { keywords: &["data pipeline", "etl", "database schema", "dataset", "migration"], weight: 1.0 },
];
const DOCS_RULES: &[Rule] = &[
    Rule { keywords: &["documentation", "readme", "changelog", "api docs"], weight: 1.0 },
];
const ARCH_RULES: &[Rule] = &[
    Rule { keywords: &["architecture", "system design", "module boundaries"], weight: 1.0 },
];
const RESEARCH_RULES: &[Rule] = &[
    Rule { keywords: &["research", "survey", "compare options", "evaluate libraries"], weight: 1.0 },
];
const CODE_RULES: &[Rule] = &[
    Rule { keywords: &["function", "class", "module", "implement", "codebase"], weight: 0.5 },
];

/// Domain cascade from §4.1: creative checked first (avoids misclassifying
/// "poem/story/art"), security/infra/testing/ui_ux/data/docs/architecture/
/// research next, code is the default.
const DOMAIN_CASCADE: &[(Domain, &[Rule])] = &[
    (Domain::Creative, CREATIVE_RULES),
    (Domain::Security, SECURITY_RULES),
    (Domain::Infrastructure, INFRA_RULES),
    (Domain::Testing, TESTING_RULES),
    (Domain::UiUx, UIUX_RULES),
    (Domain::Data, DATA_RULES),
    (Domain::Documentation, DOCS_RULES),
    (Domain::Architecture, ARCH_RULES),
    (Domain::Research, RESEARCH_RULES),
    (Domain::Code, CODE_RULES),
];

const CONTAINER_VOCAB: &[&str] = &["container", "cluster", "docker", "kubernetes", "k8s", "node pool"];
const DASHBOARD_VOCAB: &[&str] = &["dashboard", "visualize", "visualization", "chart", "graph view"];

fn rule_score(text: &str, rules: &[Rule]) -> f64 {
    rules
        .iter()
        .filter(|r| r.keywords.iter().any(|k| text.contains(k)))
        .map(|r| r.weight)
        .sum()
}

/// §4.1 contextual disambiguation for "orchestration".
fn orchestration_adjustment(text: &str) -> Option<Domain> {
    if !text.contains("orchestration") {
        return None;
    }
    let near_containers = CONTAINER_VOCAB.iter().any(|k| text.contains(k));
    let near_dashboard = DASHBOARD_VOCAB.iter().any(|k| text.contains(k));
    if near_containers {
        Some(Domain::Infrastructure)
    } else if near_dashboard {
        Some(Domain::UiUx)
    } else {
        None
    }
}

fn detect_intent(text: &str) -> (Intent, f64) {
    for (intent, rules) in INTENT_CASCADE {
        let score = rule_score(text, rules);
        if score > 0.0 {
            return (*intent, score);
        }
    }
    (Intent::Investigate, 0.0)
}

fn detect_domain(text: &str) -> (Domain, f64) {
    if let Some(adjusted) = orchestration_adjustment(text) {
        return (adjusted, 1.0);
    }
    for (domain, rules) in DOMAIN_CASCADE {
        let score = rule_score(text, rules);
        if score > 0.0 {
            return (*domain, score);
        }
    }
    (Domain::Code, 0.0)
}

fn derive_task_type(intent: Intent, domain: Domain) -> TaskType {
    if domain == Domain::Creative {
        return TaskType::Creative;
    }
    match intent {
        Intent::Document => TaskType::Communicative,
        Intent::Investigate | Intent::Validate | Intent::Design => TaskType::Analytical,
        Intent::Deploy | Intent::Optimize => TaskType::Operational,
        Intent::CreateNew | Intent::FixIssue | Intent::ModifyExisting => TaskType::Technical,
    }
}

fn derive_complexity(text: &str) -> Complexity {
    let markers = ["entire", "multiple", "integrate", "end-to-end", "across"];
    let marker_hits = markers.iter().filter(|m| text.contains(*m)).count();
    let len = text.split_whitespace().count();
    match (len, marker_hits) {
        (_, m) if m >= 2 => Complexity::Complex,
        (l, m) if l > 25 || m == 1 => Complexity::Moderate,
        _ => Complexity::Simple,
    }
}

/// §4.1 `analyze`.
pub fn analyze(objective: &str) -> ObjectiveAnalysis {
    let text = objective.to_lowercase();
    if text.trim().is_empty() {
        return ObjectiveAnalysis {
            intent: Intent::Investigate,
            domain: Domain::Research,
            task_type: TaskType::Analytical,
            complexity: Complexity::Simple,
            recommended_agents: Vec::new(),
            confidence: 0.1,
            rationale: "empty objective; defaulting to investigate/research".to_string(),
        };
    }

    let (intent, intent_score) = detect_intent(&text);
    let (domain, domain_score) = detect_domain(&text);
    let task_type = derive_task_type(intent, domain);
    let complexity = derive_complexity(&text);

    // confidence: weak signal from rule strength, never above 0.95.
    let confidence = (0.3 + 0.2 * intent_score + 0.2 * domain_score).min(0.95);

    ObjectiveAnalysis {
        intent,
        domain,
        task_type,
        complexity,
        recommended_agents: Vec::new(),
        confidence,
        rationale: format!(
            "intent={intent:?} (score {intent_score:.1}), domain={domain:?} (score {domain_score:.1}), complexity={complexity:?}"
        ),
    }
}

/// §4.1 `embed`: multi-label scores, normalized per label family.
pub fn embed(objective: &str) -> SemanticEmbedding {
    let text = objective.to_lowercase();

    let mut intent_scores = HashMap::new();
    let mut total_intent = 0.0;
    for (intent, rules) in INTENT_CASCADE {
        let s = rule_score(&text, rules);
        intent_scores.insert(*intent, s);
        total_intent += s;
    }
    if total_intent > 0.0 {
        for v in intent_scores.values_mut() {
            *v /= total_intent;
        }
    } else {
        intent_scores.insert(Intent::Investigate, 1.0);
    }

    let mut domain_scores = HashMap::new();
    let mut total_domain = 0.0;
    for (domain, rules) in DOMAIN_CASCADE {
        let s = rule_score(&text, rules);
        domain_scores.insert(*domain, s);
        total_domain += s;
    }
    if let Some(adjusted) = orchestration_adjustment(&text) {
        domain_scores.insert(adjusted, total_domain.max(1.0) + 1.0);
        total_domain += 1.0;
    }
    if total_domain > 0.0 {
        for v in domain_scores.values_mut() {
            *v /= total_domain;
        }
    } else {
        domain_scores.insert(Domain::Code, 1.0);
    }

    let complexity_score = match derive_complexity(&text) {
        Complexity::Simple => 0.2,
        Complexity::Moderate => 0.55,
        Complexity::Complex => 0.9,
    };

    let confidence = top_margin(&intent_scores.values().copied().collect::<Vec<_>>())
        .max(top_margin(&domain_scores.values().copied().collect::<Vec<_>>()))
        .clamp(0.0, 1.0);

    SemanticEmbedding {
        intent_scores,
        domain_scores,
        complexity_score,
        confidence,
    }
}

/// Confidence equals the margin between the top label and the next (§4.1).
fn top_margin(scores: &[f64]) -> f64 {
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    match (sorted.first(), sorted.get(1)) {
        (Some(top), Some(second)) => (top - second).max(0.0),
        (Some(top), None) => *top,
        _ => 0.0,
    }
}
