//! ConflictDetector + ConflictGraph (§4.6): predicts pairwise agent
//! conflicts and recommends reorderings or removals, learning from
//! observed outcomes with a Laplace-smoothed edge probability.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::types::{AgentCapability, AgentId, AgentSpec, ConflictType, PredictedConflict};

const SAFE_THRESHOLD: f64 = 0.35;

#[derive(Debug, Clone, Copy)]
struct EdgeStats {
    /// Bayesian-smoothed with prior α=1,β=1 (§3).
    alpha: f64,
    beta: f64,
    observed_count: u64,
}

impl Default for EdgeStats {
    fn default() -> Self {
        Self { alpha: 1.0, beta: 1.0, observed_count: 0 }
    }
}

impl EdgeStats {
    fn probability(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }
}

fn edge_key(a: &str, b: &str, kind: ConflictType) -> (String, String, ConflictType) {
    if a <= b {
        (a.to_string(), b.to_string(), kind)
    } else {
        (b.to_string(), a.to_string(), kind)
    }
}

/// Process-wide mutable weighted graph over agent pairs (§3, §5).
pub struct ConflictGraph {
    edges: RwLock<HashMap<(String, String, ConflictType), EdgeStats>>,
}

impl Default for ConflictGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ConflictGraph {
    pub fn new() -> Self {
        Self { edges: RwLock::new(HashMap::new()) }
    }

    /// §4.6 `learn`: update the edge with a Laplace-smoothed probability.
    pub async fn learn(&self, a: &str, b: &str, kind: ConflictType, conflicted: bool) {
        let mut edges = self.edges.write().await;
        let entry = edges.entry(edge_key(a, b, kind)).or_default();
        if conflicted {
            entry.alpha += 1.0;
        } else {
            entry.beta += 1.0;
        }
        entry.observed_count += 1;
    }

    async fn probability(&self, a: &str, b: &str, kind: ConflictType) -> Option<f64> {
        let edges = self.edges.read().await;
        edges.get(&edge_key(a, b, kind)).map(|e| e.probability())
    }
}

/// Static fallback rule table used when the graph has no observed edge
/// for a pair yet, keyed by capability-tag signals (§4.6 "static rule table").
fn static_rule(a: &AgentCapability, b: &AgentCapability) -> Option<(ConflictType, f64)> {
    let shared_tool = a.tool_tags.intersection(&b.tool_tags).next().is_some();
    if shared_tool {
        return Some((ConflictType::ToolOverlap, 0.4));
    }

    let a_design = a.capability_tags.contains("design");
    let b_implements = b.capability_tags.contains("implementation") || b.capability_tags.contains("code");
    let b_design = b.capability_tags.contains("design");
    let a_implements = a.capability_tags.contains("implementation") || a.capability_tags.contains("code");
    if (a_design && b_implements) || (b_design && a_implements) {
        return Some((ConflictType::Semantic, 0.25));
    }

    None
}

#[derive(Debug, Clone)]
pub struct ConflictReport {
    pub risk_score: f64,
    pub conflict_free_probability: f64,
    pub predicted_conflicts: Vec<PredictedConflict>,
    pub safe_to_execute: bool,
}

#[derive(Debug, Clone)]
pub struct ConflictAnalysis {
    pub report: ConflictReport,
    pub recommended_reordering: Option<Vec<AgentId>>,
    pub agents_to_remove: Vec<AgentId>,
}

/// §4.6 `predict`.
pub async fn predict(graph: &ConflictGraph, capabilities: &HashMap<AgentId, AgentCapability>) -> ConflictReport {
    let ids: Vec<&AgentId> = capabilities.keys().collect();
    let mut predicted = Vec::new();

    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            let (a_id, b_id) = (ids[i], ids[j]);
            let (Some(a), Some(b)) = (capabilities.get(a_id), capabilities.get(b_id)) else { continue };

            for kind in [ConflictType::ToolOverlap, ConflictType::Resource, ConflictType::Semantic, ConflictType::Ordering] {
                if let Some(p) = graph.probability(a_id, b_id, kind).await {
                    if p > 0.05 {
                        predicted.push(PredictedConflict {
                            agent_a: a_id.clone(),
                            agent_b: b_id.clone(),
                            conflict_type: kind,
                            probability: p,
                        });
                    }
                }
            }

            if !predicted.iter().any(|c| c.agent_a == *a_id && c.agent_b == *b_id) {
                if let Some((kind, probability)) = static_rule(a, b) {
                    predicted.push(PredictedConflict {
                        agent_a: a_id.clone(),
                        agent_b: b_id.clone(),
                        conflict_type: kind,
                        probability,
                    });
                }
            }
        }
    }

    build_report(predicted)
}

fn build_report(predicted_conflicts: Vec<PredictedConflict>) -> ConflictReport {
    let risk_score = 1.0
        - predicted_conflicts
            .iter()
            .map(|c| 1.0 - c.probability)
            .product::<f64>();
    let conflict_free_probability = 1.0 - risk_score;
    ConflictReport {
        risk_score,
        conflict_free_probability,
        safe_to_execute: risk_score <= SAFE_THRESHOLD,
        predicted_conflicts,
    }
}

/// §4.6 `analyze`: `predict` plus a post-hoc reordering/removal pass.
pub async fn analyze(
    graph: &ConflictGraph,
    agents: &[AgentSpec],
    capabilities: &HashMap<AgentId, AgentCapability>,
) -> ConflictAnalysis {
    let report = predict(graph, capabilities).await;

    let ordering_edges: Vec<(&str, &str)> = report
        .predicted_conflicts
        .iter()
        .filter(|c| c.conflict_type == ConflictType::Ordering && c.probability > 0.5)
        .map(|c| (c.agent_a.as_str(), c.agent_b.as_str()))
        .collect();

    if ordering_edges.is_empty() {
        return ConflictAnalysis { report, recommended_reordering: None, agents_to_remove: Vec::new() };
    }

    match topological_order(agents, &ordering_edges) {
        Some(order) => ConflictAnalysis { report, recommended_reordering: Some(order), agents_to_remove: Vec::new() },
        None => {
            let lowest = agents.iter().min_by_key(|a| a.priority).map(|a| a.agent_id.clone());
            ConflictAnalysis {
                report,
                recommended_reordering: None,
                agents_to_remove: lowest.into_iter().collect(),
            }
        }
    }
}

/// Kahn's algorithm over ordering-type edges only; `None` on a cycle.
fn topological_order(agents: &[AgentSpec], edges: &[(&str, &str)]) -> Option<Vec<AgentId>> {
    let ids: Vec<AgentId> = agents.iter().map(|a| a.agent_id.clone()).collect();
    let mut indegree: HashMap<&str, usize> = ids.iter().map(|id| (id.as_str(), 0)).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = ids.iter().map(|id| (id.as_str(), Vec::new())).collect();

    for (before, after) in edges {
        if let Some(list) = adjacency.get_mut(before) {
            list.push(after);
        }
        if let Some(count) = indegree.get_mut(after) {
            *count += 1;
        }
    }

    let mut queue: Vec<&str> = ids.iter().map(|id| id.as_str()).filter(|id| indegree[id] == 0).collect();
    let mut order = Vec::with_capacity(ids.len());

    while let Some(node) = queue.pop() {
        order.push(node.to_string());
        if let Some(neighbors) = adjacency.get(node) {
            for next in neighbors {
                if let Some(count) = indegree.get_mut(next) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push(next);
                    }
                }
            }
        }
    }

    if order.len() == ids.len() {
        Some(order)
    } else {
        None
    }
}
