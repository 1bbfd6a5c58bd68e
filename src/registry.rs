//! AgentRegistry (§4.2): the set of known agents, their capabilities, and
//! running performance statistics, with a debounced on-disk cache.
//!
//! Grounded on `orchestrator::profile::ProfileManager`'s load-or-seed-and-save
//! idiom plus `memory::vector::VectorMemory`'s `Arc<RwLock<..>>` cache shape.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::types::AgentCapability;

const REGISTRY_SCHEMA_VERSION: u32 = 1;
const DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);
/// Exponential moving average smoothing factor for avg_tokens/avg_duration (§4.2).
const EMA_ALPHA: f64 = 0.1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedStats {
    total: u64,
    success: u64,
    avg_tokens: f64,
    avg_duration: f64,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedAgent {
    #[serde(flatten)]
    capability: AgentCapability,
    stats: PersistedStats,
    /// Fields from a newer schema version we don't understand yet; kept
    /// verbatim so round-tripping the cache doesn't silently drop data.
    #[serde(flatten)]
    unknown: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryCacheFile {
    version: u32,
    agents: HashMap<String, PersistedAgent>,
}

fn builtin_defaults() -> Vec<AgentCapability> {
    vec![
        AgentCapability::new("the_scribe", "creative writing")
            .with_tags(&["creative_writing", "narrative"])
            .with_use_cases(&["poem", "story", "copywriting"])
            .mandatory_for(&["creative"])
            .with_history(18, 20, 2500.0, 40_000.0),
        AgentCapability::new("the_sentinel", "devops")
            .with_tags(&["devops", "infrastructure", "deployment"])
            .with_tools(&["terraform", "kubectl", "docker"])
            .with_use_cases(&["deploy", "provision cluster"])
            .mandatory_for(&["infrastructure"])
            .with_history(18, 20, 4000.0, 90_000.0),
        AgentCapability::new("cinna", "ui/design")
            .with_tags(&["design", "ui_ux", "frontend"])
            .with_use_cases(&["dashboard", "visualization"])
            .mandatory_for(&["ui_ux"])
            .with_history(18, 20, 3000.0, 60_000.0),
        AgentCapability::new("the_auditor", "security")
            .with_tags(&["security", "audit"])
            .with_use_cases(&["vulnerability scan", "threat model"])
            .mandatory_for(&["security"]),
        AgentCapability::new("the_mechanic", "implementation")
            .with_tags(&["code", "implementation"])
            .with_use_cases(&["write code", "fix bug"]),
        AgentCapability::new("the_verifier", "testing")
            .with_tags(&["testing", "verification"])
            .with_use_cases(&["write tests", "run suite"])
            .mandatory_for(&["testing"]),
        AgentCapability::new("the_archivist", "documentation")
            .with_tags(&["documentation"])
            .with_use_cases(&["write docs", "changelog"])
            .mandatory_for(&["documentation"]),
        AgentCapability::new("the_cartographer", "architecture")
            .with_tags(&["architecture", "design"])
            .with_use_cases(&["system design"])
            .mandatory_for(&["architecture"]),
        AgentCapability::new("the_analyst", "data")
            .with_tags(&["data", "analysis"])
            .with_use_cases(&["data pipeline", "schema design"])
            .mandatory_for(&["data"]),
        AgentCapability::new("the_researcher", "research")
            .with_tags(&["research"])
            .with_use_cases(&["survey", "compare options"])
            .mandatory_for(&["research"]),
        AgentCapability::new("the_interviewer", "requirements gathering")
            .with_tags(&["requirements_gathering"])
            .with_use_cases(&["clarify scope", "ask clarifying questions"]),
        AgentCapability::new("the_steward", "retry orchestration")
            .with_tags(&["retry", "backoff", "resilience"])
            .with_use_cases(&["wait with exponential backoff", "retry a failed step"]),
    ]
}

/// Process-wide singleton owning agent capabilities and stats (§5).
pub struct AgentRegistry {
    cache_path: PathBuf,
    agents: RwLock<HashMap<String, AgentCapability>>,
    last_write: Mutex<Option<Instant>>,
}

impl AgentRegistry {
    pub async fn load(cache_path: impl Into<PathBuf>) -> Result<Self> {
        let cache_path = cache_path.into();
        let registry = Self {
            cache_path: cache_path.clone(),
            agents: RwLock::new(HashMap::new()),
            last_write: Mutex::new(None),
        };

        if cache_path.exists() {
            match registry.load_from_disk().await {
                Ok(agents) => {
                    *registry.agents.write().await = agents;
                    debug!("loaded agent registry cache from {:?}", cache_path);
                    return Ok(registry);
                }
                Err(err) => {
                    warn!("registry cache unreadable ({err}); seeding defaults");
                }
            }
        }

        let defaults = builtin_defaults();
        let mut map = HashMap::new();
        for cap in defaults {
            map.insert(cap.id.clone(), cap);
        }
        *registry.agents.write().await = map;
        registry.flush().await.ok();
        Ok(registry)
    }

    async fn load_from_disk(&self) -> Result<HashMap<String, AgentCapability>> {
        let content = tokio::fs::read_to_string(&self.cache_path).await?;
        let file: RegistryCacheFile = serde_json::from_str(&content)?;
        let mut map = HashMap::new();
        for (id, persisted) in file.agents {
            map.insert(id, persisted.capability);
        }
        Ok(map)
    }

    /// §5 debouncing: at most one disk write per 2s, with callers expected
    /// to call `flush` once more on shutdown for a final write.
    async fn maybe_flush(&self) -> Result<()> {
        let mut last_write = self.last_write.lock().await;
        let now = Instant::now();
        if let Some(prev) = *last_write {
            if now.duration_since(prev) < DEBOUNCE_WINDOW {
                return Ok(());
            }
        }
        *last_write = Some(now);
        drop(last_write);
        self.flush().await
    }

    pub async fn flush(&self) -> Result<()> {
        let agents = self.agents.read().await;
        let mut file_agents = HashMap::new();
        for (id, cap) in agents.iter() {
            file_agents.insert(
                id.clone(),
                PersistedAgent {
                    capability: cap.clone(),
                    stats: PersistedStats {
                        total: cap.total,
                        success: cap.successes,
                        avg_tokens: cap.avg_tokens,
                        avg_duration: cap.avg_duration_ms,
                        updated_at: Utc::now(),
                    },
                    unknown: serde_json::Map::new(),
                },
            );
        }
        let file = RegistryCacheFile {
            version: REGISTRY_SCHEMA_VERSION,
            agents: file_agents,
        };
        if let Some(parent) = self.cache_path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        let content = serde_json::to_string_pretty(&file)?;
        tokio::fs::write(&self.cache_path, content).await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<AgentCapability> {
        self.agents.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<AgentCapability> {
        self.agents.read().await.values().cloned().collect()
    }

    /// Ranked by tag-coverage of `required`, then by success_rate (§4.2).
    pub async fn select_by_capabilities(&self, required: &[&str]) -> Vec<String> {
        let agents = self.agents.read().await;
        let mut scored: Vec<(usize, f64, String)> = agents
            .values()
            .map(|cap| {
                let coverage = required
                    .iter()
                    .filter(|tag| cap.capability_tags.contains(**tag) || cap.use_case_tags.contains(**tag))
                    .count();
                (coverage, cap.success_rate(), cap.id.clone())
            })
            .filter(|(coverage, _, _)| *coverage > 0)
            .collect();
        scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then(b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal))
        });
        scored.into_iter().map(|(_, _, id)| id).collect()
    }

    pub async fn ranked_by_success_rate(&self) -> Vec<AgentCapability> {
        let mut agents: Vec<AgentCapability> = self.agents.read().await.values().cloned().collect();
        agents.sort_by(|a, b| {
            b.success_rate()
                .partial_cmp(&a.success_rate())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        agents
    }

    /// §4.2 `recordFeedback`: running averages via EMA, successes/total
    /// counters for the plain success-rate ratio.
    pub async fn record_feedback(&self, id: &str, success: bool, tokens: u64, duration_ms: u64) -> Result<()> {
        {
            let mut agents = self.agents.write().await;
            let cap = agents
                .entry(id.to_string())
                .or_insert_with(|| AgentCapability::new(id, "unspecialized"));
            cap.total += 1;
            if success {
                cap.successes += 1;
            }
            cap.avg_tokens = ema(cap.avg_tokens, tokens as f64, cap.total);
            cap.avg_duration_ms = ema(cap.avg_duration_ms, duration_ms as f64, cap.total);
        }
        self.maybe_flush().await
    }

    /// Registers agents the host declares available (§4.2 `discover`); a
    /// registry write, unlike planning reads (§5).
    pub async fn discover(&self, ids: &[AgentCapability]) -> Result<()> {
        {
            let mut agents = self.agents.write().await;
            for cap in ids {
                agents.entry(cap.id.clone()).or_insert_with(|| cap.clone());
            }
        }
        self.maybe_flush().await
    }
}

fn ema(current: f64, sample: f64, total_observations: u64) -> f64 {
    if total_observations <= 1 {
        sample
    } else {
        EMA_ALPHA * sample + (1.0 - EMA_ALPHA) * current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeds_builtin_agents_matching_worked_examples() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AgentRegistry::load(dir.path().join("registry.json")).await.unwrap();

        assert!(registry.get("the_scribe").await.is_some());
        assert!(registry.get("the_sentinel").await.is_some());
        assert!(registry.get("cinna").await.is_some());
    }

    #[tokio::test]
    async fn record_feedback_updates_running_stats() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AgentRegistry::load(dir.path().join("registry.json")).await.unwrap();

        for _ in 0..4 {
            registry.record_feedback("the_mechanic", true, 1000, 500).await.unwrap();
        }
        registry.record_feedback("the_mechanic", false, 1000, 500).await.unwrap();

        let cap = registry.get("the_mechanic").await.unwrap();
        assert_eq!(cap.total, 5);
        assert_eq!(cap.successes, 4);
        assert!((cap.success_rate() - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn persists_and_reloads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        {
            let registry = AgentRegistry::load(&path).await.unwrap();
            registry.record_feedback("the_mechanic", true, 500, 200).await.unwrap();
            registry.flush().await.unwrap();
        }
        let reloaded = AgentRegistry::load(&path).await.unwrap();
        let cap = reloaded.get("the_mechanic").await.unwrap();
        assert_eq!(cap.total, 1);
    }

    #[tokio::test]
    async fn select_by_capabilities_ranks_by_coverage_then_success_rate() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AgentRegistry::load(dir.path().join("registry.json")).await.unwrap();

        let selected = registry.select_by_capabilities(&["devops"]).await;
        assert_eq!(selected.first().map(String::as_str), Some("the_sentinel"));
    }
}
