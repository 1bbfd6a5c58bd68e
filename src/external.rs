//! External collaborator traits (§6): the embedding provider chain, the
//! long-term knowledge store, and the event bus are genuinely external
//! services; this crate defines their interfaces plus the always-available
//! fallback implementations the spec calls out as actually implemented.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// `embed(text) -> vector`; cache tiers (memory/disk/graph-store,
/// TTLs 0/24h/90d) live outside this crate.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn dimensions(&self) -> usize;
    fn available(&self) -> bool;
}

/// The always-available fallback: hashed bag-of-words, no network call.
/// SemanticAnalyzer's keyword path depends on this tier being real.
pub struct KeywordEmbeddingProvider {
    dims: usize,
}

impl KeywordEmbeddingProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

impl Default for KeywordEmbeddingProvider {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; self.dims];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dims;
            vector[bucket] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn available(&self) -> bool {
        true
    }
}

/// Stand-in for the genuinely external local/cloud embedding tiers.
pub struct NullEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for NullEmbeddingProvider {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        anyhow::bail!("no local or cloud embedding provider configured")
    }

    fn dimensions(&self) -> usize {
        0
    }

    fn available(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEntity {
    pub entity: String,
    pub score: f64,
}

/// Async RPC interface to the long-term knowledge store. All operations
/// are best-effort (§6, §5 suspension points).
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn create_entities(&self, batch: Vec<serde_json::Value>) -> Result<()>;
    async fn create_relations(&self, batch: Vec<serde_json::Value>) -> Result<()>;
    async fn search(&self, query: &str) -> Result<Vec<ScoredEntity>>;
}

/// Always succeeds silently / returns empty, standing in for the real RPC client.
pub struct NullKnowledgeStore;

#[async_trait]
impl KnowledgeStore for NullKnowledgeStore {
    async fn create_entities(&self, _batch: Vec<serde_json::Value>) -> Result<()> {
        Ok(())
    }

    async fn create_relations(&self, _batch: Vec<serde_json::Value>) -> Result<()> {
        Ok(())
    }

    async fn search(&self, _query: &str) -> Result<Vec<ScoredEntity>> {
        Ok(Vec::new())
    }
}

/// Typed fire-and-forget events (§6). Grounded directly on
/// `orchestrator::event_bus::AgencyEvent`/`EventBus`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    PlanStarted { objective: String },
    PlanCompleted { agent_count: usize, confidence: f64 },
    PlanFailed { kind: String, message: String },
    ExecutionRecorded { pattern_id: String, success: bool },
}

pub struct EventBus {
    tx: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    pub fn publish(&self, event: CoreEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static::lazy_static! {
    /// Process-wide event bus singleton, same shape as the teacher's
    /// `AGENCY_EVENT_BUS`.
    pub static ref CORE_EVENT_BUS: Arc<EventBus> = Arc::new(EventBus::new());
}

#[macro_export]
macro_rules! emit_event {
    ($event:expr) => {
        $crate::external::CORE_EVENT_BUS.publish($event);
    };
}
