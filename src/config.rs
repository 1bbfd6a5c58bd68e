//! Feature-flag configuration (§6 "Persisted state" / "Environment").
//!
//! Same load-or-seed-and-save idiom as the teacher's
//! `orchestrator::profile::ProfileManager`: if the file is missing, write
//! out defaults and return them rather than erroring.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::types::Scope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderChoice {
    Auto,
    Local,
    Cloud,
    Keyword,
}

impl ProviderChoice {
    /// The single authoritative environment override named in §6.
    pub fn from_env() -> Option<Self> {
        let raw = std::env::var("EMBEDDING_PROVIDER").ok()?;
        match raw.to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "local" => Some(Self::Local),
            "cloud" => Some(Self::Cloud),
            "keyword" => Some(Self::Keyword),
            other => {
                warn!("unrecognized EMBEDDING_PROVIDER value {other:?}, ignoring");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub embedding_provider: ProviderChoice,
    pub semantic_matching_weight: f32,
    pub cross_project_scope: Scope,
    pub hybrid_sync_enabled: bool,
    pub realtime_timeout_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            embedding_provider: ProviderChoice::Auto,
            semantic_matching_weight: 0.5,
            cross_project_scope: Scope::default(),
            hybrid_sync_enabled: false,
            realtime_timeout_ms: 500,
        }
    }
}

impl CoreConfig {
    /// Resolved provider: environment variable wins over the config file.
    pub fn resolved_provider(&self) -> ProviderChoice {
        ProviderChoice::from_env().unwrap_or(self.embedding_provider)
    }
}

pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> Result<CoreConfig> {
        if !self.path.exists() {
            let default = CoreConfig::default();
            self.save(&default).await?;
            return Ok(default);
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        let config = match self.path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            _ => serde_json::from_str(&content)?,
        };
        debug!("loaded core config from {:?}", self.path);
        Ok(config)
    }

    pub async fn save(&self, config: &CoreConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        let content = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&self.path, content).await?;
        info!("wrote default core config to {:?}", self.path);
        Ok(())
    }
}
