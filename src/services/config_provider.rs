//! Global configuration provider seam.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::Result;
use crate::models::global_config::GlobalConfig;

/// Source of the current policy-ceiling snapshot.
///
/// Every orchestrator operation fetches a fresh snapshot; nothing pins a
/// version to a running saga. A config change landing mid-saga is an
/// accepted race.
#[async_trait]
pub trait GlobalConfigProvider: Send + Sync {
    async fn get(&self) -> Result<GlobalConfig>;
}

/// In-process provider holding a replaceable snapshot. Backs tests and
/// single-process deployments; hosted deployments wrap their managed config
/// store behind the same trait.
pub struct StaticConfigProvider {
    current: RwLock<GlobalConfig>,
}

impl StaticConfigProvider {
    pub fn new(config: GlobalConfig) -> Self {
        Self {
            current: RwLock::new(config),
        }
    }

    /// Replace the snapshot subsequent `get` calls observe.
    pub async fn set(&self, config: GlobalConfig) {
        *self.current.write().await = config;
    }
}

#[async_trait]
impl GlobalConfigProvider for StaticConfigProvider {
    async fn get(&self) -> Result<GlobalConfig> {
        Ok(self.current.read().await.clone())
    }
}
