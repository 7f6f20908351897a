//! Pool catalog service
//!
//! Keeps the farm's pool names in the config store so submission forms can
//! offer them without a farm round trip, plus named presets that pick a pool
//! for the user.

use std::sync::Arc;

use farmhand_core::dto::submit::SubmitParams;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::broker::SubmissionBroker;
use crate::error::SubmitError;
use crate::store::{ConfigStore, StoreError};

/// Config store namespace for farm settings
pub const NAMESPACE: &str = "afanasy";
/// Key holding the cached pool names
pub const POOLS_KEY: &str = "pools";
/// Key holding the pool presets
pub const PRESETS_KEY: &str = "poolPresets";

/// A named pool choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolPreset {
    pub name: String,
    pub pool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_pool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Farm(#[from] SubmitError),

    #[error("No pool preset named '{0}'")]
    UnknownPreset(String),

    #[error("Preset '{preset}' uses pool '{pool}', which the farm does not offer")]
    UnknownPool { preset: String, pool: String },
}

/// Cached farm pools and user presets
pub struct PoolCatalog {
    store: Arc<dyn ConfigStore>,
    broker: Arc<SubmissionBroker>,
}

impl PoolCatalog {
    pub fn new(store: Arc<dyn ConfigStore>, broker: Arc<SubmissionBroker>) -> Self {
        Self { store, broker }
    }

    /// Cached pool names, fetched from the farm if the cache is empty
    pub async fn pools(&self) -> Result<Vec<String>, PoolError> {
        let cached = self.cached()?;
        if !cached.is_empty() {
            return Ok(cached);
        }
        debug!("Pool cache empty, asking the farm");
        self.refresh().await
    }

    /// Pool names as last stored, without asking the farm
    pub fn cached(&self) -> Result<Vec<String>, PoolError> {
        self.read(POOLS_KEY)
    }

    /// Fetches pool names from the farm and replaces the cache
    ///
    /// A failed fetch leaves the cache as it was.
    pub async fn refresh(&self) -> Result<Vec<String>, PoolError> {
        let mut pools = self.broker.list_pools().await?;
        pools.sort();
        pools.dedup();

        self.write(POOLS_KEY, &pools)?;
        info!("Pool catalog refreshed: {} pool(s)", pools.len());
        Ok(pools)
    }

    pub fn presets(&self) -> Result<Vec<PoolPreset>, PoolError> {
        self.read(PRESETS_KEY)
    }

    pub fn preset(&self, name: &str) -> Result<Option<PoolPreset>, PoolError> {
        Ok(self.presets()?.into_iter().find(|p| p.name == name))
    }

    /// Adds a preset, replacing any preset with the same name
    pub fn save_preset(&self, preset: PoolPreset) -> Result<(), PoolError> {
        let mut presets = self.presets()?;
        match presets.iter_mut().find(|p| p.name == preset.name) {
            Some(existing) => *existing = preset,
            None => presets.push(preset),
        }
        self.write(PRESETS_KEY, &presets)
    }

    /// # Returns
    /// Whether a preset was removed
    pub fn remove_preset(&self, name: &str) -> Result<bool, PoolError> {
        let mut presets = self.presets()?;
        let before = presets.len();
        presets.retain(|p| p.name != name);
        if presets.len() == before {
            return Ok(false);
        }
        self.write(PRESETS_KEY, &presets)?;
        Ok(true)
    }

    /// Sets the pool of `params` from a preset
    ///
    /// The preset's pool must be one the catalog knows.
    pub async fn apply_preset(&self, name: &str, params: &mut SubmitParams) -> Result<(), PoolError> {
        let preset = self
            .preset(name)?
            .ok_or_else(|| PoolError::UnknownPreset(name.to_string()))?;

        if !self.pools().await?.contains(&preset.pool) {
            return Err(PoolError::UnknownPool {
                preset: preset.name,
                pool: preset.pool,
            });
        }

        params.pool = preset.pool;
        Ok(())
    }

    fn read<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<Vec<T>, PoolError> {
        match self.store.get(NAMESPACE, key)? {
            None | Some(serde_json::Value::Null) => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value).map_err(|e| {
                PoolError::Store(StoreError::Shape {
                    namespace: NAMESPACE.to_string(),
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            }),
        }
    }

    fn write<T: Serialize>(&self, key: &str, values: &[T]) -> Result<(), PoolError> {
        let value = serde_json::to_value(values).map_err(StoreError::Format)?;
        self.store.set(NAMESPACE, key, value)?;
        Ok(())
    }
}
