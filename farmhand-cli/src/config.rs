//! Configuration module
//!
//! Handles CLI configuration and builds the broker pieces each command needs.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use farmhand_broker::service::PoolCatalog;
use farmhand_broker::store::JsonFileConfigStore;
use farmhand_broker::{BrokerConfig, SubmissionService, TracingObserver};
use farmhand_client::AfanasyConnector;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the farm server
    pub farm_url: String,
    /// Config store file for pools and presets
    pub config_file: PathBuf,
}

impl Config {
    /// Builds a submission service talking to the configured farm
    ///
    /// Broker tuning comes from the `FARMHAND_*` environment variables.
    pub fn service(&self) -> Result<SubmissionService> {
        let broker_config = BrokerConfig::from_env().context("Invalid broker configuration")?;
        let connector = AfanasyConnector::new(self.farm_url.clone(), broker_config.attempt_timeout);

        Ok(SubmissionService::new(
            broker_config,
            Arc::new(connector),
            vec![Arc::new(TracingObserver)],
        ))
    }

    /// Pool catalog backed by the config file
    pub fn catalog(&self, service: &SubmissionService) -> PoolCatalog {
        let store = JsonFileConfigStore::new(self.config_file.clone());
        PoolCatalog::new(Arc::new(store), Arc::clone(service.broker()))
    }
}
