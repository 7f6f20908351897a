//! Farm client abstraction
//!
//! The broker talks to the farm only through these traits, which keeps the
//! transport swappable and lets tests script farm behaviour.

use std::sync::Arc;

use async_trait::async_trait;
use farmhand_core::domain::job::RemoteJobId;
use farmhand_core::dto::descriptor::FarmJobDescriptor;
use farmhand_core::dto::status::StatusSnapshot;

use crate::error::Result;

/// Operations the farm backend offers
#[async_trait]
pub trait FarmClient: Send + Sync {
    /// Submits a job with all of its tasks as one unit
    ///
    /// # Returns
    /// The identifier the farm assigned to the job
    async fn submit_job(&self, descriptor: &FarmJobDescriptor) -> Result<RemoteJobId>;

    /// Fetches the current job and task states
    async fn query_status(&self, remote_id: &RemoteJobId) -> Result<StatusSnapshot>;

    /// Asks the farm to stop and remove a job
    async fn cancel_job(&self, remote_id: &RemoteJobId) -> Result<()>;

    /// Lists the pool names the farm knows
    async fn list_pools(&self) -> Result<Vec<String>>;
}

/// Opens a farm client session
///
/// Called once, on first use; failures here mean the integration itself is
/// missing or misconfigured.
#[async_trait]
pub trait FarmConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn FarmClient>>;
}

/// Connector handing out an already constructed client
pub struct StaticConnector {
    client: Arc<dyn FarmClient>,
}

impl StaticConnector {
    pub fn new(client: Arc<dyn FarmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FarmConnector for StaticConnector {
    async fn connect(&self) -> Result<Arc<dyn FarmClient>> {
        Ok(Arc::clone(&self.client))
    }
}
