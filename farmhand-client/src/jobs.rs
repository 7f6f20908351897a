//! Job-related farm requests

use async_trait::async_trait;
use farmhand_core::domain::job::RemoteJobId;
use farmhand_core::dto::descriptor::FarmJobDescriptor;
use farmhand_core::dto::status::StatusSnapshot;
use serde_json::json;

use crate::AfanasyClient;
use crate::error::{ClientError, Result};
use crate::farm::FarmClient;
use crate::wire::{self, AfJob};

impl AfanasyClient {
    // =============================================================================
    // Job Lifecycle
    // =============================================================================

    /// Sends a job to the server
    ///
    /// # Arguments
    /// * `descriptor` - The job and all of its tasks
    ///
    /// # Returns
    /// The id the server assigned
    pub async fn send_job(&self, descriptor: &FarmJobDescriptor) -> Result<RemoteJobId> {
        let job = serde_json::to_value(AfJob::new(descriptor, &self.user_name, &self.host_name))
            .map_err(|e| ClientError::ParseError(format!("cannot encode job: {}", e)))?;
        let body = json!({ "job": job });
        let reply = self.send_request(&body).await?;

        wire::parse_job_id(&reply).ok_or_else(|| {
            ClientError::ParseError(format!("no job id in submission reply: {}", reply))
        })
    }

    /// Gets the job state and per-task progress
    ///
    /// # Arguments
    /// * `remote_id` - The farm job id
    pub async fn get_job_status(&self, remote_id: &RemoteJobId) -> Result<StatusSnapshot> {
        let id = wire::numeric_id(remote_id)?;

        let state_reply = self
            .send_request(&wire::get_request("jobs", &[id], None))
            .await?;
        let job_status = wire::parse_job_state(&state_reply, id)?;

        let progress_reply = self
            .send_request(&wire::get_request("jobs", &[id], Some("progress")))
            .await?;
        let tasks = wire::parse_progress(&progress_reply)?;

        Ok(StatusSnapshot { job_status, tasks })
    }

    /// Deletes a job from the server
    ///
    /// # Arguments
    /// * `remote_id` - The farm job id
    pub async fn delete_job(&self, remote_id: &RemoteJobId) -> Result<()> {
        let id = wire::numeric_id(remote_id)?;
        self.send_request(&wire::delete_request(id, &self.user_name, &self.host_name))
            .await?;

        tracing::info!("Deleted farm job {}", remote_id);
        Ok(())
    }
}

#[async_trait]
impl FarmClient for AfanasyClient {
    async fn submit_job(&self, descriptor: &FarmJobDescriptor) -> Result<RemoteJobId> {
        self.send_job(descriptor).await
    }

    async fn query_status(&self, remote_id: &RemoteJobId) -> Result<StatusSnapshot> {
        self.get_job_status(remote_id).await
    }

    async fn cancel_job(&self, remote_id: &RemoteJobId) -> Result<()> {
        self.delete_job(remote_id).await
    }

    async fn list_pools(&self) -> Result<Vec<String>> {
        self.get_pools().await
    }
}
