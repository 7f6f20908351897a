//! Dependency Resolver
//!
//! The shared dependency graph. Registering a job adds its node and all of
//! its edges as one step: if any edge would close a cycle the job is removed
//! again and the graph is left as it was.

use farmhand_core::domain::job::{Job, JobId};
use farmhand_core::error::GraphError;
use farmhand_core::graph::DependencyGraph;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Dependency graph shared across submissions
#[derive(Debug, Default)]
pub struct SharedResolver {
    graph: RwLock<DependencyGraph>,
}

impl SharedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `job` and the edges from each of its upstream jobs
    pub async fn register(&self, job: &Job) -> Result<(), GraphError> {
        let mut graph = self.graph.write().await;
        graph.add_job(job.id)?;

        for dependency in &job.dependencies {
            if let Err(e) = graph.add_edge(dependency.edge_for(job.id)) {
                warn!("Rejecting job '{}' ({}): {}", job.name, job.id, e);
                graph.remove_job(job.id);
                return Err(e);
            }
        }

        debug!(
            "Job '{}' ({}) added to dependency graph with {} upstream edge(s)",
            job.name,
            job.id,
            job.dependencies.len()
        );
        Ok(())
    }

    pub async fn remove(&self, job_id: JobId) -> bool {
        self.graph.write().await.remove_job(job_id)
    }

    pub async fn contains(&self, job_id: JobId) -> bool {
        self.graph.read().await.contains(job_id)
    }

    /// Every job downstream of `job_id`
    pub async fn dependents(&self, job_id: JobId) -> Vec<JobId> {
        self.graph.read().await.dependents(job_id)
    }

    /// Orders `jobs` so each comes after its upstream jobs
    pub async fn resolve_submission_order(&self, jobs: &[JobId]) -> Result<Vec<JobId>, GraphError> {
        self.graph.read().await.resolve_submission_order(jobs)
    }
}
