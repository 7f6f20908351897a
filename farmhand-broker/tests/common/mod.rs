//! Shared fixtures for broker integration tests
//!
//! `ScriptedFarm` stands in for the farm client: submissions follow a script
//! of outcomes, status queries return whatever the test last set, and every
//! call is recorded.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use farmhand_broker::{BrokerConfig, SubmissionObserver, SubmissionService};
use farmhand_client::{ClientError, FarmClient, FarmConnector, StaticConnector};
use farmhand_core::domain::dependency::JobDependency;
use farmhand_core::domain::job::{Job, JobId, JobState, RemoteJobId};
use farmhand_core::domain::record::StateChange;
use farmhand_core::domain::submission::SubmissionResult;
use farmhand_core::domain::task::TaskStatus;
use farmhand_core::dto::descriptor::FarmJobDescriptor;
use farmhand_core::dto::status::{FarmJobStatus, StatusSnapshot, TaskProgress};
use farmhand_core::dto::submit::SubmitParams;
use tokio::sync::Notify;

/// What the farm does with the next submission
pub enum Step {
    Accept,
    Unreachable,
    Reject(&'static str),
    /// Accept, but only after the gate is notified
    AcceptAfter(Arc<Notify>),
    /// Never answer within any sane attempt timeout
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Submit(String),
    Query(RemoteJobId),
    Cancel(RemoteJobId),
    ListPools,
}

#[derive(Default)]
pub struct ScriptedFarm {
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<Call>>,
    submitted: Mutex<Vec<FarmJobDescriptor>>,
    statuses: Mutex<HashMap<RemoteJobId, StatusSnapshot>>,
    deleted: Mutex<HashSet<RemoteJobId>>,
    next_id: AtomicU64,
}

impl ScriptedFarm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(steps: Vec<Step>) -> Arc<Self> {
        let farm = Self::default();
        farm.script.lock().unwrap().extend(steps);
        Arc::new(farm)
    }

    pub fn push(&self, step: Step) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn submit_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Submit(_)))
            .count()
    }

    pub fn cancelled(&self) -> Vec<RemoteJobId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Cancel(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Descriptors the farm accepted or refused, in call order
    pub fn descriptors(&self) -> Vec<FarmJobDescriptor> {
        self.submitted.lock().unwrap().clone()
    }

    /// Sets what status queries for `remote_id` return
    pub fn set_status(&self, remote_id: &RemoteJobId, job_status: FarmJobStatus, tasks: &[TaskStatus]) {
        let snapshot = StatusSnapshot {
            job_status,
            tasks: tasks
                .iter()
                .enumerate()
                .map(|(index, &status)| TaskProgress { index, status })
                .collect(),
        };
        self.statuses.lock().unwrap().insert(remote_id.clone(), snapshot);
    }

    /// Drops a job as if someone deleted it on the farm directly
    pub fn delete_outside(&self, remote_id: &RemoteJobId) {
        self.deleted.lock().unwrap().insert(remote_id.clone());
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl FarmClient for ScriptedFarm {
    async fn submit_job(&self, descriptor: &FarmJobDescriptor) -> farmhand_client::Result<RemoteJobId> {
        self.record(Call::Submit(descriptor.name.clone()));
        self.submitted.lock().unwrap().push(descriptor.clone());
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Accept);

        match step {
            Step::Accept => {}
            Step::Unreachable => return Err(ClientError::Unreachable("connection refused".into())),
            Step::Reject(reason) => return Err(ClientError::Rejected(reason.into())),
            Step::AcceptAfter(gate) => gate.notified().await,
            Step::Hang => tokio::time::sleep(Duration::from_secs(3600)).await,
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 100;
        Ok(RemoteJobId(id.to_string()))
    }

    async fn query_status(&self, remote_id: &RemoteJobId) -> farmhand_client::Result<StatusSnapshot> {
        self.record(Call::Query(remote_id.clone()));
        if self.deleted.lock().unwrap().contains(remote_id) {
            return Err(ClientError::JobNotFound(remote_id.clone()));
        }
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(remote_id)
            .cloned()
            .unwrap_or(StatusSnapshot {
                job_status: FarmJobStatus::Queued,
                tasks: Vec::new(),
            }))
    }

    async fn cancel_job(&self, remote_id: &RemoteJobId) -> farmhand_client::Result<()> {
        self.record(Call::Cancel(remote_id.clone()));
        Ok(())
    }

    async fn list_pools(&self) -> farmhand_client::Result<Vec<String>> {
        self.record(Call::ListPools);
        Ok(vec!["cpu".to_string(), "gpu".to_string()])
    }
}

/// Connector for a farm integration that is not installed
pub struct MissingConnector;

#[async_trait]
impl FarmConnector for MissingConnector {
    async fn connect(&self) -> farmhand_client::Result<Arc<dyn FarmClient>> {
        Err(ClientError::Unavailable("afanasy module not found".into()))
    }
}

/// Observer collecting every event
#[derive(Default)]
pub struct Recorder {
    pub before: Mutex<Vec<String>>,
    pub after: Mutex<Vec<SubmissionResult>>,
    pub changes: Mutex<Vec<StateChange>>,
}

impl SubmissionObserver for Recorder {
    fn before_submit(&self, job: &Job) {
        self.before.lock().unwrap().push(job.name.clone());
    }

    fn after_submit(&self, _job: &Job, result: &SubmissionResult) {
        self.after.lock().unwrap().push(result.clone());
    }

    fn on_status_change(&self, change: &StateChange) {
        self.changes.lock().unwrap().push(*change);
    }
}

/// Millisecond backoffs and polling so tests run quickly
pub fn fast_config() -> BrokerConfig {
    BrokerConfig {
        max_retries: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
        attempt_timeout: Duration::from_millis(500),
        max_concurrent_farm_calls: 4,
        poll_interval: Duration::from_millis(10),
    }
}

pub fn service(farm: Arc<ScriptedFarm>) -> SubmissionService {
    service_with(farm, fast_config()).0
}

pub fn service_with(farm: Arc<ScriptedFarm>, config: BrokerConfig) -> (SubmissionService, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let observers: Vec<Arc<dyn SubmissionObserver>> = vec![recorder.clone()];
    let service = SubmissionService::new(config, Arc::new(StaticConnector::new(farm)), observers);
    (service, recorder)
}

pub fn params(name: &str, frames: i64, dependencies: Vec<JobDependency>) -> SubmitParams {
    SubmitParams {
        name: name.to_string(),
        pool: "gpu".to_string(),
        frame_start: 1,
        frame_end: frames,
        chunk_size: 1,
        scene_paths: vec![format!("/proj/shots/{}.ass", name)],
        dependencies,
        ..Default::default()
    }
}

/// Polls `condition` until it holds or a second passes
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

pub async fn wait_for_state(service: &SubmissionService, job_id: JobId, state: JobState) -> bool {
    eventually(|| service.registry().state(job_id) == Some(state)).await
}
