//! Job registry
//!
//! The single owner of job records. Every read and write goes through one
//! lock, so a check and the transition that follows it are atomic; this is
//! what keeps two concurrent submissions of the same job from both reaching
//! the farm.
//!
//! Each mutation bumps a version on a watch channel. Submissions waiting on
//! upstream jobs subscribe to it instead of polling.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use farmhand_core::domain::dependency::DependencyKind;
use farmhand_core::domain::job::{Job, JobId, JobState, RemoteJobId};
use farmhand_core::domain::record::{JobRecord, StateChange};
use farmhand_core::domain::submission::{ErrorKind, FailureCause};
use farmhand_core::domain::task::Task;
use farmhand_core::dto::descriptor::UpstreamRef;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::SubmitError;

/// Message retained on jobs that were mid-submission when a snapshot was taken
pub const INTERRUPTED_MESSAGE: &str = "submission interrupted";

/// Records under the registry lock
#[derive(Debug, Default)]
pub struct RecordSet {
    records: HashMap<JobId, JobRecord>,
    by_remote: HashMap<RemoteJobId, JobId>,
    dirty: bool,
}

/// Whether a job's upstream jobs allow it to be submitted now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Ready(Vec<UpstreamRef>),
    Waiting(Vec<JobId>),
    Blocked { upstream: JobId, state: JobState },
    InvalidOffset {
        upstream: JobId,
        offset: i64,
        upstream_tasks: usize,
    },
}

/// Everything the broker needs to submit a job, taken atomically with the
/// move to `Submitting`
#[derive(Debug, Clone)]
pub struct SubmissionTicket {
    pub job: Job,
    pub tasks: Vec<Task>,
    pub upstream: Vec<UpstreamRef>,
    pub change: StateChange,
}

impl RecordSet {
    pub fn get(&self, job_id: JobId) -> Option<&JobRecord> {
        self.records.get(&job_id)
    }

    /// Mutable access; marks the set as changed
    pub fn get_mut(&mut self, job_id: JobId) -> Option<&mut JobRecord> {
        let record = self.records.get_mut(&job_id)?;
        self.dirty = true;
        Some(record)
    }

    pub fn records(&self) -> impl Iterator<Item = &JobRecord> {
        self.records.values()
    }

    pub fn job_for_remote(&self, remote_id: &RemoteJobId) -> Option<JobId> {
        self.by_remote.get(remote_id).copied()
    }

    /// Records the farm's id for a job
    pub fn link_remote(&mut self, job_id: JobId, remote_id: RemoteJobId) {
        if let Some(record) = self.get_mut(job_id) {
            if let Some(previous) = record.job.remote_id.replace(remote_id.clone()) {
                self.by_remote.remove(&previous);
            }
            self.by_remote.insert(remote_id, job_id);
        }
    }

    /// Forgets a job's farm id, as a reset does
    pub fn unlink_remote(&mut self, job_id: JobId) {
        if let Some(remote_id) = self.get(job_id).and_then(|r| r.remote_id()).cloned() {
            self.by_remote.remove(&remote_id);
        }
    }

    /// Jobs declaring a dependency on `upstream`, oldest first
    pub fn direct_dependents(&self, upstream: JobId) -> Vec<(JobId, DependencyKind)> {
        let mut dependents: Vec<&JobRecord> = self
            .records
            .values()
            .filter(|r| r.job.dependencies.iter().any(|d| d.upstream == upstream))
            .collect();
        dependents.sort_by_key(|r| (r.job.created_at, r.id()));

        dependents
            .into_iter()
            .flat_map(|r| {
                r.job
                    .dependencies
                    .iter()
                    .filter(|d| d.upstream == upstream)
                    .map(|d| (r.id(), d.kind))
            })
            .collect()
    }

    /// Evaluates a job's dependencies against the current upstream states
    ///
    /// A job-level dependency needs its upstream `Done`. A frame-level one
    /// only needs the upstream accepted by the farm; individual tasks are
    /// released later. An upstream that failed or was cancelled blocks the
    /// job for good.
    pub fn gate(&self, job_id: JobId) -> Gate {
        let Some(record) = self.get(job_id) else {
            return Gate::Waiting(Vec::new());
        };

        let mut waiting = Vec::new();
        let mut invalid = None;
        let mut upstream_refs = Vec::with_capacity(record.job.dependencies.len());

        for dependency in &record.job.dependencies {
            let Some(upstream) = self.get(dependency.upstream) else {
                waiting.push(dependency.upstream);
                continue;
            };
            let state = upstream.state();

            let satisfied = match dependency.kind {
                DependencyKind::Job => match state {
                    JobState::Done => true,
                    JobState::Failed | JobState::Cancelled | JobState::PartiallyFailed => {
                        return Gate::Blocked {
                            upstream: dependency.upstream,
                            state,
                        };
                    }
                    _ => false,
                },
                DependencyKind::Frame { offset } => {
                    if offset.unsigned_abs() >= upstream.tasks.len() as u64 && invalid.is_none() {
                        invalid = Some(Gate::InvalidOffset {
                            upstream: dependency.upstream,
                            offset,
                            upstream_tasks: upstream.tasks.len(),
                        });
                    }
                    match state {
                        JobState::Submitted | JobState::Done | JobState::PartiallyFailed => true,
                        JobState::Failed | JobState::Cancelled => {
                            return Gate::Blocked {
                                upstream: dependency.upstream,
                                state,
                            };
                        }
                        _ => false,
                    }
                }
            };

            if !satisfied {
                waiting.push(dependency.upstream);
            }
            upstream_refs.push(UpstreamRef {
                name: upstream.job.name.clone(),
                kind: dependency.kind,
            });
        }

        if let Some(gate) = invalid {
            return gate;
        }
        if !waiting.is_empty() {
            return Gate::Waiting(waiting);
        }
        Gate::Ready(upstream_refs)
    }

    fn insert(&mut self, record: JobRecord) {
        if let Some(remote_id) = record.remote_id() {
            self.by_remote.insert(remote_id.clone(), record.id());
        }
        self.records.insert(record.id(), record);
        self.dirty = true;
    }
}

/// Shared, lock-guarded store of job records
#[derive(Debug)]
pub struct JobRegistry {
    inner: Mutex<RecordSet>,
    changes: watch::Sender<u64>,
}

impl JobRegistry {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Mutex::new(RecordSet::default()),
            changes,
        }
    }

    /// A panic while holding the lock leaves records consistent per job, so a
    /// poisoned lock is still usable
    fn lock(&self) -> MutexGuard<'_, RecordSet> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    /// Receiver that fires after every registry change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Runs `f` under the lock
    pub fn read<R>(&self, f: impl FnOnce(&RecordSet) -> R) -> R {
        f(&self.lock())
    }

    /// Runs `f` under the lock, notifying subscribers if it changed anything
    pub fn update<R>(&self, f: impl FnOnce(&mut RecordSet) -> R) -> R {
        let (result, dirty) = {
            let mut set = self.lock();
            set.dirty = false;
            let result = f(&mut set);
            (result, set.dirty)
        };
        if dirty {
            self.notify();
        }
        result
    }

    /// Adds or replaces a record
    pub fn insert(&self, record: JobRecord) {
        debug!("Registering job '{}' ({})", record.job.name, record.id());
        self.update(|set| set.insert(record));
    }

    pub fn get(&self, job_id: JobId) -> Option<JobRecord> {
        self.read(|set| set.get(job_id).cloned())
    }

    pub fn state(&self, job_id: JobId) -> Option<JobState> {
        self.read(|set| set.get(job_id).map(JobRecord::state))
    }

    pub fn contains(&self, job_id: JobId) -> bool {
        self.read(|set| set.get(job_id).is_some())
    }

    pub fn len(&self) -> usize {
        self.read(|set| set.records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn job_for_remote(&self, remote_id: &RemoteJobId) -> Option<JobId> {
        self.read(|set| set.job_for_remote(remote_id))
    }

    /// Ids of jobs in `states`, oldest first
    pub fn ids_in(&self, states: &[JobState]) -> Vec<JobId> {
        self.snapshot()
            .into_iter()
            .filter(|r| states.contains(&r.state()))
            .map(|r| r.id())
            .collect()
    }

    /// Atomically checks that `job_id` may be submitted and moves it to
    /// `Submitting`
    ///
    /// Nothing changes unless the job is returned ready; a refused request
    /// leaves the registry and its subscribers untouched.
    pub fn begin_submission(&self, job_id: JobId) -> Result<SubmissionTicket, SubmitError> {
        let ticket = {
            let mut set = self.lock();
            let record = set.get(job_id).ok_or(SubmitError::UnknownJob(job_id))?;

            match record.state() {
                JobState::Draft | JobState::Validated => {}
                JobState::Submitting => return Err(SubmitError::AlreadySubmitting(job_id)),
                JobState::Failed => {
                    if let Some(upstream) = record
                        .last_error
                        .as_ref()
                        .filter(|cause| cause.kind == ErrorKind::DependencyFailed)
                        .and_then(|cause| cause.upstream)
                    {
                        let state = set.get(upstream).map_or(JobState::Failed, JobRecord::state);
                        return Err(SubmitError::DependencyFailed {
                            job_id,
                            upstream,
                            state,
                        });
                    }
                    return Err(SubmitError::NotSubmittable {
                        job_id,
                        state: JobState::Failed,
                    });
                }
                state => return Err(SubmitError::NotSubmittable { job_id, state }),
            }

            let upstream = match set.gate(job_id) {
                Gate::Ready(upstream) => upstream,
                Gate::Waiting(waiting) => {
                    return Err(SubmitError::DependenciesPending { job_id, waiting });
                }
                Gate::Blocked { upstream, state } => {
                    return Err(SubmitError::DependencyFailed {
                        job_id,
                        upstream,
                        state,
                    });
                }
                Gate::InvalidOffset {
                    upstream,
                    offset,
                    upstream_tasks,
                } => {
                    return Err(SubmitError::InvalidDependencyOffset {
                        job_id,
                        upstream,
                        offset,
                        upstream_tasks,
                    });
                }
            };

            let record = set.get_mut(job_id).ok_or(SubmitError::UnknownJob(job_id))?;
            let change = record
                .transition(JobState::Submitting)
                .map_err(|e| SubmitError::NotSubmittable {
                    job_id,
                    state: e.from,
                })?;

            SubmissionTicket {
                job: record.job.clone(),
                tasks: record.tasks.clone(),
                upstream,
                change,
            }
        };

        self.notify();
        Ok(ticket)
    }

    /// Copies every record, oldest first
    pub fn snapshot(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self.read(|set| set.records.values().cloned().collect());
        records.sort_by_key(|r| (r.job.created_at, r.id()));
        records
    }

    /// Loads records from a snapshot
    ///
    /// A job caught in `Submitting` may or may not have reached the farm, so
    /// it is restored as failed rather than resubmitted behind the caller's
    /// back. The returned changes cover those jobs.
    pub fn restore(&self, records: Vec<JobRecord>) -> Vec<StateChange> {
        self.update(|set| {
            let mut changes = Vec::new();
            for mut record in records {
                if record.state() == JobState::Submitting {
                    match record.fail(FailureCause::new(ErrorKind::Transient, INTERRUPTED_MESSAGE)) {
                        Ok(change) => {
                            warn!(
                                "Job '{}' ({}) was mid-submission; marked failed",
                                record.job.name,
                                record.id()
                            );
                            changes.push(change);
                        }
                        Err(e) => warn!("Could not mark interrupted job failed: {}", e),
                    }
                }
                set.insert(record);
            }
            changes
        })
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use farmhand_core::builder::build;
    use farmhand_core::domain::dependency::JobDependency;
    use farmhand_core::dto::submit::SubmitParams;
    use farmhand_core::planner::plan;

    fn record(name: &str, dependencies: Vec<JobDependency>) -> JobRecord {
        let job = build(&SubmitParams {
            name: name.to_string(),
            pool: "gpu".to_string(),
            frame_start: 1,
            frame_end: 10,
            scene_paths: vec![format!("/scenes/{}.ass", name)],
            dependencies,
            ..Default::default()
        })
        .unwrap();
        let tasks = plan(job.id, job.frame_range, job.chunk_size).unwrap();
        JobRecord::new(job, tasks)
    }

    fn set_state(registry: &JobRegistry, job_id: JobId, state: JobState) {
        registry.update(|set| set.get_mut(job_id).unwrap().job.state = state);
    }

    #[test]
    fn test_begin_submission_moves_to_submitting() {
        let registry = JobRegistry::new();
        let upstream = record("lighting", vec![]);
        let id = upstream.id();
        registry.insert(upstream);

        let ticket = registry.begin_submission(id).unwrap();
        assert_eq!(ticket.change.from, JobState::Validated);
        assert_eq!(ticket.change.to, JobState::Submitting);
        assert_eq!(ticket.tasks.len(), 10);
        assert_eq!(registry.state(id), Some(JobState::Submitting));

        assert_eq!(
            registry.begin_submission(id).unwrap_err(),
            SubmitError::AlreadySubmitting(id)
        );
    }

    #[test]
    fn test_begin_submission_unknown_job() {
        let registry = JobRegistry::new();
        let id = JobId::new();
        assert_eq!(registry.begin_submission(id).unwrap_err(), SubmitError::UnknownJob(id));
    }

    #[test]
    fn test_job_dependency_waits_for_done() {
        let registry = JobRegistry::new();
        let upstream = record("sim", vec![]);
        let upstream_id = upstream.id();
        let dependent = record("render", vec![JobDependency::job(upstream_id)]);
        let dependent_id = dependent.id();
        registry.insert(upstream);
        registry.insert(dependent);

        assert_matches!(
            registry.begin_submission(dependent_id),
            Err(SubmitError::DependenciesPending { waiting, .. }) if waiting == vec![upstream_id]
        );

        set_state(&registry, upstream_id, JobState::Submitted);
        assert_matches!(
            registry.begin_submission(dependent_id),
            Err(SubmitError::DependenciesPending { .. })
        );

        set_state(&registry, upstream_id, JobState::Done);
        let ticket = registry.begin_submission(dependent_id).unwrap();
        assert_eq!(ticket.upstream.len(), 1);
        assert_eq!(ticket.upstream[0].name, "sim");
    }

    #[test]
    fn test_frame_dependency_needs_only_submitted() {
        let registry = JobRegistry::new();
        let upstream = record("sim", vec![]);
        let upstream_id = upstream.id();
        let dependent = record("render", vec![JobDependency::frame(upstream_id, -1)]);
        let dependent_id = dependent.id();
        registry.insert(upstream);
        registry.insert(dependent);

        assert_matches!(
            registry.begin_submission(dependent_id),
            Err(SubmitError::DependenciesPending { .. })
        );

        set_state(&registry, upstream_id, JobState::Submitted);
        assert!(registry.begin_submission(dependent_id).is_ok());
    }

    #[test]
    fn test_failed_upstream_blocks() {
        let registry = JobRegistry::new();
        let upstream = record("sim", vec![]);
        let upstream_id = upstream.id();
        let dependent = record("render", vec![JobDependency::job(upstream_id)]);
        let dependent_id = dependent.id();
        registry.insert(upstream);
        registry.insert(dependent);
        set_state(&registry, upstream_id, JobState::Cancelled);

        assert_eq!(
            registry.begin_submission(dependent_id).unwrap_err(),
            SubmitError::DependencyFailed {
                job_id: dependent_id,
                upstream: upstream_id,
                state: JobState::Cancelled,
            }
        );
        assert_eq!(registry.state(dependent_id), Some(JobState::Validated));
    }

    #[test]
    fn test_offset_beyond_upstream_is_rejected() {
        let registry = JobRegistry::new();
        let upstream = record("sim", vec![]);
        let upstream_id = upstream.id();
        let dependent = record("render", vec![JobDependency::frame(upstream_id, 10)]);
        let dependent_id = dependent.id();
        registry.insert(upstream);
        registry.insert(dependent);
        set_state(&registry, upstream_id, JobState::Submitted);

        assert_matches!(
            registry.begin_submission(dependent_id),
            Err(SubmitError::InvalidDependencyOffset {
                offset: 10,
                upstream_tasks: 10,
                ..
            })
        );
    }

    #[test]
    fn test_refused_submission_does_not_notify() {
        let registry = JobRegistry::new();
        let done = record("comp", vec![]);
        let id = done.id();
        registry.insert(done);
        set_state(&registry, id, JobState::Done);

        let mut changes = registry.subscribe();
        assert_matches!(
            registry.begin_submission(id),
            Err(SubmitError::NotSubmittable {
                state: JobState::Done,
                ..
            })
        );
        assert!(!changes.has_changed().unwrap());

        set_state(&registry, id, JobState::Failed);
        assert!(changes.has_changed().unwrap());
    }

    #[test]
    fn test_restore_fails_interrupted_submissions() {
        let registry = JobRegistry::new();
        let mut interrupted = record("fx", vec![]);
        interrupted.job.state = JobState::Submitting;
        let interrupted_id = interrupted.id();
        let mut submitted = record("lighting", vec![]);
        submitted.job.state = JobState::Submitted;
        submitted.job.remote_id = Some(RemoteJobId::from("88"));
        let submitted_id = submitted.id();

        let changes = registry.restore(vec![interrupted, submitted]);

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].job_id, interrupted_id);
        let restored = registry.get(interrupted_id).unwrap();
        assert_eq!(restored.state(), JobState::Failed);
        assert_eq!(restored.last_error.unwrap().message, INTERRUPTED_MESSAGE);
        assert_eq!(
            registry.job_for_remote(&RemoteJobId::from("88")),
            Some(submitted_id)
        );
    }

    #[test]
    fn test_snapshot_is_oldest_first() {
        let registry = JobRegistry::new();
        let first = record("a", vec![]);
        let mut second = record("b", vec![]);
        second.job.created_at = first.job.created_at + chrono::Duration::seconds(1);
        let (first_id, second_id) = (first.id(), second.id());
        registry.insert(second);
        registry.insert(first);

        let ids: Vec<JobId> = registry.snapshot().iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![first_id, second_id]);
    }
}
