//! Job State Tracker
//!
//! Applies submission outcomes and farm status updates to the registry and
//! propagates failures to dependent jobs. Updates are idempotent: a status
//! update whose sequence was already applied is logged and dropped.
//!
//! Nothing here reports an error upward. Every change is announced through
//! the event bus once the registry lock is released.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use farmhand_core::domain::dependency::{DependencyKind, upstream_task_index};
use farmhand_core::domain::job::{JobId, JobState, RemoteJobId};
use farmhand_core::domain::record::{JobRecord, StateChange};
use farmhand_core::domain::submission::{ErrorKind, FailureCause, SubmissionResult};
use farmhand_core::domain::task::TaskStatus;
use farmhand_core::dto::status::{FarmJobStatus, StatusSnapshot, StatusUpdate};
use tracing::{debug, info, warn};

use crate::error::SubmitError;
use crate::events::EventBus;
use crate::registry::{JobRegistry, RecordSet};

/// What a tracker call changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    pub changes: Vec<StateChange>,
    /// Jobs the farm still holds that no longer have a reason to run;
    /// the caller should cancel them remotely
    pub orphaned: Vec<RemoteJobId>,
}

impl Transition {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.orphaned.is_empty()
    }

    /// New state of `job_id`, if this call changed it
    pub fn state_of(&self, job_id: JobId) -> Option<JobState> {
        self.changes
            .iter()
            .rev()
            .find(|c| c.job_id == job_id)
            .map(|c| c.to)
    }
}

/// Tracks job states against farm reality
#[derive(Debug, Clone)]
pub struct JobStateTracker {
    registry: Arc<JobRegistry>,
    events: EventBus,
}

impl JobStateTracker {
    pub fn new(registry: Arc<JobRegistry>, events: EventBus) -> Self {
        Self { registry, events }
    }

    pub fn state(&self, job_id: JobId) -> Option<JobState> {
        self.registry.state(job_id)
    }

    pub fn last_error(&self, job_id: JobId) -> Option<FailureCause> {
        self.registry.get(job_id).and_then(|r| r.last_error)
    }

    fn publish(&self, transition: &Transition) {
        self.events.status_changed(&transition.changes);
    }

    // =============================================================================
    // Submission Outcomes
    // =============================================================================

    /// Applies the broker's final result for a submission
    ///
    /// If the job was cancelled while the farm call was in flight, a
    /// successful submission is reported as orphaned so it can be removed
    /// from the farm.
    pub fn record_submission(&self, job_id: JobId, result: &SubmissionResult) -> Transition {
        let transition = self.registry.update(|set| {
            let mut transition = Transition::default();
            let Some(state) = set.get(job_id).map(JobRecord::state) else {
                warn!("Submission result for unknown job {}", job_id);
                return transition;
            };

            if state != JobState::Submitting {
                if let Some(remote_id) = result.remote_job_id.clone() {
                    info!(
                        "Job {} became {} while submitting; farm job {} is orphaned",
                        job_id, state, remote_id
                    );
                    transition.orphaned.push(remote_id);
                }
                return transition;
            }

            match (&result.remote_job_id, result.success) {
                (Some(remote_id), true) => {
                    set.link_remote(job_id, remote_id.clone());
                    if let Some(record) = set.get_mut(job_id) {
                        for task in &mut record.tasks {
                            task.status = TaskStatus::Dispatched;
                        }
                        push_change(&mut transition, record.transition(JobState::Submitted));
                    }
                }
                _ => {
                    let kind = result.error_kind.unwrap_or(ErrorKind::Transient);
                    let cause = FailureCause::new(kind, result.message.clone());
                    fail_with_cascade(set, job_id, cause, &mut transition);
                }
            }
            transition
        });

        self.publish(&transition);
        transition
    }

    /// Marks a job that can never run because an upstream ended badly
    pub fn fail_blocked(&self, job_id: JobId, upstream: JobId, upstream_state: JobState) -> Transition {
        let transition = self.registry.update(|set| {
            let mut transition = Transition::default();
            let runnable = set.get(job_id).is_some_and(|r| !r.state().is_terminal());
            if runnable {
                let cause = FailureCause::dependency(
                    upstream,
                    format!("upstream job {} is {}", upstream, upstream_state),
                );
                fail_with_cascade(set, job_id, cause, &mut transition);
            }
            transition
        });

        self.publish(&transition);
        transition
    }

    // =============================================================================
    // Farm Status
    // =============================================================================

    /// Applies a status update from the farm
    ///
    /// Updates for jobs that are not `Submitted`, and updates whose sequence
    /// is not newer than the last one applied, change nothing.
    pub fn apply(&self, update: &StatusUpdate) -> Transition {
        let transition = self.registry.update(|set| {
            let mut transition = Transition::default();
            let Some(job_id) = set.job_for_remote(&update.remote_id) else {
                debug!("Status update for unknown farm job {}", update.remote_id);
                return transition;
            };
            let Some(record) = set.get(job_id) else {
                return transition;
            };

            if record.state() != JobState::Submitted {
                debug!(
                    "Ignoring status update {} for job {} in state {}",
                    update.sequence,
                    job_id,
                    record.state()
                );
                return transition;
            }
            if record.last_sequence.is_some_and(|last| update.sequence <= last) {
                debug!(
                    "Discarding stale status update {} for job {} (last applied {:?})",
                    update.sequence, job_id, record.last_sequence
                );
                return transition;
            }

            let Some(record) = set.get_mut(job_id) else {
                return transition;
            };
            record.last_sequence = Some(update.sequence);
            record.updated_at = update.observed_at;
            for progress in &update.snapshot.tasks {
                match record.tasks.get_mut(progress.index) {
                    Some(task) => task.status = progress.status,
                    None => debug!(
                        "Job {} has no task {}; farm reported {:?}",
                        job_id, progress.index, progress.status
                    ),
                }
            }

            match aggregate(&update.snapshot, record) {
                Some(Outcome::Done) => {
                    push_change(&mut transition, record.transition(JobState::Done));
                }
                Some(Outcome::Partial { failed }) => {
                    let total = record.tasks.len();
                    push_change(&mut transition, record.transition(JobState::PartiallyFailed));
                    record.last_error = Some(FailureCause::new(
                        ErrorKind::FarmFailure,
                        format!("{} of {} tasks failed", failed, total),
                    ));
                    // Frame-level dependents can still run the frames that exist
                    cascade(set, job_id, JobState::PartiallyFailed, &mut transition);
                }
                Some(Outcome::Failed(message)) => {
                    let cause = FailureCause::new(ErrorKind::FarmFailure, message);
                    fail_with_cascade(set, job_id, cause, &mut transition);
                }
                None => {}
            }
            transition
        });

        self.publish(&transition);
        transition
    }

    /// Fails a submitted job the farm no longer holds
    ///
    /// A job deleted on the farm will never report a terminal state, so its
    /// dependents are failed with it.
    pub fn farm_job_missing(&self, remote_id: &RemoteJobId) -> Transition {
        let transition = self.registry.update(|set| {
            let mut transition = Transition::default();
            let Some(job_id) = set.job_for_remote(remote_id) else {
                return transition;
            };
            if set.get(job_id).map(JobRecord::state) != Some(JobState::Submitted) {
                return transition;
            }

            let cause = FailureCause::new(
                ErrorKind::FarmFailure,
                format!("farm job {} is no longer on the farm", remote_id),
            );
            fail_with_cascade(set, job_id, cause, &mut transition);
            transition
        });

        self.publish(&transition);
        transition
    }

    // =============================================================================
    // Caller Requests
    // =============================================================================

    /// Cancels a job that has not reached a terminal state
    ///
    /// Dependents are failed with the cancellation as their cause. Returns
    /// `None` when the job is unknown or already terminal.
    pub fn cancel(&self, job_id: JobId) -> Option<Transition> {
        let transition = self.registry.update(|set| {
            let state = set.get(job_id)?.state();
            if state.is_terminal() {
                return None;
            }

            let mut transition = Transition::default();
            let record = set.get_mut(job_id)?;
            push_change(&mut transition, record.transition(JobState::Cancelled));
            if let Some(remote_id) = record.remote_id() {
                transition.orphaned.push(remote_id.clone());
            }
            cascade(set, job_id, JobState::Cancelled, &mut transition);
            Some(transition)
        })?;

        self.publish(&transition);
        Some(transition)
    }

    /// Returns a failed, partially failed or cancelled job to `Validated`
    pub fn reset(&self, job_id: JobId) -> Result<StateChange, SubmitError> {
        let change = self.registry.update(|set| {
            let state = set
                .get(job_id)
                .ok_or(SubmitError::UnknownJob(job_id))?
                .state();
            if !state.can_reset() {
                return Err(SubmitError::NotSubmittable { job_id, state });
            }

            set.unlink_remote(job_id);
            let record = set.get_mut(job_id).ok_or(SubmitError::UnknownJob(job_id))?;
            record
                .reset()
                .map_err(|e| SubmitError::NotSubmittable { job_id, state: e.from })
        })?;

        info!("Job {} reset from {} for resubmission", job_id, change.from);
        self.events.status_changed(&[change]);
        Ok(change)
    }

    // =============================================================================
    // Task Release
    // =============================================================================

    /// Whether task `task_index` of `job_id` may start
    ///
    /// Job-level dependencies need the upstream `Done`. Frame-level ones need
    /// the corresponding upstream task done or skipped; a task whose offset
    /// points outside the upstream's tasks is unconstrained.
    pub fn is_task_releasable(&self, job_id: JobId, task_index: usize) -> bool {
        self.registry
            .read(|set| task_releasable(set, job_id, task_index))
    }

    /// Indices of the tasks of `job_id` that may start now
    pub fn releasable_tasks(&self, job_id: JobId) -> Vec<usize> {
        self.registry.read(|set| {
            let count = set.get(job_id).map(|r| r.tasks.len()).unwrap_or(0);
            (0..count)
                .filter(|&index| task_releasable(set, job_id, index))
                .collect()
        })
    }
}

fn task_releasable(set: &RecordSet, job_id: JobId, task_index: usize) -> bool {
    let Some(record) = set.get(job_id) else {
        return false;
    };
    if task_index >= record.tasks.len() {
        return false;
    }

    record.job.dependencies.iter().all(|dependency| {
        let Some(upstream) = set.get(dependency.upstream) else {
            return false;
        };
        match dependency.kind {
            DependencyKind::Job => upstream.state() == JobState::Done,
            DependencyKind::Frame { offset } => {
                if !matches!(
                    upstream.state(),
                    JobState::Submitted | JobState::Done | JobState::PartiallyFailed
                ) {
                    return false;
                }
                match upstream_task_index(task_index, offset, upstream.tasks.len()) {
                    Some(index) => upstream.tasks[index].status.is_satisfied(),
                    None => true,
                }
            }
        }
    })
}

enum Outcome {
    Done,
    Partial { failed: usize },
    Failed(String),
}

/// Job outcome implied by a snapshot, once there is one
///
/// Task results only count once every task has finished.
fn aggregate(snapshot: &StatusSnapshot, record: &JobRecord) -> Option<Outcome> {
    if snapshot.job_status == FarmJobStatus::Error {
        return Some(Outcome::Failed("farm reported the job as failed".to_string()));
    }

    if record.tasks.is_empty() {
        return (snapshot.job_status == FarmJobStatus::Done).then_some(Outcome::Done);
    }
    if !record.tasks.iter().all(|t| t.status.is_terminal()) {
        return None;
    }

    let failed = record
        .tasks
        .iter()
        .filter(|t| !t.status.is_satisfied())
        .count();
    Some(match failed {
        0 => Outcome::Done,
        n if n == record.tasks.len() => Outcome::Failed(format!("all {} tasks failed", n)),
        n => Outcome::Partial { failed: n },
    })
}

fn push_change(
    transition: &mut Transition,
    change: Result<StateChange, farmhand_core::domain::record::InvalidTransition>,
) {
    match change {
        Ok(change) => transition.changes.push(change),
        Err(e) => warn!("{}", e),
    }
}

/// Fails `job_id` and everything that can no longer run because of it
fn fail_with_cascade(set: &mut RecordSet, job_id: JobId, cause: FailureCause, transition: &mut Transition) {
    if let Some(record) = set.get_mut(job_id) {
        if record.state().is_terminal() {
            return;
        }
        if let Some(remote_id) = record.remote_id() {
            if record.state() == JobState::Submitted && cause.kind == ErrorKind::DependencyFailed {
                transition.orphaned.push(remote_id.clone());
            }
        }
        warn!("Job '{}' ({}) failed: {}", record.job.name, job_id, cause);
        push_change(transition, record.fail(cause));
    }
    cascade(set, job_id, JobState::Failed, transition);
}

/// Fails the non-terminal dependents of `upstream`, transitively
///
/// A `PartiallyFailed` upstream only breaks job-level dependents: their
/// dependency can never be met, while frame-level dependents still get the
/// frames that rendered.
fn cascade(set: &mut RecordSet, upstream: JobId, upstream_state: JobState, transition: &mut Transition) {
    let mut queue = VecDeque::from([(upstream, upstream_state)]);
    let mut visited = HashSet::from([upstream]);

    while let Some((failed, failed_state)) = queue.pop_front() {
        for (dependent, kind) in set.direct_dependents(failed) {
            if failed_state == JobState::PartiallyFailed && kind != DependencyKind::Job {
                continue;
            }
            if !visited.insert(dependent) {
                continue;
            }

            let Some(record) = set.get_mut(dependent) else {
                continue;
            };
            if record.state().is_terminal() {
                continue;
            }

            if record.state() == JobState::Submitted {
                if let Some(remote_id) = record.remote_id() {
                    transition.orphaned.push(remote_id.clone());
                }
            }
            let cause = FailureCause::dependency(
                failed,
                format!("upstream job {} is {}", failed, failed_state),
            );
            warn!(
                "Job '{}' ({}) failed: {}",
                record.job.name, dependent, cause
            );
            push_change(transition, record.fail(cause));
            queue.push_back((dependent, JobState::Failed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farmhand_core::builder::build;
    use farmhand_core::domain::dependency::JobDependency;
    use farmhand_core::dto::status::TaskProgress;
    use farmhand_core::dto::submit::SubmitParams;
    use farmhand_core::planner::plan;

    fn record(name: &str, frames: i64, dependencies: Vec<JobDependency>) -> JobRecord {
        let job = build(&SubmitParams {
            name: name.to_string(),
            pool: "gpu".to_string(),
            frame_start: 1,
            frame_end: frames,
            scene_paths: vec![format!("/scenes/{}.ass", name)],
            dependencies,
            ..Default::default()
        })
        .unwrap();
        let tasks = plan(job.id, job.frame_range, job.chunk_size).unwrap();
        JobRecord::new(job, tasks)
    }

    fn tracker() -> (Arc<JobRegistry>, JobStateTracker) {
        let registry = Arc::new(JobRegistry::new());
        let tracker = JobStateTracker::new(Arc::clone(&registry), EventBus::default());
        (registry, tracker)
    }

    /// Registers and submits a job, returning its id and farm id
    fn submitted(
        registry: &JobRegistry,
        tracker: &JobStateTracker,
        record: JobRecord,
        remote: &str,
    ) -> (JobId, RemoteJobId) {
        let id = record.id();
        registry.insert(record);
        registry.begin_submission(id).unwrap();
        let remote_id = RemoteJobId::from(remote);
        tracker.record_submission(id, &SubmissionResult::accepted(remote_id.clone(), 1));
        (id, remote_id)
    }

    fn snapshot(job_status: FarmJobStatus, statuses: &[TaskStatus]) -> StatusSnapshot {
        StatusSnapshot {
            job_status,
            tasks: statuses
                .iter()
                .enumerate()
                .map(|(index, &status)| TaskProgress { index, status })
                .collect(),
        }
    }

    #[test]
    fn test_record_submission_success() {
        let (registry, tracker) = tracker();
        let (id, remote_id) = submitted(&registry, &tracker, record("fx", 3, vec![]), "12");

        let record = registry.get(id).unwrap();
        assert_eq!(record.state(), JobState::Submitted);
        assert_eq!(record.remote_id(), Some(&remote_id));
        assert!(record.tasks.iter().all(|t| t.status == TaskStatus::Dispatched));
        assert_eq!(registry.job_for_remote(&remote_id), Some(id));
    }

    #[test]
    fn test_record_submission_failure_keeps_cause() {
        let (registry, tracker) = tracker();
        let record = record("fx", 3, vec![]);
        let id = record.id();
        registry.insert(record);
        registry.begin_submission(id).unwrap();

        tracker.record_submission(id, &SubmissionResult::failed(ErrorKind::Rejected, "unknown pool", 1));

        assert_eq!(tracker.state(id), Some(JobState::Failed));
        let cause = tracker.last_error(id).unwrap();
        assert_eq!(cause.kind, ErrorKind::Rejected);
        assert_eq!(cause.message, "unknown pool");
    }

    #[test]
    fn test_all_tasks_done_completes_job() {
        let (registry, tracker) = tracker();
        let (id, remote_id) = submitted(&registry, &tracker, record("fx", 3, vec![]), "12");

        let partial = snapshot(
            FarmJobStatus::Running,
            &[TaskStatus::Done, TaskStatus::Running, TaskStatus::Pending],
        );
        let transition = tracker.apply(&StatusUpdate::new(remote_id.clone(), 1, partial));
        assert!(transition.changes.is_empty());
        assert_eq!(tracker.state(id), Some(JobState::Submitted));

        let finished = snapshot(
            FarmJobStatus::Done,
            &[TaskStatus::Done, TaskStatus::Skipped, TaskStatus::Done],
        );
        let transition = tracker.apply(&StatusUpdate::new(remote_id, 2, finished));
        assert_eq!(transition.state_of(id), Some(JobState::Done));
    }

    #[test]
    fn test_mixed_task_results_partially_fail() {
        let (registry, tracker) = tracker();
        let (id, remote_id) = submitted(&registry, &tracker, record("fx", 3, vec![]), "12");

        let finished = snapshot(
            FarmJobStatus::Done,
            &[TaskStatus::Done, TaskStatus::Error, TaskStatus::Done],
        );
        tracker.apply(&StatusUpdate::new(remote_id, 1, finished));

        assert_eq!(tracker.state(id), Some(JobState::PartiallyFailed));
        assert_eq!(tracker.last_error(id).unwrap().message, "1 of 3 tasks failed");
    }

    #[test]
    fn test_all_tasks_failed_fails_job() {
        let (registry, tracker) = tracker();
        let (id, remote_id) = submitted(&registry, &tracker, record("fx", 2, vec![]), "12");

        let finished = snapshot(FarmJobStatus::Error, &[TaskStatus::Error, TaskStatus::Error]);
        tracker.apply(&StatusUpdate::new(remote_id, 1, finished));

        assert_eq!(tracker.state(id), Some(JobState::Failed));
        assert_eq!(tracker.last_error(id).unwrap().kind, ErrorKind::FarmFailure);
    }

    #[test]
    fn test_missing_farm_job_fails_with_dependents() {
        let (registry, tracker) = tracker();
        let (sim, remote_id) = submitted(&registry, &tracker, record("sim", 2, vec![]), "12");
        let render = record("render", 2, vec![JobDependency::job(sim)]);
        let render_id = render.id();
        registry.insert(render);

        let transition = tracker.farm_job_missing(&remote_id);

        assert_eq!(transition.state_of(sim), Some(JobState::Failed));
        assert_eq!(transition.state_of(render_id), Some(JobState::Failed));
        assert!(transition.orphaned.is_empty());
        let cause = tracker.last_error(sim).unwrap();
        assert_eq!(cause.kind, ErrorKind::FarmFailure);
        assert_eq!(cause.message, "farm job 12 is no longer on the farm");

        assert!(tracker.farm_job_missing(&remote_id).is_empty());
        assert!(tracker.farm_job_missing(&RemoteJobId::from("99")).is_empty());
    }

    #[test]
    fn test_duplicate_update_is_a_no_op() {
        let (registry, tracker) = tracker();
        let (id, remote_id) = submitted(&registry, &tracker, record("fx", 2, vec![]), "12");

        let update = StatusUpdate::new(
            remote_id.clone(),
            5,
            snapshot(FarmJobStatus::Running, &[TaskStatus::Done, TaskStatus::Running]),
        );
        tracker.apply(&update);
        let after_first = registry.get(id).unwrap();

        assert!(tracker.apply(&update).is_empty());
        assert_eq!(registry.get(id).unwrap(), after_first);

        // An older snapshot arriving late must not roll task state back
        let stale = StatusUpdate::new(
            remote_id,
            3,
            snapshot(FarmJobStatus::Queued, &[TaskStatus::Pending, TaskStatus::Pending]),
        );
        assert!(tracker.apply(&stale).is_empty());
        assert_eq!(registry.get(id).unwrap().tasks[0].status, TaskStatus::Done);
    }

    #[test]
    fn test_updates_after_terminal_state_are_ignored() {
        let (registry, tracker) = tracker();
        let (id, remote_id) = submitted(&registry, &tracker, record("fx", 1, vec![]), "12");

        tracker.apply(&StatusUpdate::new(
            remote_id.clone(),
            1,
            snapshot(FarmJobStatus::Done, &[TaskStatus::Done]),
        ));
        tracker.apply(&StatusUpdate::new(
            remote_id,
            2,
            snapshot(FarmJobStatus::Error, &[TaskStatus::Error]),
        ));

        assert_eq!(tracker.state(id), Some(JobState::Done));
    }

    #[test]
    fn test_failure_cascades_to_all_dependents() {
        let (registry, tracker) = tracker();
        let sim = record("sim", 4, vec![]);
        let sim_id = sim.id();
        let render = record("render", 4, vec![JobDependency::job(sim_id)]);
        let render_id = render.id();
        let comp = record("comp", 4, vec![JobDependency::frame(render_id, 0)]);
        let comp_id = comp.id();
        let unrelated = record("unrelated", 4, vec![]);
        let unrelated_id = unrelated.id();
        for r in [render, comp, unrelated] {
            registry.insert(r);
        }
        let (_, remote_id) = submitted(&registry, &tracker, sim, "7");

        tracker.apply(&StatusUpdate::new(
            remote_id,
            1,
            snapshot(FarmJobStatus::Error, &[TaskStatus::Error; 4]),
        ));

        assert_eq!(tracker.state(sim_id), Some(JobState::Failed));
        assert_eq!(tracker.state(render_id), Some(JobState::Failed));
        assert_eq!(tracker.state(comp_id), Some(JobState::Failed));
        assert_eq!(tracker.state(unrelated_id), Some(JobState::Validated));

        let cause = tracker.last_error(comp_id).unwrap();
        assert_eq!(cause.kind, ErrorKind::DependencyFailed);
        assert_eq!(cause.upstream, Some(render_id));
    }

    #[test]
    fn test_cancel_cascades_and_reports_remote_jobs() {
        let (registry, tracker) = tracker();
        let (sim_id, sim_remote) = submitted(&registry, &tracker, record("sim", 4, vec![]), "7");
        let (render_id, render_remote) = submitted(
            &registry,
            &tracker,
            record("render", 4, vec![JobDependency::frame(sim_id, 0)]),
            "8",
        );

        let transition = tracker.cancel(sim_id).unwrap();

        assert_eq!(tracker.state(sim_id), Some(JobState::Cancelled));
        assert_eq!(tracker.state(render_id), Some(JobState::Failed));
        assert_eq!(transition.orphaned, vec![sim_remote, render_remote]);
        assert!(tracker.cancel(sim_id).is_none());
    }

    #[test]
    fn test_cancel_during_submission_orphans_the_farm_job() {
        let (registry, tracker) = tracker();
        let record = record("fx", 2, vec![]);
        let id = record.id();
        registry.insert(record);
        registry.begin_submission(id).unwrap();

        assert!(tracker.cancel(id).is_some());
        let transition =
            tracker.record_submission(id, &SubmissionResult::accepted(RemoteJobId::from("31"), 1));

        assert_eq!(transition.orphaned, vec![RemoteJobId::from("31")]);
        assert_eq!(tracker.state(id), Some(JobState::Cancelled));
    }

    #[test]
    fn test_partial_failure_spares_frame_dependents() {
        let (registry, tracker) = tracker();
        let sim = record("sim", 2, vec![]);
        let sim_id = sim.id();
        let frames = record("frames", 2, vec![JobDependency::frame(sim_id, 0)]);
        let frames_id = frames.id();
        let whole = record("whole", 2, vec![JobDependency::job(sim_id)]);
        let whole_id = whole.id();
        registry.insert(frames);
        registry.insert(whole);
        let (_, remote_id) = submitted(&registry, &tracker, sim, "7");

        tracker.apply(&StatusUpdate::new(
            remote_id,
            1,
            snapshot(FarmJobStatus::Done, &[TaskStatus::Done, TaskStatus::Error]),
        ));

        assert_eq!(tracker.state(sim_id), Some(JobState::PartiallyFailed));
        assert_eq!(tracker.state(frames_id), Some(JobState::Validated));
        assert_eq!(tracker.state(whole_id), Some(JobState::Failed));
    }

    #[test]
    fn test_frame_offset_releases_tasks_individually() {
        let (registry, tracker) = tracker();
        let (sim_id, sim_remote) = submitted(&registry, &tracker, record("sim", 10, vec![]), "7");
        let render = record("render", 10, vec![JobDependency::frame(sim_id, -1)]);
        let render_id = render.id();
        registry.insert(render);

        assert!(!tracker.is_task_releasable(render_id, 5));
        // Task 0 has no upstream counterpart
        assert!(tracker.is_task_releasable(render_id, 0));

        let mut statuses = [TaskStatus::Running; 10];
        statuses[4] = TaskStatus::Done;
        tracker.apply(&StatusUpdate::new(
            sim_remote,
            1,
            snapshot(FarmJobStatus::Running, &statuses),
        ));

        assert!(tracker.is_task_releasable(render_id, 5));
        assert!(!tracker.is_task_releasable(render_id, 6));
        assert_eq!(tracker.releasable_tasks(render_id), vec![0, 5]);
    }

    #[test]
    fn test_reset_allows_resubmission() {
        let (registry, tracker) = tracker();
        let record = record("fx", 2, vec![]);
        let id = record.id();
        registry.insert(record);
        registry.begin_submission(id).unwrap();
        tracker.record_submission(id, &SubmissionResult::failed(ErrorKind::Transient, "down", 4));

        let change = tracker.reset(id).unwrap();
        assert_eq!(change.from, JobState::Failed);
        assert!(registry.begin_submission(id).is_ok());

        let stranger = JobId::new();
        assert_eq!(tracker.reset(stranger).unwrap_err(), SubmitError::UnknownJob(stranger));
    }
}
