//! Dependency domain types

use serde::{Deserialize, Serialize};

use crate::domain::job::JobId;

/// How a dependent job waits on its upstream
///
/// Waiting on an external file to appear is not modeled; a new variant is
/// the place to add it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DependencyKind {
    /// The whole upstream job must be `Done`
    Job,
    /// Task `N` waits for upstream task `N + offset`
    Frame { offset: i64 },
}

/// A dependency as declared on the dependent job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDependency {
    pub upstream: JobId,
    pub kind: DependencyKind,
}

impl JobDependency {
    pub fn job(upstream: JobId) -> Self {
        Self {
            upstream,
            kind: DependencyKind::Job,
        }
    }

    pub fn frame(upstream: JobId, offset: i64) -> Self {
        Self {
            upstream,
            kind: DependencyKind::Frame { offset },
        }
    }

    /// The graph edge this dependency contributes for `dependent`
    pub fn edge_for(&self, dependent: JobId) -> DependencyEdge {
        DependencyEdge {
            from: self.upstream,
            to: dependent,
            kind: self.kind,
        }
    }
}

/// Directed edge: `from` must progress before `to` may
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: JobId,
    pub to: JobId,
    pub kind: DependencyKind,
}

/// Upstream task index a dependent task waits on, if any
///
/// Returns `None` when the offset points outside the upstream's task list,
/// in which case the dependent task is unconstrained.
pub fn upstream_task_index(task_index: usize, offset: i64, upstream_tasks: usize) -> Option<usize> {
    let target = i64::try_from(task_index).ok()?.checked_add(offset)?;
    let target = usize::try_from(target).ok()?;
    (target < upstream_tasks).then_some(target)
}
