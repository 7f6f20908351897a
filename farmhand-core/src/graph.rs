//! Dependency graph
//!
//! Directed acyclic graph of jobs. An edge `from -> to` means `to` depends on
//! `from`. Edges only reference jobs by id; the graph never owns jobs.
//!
//! This type is not synchronized. The broker wraps it in a lock so mutations
//! and ordering reads are mutually exclusive.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use crate::domain::dependency::DependencyEdge;
use crate::domain::job::JobId;
use crate::error::{CycleError, GraphError};

#[derive(Debug, Default)]
struct Node {
    /// Registration order, used to break ordering ties
    order: u64,
    upstream: Vec<DependencyEdge>,
    downstream: Vec<DependencyEdge>,
}

/// Job dependency graph
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<JobId, Node>,
    next_order: u64,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, job: JobId) -> bool {
        self.nodes.contains_key(&job)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Registers a job; registration order is its creation order
    pub fn add_job(&mut self, job: JobId) -> Result<(), GraphError> {
        if self.nodes.contains_key(&job) {
            return Err(GraphError::DuplicateJob(job));
        }
        let order = self.next_order;
        self.next_order += 1;
        self.nodes.insert(
            job,
            Node {
                order,
                ..Default::default()
            },
        );
        Ok(())
    }

    /// Removes a job and every edge touching it
    pub fn remove_job(&mut self, job: JobId) -> bool {
        let Some(node) = self.nodes.remove(&job) else {
            return false;
        };

        for edge in &node.upstream {
            if let Some(upstream) = self.nodes.get_mut(&edge.from) {
                upstream.downstream.retain(|e| e.to != job);
            }
        }
        for edge in &node.downstream {
            if let Some(downstream) = self.nodes.get_mut(&edge.to) {
                downstream.upstream.retain(|e| e.from != job);
            }
        }
        true
    }

    /// Adds an edge unless it would close a cycle
    ///
    /// A rejected edge leaves the graph untouched.
    pub fn add_edge(&mut self, edge: DependencyEdge) -> Result<(), GraphError> {
        for job in [edge.from, edge.to] {
            if !self.nodes.contains_key(&job) {
                return Err(GraphError::UnknownJob(job));
            }
        }

        if edge.from == edge.to || self.reaches(edge.to, edge.from) {
            return Err(CycleError {
                from: edge.from,
                to: edge.to,
            }
            .into());
        }

        if let Some(upstream) = self.nodes.get_mut(&edge.from) {
            upstream.downstream.push(edge);
        }
        if let Some(downstream) = self.nodes.get_mut(&edge.to) {
            downstream.upstream.push(edge);
        }
        Ok(())
    }

    /// Whether `target` can be reached from `start` along edges
    pub fn reaches(&self, start: JobId, target: JobId) -> bool {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            if current == target {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                queue.extend(node.downstream.iter().map(|e| e.to));
            }
        }
        false
    }

    /// Edges into `job`: what it depends on
    pub fn upstream_of(&self, job: JobId) -> &[DependencyEdge] {
        self.nodes
            .get(&job)
            .map(|n| n.upstream.as_slice())
            .unwrap_or_default()
    }

    /// Edges out of `job`: what depends on it
    pub fn downstream_of(&self, job: JobId) -> &[DependencyEdge] {
        self.nodes
            .get(&job)
            .map(|n| n.downstream.as_slice())
            .unwrap_or_default()
    }

    /// Every job that depends on `job`, directly or transitively
    pub fn dependents(&self, job: JobId) -> Vec<JobId> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<JobId> = self.downstream_of(job).iter().map(|e| e.to).collect();
        let mut result = Vec::new();

        while let Some(current) = queue.pop_front() {
            if seen.insert(current) {
                result.push(current);
                queue.extend(self.downstream_of(current).iter().map(|e| e.to));
            }
        }
        result
    }

    /// Orders `jobs` so every job comes after the jobs it depends on
    ///
    /// Only edges between members of `jobs` constrain the order. Ties go to
    /// the job registered first, so the output is deterministic.
    pub fn resolve_submission_order(&self, jobs: &[JobId]) -> Result<Vec<JobId>, GraphError> {
        let members: HashSet<JobId> = jobs.iter().copied().collect();
        let mut pending: HashMap<JobId, usize> = HashMap::with_capacity(members.len());

        for &job in &members {
            let node = self.nodes.get(&job).ok_or(GraphError::UnknownJob(job))?;
            let blocking = node
                .upstream
                .iter()
                .filter(|e| members.contains(&e.from))
                .map(|e| e.from)
                .collect::<HashSet<_>>()
                .len();
            pending.insert(job, blocking);
        }

        let mut ready: BinaryHeap<Reverse<(u64, JobId)>> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(job, _)| Reverse((self.nodes[job].order, *job)))
            .collect();

        let mut order = Vec::with_capacity(members.len());
        let mut released = HashSet::new();
        while let Some(Reverse((_, job))) = ready.pop() {
            order.push(job);

            let downstream: HashSet<JobId> = self.nodes[&job]
                .downstream
                .iter()
                .map(|e| e.to)
                .filter(|to| members.contains(to))
                .collect();
            for next in downstream {
                if let Some(count) = pending.get_mut(&next) {
                    *count -= 1;
                    if *count == 0 && released.insert(next) {
                        ready.push(Reverse((self.nodes[&next].order, next)));
                    }
                }
            }
        }

        Ok(order)
    }
}
