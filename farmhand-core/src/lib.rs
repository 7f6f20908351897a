//! Farmhand Core
//!
//! Core types and pure logic for the Farmhand render submission broker.
//!
//! This crate contains:
//! - Domain types: Jobs, Tasks, dependency edges and submission outcomes
//! - DTOs: Submission parameters, farm descriptors and status snapshots
//! - Planner: Frame range decomposition into chunked tasks
//! - Builder: Validated job construction from submission parameters
//! - Graph: The job dependency graph and submission ordering
//!
//! Nothing in here performs I/O. Farm communication lives in `farmhand-client`,
//! lifecycle and concurrency in `farmhand-broker`.

pub mod builder;
pub mod domain;
pub mod dto;
pub mod error;
pub mod graph;
pub mod planner;

pub use error::{CycleError, Field, GraphError, PlanError, RecordError, ValidationError};
