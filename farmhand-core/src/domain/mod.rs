//! Core domain types
//!
//! This module contains the core domain structures used across Farmhand crates.
//! These types represent the fundamental business entities and are shared between
//! the broker (which owns their lifecycle) and the client (which encodes them for
//! the farm).

pub mod dependency;
pub mod environment;
pub mod job;
pub mod options;
pub mod record;
pub mod submission;
pub mod task;
