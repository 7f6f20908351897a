//! Scheduler layer for the broker
//!
//! Background work that runs after submission: polling the farm for the
//! status of submitted jobs and feeding it to the state tracker.

pub mod poller;

pub use poller::StatusPoller;
