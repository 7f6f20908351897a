//! Farmhand Broker
//!
//! Owns the submission side of farmhand: the job registry, the dependency
//! resolver, the farm submission broker with its retry policy, the job state
//! tracker and the status poller that feeds it.
//!
//! [`service::SubmissionService`] wires these together and is what the CLI
//! and embedding tools use.

pub mod broker;
pub mod config;
pub mod error;
pub mod events;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod store;
pub mod tracker;

pub use broker::SubmissionBroker;
pub use config::BrokerConfig;
pub use error::{RegisterError, SubmitError};
pub use events::{EventBus, SubmissionObserver, TracingObserver};
pub use registry::JobRegistry;
pub use service::SubmissionService;
pub use tracker::JobStateTracker;
