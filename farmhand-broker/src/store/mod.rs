//! Config store layer
//!
//! Small namespaced key/value storage for settings the broker keeps between
//! runs, such as the farm's pool catalog and the user's pool presets.
//!
//! Stores are trait-based so the CLI can persist to disk while tests and
//! embedding tools keep everything in memory.

mod file;
mod memory;

use serde_json::Value;
use thiserror::Error;

// Re-export implementations
pub use file::JsonFileConfigStore;
pub use memory::InMemoryConfigStore;

/// Errors raised by a config store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Config store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config store is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Config value {namespace}.{key} has an unexpected shape: {reason}")]
    Shape {
        namespace: String,
        key: String,
        reason: String,
    },
}

/// Namespaced JSON values
pub trait ConfigStore: Send + Sync {
    /// Reads a value
    ///
    /// # Returns
    /// `None` if nothing is stored under `namespace.key`
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, StoreError>;

    /// Stores a value, replacing what was there
    fn set(&self, namespace: &str, key: &str, value: Value) -> Result<(), StoreError>;
}
