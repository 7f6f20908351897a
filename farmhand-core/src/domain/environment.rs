//! Ordered job environment
//!
//! The farm numbers environment entries (`EnvironmentKeyValue0`,
//! `EnvironmentKeyValue1`, ...) so insertion order is part of the contract.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Prefix of the farm's numbered environment fields
pub const NUMBERED_KEY_PREFIX: &str = "EnvironmentKeyValue";

/// Insertion-ordered environment variables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment(IndexMap<String, String>);

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a variable, returning the previous value if the key existed
    ///
    /// A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Renders entries as numbered `key=value` fields in insertion order
    pub fn numbered(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .enumerate()
            .map(|(idx, (k, v))| (format!("{NUMBERED_KEY_PREFIX}{idx}"), format!("{k}={v}")))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = Environment::new();
        for (k, v) in iter {
            env.insert(k, v);
        }
        env
    }
}
