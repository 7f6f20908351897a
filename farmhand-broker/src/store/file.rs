//! JSON file config store
//!
//! The whole store is one JSON object of namespaces, each an object of keys.
//! Writes go to a sibling temporary file that is then renamed over the
//! original, so a crash never leaves a half-written store behind.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde_json::{Map, Value};
use tracing::debug;

use super::{ConfigStore, StoreError};

/// Config store backed by a JSON file
#[derive(Debug)]
pub struct JsonFileConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file; a missing file is an empty store
    fn load(&self) -> Result<Map<String, Value>, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str(&text)? {
            Value::Object(root) => Ok(root),
            other => Err(StoreError::Shape {
                namespace: String::new(),
                key: String::new(),
                reason: format!("expected an object at the top level, found {}", kind_of(&other)),
            }),
        }
    }

    fn save(&self, root: &Map<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_string_pretty(root)?)?;
        fs::rename(&staging, &self.path)?;
        debug!("Saved config store {}", self.path.display());
        Ok(())
    }
}

impl ConfigStore for JsonFileConfigStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let root = self.load()?;
        match root.get(namespace) {
            None => Ok(None),
            Some(Value::Object(section)) => Ok(section.get(key).cloned()),
            Some(other) => Err(StoreError::Shape {
                namespace: namespace.to_string(),
                key: key.to_string(),
                reason: format!("namespace is {}, not an object", kind_of(other)),
            }),
        }
    }

    fn set(&self, namespace: &str, key: &str, value: Value) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut root = self.load()?;

        let section = root
            .entry(namespace.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match section {
            Value::Object(section) => {
                section.insert(key.to_string(), value);
            }
            other => {
                return Err(StoreError::Shape {
                    namespace: namespace.to_string(),
                    key: key.to_string(),
                    reason: format!("namespace is {}, not an object", kind_of(other)),
                });
            }
        }

        self.save(&root)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
