//! Submission parameter DTOs

use serde::{Deserialize, Serialize};

use crate::domain::dependency::JobDependency;
use crate::domain::options::SubmitOptions;

/// Immutable submission parameters captured from the pipeline UI
///
/// Numeric fields are kept wide and signed so out-of-range input reaches the
/// builder and is reported against the right field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitParams {
    /// Job name, already resolved from the pipeline's naming template
    pub name: String,
    pub name_suffix: Option<String>,
    pub pool: String,
    pub priority: i64,
    pub frame_start: i64,
    pub frame_end: i64,
    pub chunk_size: i64,
    /// Exported scene files, one job per path
    pub scene_paths: Vec<String>,
    /// Environment entries in the order they should be numbered
    pub environment: Vec<(String, String)>,
    /// Pipeline project file, exported as `farmhand_project`
    pub project_path: Option<String>,
    /// Work scene the export came from, exported as `farmhand_source_scene`
    pub source_scene: Option<String>,
    pub dependencies: Vec<JobDependency>,
    pub options: SubmitOptions,
}

impl Default for SubmitParams {
    fn default() -> Self {
        Self {
            name: String::new(),
            name_suffix: None,
            pool: String::new(),
            priority: 50,
            frame_start: 1,
            frame_end: 1,
            chunk_size: 1,
            scene_paths: Vec::new(),
            environment: Vec::new(),
            project_path: None,
            source_scene: None,
            dependencies: Vec::new(),
            options: SubmitOptions::default(),
        }
    }
}
