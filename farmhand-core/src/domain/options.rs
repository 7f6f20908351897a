//! Recognized optional submission settings
//!
//! Every setting the farm understands is an explicit, defaulted field here.
//! Unknown keys in serialized parameters are rejected rather than ignored.

use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST_MASK: &str = "render.*";
pub const DEFAULT_MAX_RUNNING_TASKS: u32 = 15;
pub const DEFAULT_SERVICE: &str = "arnold";

/// Optional scheduling and execution hints for a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubmitOptions {
    /// Maximum number of hosts working on the job, 0 for unlimited
    pub machine_limit: u32,
    /// Regular expression of host names allowed to run tasks
    pub host_mask: String,
    /// Regular expression of host names excluded from the job
    pub exclude_host_mask: Option<String>,
    /// Regular expression of job names this job waits for. When unset it is
    /// built from the upstream job names, or from the job's own name if the
    /// job has no job-level upstreams
    pub depend_mask: Option<String>,
    /// Like `depend_mask`, matched against jobs of every user
    pub global_depend_mask: Option<String>,
    /// Maximum number of tasks running at once
    pub max_running_tasks: u32,
    /// Tasks one host may run concurrently
    pub concurrent_tasks: Option<u32>,
    /// Per-task timeout, 0 for none
    pub task_timeout_minutes: u32,
    pub gpus_per_task: Option<u32>,
    /// Comma separated GPU device list
    pub gpu_devices: Option<String>,
    /// Submit the job offline so it waits for a manual start
    pub suspended: bool,
    /// Groups related jobs in the farm UI
    pub batch_name: Option<String>,
    /// Output image pattern shown as the task preview
    pub output_file: Option<String>,
    /// Farm service (renderer) that executes the tasks
    pub service: String,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            machine_limit: 0,
            host_mask: DEFAULT_HOST_MASK.to_string(),
            exclude_host_mask: None,
            depend_mask: None,
            global_depend_mask: None,
            max_running_tasks: DEFAULT_MAX_RUNNING_TASKS,
            concurrent_tasks: None,
            task_timeout_minutes: 0,
            gpus_per_task: None,
            gpu_devices: None,
            suspended: false,
            batch_name: None,
            output_file: None,
            service: DEFAULT_SERVICE.to_string(),
        }
    }
}
