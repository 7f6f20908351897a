//! Farm job descriptor
//!
//! A job and all of its tasks encoded as a single farm block. The farm either
//! accepts the whole descriptor or none of it.

use serde::{Deserialize, Serialize};

use crate::domain::dependency::DependencyKind;
use crate::domain::job::Job;
use crate::domain::task::Task;

/// An upstream job as the farm will see it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamRef {
    pub name: String,
    pub kind: DependencyKind,
}

/// Everything the farm needs to run one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmJobDescriptor {
    pub name: String,
    pub pool: String,
    pub priority: u8,
    pub max_running_tasks: u32,
    pub machine_limit: u32,
    pub host_mask: String,
    pub exclude_host_mask: Option<String>,
    /// Job names this job waits for
    pub depend_mask: Option<String>,
    pub global_depend_mask: Option<String>,
    /// Start offline (suspended)
    pub offline: bool,
    pub batch_name: Option<String>,
    /// `(EnvironmentKeyValueN, "key=value")` pairs
    pub environment: Vec<(String, String)>,
    pub block: FarmBlock,
}

/// The single block carrying every task of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmBlock {
    pub name: String,
    pub service: String,
    pub command: String,
    pub frame_first: i64,
    pub frame_last: i64,
    pub frames_per_task: u32,
    pub files: Vec<String>,
    /// Job names whose tasks gate this block's tasks one by one
    pub tasks_depend_mask: Option<String>,
    /// Offset between a task and the upstream task it waits on
    pub depend_task_offset: Option<i64>,
    pub concurrent_tasks: Option<u32>,
    pub task_timeout_minutes: u32,
    pub gpus_per_task: Option<u32>,
    pub gpu_devices: Option<String>,
}

impl FarmJobDescriptor {
    /// Encodes `job` and its `tasks` against the given upstream jobs
    pub fn new(job: &Job, tasks: &[Task], upstream: &[UpstreamRef]) -> Self {
        let options = &job.options;

        let job_level: Vec<&str> = upstream
            .iter()
            .filter(|u| u.kind == DependencyKind::Job)
            .map(|u| u.name.as_str())
            .collect();
        let frame_level: Vec<&UpstreamRef> = upstream
            .iter()
            .filter(|u| matches!(u.kind, DependencyKind::Frame { .. }))
            .collect();

        // Without upstreams the job waits for earlier jobs sharing its name
        let depend_mask = options
            .depend_mask
            .clone()
            .or_else(|| name_mask(job_level.iter().copied()))
            .or_else(|| name_mask(std::iter::once(job.name.as_str())));
        let tasks_depend_mask = name_mask(frame_level.iter().map(|u| u.name.as_str()));
        // The farm takes one offset per block; the first frame dependency sets it
        let depend_task_offset = frame_level.first().and_then(|u| match u.kind {
            DependencyKind::Frame { offset } => Some(offset),
            DependencyKind::Job => None,
        });

        let frame_first = tasks
            .first()
            .map(|t| t.frame_start)
            .unwrap_or(job.frame_range.start);
        let frame_last = tasks
            .last()
            .map(|t| t.frame_end)
            .unwrap_or(job.frame_range.end);

        Self {
            name: job.name.clone(),
            pool: job.pool.clone(),
            priority: job.priority,
            max_running_tasks: options.max_running_tasks,
            machine_limit: options.machine_limit,
            host_mask: options.host_mask.clone(),
            exclude_host_mask: options.exclude_host_mask.clone(),
            depend_mask,
            global_depend_mask: options.global_depend_mask.clone(),
            offline: options.suspended,
            batch_name: options.batch_name.clone(),
            environment: job.environment.numbered(),
            block: FarmBlock {
                name: job.name.clone(),
                service: options.service.clone(),
                command: job.scene_path.clone(),
                frame_first,
                frame_last,
                frames_per_task: job.chunk_size,
                files: options.output_file.iter().cloned().collect(),
                tasks_depend_mask,
                depend_task_offset,
                concurrent_tasks: options.concurrent_tasks,
                task_timeout_minutes: options.task_timeout_minutes,
                gpus_per_task: options.gpus_per_task,
                gpu_devices: options.gpu_devices.clone(),
            },
        }
    }
}

/// Anchored regular expression matching exactly the given job names
fn name_mask<'a>(names: impl Iterator<Item = &'a str>) -> Option<String> {
    let escaped: Vec<String> = names.map(regex::escape).collect();
    if escaped.is_empty() {
        None
    } else {
        Some(format!("^({})$", escaped.join("|")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::environment::Environment;
    use crate::domain::job::{FrameRange, JobId, JobState};
    use crate::domain::options::SubmitOptions;
    use crate::planner::plan;

    fn job() -> Job {
        let mut environment = Environment::new();
        environment.insert("farmhand_project", "/proj/show.yml");
        Job {
            id: JobId::new(),
            remote_id: None,
            name: "sh010.beauty".to_string(),
            pool: "cpu".to_string(),
            priority: 70,
            frame_range: FrameRange { start: 1, end: 10 },
            chunk_size: 3,
            scene_path: "/out/sh010.ass".to_string(),
            environment,
            dependencies: Vec::new(),
            options: SubmitOptions::default(),
            state: JobState::Validated,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_descriptor_encodes_all_tasks_as_one_block() {
        let job = job();
        let tasks = plan(job.id, job.frame_range, job.chunk_size).unwrap();
        let descriptor = FarmJobDescriptor::new(&job, &tasks, &[]);

        assert_eq!(descriptor.block.frame_first, 1);
        assert_eq!(descriptor.block.frame_last, 10);
        assert_eq!(descriptor.block.frames_per_task, 3);
        assert_eq!(descriptor.block.command, "/out/sh010.ass");
        assert_eq!(descriptor.host_mask, "render.*");
        assert_eq!(descriptor.depend_mask.as_deref(), Some(r"^(sh010\.beauty)$"));
        assert_eq!(
            descriptor.environment,
            vec![(
                "EnvironmentKeyValue0".to_string(),
                "farmhand_project=/proj/show.yml".to_string()
            )]
        );
    }

    #[test]
    fn test_descriptor_derives_depend_masks() {
        let job = job();
        let tasks = plan(job.id, job.frame_range, job.chunk_size).unwrap();
        let upstream = vec![
            UpstreamRef {
                name: "sh010.fx".to_string(),
                kind: DependencyKind::Job,
            },
            UpstreamRef {
                name: "sh010.sim".to_string(),
                kind: DependencyKind::Frame { offset: -1 },
            },
        ];

        let descriptor = FarmJobDescriptor::new(&job, &tasks, &upstream);
        assert_eq!(descriptor.depend_mask.as_deref(), Some(r"^(sh010\.fx)$"));
        assert_eq!(
            descriptor.block.tasks_depend_mask.as_deref(),
            Some(r"^(sh010\.sim)$")
        );
        assert_eq!(descriptor.block.depend_task_offset, Some(-1));
    }

    #[test]
    fn test_explicit_depend_mask_wins() {
        let mut job = job();
        job.options.depend_mask = Some("^comp_.*$".to_string());
        let upstream = vec![UpstreamRef {
            name: "other".to_string(),
            kind: DependencyKind::Job,
        }];

        let descriptor = FarmJobDescriptor::new(&job, &[], &upstream);
        assert_eq!(descriptor.depend_mask.as_deref(), Some("^comp_.*$"));
    }

    #[test]
    fn test_depend_mask_defaults_to_own_name() {
        let job = job();
        let upstream = vec![UpstreamRef {
            name: "sh010.sim".to_string(),
            kind: DependencyKind::Frame { offset: 0 },
        }];

        // Frame dependencies gate tasks, not the whole job
        let descriptor = FarmJobDescriptor::new(&job, &[], &upstream);
        assert_eq!(descriptor.depend_mask.as_deref(), Some(r"^(sh010\.beauty)$"));
        assert_eq!(descriptor.block.tasks_depend_mask.as_deref(), Some(r"^(sh010\.sim)$"));
    }
}
