//! Job Descriptor Builder
//!
//! Turns submission parameters into validated jobs. Construction is pure: the
//! builder neither talks to the farm nor registers anything. Checks run in a
//! fixed order and the first failing field is reported.

use std::collections::HashSet;

use regex::Regex;

use crate::domain::environment::Environment;
use crate::domain::job::{FrameRange, Job, JobId, JobState};
use crate::dto::submit::SubmitParams;
use crate::error::{Field, ValidationError};
use crate::planner;

pub const MIN_PRIORITY: i64 = 0;
pub const MAX_PRIORITY: i64 = 100;

/// Environment key carrying the pipeline project file
pub const PROJECT_ENV_KEY: &str = "farmhand_project";
/// Environment key carrying the work scene the export came from
pub const SOURCE_SCENE_ENV_KEY: &str = "farmhand_source_scene";

/// Builds the job for a single-scene submission
pub fn build(params: &SubmitParams) -> Result<Job, ValidationError> {
    if params.scene_paths.len() > 1 {
        return Err(ValidationError::new(
            Field::ScenePath,
            format!(
                "{} scene paths given, a single job takes one",
                params.scene_paths.len()
            ),
        ));
    }

    let mut jobs = build_all(params)?;
    // build_all yields exactly one job per path and rejects an empty list
    Ok(jobs.remove(0))
}

/// Builds one job per exported scene path, in path order
///
/// With several paths (one per render layer) each job name gets a
/// `_<layer index>` suffix so the farm can tell them apart.
pub fn build_all(params: &SubmitParams) -> Result<Vec<Job>, ValidationError> {
    let validated = validate(params)?;
    let layered = params.scene_paths.len() > 1;

    let jobs = params
        .scene_paths
        .iter()
        .enumerate()
        .map(|(layer, path)| {
            let name = if layered {
                format!("{}_{}", validated.name, layer)
            } else {
                validated.name.clone()
            };

            let mut job = Job {
                id: JobId::new(),
                remote_id: None,
                name,
                pool: params.pool.trim().to_string(),
                priority: validated.priority,
                frame_range: validated.frame_range,
                chunk_size: validated.chunk_size,
                scene_path: path.clone(),
                environment: validated.environment.clone(),
                dependencies: params.dependencies.clone(),
                options: params.options.clone(),
                state: JobState::Draft,
                created_at: chrono::Utc::now(),
            };
            job.state = JobState::Validated;
            job
        })
        .collect();

    Ok(jobs)
}

struct Validated {
    name: String,
    priority: u8,
    frame_range: FrameRange,
    chunk_size: u32,
    environment: Environment,
}

fn validate(params: &SubmitParams) -> Result<Validated, ValidationError> {
    let mut name = params.name.trim().to_string();
    if name.is_empty() {
        return Err(ValidationError::new(Field::Name, "must not be empty"));
    }
    if let Some(suffix) = &params.name_suffix {
        name.push_str(suffix);
    }

    if params.pool.trim().is_empty() {
        return Err(ValidationError::new(Field::Pool, "must not be empty"));
    }

    if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&params.priority) {
        return Err(ValidationError::new(
            Field::Priority,
            format!(
                "{} is outside {}..={}",
                params.priority, MIN_PRIORITY, MAX_PRIORITY
            ),
        ));
    }
    let priority = u8::try_from(params.priority)
        .map_err(|_| ValidationError::new(Field::Priority, "does not fit a byte"))?;

    let frame_range = FrameRange::new(params.frame_start, params.frame_end)
        .map_err(|e| ValidationError::new(Field::FrameRange, e.to_string()))?;

    if params.chunk_size < 1 {
        return Err(ValidationError::new(
            Field::ChunkSize,
            format!("{} is not a positive frame count", params.chunk_size),
        ));
    }
    let chunk_size = u32::try_from(params.chunk_size)
        .map_err(|_| ValidationError::new(Field::ChunkSize, "is too large"))?;
    planner::task_count(frame_range, chunk_size)
        .map_err(|e| ValidationError::new(Field::FrameRange, e.to_string()))?;

    if params.scene_paths.is_empty() {
        return Err(ValidationError::new(Field::ScenePath, "no scene file given"));
    }
    if params.scene_paths.iter().any(|p| p.trim().is_empty()) {
        return Err(ValidationError::new(Field::ScenePath, "must not be empty"));
    }

    let environment = build_environment(params)?;

    let options = &params.options;
    if options.host_mask.trim().is_empty() {
        return Err(ValidationError::new(Field::HostMask, "must not be empty"));
    }
    check_mask(Field::HostMask, Some(&options.host_mask))?;
    check_mask(Field::ExcludeHostMask, options.exclude_host_mask.as_deref())?;
    check_mask(Field::DependMask, options.depend_mask.as_deref())?;
    check_mask(Field::GlobalDependMask, options.global_depend_mask.as_deref())?;

    if options.max_running_tasks == 0 {
        return Err(ValidationError::new(Field::MaxRunningTasks, "must be at least 1"));
    }
    if options.concurrent_tasks == Some(0) {
        return Err(ValidationError::new(Field::ConcurrentTasks, "must be at least 1"));
    }
    if options.gpus_per_task == Some(0) {
        return Err(ValidationError::new(Field::GpusPerTask, "must be at least 1"));
    }

    let mut upstream = HashSet::new();
    for dep in &params.dependencies {
        if !upstream.insert(dep.upstream) {
            return Err(ValidationError::new(
                Field::Dependencies,
                format!("job {} listed more than once", dep.upstream),
            ));
        }
    }

    Ok(Validated {
        name,
        priority,
        frame_range,
        chunk_size,
        environment,
    })
}

/// Standard pipeline entries first, then the caller's entries in order
fn build_environment(params: &SubmitParams) -> Result<Environment, ValidationError> {
    let standard = [
        (PROJECT_ENV_KEY, params.project_path.as_deref()),
        (SOURCE_SCENE_ENV_KEY, params.source_scene.as_deref()),
    ];

    let mut env = Environment::new();
    for (key, value) in standard {
        if let Some(value) = value {
            env.insert(key, value.replace('\\', "/"));
        }
    }

    for (key, value) in &params.environment {
        let key = key.trim();
        if key.is_empty() || key.contains('=') {
            return Err(ValidationError::new(
                Field::Environment,
                format!("'{}' is not a valid variable name", key),
            ));
        }
        if env.insert(key, value.as_str()).is_some() {
            return Err(ValidationError::new(
                Field::Environment,
                format!("duplicate key '{}'", key),
            ));
        }
    }

    Ok(env)
}

fn check_mask(field: Field, mask: Option<&str>) -> Result<(), ValidationError> {
    match mask {
        Some(mask) => Regex::new(mask)
            .map(|_| ())
            .map_err(|e| ValidationError::new(field, format!("invalid pattern: {}", e))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dependency::JobDependency;
    use assert_matches::assert_matches;

    fn params() -> SubmitParams {
        SubmitParams {
            name: "sh010_beauty".to_string(),
            pool: "cpu".to_string(),
            priority: 50,
            frame_start: 1001,
            frame_end: 1100,
            chunk_size: 10,
            scene_paths: vec!["/exports/sh010_beauty.ass".to_string()],
            ..Default::default()
        }
    }

    fn failing_field(params: &SubmitParams) -> Field {
        build_all(params).unwrap_err().field
    }

    #[test]
    fn test_build_valid_job() {
        let job = build(&params()).unwrap();
        assert_eq!(job.state, JobState::Validated);
        assert_eq!(job.name, "sh010_beauty");
        assert_eq!(job.priority, 50);
        assert_eq!(job.frame_range, FrameRange { start: 1001, end: 1100 });
        assert_eq!(job.chunk_size, 10);
        assert!(job.remote_id.is_none());
    }

    #[test]
    fn test_name_suffix_appended() {
        let mut params = params();
        params.name_suffix = Some("_v002".to_string());
        assert_eq!(build(&params).unwrap().name, "sh010_beauty_v002");
    }

    #[test]
    fn test_each_field_is_checked() {
        let mut p = params();
        p.name = "  ".to_string();
        assert_eq!(failing_field(&p), Field::Name);

        let mut p = params();
        p.pool = String::new();
        assert_eq!(failing_field(&p), Field::Pool);

        let mut p = params();
        p.priority = 101;
        assert_eq!(failing_field(&p), Field::Priority);

        let mut p = params();
        p.priority = -1;
        assert_eq!(failing_field(&p), Field::Priority);

        let mut p = params();
        p.frame_start = 20;
        p.frame_end = 10;
        assert_eq!(failing_field(&p), Field::FrameRange);

        let mut p = params();
        p.chunk_size = 0;
        assert_eq!(failing_field(&p), Field::ChunkSize);

        let mut p = params();
        p.scene_paths.clear();
        assert_eq!(failing_field(&p), Field::ScenePath);

        let mut p = params();
        p.environment = vec![
            ("A".to_string(), "1".to_string()),
            ("A".to_string(), "2".to_string()),
        ];
        assert_eq!(failing_field(&p), Field::Environment);

        let mut p = params();
        p.options.host_mask = "render(".to_string();
        assert_eq!(failing_field(&p), Field::HostMask);

        let mut p = params();
        p.options.exclude_host_mask = Some("[".to_string());
        assert_eq!(failing_field(&p), Field::ExcludeHostMask);

        let mut p = params();
        p.options.max_running_tasks = 0;
        assert_eq!(failing_field(&p), Field::MaxRunningTasks);

        let mut p = params();
        p.options.concurrent_tasks = Some(0);
        assert_eq!(failing_field(&p), Field::ConcurrentTasks);

        let upstream = JobId::new();
        let mut p = params();
        p.dependencies = vec![JobDependency::job(upstream), JobDependency::frame(upstream, 0)];
        assert_eq!(failing_field(&p), Field::Dependencies);
    }

    #[test]
    fn test_oversized_range_rejected() {
        let mut p = params();
        p.frame_start = i64::MIN;
        p.frame_end = i64::MAX;
        p.chunk_size = 1;
        let err = build(&p).unwrap_err();
        assert_eq!(err.field, Field::FrameRange);

        let mut p = params();
        p.frame_start = 1;
        p.frame_end = planner::MAX_TASKS as i64 * 10;
        p.chunk_size = 10;
        assert!(build(&p).is_ok());
        p.chunk_size = 9;
        assert_eq!(failing_field(&p), Field::FrameRange);
    }

    #[test]
    fn test_first_failing_field_wins() {
        let mut p = params();
        p.pool = String::new();
        p.priority = 500;
        p.chunk_size = 0;
        assert_eq!(failing_field(&p), Field::Pool);

        p.pool = "cpu".to_string();
        assert_eq!(failing_field(&p), Field::Priority);
    }

    #[test]
    fn test_standard_environment_comes_first() {
        let mut p = params();
        p.project_path = Some("C:\\proj\\show.yml".to_string());
        p.source_scene = Some("/work/sh010_v003.ma".to_string());
        p.environment = vec![("OCIO".to_string(), "/cfg/aces.ocio".to_string())];

        let job = build(&p).unwrap();
        let entries: Vec<_> = job.environment.iter().collect();
        assert_eq!(
            entries,
            vec![
                ("farmhand_project", "C:/proj/show.yml"),
                ("farmhand_source_scene", "/work/sh010_v003.ma"),
                ("OCIO", "/cfg/aces.ocio"),
            ]
        );
    }

    #[test]
    fn test_environment_may_not_shadow_standard_keys() {
        let mut p = params();
        p.project_path = Some("/proj".to_string());
        p.environment = vec![("farmhand_project".to_string(), "/other".to_string())];
        assert_eq!(failing_field(&p), Field::Environment);
    }

    #[test]
    fn test_build_all_one_job_per_layer() {
        let mut p = params();
        p.scene_paths = vec![
            "/exports/sh010_bg.ass".to_string(),
            "/exports/sh010_fg.ass".to_string(),
        ];

        let jobs = build_all(&p).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].name, "sh010_beauty_0");
        assert_eq!(jobs[1].name, "sh010_beauty_1");
        assert_eq!(jobs[1].scene_path, "/exports/sh010_fg.ass");
        assert_ne!(jobs[0].id, jobs[1].id);
    }

    #[test]
    fn test_build_refuses_multiple_layers() {
        let mut p = params();
        p.scene_paths.push("/exports/second.ass".to_string());
        assert_matches!(
            build(&p),
            Err(ValidationError {
                field: Field::ScenePath,
                ..
            })
        );
    }
}
