//! Afanasy wire format
//!
//! Request bodies and reply parsing for the server's JSON protocol.

use farmhand_core::domain::job::RemoteJobId;
use farmhand_core::domain::task::TaskStatus;
use farmhand_core::dto::descriptor::FarmJobDescriptor;
use farmhand_core::dto::status::{FarmJobStatus, TaskProgress};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Value, json};

use crate::error::{ClientError, Result};

/// Block flag marking frame-numbered tasks
const BLOCK_FLAG_NUMERIC: u32 = 1;

#[derive(Debug, Serialize)]
pub(crate) struct AfJob<'a> {
    name: &'a str,
    user_name: &'a str,
    host_name: &'a str,
    priority: u8,
    max_running_tasks: u32,
    #[serde(skip_serializing_if = "is_zero")]
    max_hosts: u32,
    hosts_mask: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hosts_mask_exclude: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    depend_mask: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    depend_mask_global: Option<&'a str>,
    offline: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    annotation: Option<&'a str>,
    pools: PoolPriority<'a>,
    blocks: Vec<AfBlock<'a>>,
}

#[derive(Debug, Serialize)]
struct AfBlock<'a> {
    name: &'a str,
    service: &'a str,
    command: &'a str,
    flags: u32,
    frame_first: i64,
    frame_last: i64,
    frames_per_task: u32,
    frames_inc: u32,
    #[serde(skip_serializing_if = "no_files")]
    files: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    tasks_depend_mask: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    depend_sub_task_offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_running_tasks_per_host: Option<u32>,
    #[serde(skip_serializing_if = "is_zero")]
    task_max_run_time: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    gpus_per_task: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gpu_devices: Option<&'a str>,
    environment: OrderedEnv<'a>,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

fn no_files(files: &&[String]) -> bool {
    files.is_empty()
}

/// The job's pool with the job's priority inside it
#[derive(Debug)]
struct PoolPriority<'a>(&'a str, u8);

impl Serialize for PoolPriority<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.0, &self.1)?;
        map.end()
    }
}

/// Numbered `key=value` pairs written as a JSON object in their original order
#[derive(Debug)]
struct OrderedEnv<'a>(&'a [(String, String)]);

impl Serialize for OrderedEnv<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (_, pair) in self.0 {
            let (key, value) = pair.split_once('=').unwrap_or((pair.as_str(), ""));
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'a> AfJob<'a> {
    pub(crate) fn new(descriptor: &'a FarmJobDescriptor, user_name: &'a str, host_name: &'a str) -> Self {
        let block = &descriptor.block;
        Self {
            name: &descriptor.name,
            user_name,
            host_name,
            priority: descriptor.priority,
            max_running_tasks: descriptor.max_running_tasks,
            max_hosts: descriptor.machine_limit,
            hosts_mask: &descriptor.host_mask,
            hosts_mask_exclude: descriptor.exclude_host_mask.as_deref(),
            depend_mask: descriptor.depend_mask.as_deref(),
            depend_mask_global: descriptor.global_depend_mask.as_deref(),
            offline: descriptor.offline,
            annotation: descriptor.batch_name.as_deref(),
            pools: PoolPriority(&descriptor.pool, descriptor.priority),
            blocks: vec![AfBlock {
                name: &block.name,
                service: &block.service,
                command: &block.command,
                flags: BLOCK_FLAG_NUMERIC,
                frame_first: block.frame_first,
                frame_last: block.frame_last,
                frames_per_task: block.frames_per_task,
                frames_inc: 1,
                files: &block.files,
                tasks_depend_mask: block.tasks_depend_mask.as_deref(),
                depend_sub_task_offset: block.depend_task_offset,
                max_running_tasks_per_host: block.concurrent_tasks,
                task_max_run_time: block.task_timeout_minutes.saturating_mul(60),
                gpus_per_task: block.gpus_per_task,
                gpu_devices: block.gpu_devices.as_deref(),
                environment: OrderedEnv(&descriptor.environment),
            }],
        }
    }
}

/// Farm job ids are integers on the wire
pub(crate) fn numeric_id(remote_id: &RemoteJobId) -> Result<i64> {
    remote_id
        .as_str()
        .trim()
        .parse()
        .map_err(|_| ClientError::Rejected(format!("'{}' is not a farm job id", remote_id)))
}

pub(crate) fn get_request(kind: &str, ids: &[i64], mode: Option<&str>) -> Value {
    let mut get = json!({ "type": kind });
    if !ids.is_empty() {
        get["ids"] = json!(ids);
    }
    if let Some(mode) = mode {
        get["mode"] = json!(mode);
    }
    json!({ "get": get })
}

pub(crate) fn delete_request(id: i64, user_name: &str, host_name: &str) -> Value {
    json!({
        "action": {
            "type": "jobs",
            "ids": [id],
            "user_name": user_name,
            "host_name": host_name,
            "operation": { "type": "delete" }
        }
    })
}

/// Parses a reply body; plain text replies are kept as a JSON string
pub(crate) fn parse_reply(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ClientError::ParseError("empty reply".to_string()));
    }
    Ok(serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string())))
}

/// Error text carried by a reply, if any
pub(crate) fn error_message(reply: &Value) -> Option<String> {
    match reply.get("error")? {
        Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}

/// Extracts the job id the server assigned
///
/// Accepts `{"id": N}`, an id nested one object deep such as
/// `{"job_register": {"id": N}}`, or a text reply with a `JobID=N` line.
pub(crate) fn parse_job_id(reply: &Value) -> Option<RemoteJobId> {
    fn id_of(value: &Value) -> Option<RemoteJobId> {
        match value.get("id")? {
            Value::Number(n) => Some(RemoteJobId(n.to_string())),
            Value::String(s) if !s.is_empty() => Some(RemoteJobId(s.clone())),
            _ => None,
        }
    }

    match reply {
        Value::Object(map) => {
            id_of(reply).or_else(|| map.values().filter(|v| v.is_object()).find_map(id_of))
        }
        Value::String(text) => text.lines().find_map(|line| {
            let (key, value) = line.split_once('=')?;
            (key.trim() == "JobID" && !value.trim().is_empty())
                .then(|| RemoteJobId(value.trim().to_string()))
        }),
        _ => None,
    }
}

/// Maps a job state string such as `"RDY RUN"` to a job status
pub(crate) fn job_status(state: &str) -> FarmJobStatus {
    let has = |token: &str| state.split_whitespace().any(|t| t == token);

    if has("ERR") {
        FarmJobStatus::Error
    } else if has("OFF") {
        FarmJobStatus::Offline
    } else if has("DON") {
        FarmJobStatus::Done
    } else if has("RUN") {
        FarmJobStatus::Running
    } else {
        FarmJobStatus::Queued
    }
}

/// Maps a task state string to a task status
pub(crate) fn task_status(state: &str) -> TaskStatus {
    let has = |token: &str| state.split_whitespace().any(|t| t == token);

    if has("DON") {
        TaskStatus::Done
    } else if has("ERR") {
        TaskStatus::Error
    } else if has("SKP") {
        TaskStatus::Skipped
    } else if has("RUN") {
        TaskStatus::Running
    } else {
        TaskStatus::Pending
    }
}

/// Reads the job state string from a `jobs` reply
///
/// A reply that does not list `id` means the farm no longer has the job.
pub(crate) fn parse_job_state(reply: &Value, id: i64) -> Result<FarmJobStatus> {
    let jobs = reply
        .get("jobs")
        .and_then(Value::as_array)
        .ok_or_else(|| ClientError::ParseError("reply has no 'jobs' list".to_string()))?;

    let job = jobs
        .iter()
        .find(|job| job.get("id").and_then(Value::as_i64) == Some(id))
        .ok_or_else(|| ClientError::JobNotFound(RemoteJobId(id.to_string())))?;

    Ok(job_status(job.get("state").and_then(Value::as_str).unwrap_or("")))
}

/// Reads per-task progress from a `job_progress` reply
///
/// The single block's tasks come back in task order.
pub(crate) fn parse_progress(reply: &Value) -> Result<Vec<TaskProgress>> {
    let blocks = reply
        .get("job_progress")
        .and_then(|p| p.get("progress"))
        .and_then(Value::as_array)
        .ok_or_else(|| ClientError::ParseError("reply has no job progress".to_string()))?;

    let tasks = blocks
        .first()
        .and_then(Value::as_array)
        .map(|tasks| {
            tasks
                .iter()
                .enumerate()
                .map(|(index, task)| TaskProgress {
                    index,
                    status: task_status(task.get("state").and_then(Value::as_str).unwrap_or("")),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(tasks)
}

/// Reads pool names from a `pools` reply
pub(crate) fn parse_pools(reply: &Value) -> Vec<String> {
    reply
        .get("pools")
        .and_then(Value::as_array)
        .map(|pools| {
            pools
                .iter()
                .filter_map(|pool| pool.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
