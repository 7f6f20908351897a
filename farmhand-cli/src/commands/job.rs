//! Farm job command handlers
//!
//! Status and cancellation of jobs already on the farm, addressed by their
//! farm id.

use anyhow::{Context, Result};
use colored::*;
use farmhand_core::domain::job::RemoteJobId;
use farmhand_core::domain::task::TaskStatus;
use farmhand_core::dto::status::{FarmJobStatus, StatusSnapshot};

use crate::config::Config;

/// Show the farm's view of a job
pub async fn handle_status_command(config: &Config, remote_id: &str) -> Result<()> {
    let service = config.service()?;
    let remote_id = RemoteJobId(remote_id.to_string());

    let snapshot = service.broker().query_status(&remote_id).await;
    service.shutdown().await;
    let snapshot = snapshot.with_context(|| format!("Failed to query farm job {}", remote_id))?;

    print_status(&remote_id, &snapshot);
    Ok(())
}

/// Remove a job from the farm
pub async fn handle_cancel_command(config: &Config, remote_id: &str) -> Result<()> {
    let service = config.service()?;
    let remote_id = RemoteJobId(remote_id.to_string());

    let result = service.broker().cancel_remote(&remote_id).await;
    service.shutdown().await;
    result.with_context(|| format!("Failed to cancel farm job {}", remote_id))?;

    println!("{} Cancelled farm job {}", "✓".green(), remote_id.to_string().bold());
    Ok(())
}

fn print_status(remote_id: &RemoteJobId, snapshot: &StatusSnapshot) {
    println!("{}", "Farm Job:".bold());
    println!("  ID:     {}", remote_id.to_string().cyan());
    println!("  Status: {}", colorize_job_status(snapshot.job_status));

    if snapshot.tasks.is_empty() {
        return;
    }

    let done = snapshot
        .tasks
        .iter()
        .filter(|t| t.status.is_satisfied())
        .count();
    println!("  Tasks:  {}/{} finished", done, snapshot.tasks.len());

    println!("\n{}", "Tasks:".bold());
    for task in &snapshot.tasks {
        println!("  {:>4}  {}", task.index, colorize_task_status(task.status));
    }
}

fn colorize_job_status(status: FarmJobStatus) -> ColoredString {
    let status_str = format!("{:?}", status);
    match status {
        FarmJobStatus::Queued => status_str.yellow(),
        FarmJobStatus::Running => status_str.cyan(),
        FarmJobStatus::Offline => status_str.dimmed(),
        FarmJobStatus::Done => status_str.green(),
        FarmJobStatus::Error => status_str.red(),
    }
}

fn colorize_task_status(status: TaskStatus) -> ColoredString {
    let status_str = format!("{:?}", status);
    match status {
        TaskStatus::Pending | TaskStatus::Dispatched => status_str.yellow(),
        TaskStatus::Running => status_str.cyan(),
        TaskStatus::Done => status_str.green(),
        TaskStatus::Error => status_str.red(),
        TaskStatus::Skipped => status_str.dimmed(),
    }
}
