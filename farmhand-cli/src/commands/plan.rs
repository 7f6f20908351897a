//! Plan command handler
//!
//! Prints the tasks a frame range splits into, without talking to the farm.

use anyhow::{Result, anyhow};
use colored::*;
use farmhand_core::domain::job::{FrameRange, JobId};
use farmhand_core::planner;

pub fn handle_plan_command(frames: &str, chunk: u32) -> Result<()> {
    let range: FrameRange = frames
        .parse()
        .map_err(|e| anyhow!("Invalid frame range '{}': {}", frames, e))?;
    let tasks = planner::plan(JobId::new(), range, chunk)?;

    println!(
        "{}",
        format!(
            "Frames {} ({} frame(s)) in chunks of {}: {} task(s)",
            range,
            range.len(),
            chunk,
            tasks.len()
        )
        .bold()
    );
    for task in &tasks {
        println!("  {} {:>4}  {}", "▸".cyan(), task.index, task.frames());
    }

    Ok(())
}
