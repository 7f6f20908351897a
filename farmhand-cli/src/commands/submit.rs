//! Submit command handler
//!
//! Registers the jobs described by a parameters file, submits them in
//! dependency order and optionally follows them until they finish.

use std::path::Path;

use anyhow::{Context, Result, bail};
use colored::*;
use farmhand_broker::SubmissionService;
use farmhand_core::domain::job::{JobId, JobState};
use farmhand_core::dto::submit::SubmitParams;

use crate::config::Config;

pub async fn handle_submit_command(
    config: &Config,
    params_path: &Path,
    preset: Option<&str>,
    wait: bool,
    save: Option<&Path>,
) -> Result<()> {
    let contents = std::fs::read_to_string(params_path)
        .with_context(|| format!("Failed to read {}", params_path.display()))?;
    let mut params: SubmitParams = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", params_path.display()))?;

    let service = config.service()?;

    if let Some(preset) = preset {
        config
            .catalog(&service)
            .apply_preset(preset, &mut params)
            .await
            .with_context(|| format!("Failed to apply preset '{}'", preset))?;
        println!("{} Using pool {}", "▸".cyan(), params.pool.cyan());
    }

    let result = submit_and_follow(&service, &params, wait).await;

    if let Some(path) = save {
        let records = service.snapshot();
        let json = serde_json::to_string_pretty(&records)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{}", format!("Saved {} job record(s) to {}", records.len(), path.display()).dimmed());
    }

    service.shutdown().await;
    result
}

async fn submit_and_follow(service: &SubmissionService, params: &SubmitParams, wait: bool) -> Result<()> {
    let ids = service
        .register(params)
        .await
        .context("Failed to register jobs")?;
    println!("{}", format!("Registered {} job(s)", ids.len()).bold());

    let outcomes = service.submit_pending().await?;

    let mut accepted = Vec::new();
    let mut failed = 0;
    for (job_id, outcome) in outcomes {
        let name = job_name(service, job_id);
        match outcome {
            Ok(result) if result.success => {
                let remote = result
                    .remote_job_id
                    .map(|id| id.to_string())
                    .unwrap_or_default();
                println!(
                    "  {} {} submitted as farm job {} ({} attempt(s))",
                    "✓".green(),
                    name.cyan(),
                    remote.bold(),
                    result.attempts
                );
                accepted.push(job_id);
            }
            Ok(result) => {
                failed += 1;
                let kind = result
                    .error_kind
                    .map(|k| k.to_string())
                    .unwrap_or_default();
                println!("  {} {} [{}] {}", "✗".red(), name.cyan(), kind.yellow(), result.message.red());
            }
            Err(e) => {
                failed += 1;
                println!("  {} {} {}", "✗".red(), name.cyan(), e.to_string().red());
            }
        }
    }

    if wait && !accepted.is_empty() {
        println!();
        println!("{}", "Waiting for jobs to finish...".dimmed());
        for job_id in accepted {
            let state = service.wait_for(job_id).await;
            let name = job_name(service, job_id);
            match state {
                Some(JobState::Done) => println!("  {} {} {}", "✓".green(), name.cyan(), "Done".green()),
                Some(state) => {
                    failed += 1;
                    let reason = service
                        .tracker()
                        .last_error(job_id)
                        .map(|cause| cause.to_string())
                        .unwrap_or_default();
                    println!("  {} {} {} {}", "✗".red(), name.cyan(), state.to_string().red(), reason.dimmed());
                }
                None => failed += 1,
            }
        }
    }

    if failed > 0 {
        bail!("{} job(s) did not succeed", failed);
    }
    Ok(())
}

fn job_name(service: &SubmissionService, job_id: JobId) -> String {
    service
        .registry()
        .get(job_id)
        .map(|record| record.job.name)
        .unwrap_or_else(|| job_id.to_string())
}
