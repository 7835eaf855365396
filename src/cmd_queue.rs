//! Queue inspection and maintenance commands.

use anyhow::{bail, Context as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use queuectl_config::{canonical_key, ConfigError};
use queuectl_workqueue::{DeadLetterEntry, EnqueueOptions, Job, JobState};

use crate::pid::PidFile;
use crate::Context;

/// Job JSON accepted by `enqueue`.
#[derive(Debug, Deserialize)]
struct EnqueueRequest {
    command: String,
    #[serde(flatten)]
    options: EnqueueOptions,
}

/// Split the `enqueue` argument into a command and options. Flags win over
/// fields in the JSON.
fn parse_enqueue(
    raw: &str,
    id: Option<String>,
    max_retries: Option<u32>,
) -> anyhow::Result<(String, EnqueueOptions)> {
    let (command, mut options) = if raw.trim_start().starts_with('{') {
        let request: EnqueueRequest =
            serde_json::from_str(raw).context("Invalid job JSON, expected {\"command\": ...}")?;
        (request.command, request.options)
    } else {
        (raw.to_string(), EnqueueOptions::default())
    };

    if id.is_some() {
        options.id = id;
    }
    if max_retries.is_some() {
        options.max_retries = max_retries;
    }
    Ok((command, options))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// First line of the output, shortened for tables.
fn summary(output: Option<&str>, width: usize) -> String {
    let line = output
        .and_then(|o| o.lines().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or("");
    if line.chars().count() <= width {
        return line.to_string();
    }
    let mut short: String = line.chars().take(width.saturating_sub(3)).collect();
    short.push_str("...");
    short
}

fn print_jobs(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("No jobs");
        return;
    }
    println!(
        "{:<36}  {:<10}  {:>8}  {:<19}  COMMAND",
        "ID", "STATE", "ATTEMPTS", "UPDATED"
    );
    for job in jobs {
        println!(
            "{:<36}  {:<10}  {:>8}  {:<19}  {}",
            job.id,
            job.state.as_str(),
            format!("{}/{}", job.attempts, job.max_retries),
            timestamp(job.updated_at),
            job.command
        );
    }
}

fn print_job(verb: &str, job: &Job) {
    println!("{} job {} ({}): {}", verb, job.id, job.state, job.command);
}

pub(crate) async fn enqueue(
    ctx: &Context,
    raw: &str,
    id: Option<String>,
    max_retries: Option<u32>,
) -> anyhow::Result<()> {
    let (command, options) = parse_enqueue(raw, id, max_retries)?;
    let job = ctx.jobs.enqueue(&command, options).await?;

    if ctx.json {
        return print_json(&job);
    }
    print_job("Enqueued", &job);
    Ok(())
}

pub(crate) async fn status(ctx: &Context) -> anyhow::Result<()> {
    let status = ctx.jobs.status().await?;
    let worker_pid = PidFile::for_store(&ctx.settings.store_path).running_pid()?;

    if ctx.json {
        return print_json(&json!({
            "jobs": status,
            "workers": {
                "running": worker_pid.is_some(),
                "pid": worker_pid,
            },
        }));
    }

    println!("Jobs: {}", status.total);
    for state in JobState::ALL {
        println!("  {:<11} {}", state.as_str(), status.count(state));
    }
    match worker_pid {
        Some(pid) => println!("Workers: running (PID {})", pid),
        None => println!("Workers: stopped"),
    }
    Ok(())
}

pub(crate) async fn list(ctx: &Context, state: Option<JobState>) -> anyhow::Result<()> {
    let jobs = ctx.jobs.list(state).await?;
    if ctx.json {
        return print_json(&jobs);
    }
    print_jobs(&jobs);
    Ok(())
}

pub(crate) async fn reset(ctx: &Context, id: Option<String>, processing: bool) -> anyhow::Result<()> {
    if processing {
        let count = ctx.jobs.reset_all_processing().await?;
        if ctx.json {
            return print_json(&json!({ "reset": count }));
        }
        println!("Reset {} processing job(s)", count);
        return Ok(());
    }

    let Some(id) = id else {
        bail!("Specify a job ID or --processing");
    };
    match ctx.jobs.reset_for_retry(&id).await? {
        Some(job) if ctx.json => print_json(&job),
        Some(job) => {
            print_job("Reset", &job);
            Ok(())
        }
        None => bail!("Job not found: {}", id),
    }
}

pub(crate) async fn reset_stale(ctx: &Context, timeout: Option<u64>) -> anyhow::Result<()> {
    let timeout = timeout.unwrap_or(ctx.settings.lease_timeout_seconds);
    let count = ctx.jobs.reclaim_stale(timeout).await?;
    if ctx.json {
        return print_json(&json!({ "unlocked": count, "timeoutSeconds": timeout }));
    }
    println!("Unlocked {} job(s) locked for more than {}s", count, timeout);
    Ok(())
}

pub(crate) async fn clear(ctx: &Context) -> anyhow::Result<()> {
    ctx.jobs.clear_all().await?;
    if ctx.json {
        return print_json(&json!({ "cleared": true }));
    }
    println!("All jobs cleared");
    Ok(())
}

pub(crate) async fn delete(ctx: &Context, id: &str) -> anyhow::Result<()> {
    if !ctx.jobs.delete(id).await? {
        bail!("Job not found: {}", id);
    }
    if ctx.json {
        return print_json(&json!({ "deleted": id }));
    }
    println!("Deleted job {}", id);
    Ok(())
}

fn print_dead_letters(entries: &[DeadLetterEntry]) {
    if entries.is_empty() {
        println!("Dead letter queue is empty");
        return;
    }
    println!(
        "{:<36}  {:>8}  {:<19}  {:<30}  COMMAND",
        "ID", "ATTEMPTS", "DEAD AT", "LAST OUTPUT"
    );
    for entry in entries {
        println!(
            "{:<36}  {:>8}  {:<19}  {:<30}  {}",
            entry.job.id,
            entry.job.attempts,
            timestamp(entry.dead_at),
            summary(entry.job.output.as_deref(), 30),
            entry.job.command
        );
    }
}

pub(crate) async fn dlq_list(ctx: &Context) -> anyhow::Result<()> {
    let entries = ctx.dlq.list().await?;
    if ctx.json {
        return print_json(&entries);
    }
    print_dead_letters(&entries);
    Ok(())
}

pub(crate) async fn dlq_retry(ctx: &Context, id: &str) -> anyhow::Result<()> {
    match ctx.dlq.retry(id).await? {
        Some(job) if ctx.json => print_json(&job),
        Some(job) => {
            print_job("Requeued", &job);
            Ok(())
        }
        None => bail!("Dead letter job not found: {}", id),
    }
}

pub(crate) async fn config_get(ctx: &Context, key: Option<String>) -> anyhow::Result<()> {
    let settings = ctx.settings.to_map()?;

    let Some(key) = key else {
        if ctx.json {
            return print_json(&settings);
        }
        for (key, value) in &settings {
            println!("{} = {}", key, value);
        }
        return Ok(());
    };

    let canonical = canonical_key(&key).ok_or_else(|| ConfigError::UnknownKey(key.clone()))?;
    let value = settings.get(canonical).cloned().unwrap_or_default();
    if ctx.json {
        return print_json(&json!({ canonical: value }));
    }
    println!("{} = {}", canonical, value);
    Ok(())
}

pub(crate) async fn config_set(ctx: &Context, key: &str, value: &str) -> anyhow::Result<()> {
    let persisted = ctx.config.set(key, value).await?;
    if ctx.json {
        return print_json(&persisted);
    }
    let canonical = canonical_key(key).unwrap_or(key);
    let stored = persisted.get(canonical).cloned().unwrap_or_default();
    println!("{} = {}", canonical, stored);
    Ok(())
}
