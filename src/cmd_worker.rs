//! Worker process commands.

use std::time::Duration;

use tracing::{info, warn};

use queuectl_workqueue::WorkerPool;

use crate::pid::{self, PidFile};
use crate::Context;

/// Run the pool in the foreground until SIGINT or SIGTERM.
pub(crate) async fn start(ctx: &Context, count: Option<u32>) -> anyhow::Result<()> {
    let mut pid_file = PidFile::for_store(&ctx.settings.store_path);
    pid_file.try_acquire()?;
    info!("Wrote PID file {}", pid_file.path().display());

    let count = count.unwrap_or(ctx.settings.worker_count);
    let pool = WorkerPool::new(ctx.jobs.clone(), ctx.settings.clone());
    pool.start(count).await?;

    if !ctx.json {
        println!(
            "Started {} worker(s) on {} (PID {}), Ctrl+C to stop",
            count,
            ctx.settings.store_path.display(),
            std::process::id()
        );
    }

    wait_for_shutdown().await?;
    info!("Shutdown requested, finishing in-flight jobs");
    pool.stop().await;

    pid_file.release()?;
    if !ctx.json {
        println!("Workers stopped");
    }
    Ok(())
}

/// Signal the foreground worker process and wait for it to exit.
pub(crate) async fn stop(ctx: &Context, wait_secs: u64) -> anyhow::Result<()> {
    let pid_file = PidFile::for_store(&ctx.settings.store_path);
    let Some(pid) = pid_file.running_pid()? else {
        println!("No workers running");
        return Ok(());
    };

    info!("Stopping workers (PID: {})...", pid);
    pid::request_shutdown(pid)?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(wait_secs);
    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if !pid::is_process_running(pid) {
            println!("Workers stopped");
            return Ok(());
        }
    }

    warn!("Workers (PID {}) still finishing jobs after {}s", pid, wait_secs);
    anyhow::bail!("Workers did not stop within {}s", wait_secs)
}

#[cfg(unix)]
async fn wait_for_shutdown() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C");
    Ok(())
}
