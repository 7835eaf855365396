//! Shell command execution.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long to keep collecting output after the process is gone. Pipes
/// inherited by background grandchildren can stay open indefinitely.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// How an execution ended. Exactly one of these is produced per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The process exited; `-1` when it was killed by a signal.
    Exited(i32),
    /// The deadline passed and the process was killed.
    TimedOut(Duration),
    /// The shell could not be started.
    SpawnFailed(String),
    /// Waiting on the process failed.
    WaitFailed(String),
}

impl Completion {
    fn from_wait(result: std::io::Result<ExitStatus>) -> Self {
        match result {
            Ok(status) => Completion::Exited(status.code().unwrap_or(-1)),
            Err(e) => Completion::WaitFailed(e.to_string()),
        }
    }
}

/// Result of running one job command.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub completion: Completion,
    /// Combined stdout and stderr, in arrival order.
    pub output: String,
    pub elapsed: Duration,
}

impl ExecutionOutcome {
    pub fn succeeded(&self) -> bool {
        self.completion == Completion::Exited(0)
    }

    /// Text recorded as the job's output.
    pub fn report(&self) -> String {
        match &self.completion {
            Completion::Exited(0) => self.output.clone(),
            Completion::Exited(code) if self.output.trim().is_empty() => {
                format!("Exit code {code}")
            }
            Completion::Exited(_) => self.output.clone(),
            Completion::TimedOut(limit) => append_line(
                &self.output,
                &format!("Job timed out after {}ms", limit.as_millis()),
            ),
            Completion::SpawnFailed(reason) => {
                append_line(&self.output, &format!("spawn error: {reason}"))
            }
            Completion::WaitFailed(reason) => {
                append_line(&self.output, &format!("process error: {reason}"))
            }
        }
    }
}

fn append_line(output: &str, line: &str) -> String {
    if output.is_empty() {
        line.to_string()
    } else if output.ends_with('\n') {
        format!("{output}{line}")
    } else {
        format!("{output}\n{line}")
    }
}

/// Runs job commands through the platform shell.
#[derive(Debug, Clone, Default)]
pub struct JobExecutor {
    timeout: Option<Duration>,
}

impl JobExecutor {
    /// Create an executor. `None` disables the deadline.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run `command` to completion, or until the deadline.
    pub async fn execute(&self, command: &str) -> ExecutionOutcome {
        let started = Instant::now();
        let sink = Arc::new(Mutex::new(Vec::new()));

        let mut child = match shell_command(command).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command, error = %e, "Failed to spawn job command");
                return ExecutionOutcome {
                    completion: Completion::SpawnFailed(e.to_string()),
                    output: String::new(),
                    elapsed: started.elapsed(),
                };
            }
        };

        let mut readers = [
            pump(child.stdout.take(), sink.clone()),
            pump(child.stderr.take(), sink.clone()),
        ];

        // Exit and deadline race; whichever fires first decides the outcome.
        let completion = match self.timeout {
            Some(limit) => {
                let exited = tokio::select! {
                    status = child.wait() => Some(status),
                    _ = tokio::time::sleep(limit) => None,
                };
                match exited {
                    Some(status) => Completion::from_wait(status),
                    None => {
                        terminate(&mut child).await;
                        Completion::TimedOut(limit)
                    }
                }
            }
            None => Completion::from_wait(child.wait().await),
        };

        drain(&mut readers).await;
        let output = String::from_utf8_lossy(&sink.lock()).into_owned();

        ExecutionOutcome {
            completion,
            output,
            elapsed: started.elapsed(),
        }
    }
}

fn shell_command(command: &str) -> Command {
    let (shell, flag) = if cfg!(target_os = "windows") {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    };

    let mut std_cmd = std::process::Command::new(shell);
    std_cmd
        .arg(flag)
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // Own process group, so a timeout can kill everything the shell started.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        std_cmd.process_group(0);
    }

    let mut cmd = Command::from(std_cmd);
    cmd.kill_on_drop(true);
    cmd
}

fn pump<R>(reader: Option<R>, sink: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut reader) = reader else {
            return;
        };
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => sink.lock().extend_from_slice(&buf[..n]),
                Err(e) => {
                    debug!("Output pipe closed with error: {}", e);
                    break;
                }
            }
        }
    })
}

async fn drain(readers: &mut [JoinHandle<()>]) {
    let all = async {
        for reader in readers.iter_mut() {
            let _ = reader.await;
        }
    };
    if tokio::time::timeout(OUTPUT_DRAIN_GRACE, all).await.is_err() {
        debug!("Output pipes still open after exit, abandoning them");
        for reader in readers.iter() {
            reader.abort();
        }
    }
}

async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                debug!("Failed to kill process group {}: {}", pid, e);
            }
        }
    }

    if let Err(e) = child.kill().await {
        debug!("Failed to kill child process: {}", e);
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
