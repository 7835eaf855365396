use super::*;

#[cfg(unix)]
#[tokio::test]
async fn test_execute_success() {
    let executor = JobExecutor::new(None);
    let outcome = executor.execute("echo hello").await;

    assert!(outcome.succeeded());
    assert_eq!(outcome.completion, Completion::Exited(0));
    assert_eq!(outcome.output.trim(), "hello");
    assert_eq!(outcome.report().trim(), "hello");
}

#[cfg(unix)]
#[tokio::test]
async fn test_execute_nonzero_exit_without_output() {
    let executor = JobExecutor::new(None);
    let outcome = executor.execute("exit 1").await;

    assert!(!outcome.succeeded());
    assert_eq!(outcome.completion, Completion::Exited(1));
    assert_eq!(outcome.report(), "Exit code 1");
}

#[cfg(unix)]
#[tokio::test]
async fn test_execute_nonzero_exit_keeps_output() {
    let executor = JobExecutor::new(None);
    let outcome = executor.execute("echo broken; exit 3").await;

    assert_eq!(outcome.completion, Completion::Exited(3));
    assert_eq!(outcome.report().trim(), "broken");
}

#[cfg(unix)]
#[tokio::test]
async fn test_execute_captures_stderr() {
    let executor = JobExecutor::new(None);
    let outcome = executor.execute("echo out; echo err >&2").await;

    assert!(outcome.succeeded());
    assert!(outcome.output.contains("out"));
    assert!(outcome.output.contains("err"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_execute_missing_binary_fails() {
    let executor = JobExecutor::new(None);
    let outcome = executor.execute("definitely-not-a-real-binary-xyz").await;

    // The shell starts; the command lookup fails inside it.
    assert_eq!(outcome.completion, Completion::Exited(127));
    assert!(!outcome.succeeded());
}

#[cfg(unix)]
#[tokio::test]
async fn test_execute_timeout_kills_process() {
    let executor = JobExecutor::new(Some(Duration::from_millis(100)));
    let outcome = executor.execute("echo started; sleep 10").await;

    assert_eq!(outcome.completion, Completion::TimedOut(Duration::from_millis(100)));
    assert!(outcome.elapsed < Duration::from_secs(5));
    let report = outcome.report();
    assert!(report.starts_with("started"));
    assert!(report.ends_with("Job timed out after 100ms"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_execute_timeout_kills_background_children() {
    let executor = JobExecutor::new(Some(Duration::from_millis(100)));
    // The background sleep holds the output pipes open unless the whole
    // group is killed.
    let outcome = executor.execute("sleep 10 & sleep 10; wait").await;

    assert!(matches!(outcome.completion, Completion::TimedOut(_)));
    assert!(outcome.elapsed < Duration::from_secs(5));
}

#[cfg(unix)]
#[tokio::test]
async fn test_execute_fast_command_beats_deadline() {
    let executor = JobExecutor::new(Some(Duration::from_secs(10)));
    let outcome = executor.execute("true").await;
    assert!(outcome.succeeded());
}

#[test]
fn test_report_formats() {
    let timed_out = ExecutionOutcome {
        completion: Completion::TimedOut(Duration::from_millis(250)),
        output: String::new(),
        elapsed: Duration::from_millis(250),
    };
    assert_eq!(timed_out.report(), "Job timed out after 250ms");

    let spawn = ExecutionOutcome {
        completion: Completion::SpawnFailed("no such file".to_string()),
        output: "partial\n".to_string(),
        elapsed: Duration::ZERO,
    };
    assert_eq!(spawn.report(), "partial\nspawn error: no such file");

    let wait = ExecutionOutcome {
        completion: Completion::WaitFailed("interrupted".to_string()),
        output: "partial".to_string(),
        elapsed: Duration::ZERO,
    };
    assert_eq!(wait.report(), "partial\nprocess error: interrupted");
}

#[test]
fn test_default_has_no_deadline() {
    assert!(JobExecutor::default().timeout().is_none());
}
