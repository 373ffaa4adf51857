#![cfg(unix)]

use std::thread;
use std::time::{Duration, Instant};

use neuroseg::{CommandExecutor, Invocation, PipelineError, SystemExecutor};
use tempfile::tempdir;

#[test]
fn invocation_renders_command_line() {
    let invocation = Invocation::new("nnUNetv2_predict").arg("-f").arg("all");

    assert_eq!(invocation.command_line(), "nnUNetv2_predict -f all");
    assert_eq!(invocation.to_string(), "nnUNetv2_predict -f all");
    assert_eq!(invocation.args().len(), 2);
}

#[test]
fn successful_command_returns_captured_stdout() {
    let invocation = Invocation::new("sh").arg("-c").arg("echo registered");

    let output = SystemExecutor::new().execute(&invocation).unwrap();

    assert_eq!(output.status, Some(0));
    assert_eq!(output.stdout, "registered\n");
}

#[test]
fn non_zero_exit_carries_argv_and_stderr() {
    let invocation = Invocation::new("sh")
        .arg("-c")
        .arg("echo 'bad header' >&2; exit 3");

    let err = SystemExecutor::new().execute(&invocation).unwrap_err();

    match err {
        PipelineError::CommandFailed {
            argv,
            status,
            stderr,
        } => {
            assert_eq!(argv[0], "sh");
            assert_eq!(status, Some(3));
            assert_eq!(stderr.trim(), "bad header");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn missing_program_is_a_spawn_error() {
    let invocation = Invocation::new("/nonexistent/neuroseg-tool");

    let err = SystemExecutor::new().execute(&invocation).unwrap_err();

    assert!(matches!(err, PipelineError::Spawn { .. }));
    assert!(!err.is_item_failure());
}

#[test]
fn timeout_kills_hanging_command() {
    let executor = SystemExecutor::with_timeout(Some(Duration::from_millis(200)));
    let invocation = Invocation::new("sleep").arg("5");

    let err = executor.execute(&invocation).unwrap_err();

    assert!(matches!(err, PipelineError::CommandTimedOut { .. }));
    assert!(err.is_item_failure());
}

#[test]
fn timeout_leaves_fast_commands_alone() {
    let executor = SystemExecutor::with_timeout(Some(Duration::from_secs(10)));
    let invocation = Invocation::new("sh")
        .arg("-c")
        .arg("echo out; echo err >&2");

    let output = executor.execute(&invocation).unwrap();

    assert_eq!(output.stdout, "out\n");
    assert_eq!(output.stderr, "err\n");
}

#[test]
fn timeout_kills_processes_started_by_a_wrapper_script() {
    let temp = tempdir().unwrap();
    let marker = temp.path().join("late-output");
    let executor = SystemExecutor::with_timeout(Some(Duration::from_millis(200)));
    let script = format!("sh -c 'sleep 1; touch {}'; true", marker.display());
    let invocation = Invocation::new("sh").arg("-c").arg(script);

    let err = executor.execute(&invocation).unwrap_err();

    assert!(matches!(err, PipelineError::CommandTimedOut { .. }));
    thread::sleep(Duration::from_millis(1_800));
    assert!(!marker.exists());
}

#[test]
fn background_child_holding_output_open_is_bounded_by_timeout() {
    let temp = tempdir().unwrap();
    let marker = temp.path().join("late-output");
    let executor = SystemExecutor::with_timeout(Some(Duration::from_millis(300)));
    let script = format!("(sleep 1; touch {}) & echo started", marker.display());
    let invocation = Invocation::new("sh").arg("-c").arg(script);

    let started = Instant::now();
    let err = executor.execute(&invocation).unwrap_err();

    assert!(started.elapsed() < Duration::from_millis(900));
    assert!(matches!(err, PipelineError::CommandTimedOut { .. }));
    thread::sleep(Duration::from_millis(1_500));
    assert!(!marker.exists());
}
