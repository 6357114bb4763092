#![cfg(unix)]

mod common;

use common::daily_series;
use std::time::Duration;
use stratforge::domain::cancellation::CancelSignal;
use stratforge::domain::errors::ExecutionFailure;
use stratforge::domain::execution::ExecutionRequest;
use stratforge::domain::ports::SandboxEnvironment;
use stratforge::infrastructure::sandbox::{ProcessSandbox, SandboxConfig};

fn sandbox() -> ProcessSandbox {
    ProcessSandbox::new(SandboxConfig {
        interpreter: "sh".to_string(),
        interpreter_args: Vec::new(),
        script_name: "strategy.sh".to_string(),
        ..Default::default()
    })
}

fn request(source: &str, timeout: Duration) -> ExecutionRequest {
    ExecutionRequest {
        run_id: "SPY-sandbox-test".to_string(),
        artifact_version: 2,
        source: source.to_string(),
        market_data: Some(daily_series("SPY", 12)),
        timeout,
    }
}

#[tokio::test]
async fn test_child_sees_data_file_in_its_working_directory() {
    let script = "head -n 1 ohlcv.csv\nwc -l < ohlcv.csv | tr -d ' '\npwd\n";
    let result = sandbox()
        .run(request(script, Duration::from_secs(10)), &CancelSignal::never())
        .await
        .unwrap();

    assert!(result.succeeded(), "stderr: {}", result.stderr);
    let lines: Vec<&str> = result.stdout.lines().collect();
    assert_eq!(lines[0], "timestamp,open,high,low,close,volume");
    assert_eq!(lines[1], "13");
    assert!(lines[2].contains("stratforge-"));
}

#[tokio::test]
async fn test_workspace_is_removed_after_the_run() {
    let result = sandbox()
        .run(request("pwd\n", Duration::from_secs(10)), &CancelSignal::never())
        .await
        .unwrap();
    let dir = result.stdout.trim().to_string();
    assert!(!std::path::Path::new(&dir).exists());
}

#[tokio::test]
async fn test_runaway_script_is_killed_at_the_timeout() {
    let started = std::time::Instant::now();
    let result = sandbox()
        .run(request("while true; do :; done\n", Duration::from_millis(300)), &CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(result.failure(), Some(ExecutionFailure::Timeout));
    assert!(result.exit_code.is_none());
    assert!(started.elapsed() < Duration::from_secs(10));
}
