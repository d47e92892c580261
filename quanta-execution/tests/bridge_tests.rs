//! End-to-end bridge tests against small shell workers
#![cfg(unix)]

use serde_json::json;
use std::time::Duration;

use quanta_execution::{
    ExecutionError, ProcessWorkerBridge, RpcClientConfig, SupervisorConfig, WorkerBackend,
    WorkerBridgeConfig, WorkerProcessStatus,
};

/// Answers every request line with `{"id": <same id>, "result": "ok"}`
const ECHO_WORKER: &str =
    r#"while IFS= read -r line; do printf '%s\n' "$line" | sed 's/,"method".*/,"result":"ok"}/'; done"#;

fn bridge(script: &str, restart_on_crash: bool, max_restart_attempts: u32) -> ProcessWorkerBridge {
    ProcessWorkerBridge::new(WorkerBridgeConfig {
        supervisor: SupervisorConfig {
            max_restart_attempts,
            restart_delay: Duration::ZERO,
            ..SupervisorConfig::new("sh", ["-c", script])
        },
        rpc: RpcClientConfig {
            default_timeout: Duration::from_secs(5),
            max_pending_calls: Some(16),
        },
        restart_on_crash,
        max_frame_bytes: None,
    })
}

#[tokio::test]
async fn test_lazy_start_and_round_trip() {
    let bridge = bridge(ECHO_WORKER, true, 3);
    assert_eq!(bridge.supervisor().status(), WorkerProcessStatus::NotStarted);

    let result = bridge.call("cas_evaluate", json!({"expr": "2+2"}), None).await.unwrap();
    assert_eq!(result, json!("ok"));
    assert_eq!(bridge.supervisor().status(), WorkerProcessStatus::Running);
    assert!(bridge.health_check().await.is_ok());

    let calls = (0..8).map(|i| bridge.call("cas_diff", json!({ "i": i }), None));
    for result in futures::future::join_all(calls).await {
        assert_eq!(result.unwrap(), json!("ok"));
    }

    bridge.shutdown(Duration::from_secs(5)).await.unwrap();
    assert_eq!(bridge.supervisor().status(), WorkerProcessStatus::Stopped);
    assert_eq!(bridge.stats().worker.last_exit.unwrap().code, Some(0));

    let err = bridge.call("cas_evaluate", json!({}), None).await.unwrap_err();
    assert!(matches!(err, ExecutionError::WorkerUnavailable(_)));
}

#[tokio::test]
async fn test_crash_fails_pending_then_restarts_within_budget() {
    // Reads one request and dies without answering
    let bridge = bridge("read -r line; exit 7", true, 1);

    let err = bridge.call("plot_function_2d", json!({}), None).await.unwrap_err();
    assert!(matches!(err, ExecutionError::WorkerUnavailable(_)));

    // Next call restarts the worker once; it crashes again
    let err = bridge.call("plot_function_2d", json!({}), None).await.unwrap_err();
    assert!(matches!(err, ExecutionError::WorkerUnavailable(_)));
    assert_eq!(bridge.stats().worker.restart_count, 1);

    // Budget is spent
    let err = bridge.call("plot_function_2d", json!({}), None).await.unwrap_err();
    assert!(matches!(err, ExecutionError::RestartsExhausted { attempts: 1 }));
}

#[tokio::test]
async fn test_fail_fast_without_restart_policy() {
    let bridge = bridge("read -r line; exit 2", false, 3);

    let err = bridge.call("data_filter", json!({}), None).await.unwrap_err();
    assert!(matches!(err, ExecutionError::WorkerUnavailable(_)));

    // Wait for the exit to be observed before the next call
    for _ in 0..100 {
        if bridge.supervisor().status() == WorkerProcessStatus::Crashed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let err = bridge.call("data_filter", json!({}), None).await.unwrap_err();
    assert!(err.to_string().contains("restart_on_crash is disabled"));
}

#[tokio::test]
async fn test_crash_settles_calls_while_stdout_is_still_held() {
    // The backgrounded sleep inherits stdout, so the pipe stays open after the worker dies
    let bridge = bridge("read -r line; sleep 20 & exit 7", false, 3);

    let started = std::time::Instant::now();
    let err = bridge
        .call("cas_evaluate", json!({"expr": "1"}), Some(Duration::from_secs(10)))
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
    assert!(matches!(err, ExecutionError::WorkerUnavailable(_)), "{:?}", err);
    assert!(err.to_string().contains("code 7"));
    assert_eq!(bridge.supervisor().status(), WorkerProcessStatus::Crashed);
    assert_eq!(bridge.client().pending_count(), 0);
}
