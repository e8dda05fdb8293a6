#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use agentbus_core::{EntryPoint, SupervisorConfig};
use agentbus_worker::ProcessAgentSupervisor;

fn test_config(max_restart_attempts: u32) -> SupervisorConfig {
    SupervisorConfig {
        enabled: true,
        health_check_interval_secs: 0.05,
        max_restart_attempts,
        shutdown_timeout_ms: 500,
    }
}

/// 追加的代理ID成为 `$0`，`exec` 让PID直接对应sleep进程
fn sleeper() -> EntryPoint {
    EntryPoint::new("sh").args(["-c", "exec sleep 30"])
}

fn pid_exists(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// 每次启动向 `log` 追加一行后立即退出
fn crasher(log: &Path) -> EntryPoint {
    EntryPoint::new("sh")
        .arg("-c")
        .arg(format!("echo \"$AGENTBUS_AGENT_ID\" >> '{}'; exit 1", log.display()))
}

fn launches(log: &Path) -> usize {
    std::fs::read_to_string(log)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

async fn wait_for<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

#[tokio::test]
async fn test_launch_and_status() {
    let supervisor = ProcessAgentSupervisor::new(test_config(3)).unwrap();
    assert!(supervisor.launch("worker", "a1", sleeper()).await);

    let status = supervisor.get_status("a1").await.unwrap();
    assert!(pid_exists(status.pid.unwrap()));
    assert_eq!(status.agent_id, "a1");
    assert_eq!(status.agent_type, "worker");
    assert!(status.pid.is_some());
    assert!(status.is_alive);
    assert_eq!(status.restart_count, 0);

    // 仍在运行时重复启动不会产生新进程
    assert!(supervisor.launch("worker", "a1", sleeper()).await);
    assert_eq!(supervisor.get_status("a1").await.unwrap().pid, status.pid);

    assert!(supervisor.get_status("missing").await.is_none());
    assert_eq!(supervisor.agent_ids().await, vec!["a1".to_string()]);
    supervisor.shutdown_all().await;
}

#[tokio::test]
async fn test_launch_fails_when_disabled_or_unlaunchable() {
    let disabled = ProcessAgentSupervisor::new(SupervisorConfig {
        enabled: false,
        ..test_config(3)
    })
    .unwrap();
    assert!(!disabled.launch("worker", "a1", sleeper()).await);

    let supervisor = ProcessAgentSupervisor::new(test_config(3)).unwrap();
    assert!(
        !supervisor
            .launch("worker", "a2", EntryPoint::new("/definitely/not/a/binary"))
            .await
    );
    assert!(supervisor.get_status("a2").await.is_none());
}

#[tokio::test]
async fn test_restart_budget_is_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("launches.log");
    let supervisor = ProcessAgentSupervisor::new(test_config(2)).unwrap();

    assert!(supervisor.launch("flaky", "crash", crasher(&log)).await);
    assert!(wait_for(|| async { !supervisor.is_alive("crash").await }).await);

    for expected in 1..=2 {
        assert!(supervisor.attempt_restart("crash").await);
        assert_eq!(
            supervisor.get_status("crash").await.unwrap().restart_count,
            expected
        );
        assert!(wait_for(|| async { !supervisor.is_alive("crash").await }).await);
    }

    assert!(!supervisor.attempt_restart("crash").await);
    assert!(supervisor.get_status("crash").await.is_none());
    assert!(!supervisor.attempt_restart("crash").await);

    assert!(wait_for(|| async { launches(&log) == 3 }).await);
    let ids = std::fs::read_to_string(&log).unwrap();
    assert!(ids.lines().all(|line| line == "crash"));
}

#[tokio::test]
async fn test_health_monitor_restarts_until_budget_exhausted() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("launches.log");
    let supervisor = ProcessAgentSupervisor::new(test_config(3)).unwrap();

    assert!(supervisor.launch("flaky", "crash", crasher(&log)).await);
    assert!(supervisor.start_monitoring().await);
    assert!(!supervisor.start_monitoring().await);

    assert!(wait_for(|| async { supervisor.get_status("crash").await.is_none() }).await);
    supervisor.stop_monitoring().await;
    assert!(!supervisor.is_monitoring().await);

    // 1次启动 + 3次重启
    assert_eq!(launches(&log), 4);
}

#[tokio::test]
async fn test_health_monitor_leaves_healthy_agents_alone() {
    let supervisor = ProcessAgentSupervisor::new(test_config(3)).unwrap();
    supervisor.launch("worker", "steady", sleeper()).await;
    assert!(supervisor.check_agents().await.is_empty());

    supervisor.start_monitoring().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    supervisor.stop_monitoring().await;

    let status = supervisor.get_status("steady").await.unwrap();
    assert!(status.is_alive);
    assert_eq!(status.restart_count, 0);
    supervisor.shutdown_all().await;
}

#[tokio::test]
async fn test_shutdown_terminates_processes() {
    let supervisor = ProcessAgentSupervisor::new(test_config(3)).unwrap();
    supervisor.launch("worker", "a", sleeper()).await;
    supervisor.launch("worker", "b", sleeper()).await;
    supervisor.launch("worker", "c", sleeper()).await;
    supervisor.start_monitoring().await;

    let mut pids = Vec::new();
    for id in ["a", "b", "c"] {
        let status = supervisor.get_status(id).await.unwrap();
        assert!(status.is_alive, "{id} should be running");
        pids.push(status.pid.unwrap());
    }
    assert!(pids.iter().all(|pid| pid_exists(*pid)));

    assert!(supervisor.shutdown_agent("a").await);
    assert!(!pid_exists(pids[0]));
    assert!(!supervisor.shutdown_agent("a").await);
    assert_eq!(supervisor.agent_ids().await, vec!["b", "c"]);

    supervisor.shutdown_all().await;
    assert!(supervisor.agent_ids().await.is_empty());
    assert!(!supervisor.is_monitoring().await);
    assert!(!supervisor.is_alive("b").await);
    assert!(pids.iter().all(|pid| !pid_exists(*pid)));
}

#[tokio::test]
async fn test_stubborn_process_is_killed_after_timeout() {
    let supervisor = ProcessAgentSupervisor::new(test_config(3)).unwrap();
    let stubborn = EntryPoint::new("sh")
        .arg("-c")
        .arg("trap '' TERM; while true; do sleep 0.05; done");
    supervisor.launch("worker", "stubborn", stubborn).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = std::time::Instant::now();
    assert!(supervisor.shutdown_agent("stubborn").await);
    assert!(started.elapsed() >= Duration::from_millis(400));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_invalid_config_is_rejected_at_construction() {
    for interval in [0.0, -1.0, f64::NAN, 1e30] {
        let config = SupervisorConfig {
            health_check_interval_secs: interval,
            ..test_config(3)
        };
        assert!(ProcessAgentSupervisor::new(config).is_err(), "{interval}");
    }
}
