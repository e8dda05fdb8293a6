//! 进程代理监督
//!
//! 每个代理运行在独立的操作系统进程中，由 [`EntryPoint`] 描述如何启动。
//! 监督者记录PID、启动时间与重启次数，后台健康检查按固定周期探测存活，
//! 退出的代理在重启预算内按原入口重新拉起，预算耗尽后移除记录。

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agentbus_core::models::AGENT_ID_ENV;
use agentbus_core::config::ConfigValidator;
use agentbus_core::{AgentBusError, AgentBusResult, AgentStatus, EntryPoint, SupervisorConfig};
use chrono::{DateTime, Utc};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, error, info, warn};

struct AgentProcess {
    agent_type: String,
    child: Child,
    pid: Option<u32>,
    start_time: Instant,
    last_heartbeat: DateTime<Utc>,
    restart_count: u32,
    entry_point: EntryPoint,
}

impl AgentProcess {
    /// 非阻塞探测进程是否仍在运行
    fn probe(&mut self, agent_id: &str) -> bool {
        match self.child.try_wait() {
            Ok(None) => {
                self.last_heartbeat = Utc::now();
                true
            }
            Ok(Some(status)) => {
                debug!(agent_id, %status, "Agent process exited");
                false
            }
            Err(e) => {
                warn!(agent_id, "Failed to probe agent process: {}", e);
                false
            }
        }
    }
}

fn spawn_agent(agent_id: &str, entry_point: &EntryPoint) -> std::io::Result<Child> {
    Command::new(&entry_point.program)
        .args(entry_point.args_for(agent_id))
        .envs(&entry_point.env)
        .env(AGENT_ID_ENV, agent_id)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
}

/// 先发送SIGTERM，等待 `timeout` 后仍未退出则强制杀死
async fn terminate(agent_id: &str, child: &mut Child, timeout: Duration) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            match Command::new("kill").arg(pid.to_string()).output().await {
                Ok(output) if output.status.success() => {
                    debug!(agent_id, pid, "Sent SIGTERM to agent");
                }
                Ok(output) => warn!(
                    agent_id,
                    pid,
                    "kill failed: {}",
                    String::from_utf8_lossy(&output.stderr)
                ),
                Err(e) => warn!(agent_id, pid, "Failed to run kill: {}", e),
            }
        }
    }

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => info!(agent_id, %status, "Agent process terminated"),
        Ok(Err(e)) => warn!(agent_id, "Failed to wait for agent process: {}", e),
        Err(_) => {
            warn!(agent_id, "Agent did not exit within {:?}, killing", timeout);
            if let Err(e) = child.kill().await {
                error!(agent_id, "Failed to kill agent process: {}", e);
            }
        }
    }
}

struct SupervisorInner {
    config: SupervisorConfig,
    agents: Mutex<HashMap<String, AgentProcess>>,
}

impl SupervisorInner {
    async fn attempt_restart(&self, agent_id: &str) -> bool {
        let mut agents = self.agents.lock().await;
        let Some(agent) = agents.get_mut(agent_id) else {
            warn!(agent_id, "Cannot restart unknown agent");
            return false;
        };

        if agent.restart_count >= self.config.max_restart_attempts {
            let attempts = agent.restart_count;
            agents.remove(agent_id);
            error!(
                "{}",
                AgentBusError::RestartBudgetExhausted {
                    agent_id: agent_id.to_string(),
                    attempts,
                }
            );
            metrics::counter!("agentbus_agent_evictions_total").increment(1);
            return false;
        }

        terminate(agent_id, &mut agent.child, self.config.shutdown_timeout()).await;
        agent.restart_count += 1;
        metrics::counter!("agentbus_agent_restarts_total").increment(1);

        match spawn_agent(agent_id, &agent.entry_point) {
            Ok(child) => {
                agent.pid = child.id();
                agent.child = child;
                agent.start_time = Instant::now();
                agent.last_heartbeat = Utc::now();
                info!(
                    agent_id,
                    pid = agent.pid,
                    restart_count = agent.restart_count,
                    "Agent restarted"
                );
                true
            }
            Err(e) => {
                error!(agent_id, "Failed to respawn agent: {}", e);
                false
            }
        }
    }

    /// 探测全部代理，退出的逐个尝试重启；返回各代理的重启结果
    async fn check_agents(&self) -> HashMap<String, bool> {
        let dead: Vec<String> = {
            let mut agents = self.agents.lock().await;
            agents
                .iter_mut()
                .filter_map(|(agent_id, agent)| {
                    (!agent.probe(agent_id)).then(|| agent_id.clone())
                })
                .collect()
        };

        let mut outcomes = HashMap::with_capacity(dead.len());
        for agent_id in dead {
            warn!(
                agent_id = %agent_id,
                "{}",
                AgentBusError::ProcessDeath(format!("agent {agent_id}"))
            );
            let restarted = self.attempt_restart(&agent_id).await;
            outcomes.insert(agent_id, restarted);
        }
        outcomes
    }

    async fn monitor_loop(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let period = self.config.health_check_interval();
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Agent health monitoring started, interval {:?}", period);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Agent health monitoring stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.check_agents().await;
                }
            }
        }
    }
}

struct Monitor {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct ProcessAgentSupervisor {
    inner: Arc<SupervisorInner>,
    monitor: Mutex<Option<Monitor>>,
}

impl ProcessAgentSupervisor {
    /// 创建监督者；配置无效时返回 [`AgentBusError::Configuration`]
    pub fn new(config: SupervisorConfig) -> AgentBusResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(SupervisorInner {
                config,
                agents: Mutex::new(HashMap::new()),
            }),
            monitor: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    /// 启动代理进程；同一ID的代理仍在运行时不做任何事并返回 `true`
    pub async fn launch(&self, agent_type: &str, agent_id: &str, entry_point: EntryPoint) -> bool {
        if !self.inner.config.enabled {
            warn!(agent_id, "Process agent support is disabled");
            return false;
        }

        let mut agents = self.inner.agents.lock().await;
        if let Some(existing) = agents.get_mut(agent_id) {
            if existing.probe(agent_id) {
                debug!(agent_id, "Agent already running");
                return true;
            }
        }

        match spawn_agent(agent_id, &entry_point) {
            Ok(child) => {
                let pid = child.id();
                agents.insert(
                    agent_id.to_string(),
                    AgentProcess {
                        agent_type: agent_type.to_string(),
                        child,
                        pid,
                        start_time: Instant::now(),
                        last_heartbeat: Utc::now(),
                        restart_count: 0,
                        entry_point,
                    },
                );
                info!(agent_id, agent_type, pid, "Agent launched");
                true
            }
            Err(e) => {
                error!(agent_id, program = %entry_point.program, "Failed to launch agent: {}", e);
                false
            }
        }
    }

    /// 按原入口重启代理；重启次数达到上限时移除记录并返回 `false`
    pub async fn attempt_restart(&self, agent_id: &str) -> bool {
        self.inner.attempt_restart(agent_id).await
    }

    /// 执行一轮健康检查
    pub async fn check_agents(&self) -> HashMap<String, bool> {
        self.inner.check_agents().await
    }

    pub async fn start_monitoring(&self) -> bool {
        let mut monitor = self.monitor.lock().await;
        if monitor.is_some() {
            return false;
        }
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(Arc::clone(&self.inner).monitor_loop(shutdown_rx));
        *monitor = Some(Monitor {
            shutdown_tx,
            handle,
        });
        true
    }

    /// 停止健康检查并等待后台任务退出
    pub async fn stop_monitoring(&self) {
        let Some(monitor) = self.monitor.lock().await.take() else {
            return;
        };
        let _ = monitor.shutdown_tx.send(());
        if let Err(e) = monitor.handle.await {
            error!("Health monitor terminated abnormally: {}", e);
        }
    }

    pub async fn is_monitoring(&self) -> bool {
        self.monitor.lock().await.is_some()
    }

    pub async fn shutdown_agent(&self, agent_id: &str) -> bool {
        let Some(mut agent) = self.inner.agents.lock().await.remove(agent_id) else {
            return false;
        };
        terminate(agent_id, &mut agent.child, self.inner.config.shutdown_timeout()).await;
        true
    }

    /// 停止监控并终止全部代理
    pub async fn shutdown_all(&self) {
        self.stop_monitoring().await;

        let agents: Vec<(String, AgentProcess)> =
            self.inner.agents.lock().await.drain().collect();
        info!("Shutting down {} agents", agents.len());

        let timeout = self.inner.config.shutdown_timeout();
        let shutdowns = agents.into_iter().map(|(agent_id, mut agent)| async move {
            terminate(&agent_id, &mut agent.child, timeout).await;
        });
        futures::future::join_all(shutdowns).await;
    }

    pub async fn get_status(&self, agent_id: &str) -> Option<AgentStatus> {
        let mut agents = self.inner.agents.lock().await;
        let agent = agents.get_mut(agent_id)?;
        let is_alive = agent.probe(agent_id);
        Some(AgentStatus {
            agent_id: agent_id.to_string(),
            agent_type: agent.agent_type.clone(),
            pid: agent.pid,
            is_alive,
            uptime: agent.start_time.elapsed(),
            last_heartbeat: agent.last_heartbeat,
            restart_count: agent.restart_count,
        })
    }

    pub async fn is_alive(&self, agent_id: &str) -> bool {
        let mut agents = self.inner.agents.lock().await;
        agents
            .get_mut(agent_id)
            .is_some_and(|agent| agent.probe(agent_id))
    }

    pub async fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.agents.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
