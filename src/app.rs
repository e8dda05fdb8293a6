use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agentbus_core::{AppConfig, ClusterTask, EntryPoint, MessageCallback, TransportMode};
use agentbus_infrastructure::{IpcEndpoint, TransportDeps, TransportFactory};
use agentbus_worker::{ClusterManager, ProcessAgentSupervisor};
use anyhow::{bail, Context, Result};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::shutdown::run_phase;

/// 运行模式
#[derive(Debug, Clone)]
pub enum AppMode {
    /// 提交一批演示任务到本地集群并收集结果
    Cluster { tasks: usize },
    /// 以子进程方式监督若干代理
    Supervise { agents: usize },
    /// 作为被监督的代理进程运行
    Agent { agent_id: String },
    /// 通过传输层收发心跳消息
    PubSub { messages: usize },
}

pub struct Application {
    config: AppConfig,
    mode: AppMode,
}

impl Application {
    pub fn new(config: AppConfig, mode: AppMode) -> Self {
        info!("Initializing application in {:?} mode", mode);
        Self { config, mode }
    }

    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        match &self.mode {
            AppMode::Cluster { tasks } => self.run_cluster(*tasks, shutdown_rx).await,
            AppMode::Supervise { agents } => self.run_supervisor(*agents, shutdown_rx).await,
            AppMode::Agent { agent_id } => run_agent(agent_id, shutdown_rx).await,
            AppMode::PubSub { messages } => self.run_pubsub(*messages, shutdown_rx).await,
        }
    }

    async fn run_cluster(&self, tasks: usize, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let cluster = ClusterManager::new(self.config.cluster.clone());
        cluster.start().await.context("启动集群失败")?;

        for i in 0..tasks {
            let task = match i % 3 {
                0 => ClusterTask::new(format!("t{i}"), "inference", json!({ "model": "m1", "input": i })),
                1 => ClusterTask::new(format!("t{i}"), "training", json!({ "model": "m1", "epochs": 2 })),
                _ => ClusterTask::new(format!("t{i}"), "agent_execute", json!({ "agent": "planner" })),
            };
            cluster.submit_task(task).await.context("提交任务失败")?;
        }

        let mut received = 0;
        while received < tasks {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    warn!("Shutdown requested with {} results outstanding", tasks - received);
                    break;
                }
                result = cluster.get_result(Duration::from_secs(1)) => {
                    if let Some(result) = result {
                        received += 1;
                        info!(
                            task_id = %result.task_id,
                            worker_id = result.worker_id,
                            status = result.status().unwrap_or("unknown"),
                            "Task finished"
                        );
                    }
                }
            }
        }

        let status = cluster.get_status().await;
        info!(
            submitted = status.total_submitted,
            completed = status.total_completed,
            "Cluster run complete"
        );
        run_phase("cluster", self.config.cluster.join_timeout() * 2, cluster.shutdown()).await;
        Ok(())
    }

    async fn run_supervisor(&self, agents: usize, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        if !self.config.supervisor.enabled {
            bail!("进程代理支持已禁用，请检查 supervisor.enabled 配置");
        }

        let exe = std::env::current_exe().context("无法定位当前可执行文件")?;
        let entry_point = EntryPoint::new(exe.to_string_lossy()).args(["agent", "--agent-id"]);
        let supervisor = ProcessAgentSupervisor::new(self.config.supervisor.clone())
            .context("监督者配置无效")?;

        for i in 0..agents {
            let agent_id = format!("agent-{i}");
            if !supervisor.launch("demo", &agent_id, entry_point.clone()).await {
                error!(agent_id = %agent_id, "Failed to launch agent");
            }
        }
        supervisor.start_monitoring().await;

        let _ = shutdown_rx.recv().await;
        for agent_id in supervisor.agent_ids().await {
            if let Some(status) = supervisor.get_status(&agent_id).await {
                info!(
                    agent_id = %agent_id,
                    restarts = status.restart_count,
                    uptime = ?status.uptime,
                    "Agent status before shutdown"
                );
            }
        }
        supervisor.shutdown_all().await;
        Ok(())
    }

    async fn run_pubsub(&self, messages: usize, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        if self.config.transport.mode != TransportMode::LocalIpc {
            bail!("演示模式只支持 local_ipc 传输层，MQTT模式需要由嵌入方注入代理客户端");
        }

        let (publisher_end, subscriber_end) = IpcEndpoint::pair(self.config.transport.ipc_queue_capacity);
        let publisher =
            TransportFactory::create(&self.config.transport, TransportDeps::with_ipc(publisher_end))?;
        let subscriber =
            TransportFactory::create(&self.config.transport, TransportDeps::with_ipc(subscriber_end))?;

        let received = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&received);
        subscriber
            .subscribe(
                "agents/+/heartbeat",
                MessageCallback::sync(move |ctx| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    info!(topic = %ctx.topic, payload = %ctx.payload, "Heartbeat received");
                    Ok(())
                }),
            )
            .await;

        if !(publisher.connect().await && subscriber.connect().await) {
            bail!("传输层连接失败");
        }

        let mut ticker = interval(Duration::from_millis(200));
        let mut sent = 0;
        while sent < messages {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    let topic = format!("agents/agent-{}/heartbeat", sent % 2);
                    if publisher.publish(&topic, &json!({ "seq": sent })).await {
                        sent += 1;
                    }
                }
            }
        }

        run_phase("drain", Duration::from_secs(2), async {
            while received.load(Ordering::Relaxed) < sent as u64 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;

        publisher.disconnect().await;
        subscriber.disconnect().await;
        info!(
            sent,
            received = received.load(Ordering::Relaxed),
            "Pub/sub run complete"
        );
        Ok(())
    }
}

/// 演示代理：定期打印心跳，直到收到关闭信号
async fn run_agent(agent_id: &str, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
    info!(agent_id, pid = std::process::id(), "Agent process started");
    let mut heartbeat = interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = heartbeat.tick() => info!(agent_id, "Agent heartbeat"),
        }
    }
    info!(agent_id, "Agent process exiting");
    Ok(())
}
