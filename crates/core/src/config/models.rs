use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::validation::{ConfigValidator, ValidationUtils};
use crate::models::Qos;
use crate::{AgentBusError, AgentBusResult};

/// 传输层模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    #[default]
    LocalIpc,
    MqttBroker,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::LocalIpc => "local_ipc",
            TransportMode::MqttBroker => "mqtt_broker",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportMode {
    type Err = AgentBusError;

    fn from_str(s: &str) -> AgentBusResult<Self> {
        match s.to_lowercase().as_str() {
            "local_ipc" => Ok(TransportMode::LocalIpc),
            "mqtt_broker" => Ok(TransportMode::MqttBroker),
            _ => Err(AgentBusError::configuration(format!(
                "不支持的传输模式: {s}，支持的模式: local_ipc, mqtt_broker"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub mode: TransportMode,
    /// 首次订阅时底层订阅的尝试次数
    pub subscribe_retry_count: u32,
    /// 订阅重试基础间隔，第n次失败后等待 `base * n`
    pub subscribe_retry_base_ms: u64,
    pub ipc_queue_capacity: usize,
    pub ipc_poll_timeout_ms: u64,
    pub publish_timeout_ms: u64,
    pub default_qos: Qos,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::LocalIpc,
            subscribe_retry_count: 3,
            subscribe_retry_base_ms: 1000,
            ipc_queue_capacity: 1024,
            ipc_poll_timeout_ms: 500,
            publish_timeout_ms: 5000,
            default_qos: Qos::AtMostOnce,
        }
    }
}

impl TransportConfig {
    pub fn subscribe_retry_base(&self) -> Duration {
        Duration::from_millis(self.subscribe_retry_base_ms)
    }

    pub fn ipc_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.ipc_poll_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

impl ConfigValidator for TransportConfig {
    fn validate(&self) -> AgentBusResult<()> {
        ValidationUtils::validate_positive(self.subscribe_retry_count as u64, "transport.subscribe_retry_count")?;
        ValidationUtils::validate_positive(self.ipc_queue_capacity as u64, "transport.ipc_queue_capacity")?;
        ValidationUtils::validate_positive(self.ipc_poll_timeout_ms, "transport.ipc_poll_timeout_ms")?;
        ValidationUtils::validate_positive(self.publish_timeout_ms, "transport.publish_timeout_ms")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// 未设置时按CPU数推导，见 [`ClusterConfig::effective_max_workers`]
    pub max_workers: Option<usize>,
    pub task_poll_timeout_ms: u64,
    pub join_timeout_ms: u64,
    pub queue_capacity: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            max_workers: None,
            task_poll_timeout_ms: 1000,
            join_timeout_ms: 5000,
            queue_capacity: 1024,
        }
    }
}

impl ClusterConfig {
    pub fn with_workers(max_workers: usize) -> Self {
        Self {
            max_workers: Some(max_workers),
            ..Self::default()
        }
    }

    /// `max(2, min(cpu_count - 1, 4))`
    pub fn default_worker_count() -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        cpus.saturating_sub(1).min(4).max(2)
    }

    pub fn effective_max_workers(&self) -> usize {
        self.max_workers.unwrap_or_else(Self::default_worker_count)
    }

    pub fn task_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.task_poll_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

impl ConfigValidator for ClusterConfig {
    fn validate(&self) -> AgentBusResult<()> {
        if let Some(workers) = self.max_workers {
            ValidationUtils::validate_positive(workers as u64, "cluster.max_workers")?;
        }
        ValidationUtils::validate_positive(self.task_poll_timeout_ms, "cluster.task_poll_timeout_ms")?;
        ValidationUtils::validate_positive(self.queue_capacity as u64, "cluster.queue_capacity")?;
        Ok(())
    }
}

/// 健康检查间隔上限（一天）
pub const MAX_HEALTH_CHECK_INTERVAL_SECS: f64 = 86_400.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// 是否启用进程代理支持
    pub enabled: bool,
    pub health_check_interval_secs: f64,
    pub max_restart_attempts: u32,
    pub shutdown_timeout_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            health_check_interval_secs: 10.0,
            max_restart_attempts: 3,
            shutdown_timeout_ms: 5000,
        }
    }
}

impl SupervisorConfig {
    /// 未经校验的非法值按默认的10秒处理
    pub fn health_check_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.health_check_interval_secs)
            .ok()
            .filter(|interval| !interval.is_zero())
            .unwrap_or(Duration::from_secs(10))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl ConfigValidator for SupervisorConfig {
    fn validate(&self) -> AgentBusResult<()> {
        let interval = self.health_check_interval_secs;
        if !interval.is_finite() || interval <= 0.0 || interval > MAX_HEALTH_CHECK_INTERVAL_SECS {
            return Err(AgentBusError::configuration(format!(
                "supervisor.health_check_interval_secs must be in (0, {MAX_HEALTH_CHECK_INTERVAL_SECS}], got {interval}"
            )));
        }
        ValidationUtils::validate_positive(self.shutdown_timeout_ms, "supervisor.shutdown_timeout_ms")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl ConfigValidator for LoggingConfig {
    fn validate(&self) -> AgentBusResult<()> {
        ValidationUtils::validate_one_of(
            &self.level,
            &["trace", "debug", "info", "warn", "error"],
            "logging.level",
        )?;
        ValidationUtils::validate_one_of(&self.format, &["pretty", "json"], "logging.format")
    }
}
