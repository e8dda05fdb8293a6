//! 日志初始化
//!
//! `RUST_LOG` 环境变量优先于配置中的日志级别。

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::{AgentBusError, AgentBusResult};

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(format: &str) -> AgentBusResult<Self> {
        match format {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(AgentBusError::configuration(format!(
                "不支持的日志格式: {format}"
            ))),
        }
    }
}

/// 初始化全局tracing订阅器
pub fn init_logging(level: &str, format: &str) -> AgentBusResult<()> {
    let format = LogFormat::parse(format)?;
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| AgentBusError::configuration(format!("初始化JSON日志格式失败: {e}"))),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .map_err(|e| AgentBusError::configuration(format!("初始化Pretty日志格式失败: {e}"))),
    }
}

pub fn init_logging_from_config(config: &LoggingConfig) -> AgentBusResult<()> {
    init_logging(&config.level, &config.format)
}
