use thiserror::Error;

/// 控制平面错误类型定义
#[derive(Debug, Error)]
pub enum AgentBusError {
    #[error("传输层错误: {0}")]
    Transport(String),

    #[error("传输层未连接")]
    NotConnected,

    #[error("消息投递错误: {0}")]
    Delivery(String),

    #[error("任务执行错误: {0}")]
    WorkerExecution(String),

    #[error("任务ID重复: {task_id}")]
    DuplicateTask { task_id: String },

    #[error("进程已退出: {0}")]
    ProcessDeath(String),

    #[error("代理 {agent_id} 重启次数已耗尽 ({attempts} 次)")]
    RestartBudgetExhausted { agent_id: String, attempts: u32 },

    #[error("无效的主题: {0}")]
    InvalidTopic(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl AgentBusError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// 是否属于可在本地恢复的传输层错误
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::NotConnected)
    }
}

impl From<config::ConfigError> for AgentBusError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// 统一的Result类型
pub type AgentBusResult<T> = std::result::Result<T, AgentBusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentBusError::RestartBudgetExhausted {
            agent_id: "agent-1".to_string(),
            attempts: 3,
        };
        assert_eq!(err.to_string(), "代理 agent-1 重启次数已耗尽 (3 次)");
        assert!(AgentBusError::NotConnected.is_transport());
        assert!(!AgentBusError::configuration("bad").is_transport());
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: AgentBusError = parse.unwrap_err().into();
        assert!(matches!(err, AgentBusError::Serialization(_)));
    }
}
