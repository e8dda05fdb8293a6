//! # agentbus-core
//!
//! 智能体消息总线的核心定义：错误类型、数据模型、主题匹配、
//! 传输层/代理客户端/任务执行器接口以及配置与日志初始化。

pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod topic;
pub mod traits;

pub use config::{
    AppConfig, ClusterConfig, LoggingConfig, SupervisorConfig, TransportConfig, TransportMode,
};
pub use errors::*;
pub use models::{
    AgentStatus, BrokerMessage, ClusterTask, EntryPoint, Qos, Subscription, SubscriptionInfo,
    SubscriptionStatus, TaskResult, TransferMessage, WorkerInfo, WorkerStatus,
};
pub use topic::topic_matches;
pub use traits::{
    BrokerClient, MessageCallback, MessageContext, TaskExecutor, Transport,
};
