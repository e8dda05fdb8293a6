//! 单机主从任务分发
//!
//! Worker以tokio任务运行，彼此之间只通过有界队列通信。

pub mod handlers;
pub mod manager;
mod worker;

pub use handlers::{
    AgentExecuteHandler, HandlerTable, InferenceHandler, SimulatorExecutor, TrainingHandler,
};
pub use manager::{ClusterManager, ClusterStatus};
pub use worker::ControlMessage;
