//! # agentbus-worker
//!
//! 集群任务分发（[`ClusterManager`]）与进程代理监督（[`ProcessAgentSupervisor`]）。
//! 两者互不依赖。

pub mod cluster;
pub mod supervisor;

pub use cluster::{ClusterManager, ClusterStatus, HandlerTable};
pub use supervisor::ProcessAgentSupervisor;
