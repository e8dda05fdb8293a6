//! # 数据模型
//!
//! 控制平面的核心数据结构：传输层消息、订阅记录、集群任务与结果、
//! Worker信息以及进程代理信息。
//!
//! ## 生命周期
//!
//! ### Subscription
//! 由订阅注册表独占，`subscribe` 时创建，收到消息或回调出错时更新，
//! `unsubscribe` 时移除。
//!
//! ```text
//! Pending → Active → Unsubscribed
//!    ↓
//!  Failed
//! ```
//!
//! ### WorkerInfo
//! ```text
//! Starting → Idle ⇄ Busy → Dead
//! ```
//!
//! ### ClusterTask / TaskResult
//! 任务创建后只入队一次，由唯一的Worker消费，之后不再修改；每个任务产生一个结果。
//! Worker在执行中途退出时任务会丢失，不会自动重新提交。

pub mod agent;
pub mod message;
pub mod subscription;
pub mod task;
pub mod worker;

pub use agent::*;
pub use message::*;
pub use subscription::*;
pub use task::*;
pub use worker::*;
