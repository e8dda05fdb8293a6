//! 任务执行器接口定义
//!
//! 集群Worker按以下优先级选择执行方式：
//! 1. 注入的自定义执行器
//! 2. 按 `task_type` 注册的内置处理器（`agent_execute`、`training`、`inference`）
//! 3. 默认的模拟执行器
//!
//! 执行器返回的 `Err` 或发生的panic都会被转换为
//! `{"status": "error", "error": ...}` 结果，Worker本身继续运行。

use async_trait::async_trait;
use serde_json::Value;

use crate::models::ClusterTask;

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// 执行任务，返回结果对象
    async fn execute(&self, task: &ClusterTask) -> anyhow::Result<Value>;

    fn name(&self) -> &str;

    /// 是否处理该类型的任务
    fn supports_task_type(&self, _task_type: &str) -> bool {
        true
    }
}
