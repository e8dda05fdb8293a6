//! 内置任务处理器
//!
//! 没有注入自定义执行器（或自定义执行器不支持该任务类型）时，Worker按
//! `task_type` 在 [`HandlerTable`] 中查找处理器，找不到则交给 [`SimulatorExecutor`]。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agentbus_core::models::RESULT_STATUS_SUCCESS;
use agentbus_core::{ClusterTask, TaskExecutor};
use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::debug;

pub const TASK_TYPE_AGENT_EXECUTE: &str = "agent_execute";
pub const TASK_TYPE_TRAINING: &str = "training";
pub const TASK_TYPE_INFERENCE: &str = "inference";

fn payload_str<'a>(task: &'a ClusterTask, key: &str) -> Option<&'a str> {
    task.payload.get(key).and_then(Value::as_str)
}

/// 执行代理动作：`{"agent": ..., "action": ..., "params": {...}}`
pub struct AgentExecuteHandler;

#[async_trait]
impl TaskExecutor for AgentExecuteHandler {
    async fn execute(&self, task: &ClusterTask) -> anyhow::Result<Value> {
        let agent = payload_str(task, "agent").context("agent_execute任务缺少agent字段")?;
        let action = payload_str(task, "action").unwrap_or("run");
        let params = task.payload.get("params").cloned().unwrap_or(Value::Null);
        debug!(task_id = %task.task_id, agent, action, "Executing agent action");

        Ok(json!({
            "status": RESULT_STATUS_SUCCESS,
            "agent": agent,
            "action": action,
            "params": params,
        }))
    }

    fn name(&self) -> &str {
        TASK_TYPE_AGENT_EXECUTE
    }

    fn supports_task_type(&self, task_type: &str) -> bool {
        task_type == TASK_TYPE_AGENT_EXECUTE
    }
}

/// 模拟训练：`{"model": ..., "epochs": n}`，每个epoch损失减半
pub struct TrainingHandler {
    epoch_delay: Duration,
}

impl TrainingHandler {
    pub fn new(epoch_delay: Duration) -> Self {
        Self { epoch_delay }
    }
}

impl Default for TrainingHandler {
    fn default() -> Self {
        Self::new(Duration::from_millis(10))
    }
}

#[async_trait]
impl TaskExecutor for TrainingHandler {
    async fn execute(&self, task: &ClusterTask) -> anyhow::Result<Value> {
        let model = payload_str(task, "model").context("training任务缺少model字段")?;
        let epochs = match task.payload.get("epochs") {
            None => 1,
            Some(v) => v.as_u64().context("epochs必须是非负整数")?,
        };
        if epochs == 0 {
            bail!("epochs必须大于0");
        }

        let mut loss = 1.0_f64;
        let mut history = Vec::with_capacity(epochs as usize);
        for epoch in 1..=epochs {
            sleep(self.epoch_delay).await;
            loss /= 2.0;
            history.push(json!({ "epoch": epoch, "loss": loss }));
        }

        Ok(json!({
            "status": RESULT_STATUS_SUCCESS,
            "model": model,
            "epochs": epochs,
            "final_loss": loss,
            "history": history,
        }))
    }

    fn name(&self) -> &str {
        TASK_TYPE_TRAINING
    }

    fn supports_task_type(&self, task_type: &str) -> bool {
        task_type == TASK_TYPE_TRAINING
    }
}

/// 模拟推理：`{"model": ..., "input": ...}`
pub struct InferenceHandler;

#[async_trait]
impl TaskExecutor for InferenceHandler {
    async fn execute(&self, task: &ClusterTask) -> anyhow::Result<Value> {
        let model = payload_str(task, "model").context("inference任务缺少model字段")?;
        let input = task.payload.get("input").cloned().unwrap_or(Value::Null);

        Ok(json!({
            "status": RESULT_STATUS_SUCCESS,
            "model": model,
            "input": input,
            "output": format!("{model}:{}", task.task_id),
        }))
    }

    fn name(&self) -> &str {
        TASK_TYPE_INFERENCE
    }

    fn supports_task_type(&self, task_type: &str) -> bool {
        task_type == TASK_TYPE_INFERENCE
    }
}

/// 兜底执行器，任何任务类型都直接返回成功
pub struct SimulatorExecutor {
    delay: Duration,
}

impl SimulatorExecutor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatorExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(10))
    }
}

#[async_trait]
impl TaskExecutor for SimulatorExecutor {
    async fn execute(&self, task: &ClusterTask) -> anyhow::Result<Value> {
        sleep(self.delay).await;
        Ok(json!({
            "status": RESULT_STATUS_SUCCESS,
            "task_type": task.task_type,
            "simulated": true,
        }))
    }

    fn name(&self) -> &str {
        "simulator"
    }
}

/// 按任务类型索引的处理器表
#[derive(Clone)]
pub struct HandlerTable {
    handlers: HashMap<String, Arc<dyn TaskExecutor>>,
    fallback: Arc<dyn TaskExecutor>,
}

impl HandlerTable {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(SimulatorExecutor::default()),
        }
    }

    pub fn register(&mut self, task_type: impl Into<String>, handler: Arc<dyn TaskExecutor>) {
        self.handlers.insert(task_type.into(), handler);
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn TaskExecutor>) -> Self {
        self.fallback = fallback;
        self
    }

    /// 选择执行器：先是 `custom`，再是内置处理器，最后是兜底执行器
    pub fn resolve(
        &self,
        custom: Option<&Arc<dyn TaskExecutor>>,
        task_type: &str,
    ) -> Arc<dyn TaskExecutor> {
        if let Some(custom) = custom.filter(|e| e.supports_task_type(task_type)) {
            return Arc::clone(custom);
        }
        self.handlers
            .get(task_type)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.register(TASK_TYPE_AGENT_EXECUTE, Arc::new(AgentExecuteHandler));
        table.register(TASK_TYPE_TRAINING, Arc::new(TrainingHandler::default()));
        table.register(TASK_TYPE_INFERENCE, Arc::new(InferenceHandler));
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OnlyReports;

    #[async_trait]
    impl TaskExecutor for OnlyReports {
        async fn execute(&self, _task: &ClusterTask) -> anyhow::Result<Value> {
            Ok(json!({"status": "success", "custom": true}))
        }

        fn name(&self) -> &str {
            "reports"
        }

        fn supports_task_type(&self, task_type: &str) -> bool {
            task_type == "report"
        }
    }

    #[test]
    fn test_resolve_priority() {
        let table = HandlerTable::default();
        let custom: Arc<dyn TaskExecutor> = Arc::new(OnlyReports);

        assert_eq!(table.resolve(Some(&custom), "report").name(), "reports");
        assert_eq!(table.resolve(Some(&custom), "training").name(), "training");
        assert_eq!(table.resolve(None, "inference").name(), "inference");
        assert_eq!(table.resolve(None, "unknown").name(), "simulator");
        assert_eq!(
            table.task_types(),
            vec!["agent_execute", "inference", "training"]
        );
    }

    #[tokio::test]
    async fn test_training_reports_loss_history() {
        let handler = TrainingHandler::new(Duration::ZERO);
        let task = ClusterTask::new("t2", "training", json!({"model": "m1", "epochs": 2}));
        let result = handler.execute(&task).await.unwrap();
        assert_eq!(result["status"], "success");
        assert_eq!(result["final_loss"], 0.25);
        assert_eq!(result["history"].as_array().unwrap().len(), 2);

        let bad = ClusterTask::new("t3", "training", json!({"model": "m1", "epochs": 0}));
        assert!(handler.execute(&bad).await.is_err());
    }

    #[tokio::test]
    async fn test_handlers_require_fields() {
        let missing = ClusterTask::new("t", "inference", json!({}));
        assert!(InferenceHandler.execute(&missing).await.is_err());
        assert!(AgentExecuteHandler.execute(&missing).await.is_err());

        let ok = ClusterTask::new("t", "agent_execute", json!({"agent": "planner"}));
        let result = AgentExecuteHandler.execute(&ok).await.unwrap();
        assert_eq!(result["action"], "run");
    }
}
