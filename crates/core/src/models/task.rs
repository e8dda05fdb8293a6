use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

pub const RESULT_STATUS_SUCCESS: &str = "success";
pub const RESULT_STATUS_ERROR: &str = "error";

/// 集群任务
///
/// 由提交方创建，入队一次，仅被一个Worker消费，创建后不再修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterTask {
    pub task_id: String,
    pub task_type: String,
    pub payload: Value,
    #[serde(default)]
    pub priority: i32,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ClusterTask {
    pub fn new(task_id: impl Into<String>, task_type: impl Into<String>, payload: Value) -> Self {
        Self {
            task_id: task_id.into(),
            task_type: task_type.into(),
            payload,
            priority: 0,
            timestamp: None,
        }
    }

    /// 使用随机生成的任务ID创建任务
    pub fn with_generated_id(task_type: impl Into<String>, payload: Value) -> Self {
        Self::new(Uuid::new_v4().to_string(), task_type, payload)
    }
}

/// 任务执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub worker_id: u32,
    pub result: Value,
    pub timestamp: DateTime<Utc>,
}

impl TaskResult {
    pub fn new(task_id: impl Into<String>, worker_id: u32, result: Value) -> Self {
        Self {
            task_id: task_id.into(),
            worker_id,
            result,
            timestamp: Utc::now(),
        }
    }

    /// 执行失败时的结构化结果: `{"status": "error", "error": ...}`
    pub fn error(task_id: impl Into<String>, worker_id: u32, message: impl Into<String>) -> Self {
        Self::new(
            task_id,
            worker_id,
            json!({ "status": RESULT_STATUS_ERROR, "error": message.into() }),
        )
    }

    pub fn status(&self) -> Option<&str> {
        self.result.get("status").and_then(Value::as_str)
    }

    pub fn is_success(&self) -> bool {
        self.status() == Some(RESULT_STATUS_SUCCESS)
    }
}
