use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Worker状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Starting,
    Idle,
    Busy,
    Dead,
}

/// Worker信息快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub worker_id: u32,
    pub status: WorkerStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub tasks_processed: u64,
}

impl WorkerInfo {
    pub fn starting(worker_id: u32) -> Self {
        Self {
            worker_id,
            status: WorkerStatus::Starting,
            last_heartbeat: Utc::now(),
            tasks_processed: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.status != WorkerStatus::Dead
    }
}
