use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agentbus_core::traits::panic_message;
use agentbus_core::{AgentBusError, ClusterTask, TaskExecutor, TaskResult, WorkerInfo, WorkerStatus};
use agentbus_infrastructure::IpcQueue;
use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::handlers::HandlerTable;

/// 控制队列中的指令
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlMessage {
    Shutdown,
}

pub(crate) type WorkerInfoMap = Arc<RwLock<HashMap<u32, WorkerInfo>>>;

/// 单个Worker运行所需的共享资源
pub(crate) struct WorkerContext {
    pub worker_id: u32,
    pub task_queue: IpcQueue<ClusterTask>,
    pub result_queue: IpcQueue<TaskResult>,
    pub control_queue: IpcQueue<ControlMessage>,
    pub shutdown: Arc<AtomicBool>,
    pub executor: Option<Arc<dyn TaskExecutor>>,
    pub handlers: Arc<HandlerTable>,
    pub infos: WorkerInfoMap,
    pub poll_timeout: Duration,
}

impl WorkerContext {
    async fn update_info(&self, status: WorkerStatus, finished_task: bool) {
        let mut infos = self.infos.write().await;
        if let Some(info) = infos.get_mut(&self.worker_id) {
            info.status = status;
            info.last_heartbeat = Utc::now();
            if finished_task {
                info.tasks_processed += 1;
            }
        }
    }

    async fn heartbeat(&self) {
        let mut infos = self.infos.write().await;
        if let Some(info) = infos.get_mut(&self.worker_id) {
            info.last_heartbeat = Utc::now();
        }
    }
}

/// Worker主循环：检查控制指令，限时取任务，执行并回传结果
pub(crate) async fn run_worker(ctx: WorkerContext) {
    let worker_id = ctx.worker_id;
    info!(worker_id, "Worker started");
    ctx.update_info(WorkerStatus::Idle, false).await;

    loop {
        if let Some(ControlMessage::Shutdown) = ctx.control_queue.try_get() {
            info!(worker_id, "Worker received shutdown command");
            break;
        }
        if ctx.shutdown.load(Ordering::SeqCst) {
            debug!(worker_id, "Shutdown flag set, worker exiting");
            break;
        }

        let Some(task) = ctx.task_queue.get_timeout(ctx.poll_timeout).await else {
            ctx.heartbeat().await;
            continue;
        };

        ctx.update_info(WorkerStatus::Busy, false).await;
        let result = execute_task(&ctx, &task).await;
        if let Err(e) = ctx.result_queue.put(result).await {
            error!(worker_id, task_id = %task.task_id, "Failed to return task result: {}", e);
            break;
        }
        ctx.update_info(WorkerStatus::Idle, true).await;
    }

    info!(worker_id, "Worker stopped");
}

/// 持有执行器任务的句柄，被丢弃时终止该任务
///
/// Worker被强制终止时，正在运行的执行器随之终止，不会在后台继续占用运行时。
struct ExecutionGuard(JoinHandle<Result<anyhow::Result<Value>, String>>);

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// 执行单个任务；执行器返回错误或panic时生成错误结果，Worker继续运行
///
/// 执行器运行在独立的任务中，Worker只等待其完成，因此关闭时中止Worker
/// 不需要等待执行器让出。
pub(crate) async fn execute_task(ctx: &WorkerContext, task: &ClusterTask) -> TaskResult {
    let executor = ctx.handlers.resolve(ctx.executor.as_ref(), &task.task_type);
    debug!(
        worker_id = ctx.worker_id,
        task_id = %task.task_id,
        task_type = %task.task_type,
        executor = executor.name(),
        "Executing task"
    );

    let owned_task = task.clone();
    let mut guard = ExecutionGuard(tokio::spawn(async move {
        AssertUnwindSafe(executor.execute(&owned_task))
            .catch_unwind()
            .await
            .map_err(|panic| panic_message(panic.as_ref()))
    }));

    let failure = match (&mut guard.0).await {
        Ok(Ok(Ok(value))) => return TaskResult::new(&task.task_id, ctx.worker_id, value),
        Ok(Ok(Err(e))) => format!("{e:#}"),
        Ok(Err(panic)) => format!("执行器发生panic: {panic}"),
        Err(e) => format!("执行器任务异常终止: {e}"),
    };

    warn!(
        worker_id = ctx.worker_id,
        task_id = %task.task_id,
        "{}",
        AgentBusError::WorkerExecution(failure.clone())
    );
    metrics::counter!("agentbus_cluster_task_failures_total").increment(1);
    TaskResult::error(&task.task_id, ctx.worker_id, failure)
}
