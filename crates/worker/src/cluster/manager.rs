use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agentbus_core::{
    AgentBusError, AgentBusResult, ClusterConfig, ClusterTask, TaskExecutor, TaskResult,
    WorkerInfo, WorkerStatus,
};
use agentbus_infrastructure::IpcQueue;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::handlers::HandlerTable;
use super::worker::{run_worker, ControlMessage, WorkerContext, WorkerInfoMap};

struct WorkerHandle {
    worker_id: u32,
    handle: JoinHandle<()>,
}

/// 集群状态快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub total_workers: usize,
    pub alive_workers: usize,
    pub total_submitted: u64,
    pub total_completed: u64,
    pub pending_tasks: usize,
    pub pending_results: usize,
    pub is_shutdown: bool,
}

/// 单机主从任务分发
///
/// 主控方持有任务/结果/控制三条队列，`start` 拉起 `max_workers` 个Worker，
/// 每个Worker从任务队列竞争取任务并把结果放回结果队列。Worker退出后不会
/// 被自动拉起，执行中途退出的任务会丢失。
pub struct ClusterManager {
    config: ClusterConfig,
    max_workers: usize,
    executor: Option<Arc<dyn TaskExecutor>>,
    handlers: Arc<HandlerTable>,
    task_queue: IpcQueue<ClusterTask>,
    result_queue: IpcQueue<TaskResult>,
    control_queue: IpcQueue<ControlMessage>,
    shutdown: Arc<AtomicBool>,
    workers: Mutex<Vec<WorkerHandle>>,
    infos: WorkerInfoMap,
    submitted_ids: Mutex<HashSet<String>>,
    total_submitted: AtomicU64,
    total_completed: AtomicU64,
}

impl ClusterManager {
    pub fn new(config: ClusterConfig) -> Self {
        let max_workers = config.effective_max_workers();
        let queue_capacity = config.queue_capacity;
        Self {
            config,
            max_workers,
            executor: None,
            handlers: Arc::new(HandlerTable::default()),
            task_queue: IpcQueue::bounded(queue_capacity),
            result_queue: IpcQueue::bounded(queue_capacity),
            control_queue: IpcQueue::bounded(max_workers),
            shutdown: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
            infos: Arc::new(RwLock::new(HashMap::new())),
            submitted_ids: Mutex::new(HashSet::new()),
            total_submitted: AtomicU64::new(0),
            total_completed: AtomicU64::new(0),
        }
    }

    /// 注入自定义执行器，优先于内置处理器
    pub fn with_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_handlers(mut self, handlers: HandlerTable) -> Self {
        self.handlers = Arc::new(handlers);
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub async fn start(&self) -> AgentBusResult<()> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(AgentBusError::Internal("集群已关闭，不能再次启动".to_string()));
        }
        let mut workers = self.workers.lock().await;
        if !workers.is_empty() {
            return Err(AgentBusError::Internal("集群已经启动".to_string()));
        }

        info!("Starting cluster with {} workers", self.max_workers);
        for worker_id in 0..self.max_workers as u32 {
            self.infos
                .write()
                .await
                .insert(worker_id, WorkerInfo::starting(worker_id));

            let ctx = WorkerContext {
                worker_id,
                task_queue: self.task_queue.clone(),
                result_queue: self.result_queue.clone(),
                control_queue: self.control_queue.clone(),
                shutdown: Arc::clone(&self.shutdown),
                executor: self.executor.clone(),
                handlers: Arc::clone(&self.handlers),
                infos: Arc::clone(&self.infos),
                poll_timeout: self.config.task_poll_timeout(),
            };
            workers.push(WorkerHandle {
                worker_id,
                handle: tokio::spawn(run_worker(ctx)),
            });
        }
        Ok(())
    }

    /// 提交任务，返回任务ID；同一队列生命周期内任务ID不可重复
    pub async fn submit_task(&self, mut task: ClusterTask) -> AgentBusResult<String> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(AgentBusError::Internal("集群已关闭，拒绝提交任务".to_string()));
        }
        if task.task_id.is_empty() {
            return Err(AgentBusError::Internal("任务ID不能为空".to_string()));
        }
        if !self.submitted_ids.lock().await.insert(task.task_id.clone()) {
            return Err(AgentBusError::DuplicateTask {
                task_id: task.task_id,
            });
        }

        if task.timestamp.is_none() {
            task.timestamp = Some(Utc::now());
        }
        let task_id = task.task_id.clone();
        if let Err(e) = self.task_queue.put(task).await {
            self.submitted_ids.lock().await.remove(&task_id);
            return Err(e);
        }

        self.total_submitted.fetch_add(1, Ordering::SeqCst);
        metrics::counter!("agentbus_cluster_tasks_submitted_total").increment(1);
        debug!(task_id = %task_id, "Task submitted");
        Ok(task_id)
    }

    /// 最多等待 `timeout` 取一个结果
    pub async fn get_result(&self, timeout: Duration) -> Option<TaskResult> {
        let result = self.result_queue.get_timeout(timeout).await?;
        self.total_completed.fetch_add(1, Ordering::SeqCst);
        metrics::counter!("agentbus_cluster_tasks_completed_total").increment(1);
        Some(result)
    }

    /// 停止所有Worker
    ///
    /// 设置关闭标志并为每个Worker放入一条关闭指令，逐个等待 `join_timeout`，
    /// 超时的Worker被强制终止，其正在运行的执行器任务一并中止。
    pub async fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down cluster");

        let workers: Vec<WorkerHandle> = self.workers.lock().await.drain(..).collect();
        for _ in 0..workers.len() {
            if let Err(e) = self.control_queue.try_put(ControlMessage::Shutdown) {
                warn!("Failed to enqueue shutdown command: {}", e);
            }
        }

        let join_timeout = self.config.join_timeout();
        for WorkerHandle {
            worker_id,
            mut handle,
        } in workers
        {
            match tokio::time::timeout(join_timeout, &mut handle).await {
                Ok(Ok(())) => debug!(worker_id, "Worker joined"),
                Ok(Err(e)) => warn!(worker_id, "Worker terminated abnormally: {}", e),
                Err(_) => {
                    warn!(worker_id, "Worker did not stop within {:?}, terminating", join_timeout);
                    // 中止后不再等待：卡在同步代码里的执行器不会让出
                    handle.abort();
                }
            }
            self.mark_status(worker_id, WorkerStatus::Dead).await;
        }

        self.control_queue.drain();
        info!("Cluster shut down");
    }

    async fn mark_status(&self, worker_id: u32, status: WorkerStatus) {
        if let Some(info) = self.infos.write().await.get_mut(&worker_id) {
            info.status = status;
        }
    }

    /// 探测Worker存活状态，已退出的标记为 `Dead`，返回存活数量
    pub async fn check_workers(&self) -> usize {
        let workers = self.workers.lock().await;
        let mut alive = 0;
        for worker in workers.iter() {
            if worker.handle.is_finished() {
                let mut infos = self.infos.write().await;
                if let Some(info) = infos.get_mut(&worker.worker_id) {
                    if info.status != WorkerStatus::Dead {
                        warn!(
                            worker_id = worker.worker_id,
                            "{}",
                            AgentBusError::ProcessDeath(format!("worker {}", worker.worker_id))
                        );
                        info.status = WorkerStatus::Dead;
                    }
                }
            } else {
                alive += 1;
            }
        }
        alive
    }

    pub async fn worker_infos(&self) -> Vec<WorkerInfo> {
        let mut infos: Vec<WorkerInfo> = self.infos.read().await.values().cloned().collect();
        infos.sort_by_key(|info| info.worker_id);
        infos
    }

    pub async fn get_status(&self) -> ClusterStatus {
        let workers = self.workers.lock().await;
        ClusterStatus {
            total_workers: workers.len(),
            alive_workers: workers.iter().filter(|w| !w.handle.is_finished()).count(),
            total_submitted: self.total_submitted.load(Ordering::SeqCst),
            total_completed: self.total_completed.load(Ordering::SeqCst),
            pending_tasks: self.task_queue.len(),
            pending_results: self.result_queue.len(),
            is_shutdown: self.shutdown.load(Ordering::SeqCst),
        }
    }
}
