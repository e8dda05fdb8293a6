//! 本地IPC队列
//!
//! `IpcQueue` 是有界的多生产者/多消费者队列：发送端可克隆，接收端由
//! `Arc<Mutex<..>>` 包装以支持多个消费者竞争取出。队列同时持有两端，
//! 因此只要还有一个副本存活就不会被关闭。
//!
//! `StreamBridge` 把一对队列桥接到任意字节流上（子进程stdio、Unix socket等），
//! 每行一个 [`TransferMessage`] JSON。

use std::sync::Arc;
use std::time::Duration;

use agentbus_core::{AgentBusError, AgentBusResult, TransferMessage};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

pub struct IpcQueue<T> {
    sender: mpsc::Sender<T>,
    receiver: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for IpcQueue<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: Arc::clone(&self.receiver),
        }
    }
}

impl<T> IpcQueue<T> {
    /// 当前排队的元素数量
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }
}

impl<T> std::fmt::Debug for IpcQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl<T: Send + 'static> IpcQueue<T> {
    /// 创建有界队列，容量为0时按1处理
    pub fn bounded(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// 入队，队列满时等待
    pub async fn put(&self, item: T) -> AgentBusResult<()> {
        self.sender
            .send(item)
            .await
            .map_err(|_| AgentBusError::transport("IPC队列已关闭"))
    }

    /// 入队，队列满时最多等待 `timeout`
    pub async fn put_timeout(&self, item: T, timeout: Duration) -> AgentBusResult<()> {
        self.sender.send_timeout(item, timeout).await.map_err(|e| match e {
            mpsc::error::SendTimeoutError::Timeout(_) => {
                AgentBusError::transport(format!("IPC队列已满，等待 {timeout:?} 后超时"))
            }
            mpsc::error::SendTimeoutError::Closed(_) => AgentBusError::transport("IPC队列已关闭"),
        })
    }

    /// 非阻塞入队
    pub fn try_put(&self, item: T) -> AgentBusResult<()> {
        self.sender.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => AgentBusError::transport("IPC队列已满"),
            mpsc::error::TrySendError::Closed(_) => AgentBusError::transport("IPC队列已关闭"),
        })
    }

    /// 出队，最多等待 `timeout`（包括等待其他消费者释放接收端的时间）
    pub async fn get_timeout(&self, timeout: Duration) -> Option<T> {
        tokio::time::timeout(timeout, async {
            let mut receiver = self.receiver.lock().await;
            receiver.recv().await
        })
        .await
        .ok()
        .flatten()
    }

    /// 非阻塞出队；接收端被其他消费者占用时返回 `None`
    pub fn try_get(&self) -> Option<T> {
        let mut receiver = self.receiver.try_lock().ok()?;
        receiver.try_recv().ok()
    }

    /// 取出所有已排队的元素
    pub fn drain(&self) -> Vec<T> {
        let mut items = Vec::new();
        while let Some(item) = self.try_get() {
            items.push(item);
        }
        items
    }
}

/// 一个IPC端点：向对端发送的队列与从对端接收的队列
#[derive(Debug, Clone)]
pub struct IpcEndpoint {
    pub send_queue: IpcQueue<TransferMessage>,
    pub recv_queue: IpcQueue<TransferMessage>,
}

impl IpcEndpoint {
    /// 创建一对交叉连接的端点：A发送的消息由B接收，反之亦然
    pub fn pair(capacity: usize) -> (Self, Self) {
        let a_to_b = IpcQueue::bounded(capacity);
        let b_to_a = IpcQueue::bounded(capacity);
        (
            Self {
                send_queue: a_to_b.clone(),
                recv_queue: b_to_a.clone(),
            },
            Self {
                send_queue: b_to_a,
                recv_queue: a_to_b,
            },
        )
    }

    /// 发送与接收共用同一队列的回环端点
    pub fn loopback(capacity: usize) -> Self {
        let queue = IpcQueue::bounded(capacity);
        Self {
            send_queue: queue.clone(),
            recv_queue: queue,
        }
    }
}

/// 字节流桥接：把流上的JSON行搬运到本地队列，反方向同理
pub struct StreamBridge {
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl StreamBridge {
    /// 启动桥接并返回供本地传输层使用的端点
    ///
    /// 从 `reader` 读到的消息进入端点的接收队列；写入端点发送队列的消息
    /// 被编码后写到 `writer`。无法解码的行会被丢弃并记录错误。
    pub fn spawn<R, W>(reader: R, writer: W, capacity: usize) -> (IpcEndpoint, Self)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (local, remote) = IpcEndpoint::pair(capacity);

        let inbound = remote.send_queue.clone();
        let reader_task = tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => match TransferMessage::from_line(&line) {
                        Ok(message) => {
                            if let Err(e) = inbound.put(message).await {
                                error!("Failed to enqueue bridged message: {}", e);
                                break;
                            }
                        }
                        Err(e) => {
                            error!("Dropping undecodable IPC line: {}", e);
                            metrics::counter!("agentbus_ipc_decode_errors_total").increment(1);
                        }
                    },
                    Ok(None) => {
                        debug!("IPC stream reached EOF");
                        break;
                    }
                    Err(e) => {
                        warn!("IPC stream read failed: {}", e);
                        break;
                    }
                }
            }
        });

        let outbound = remote.recv_queue;
        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            loop {
                let message = {
                    let mut receiver = outbound.receiver.lock().await;
                    receiver.recv().await
                };
                let Some(message) = message else { break };

                let line = match message.to_line() {
                    Ok(line) => line,
                    Err(e) => {
                        error!("Failed to encode IPC message for {}: {}", message.topic, e);
                        continue;
                    }
                };
                let write = async {
                    writer.write_all(line.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                    writer.flush().await
                };
                if let Err(e) = write.await {
                    warn!("IPC stream write failed: {}", e);
                    break;
                }
            }
        });

        (
            local,
            Self {
                reader_task,
                writer_task,
            },
        )
    }

    pub fn is_finished(&self) -> bool {
        self.reader_task.is_finished() && self.writer_task.is_finished()
    }

    /// 停止桥接任务并等待其退出
    pub async fn shutdown(self) {
        self.reader_task.abort();
        self.writer_task.abort();
        let _ = self.reader_task.await;
        let _ = self.writer_task.await;
    }
}
