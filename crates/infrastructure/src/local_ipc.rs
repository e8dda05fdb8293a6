use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agentbus_core::topic::{topic_matches, validate_publish_topic, validate_subscription};
use agentbus_core::{
    AgentBusError, MessageCallback, MessageContext, TransferMessage, Transport, TransportConfig,
    TransportMode,
};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ipc::{IpcEndpoint, IpcQueue};
use crate::metrics::{DeliveryMetrics, DeliveryMetricsSnapshot};

type CallbackMap = Arc<RwLock<HashMap<String, Vec<MessageCallback>>>>;

struct Listener {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// 基于本地有界队列的传输层
///
/// 持有发送队列与接收队列。`connect` 启动后台监听任务，以
/// `ipc_poll_timeout` 为周期轮询接收队列，并按主题把消息交给已注册的回调。
pub struct LocalIpcTransport {
    send_queue: IpcQueue<TransferMessage>,
    recv_queue: IpcQueue<TransferMessage>,
    callbacks: CallbackMap,
    connected: Arc<AtomicBool>,
    listener: Mutex<Option<Listener>>,
    metrics: Arc<DeliveryMetrics>,
    poll_timeout: Duration,
    publish_timeout: Duration,
}

impl LocalIpcTransport {
    pub fn new(endpoint: IpcEndpoint, config: &TransportConfig) -> Self {
        Self {
            send_queue: endpoint.send_queue,
            recv_queue: endpoint.recv_queue,
            callbacks: Arc::new(RwLock::new(HashMap::new())),
            connected: Arc::new(AtomicBool::new(false)),
            listener: Mutex::new(None),
            metrics: Arc::new(DeliveryMetrics::new()),
            poll_timeout: config.ipc_poll_timeout(),
            publish_timeout: config.publish_timeout(),
        }
    }

    /// 一对互相连通的传输层实例
    pub fn pair(config: &TransportConfig) -> (Self, Self) {
        let (a, b) = IpcEndpoint::pair(config.ipc_queue_capacity);
        (Self::new(a, config), Self::new(b, config))
    }

    /// 发布的消息回到自身的回环实例
    pub fn loopback(config: &TransportConfig) -> Self {
        Self::new(IpcEndpoint::loopback(config.ipc_queue_capacity), config)
    }

    pub fn metrics(&self) -> DeliveryMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// 接收队列中尚未处理的消息数
    pub fn pending_messages(&self) -> usize {
        self.recv_queue.len()
    }

    async fn listen(
        recv_queue: IpcQueue<TransferMessage>,
        callbacks: CallbackMap,
        metrics: Arc<DeliveryMetrics>,
        poll_timeout: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        debug!("IPC listener started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    debug!("IPC listener shutting down");
                    break;
                }
                message = recv_queue.get_timeout(poll_timeout) => {
                    if let Some(message) = message {
                        Self::deliver(&callbacks, &metrics, message).await;
                    }
                }
            }
        }
    }

    async fn deliver(callbacks: &CallbackMap, metrics: &DeliveryMetrics, message: TransferMessage) {
        metrics.record_message();

        let handlers: Vec<MessageCallback> = {
            let callbacks = callbacks.read().await;
            callbacks
                .iter()
                .filter(|(pattern, _)| topic_matches(pattern, &message.topic))
                .flat_map(|(_, handlers)| handlers.iter().cloned())
                .collect()
        };

        if handlers.is_empty() {
            debug!(topic = %message.topic, "No callback registered for topic");
            return;
        }

        let ctx = MessageContext::new(message.topic, message.payload);
        for handler in handlers {
            match handler.invoke(ctx.clone()).await {
                Ok(()) => metrics.record_callback_success(),
                Err(e) => {
                    error!(topic = %ctx.topic, "IPC callback error: {}", e);
                    metrics.record_callback_error();
                }
            }
        }
    }
}

#[async_trait]
impl Transport for LocalIpcTransport {
    async fn connect(&self) -> bool {
        let mut listener = self.listener.lock().await;
        if listener.is_some() {
            return true;
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(Self::listen(
            self.recv_queue.clone(),
            Arc::clone(&self.callbacks),
            Arc::clone(&self.metrics),
            self.poll_timeout,
            shutdown_rx,
        ));
        *listener = Some(Listener {
            shutdown_tx,
            handle,
        });
        self.connected.store(true, Ordering::SeqCst);
        info!("Local IPC transport connected");
        true
    }

    async fn disconnect(&self) -> bool {
        self.connected.store(false, Ordering::SeqCst);

        let Some(listener) = self.listener.lock().await.take() else {
            return true;
        };
        let _ = listener.shutdown_tx.send(());
        match listener.handle.await {
            Ok(()) => {
                info!("Local IPC transport disconnected");
                true
            }
            Err(e) => {
                error!("IPC listener terminated abnormally: {}", e);
                false
            }
        }
    }

    async fn publish(&self, topic: &str, payload: &Value) -> bool {
        if !self.is_connected() {
            warn!(topic, "Local IPC publish rejected: {}", AgentBusError::NotConnected);
            return false;
        }
        if let Err(e) = validate_publish_topic(topic) {
            error!("Publish rejected: {}", e);
            return false;
        }

        let message = TransferMessage::new(topic, payload.clone());
        match self.send_queue.put_timeout(message, self.publish_timeout).await {
            Ok(()) => true,
            Err(e) => {
                error!(topic, "Local IPC publish failed: {}", e);
                false
            }
        }
    }

    async fn subscribe(&self, topic: &str, callback: MessageCallback) -> bool {
        if let Err(e) = validate_subscription(topic) {
            error!("Subscribe rejected: {}", e);
            return false;
        }
        let mut callbacks = self.callbacks.write().await;
        let handlers = callbacks.entry(topic.to_string()).or_default();
        if handlers.is_empty() {
            self.metrics.record_subscription(true);
        }
        handlers.push(callback);
        debug!(topic, "Local IPC callback registered");
        true
    }

    async fn unsubscribe(&self, topic: &str) -> bool {
        let removed = self.callbacks.write().await.remove(topic).is_some();
        if removed {
            self.metrics.record_unsubscription();
        }
        removed
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn mode(&self) -> TransportMode {
        TransportMode::LocalIpc
    }
}
