use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use agentbus_core::topic::validate_publish_topic;
use agentbus_core::{
    AgentBusError, BrokerClient, BrokerMessage, MessageCallback, Qos, Transport, TransportConfig,
    TransportMode,
};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::subscription_registry::SubscriptionRegistry;

struct InboundPump {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<mpsc::Receiver<BrokerMessage>>,
}

/// 基于外部消息代理（MQTT等）的传输层
///
/// 订阅、取消订阅与分发委托给 [`SubscriptionRegistry`]。连接建立之前的所有
/// 操作直接返回 `false`。推送式投递持有 `delivery` 读锁，`disconnect` 取写锁
/// 等待进行中的投递结束，返回之后不会再触发回调。
pub struct BrokerTransport {
    client: Arc<dyn BrokerClient>,
    registry: Arc<SubscriptionRegistry>,
    connected: AtomicBool,
    delivery: RwLock<()>,
    default_qos: Qos,
    inbound: Mutex<Option<mpsc::Receiver<BrokerMessage>>>,
    pump: Mutex<Option<InboundPump>>,
}

impl BrokerTransport {
    pub fn new(client: Arc<dyn BrokerClient>, config: &TransportConfig) -> Self {
        Self::with_registry(
            client,
            Arc::new(SubscriptionRegistry::with_config(config)),
            config.default_qos,
        )
    }

    pub fn with_registry(
        client: Arc<dyn BrokerClient>,
        registry: Arc<SubscriptionRegistry>,
        default_qos: Qos,
    ) -> Self {
        Self {
            client,
            registry,
            connected: AtomicBool::new(false),
            delivery: RwLock::new(()),
            default_qos,
            inbound: Mutex::new(None),
            pump: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> Arc<SubscriptionRegistry> {
        Arc::clone(&self.registry)
    }

    /// 以指定QoS与保留标志发布
    pub async fn publish_with(&self, topic: &str, payload: &Value, qos: Qos, retain: bool) -> bool {
        if !self.is_connected() {
            warn!(topic, "Broker publish rejected: {}", AgentBusError::NotConnected);
            return false;
        }
        if let Err(e) = validate_publish_topic(topic) {
            error!("Publish rejected: {}", e);
            return false;
        }

        let bytes = match serde_json::to_vec(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(topic, "Failed to encode payload: {}", e);
                return false;
            }
        };

        match self.client.publish(topic, bytes, qos, retain).await {
            Ok(()) => {
                debug!(topic, "Published to broker");
                true
            }
            Err(e) => {
                error!(topic, "Broker publish failed: {}", e);
                false
            }
        }
    }

    /// 以指定QoS订阅
    pub async fn subscribe_with_qos(&self, topic: &str, callback: MessageCallback, qos: Qos) -> bool {
        if !self.is_connected() {
            warn!(topic, "Broker subscribe rejected: {}", AgentBusError::NotConnected);
            return false;
        }
        self.registry.subscribe(topic, Some(callback), qos).await
    }

    /// 供推送式客户端直接投递入站消息；未连接时忽略
    pub async fn handle_message(&self, message: BrokerMessage) -> usize {
        let _delivery = self.delivery.read().await;
        if !self.is_connected() {
            debug!(topic = %message.topic, "Ignoring inbound message while disconnected");
            return 0;
        }
        self.registry
            .dispatch(&message.topic, &message.payload, message.qos, message.retain)
            .await
    }

    async fn start_pump(&self) {
        let mut pump = self.pump.lock().await;
        if pump.is_some() {
            return;
        }

        let receiver = match self.inbound.lock().await.take() {
            Some(receiver) => Some(receiver),
            None => self.client.take_incoming(),
        };
        let Some(mut receiver) = receiver else {
            debug!("Broker client provides no inbound stream, expecting push delivery");
            return;
        };

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let registry = Arc::clone(&self.registry);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    message = receiver.recv() => match message {
                        Some(message) => {
                            registry
                                .dispatch(&message.topic, &message.payload, message.qos, message.retain)
                                .await;
                        }
                        None => {
                            warn!("Broker inbound stream closed");
                            break;
                        }
                    },
                }
            }
            receiver
        });

        *pump = Some(InboundPump {
            shutdown_tx,
            handle,
        });
    }

    async fn stop_pump(&self) {
        let Some(pump) = self.pump.lock().await.take() else {
            return;
        };
        let _ = pump.shutdown_tx.send(());
        match pump.handle.await {
            Ok(receiver) => *self.inbound.lock().await = Some(receiver),
            Err(e) => error!("Broker inbound pump terminated abnormally: {}", e),
        }
    }
}

#[async_trait]
impl Transport for BrokerTransport {
    async fn connect(&self) -> bool {
        if self.is_connected() {
            return true;
        }

        if let Err(e) = self.client.connect().await {
            error!("Broker connect failed: {}", e);
            return false;
        }

        self.registry.bind_client(Arc::clone(&self.client)).await;
        self.connected.store(true, Ordering::SeqCst);
        self.start_pump().await;
        info!("Broker transport connected");
        true
    }

    async fn disconnect(&self) -> bool {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return true;
        }

        // 等待进行中的推送投递结束
        drop(self.delivery.write().await);
        self.stop_pump().await;
        self.registry.unbind_client().await;
        match self.client.disconnect().await {
            Ok(()) => {
                info!("Broker transport disconnected");
                true
            }
            Err(e) => {
                warn!("Broker disconnect failed: {}", e);
                false
            }
        }
    }

    async fn publish(&self, topic: &str, payload: &Value) -> bool {
        self.publish_with(topic, payload, self.default_qos, false)
            .await
    }

    async fn subscribe(&self, topic: &str, callback: MessageCallback) -> bool {
        self.subscribe_with_qos(topic, callback, self.default_qos)
            .await
    }

    async fn unsubscribe(&self, topic: &str) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.registry.unsubscribe(topic).await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn mode(&self) -> TransportMode {
        TransportMode::MqttBroker
    }
}
