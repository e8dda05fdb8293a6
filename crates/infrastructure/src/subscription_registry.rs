//! 订阅注册表
//!
//! 维护 主题 → 订阅记录 与 主题 → 回调列表 两张表，负责把代理收到的原始消息
//! 按通配符匹配分发给回调。两张表由同一把锁保护；回调执行期间不持有锁，
//! 回调内部可以再次订阅或取消订阅。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agentbus_core::models::decode_json_payload;
use agentbus_core::topic::{topic_matches, validate_subscription};
use agentbus_core::{
    BrokerClient, MessageCallback, MessageContext, Qos, Subscription, SubscriptionInfo,
    TransportConfig,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::metrics::{DeliveryMetrics, DeliveryMetricsSnapshot};

#[derive(Default)]
struct RegistryState {
    subscriptions: HashMap<String, Subscription>,
    callbacks: HashMap<String, Vec<MessageCallback>>,
}

impl RegistryState {
    fn register_callback(&mut self, topic: &str, callback: MessageCallback) {
        self.callbacks
            .entry(topic.to_string())
            .or_default()
            .push(callback);
    }
}

pub struct SubscriptionRegistry {
    client: RwLock<Option<Arc<dyn BrokerClient>>>,
    state: Mutex<RegistryState>,
    metrics: DeliveryMetrics,
    retry_count: u32,
    retry_base: Duration,
}

impl SubscriptionRegistry {
    pub fn new(retry_count: u32, retry_base: Duration) -> Self {
        Self {
            client: RwLock::new(None),
            state: Mutex::new(RegistryState::default()),
            metrics: DeliveryMetrics::new(),
            retry_count,
            retry_base,
        }
    }

    pub fn with_config(config: &TransportConfig) -> Self {
        Self::new(config.subscribe_retry_count, config.subscribe_retry_base())
    }

    /// 绑定代理客户端的原始订阅/取消订阅操作
    pub async fn bind_client(&self, client: Arc<dyn BrokerClient>) {
        *self.client.write().await = Some(client);
        info!("Broker client bound to subscription registry");
    }

    pub async fn unbind_client(&self) {
        *self.client.write().await = None;
    }

    async fn client(&self) -> Option<Arc<dyn BrokerClient>> {
        self.client.read().await.clone()
    }

    /// 使用默认重试次数订阅主题
    pub async fn subscribe(
        &self,
        topic: &str,
        callback: Option<MessageCallback>,
        qos: Qos,
    ) -> bool {
        self.subscribe_with_retry(topic, callback, qos, self.retry_count)
            .await
    }

    /// 订阅主题（支持 `+`/`#` 通配符）
    ///
    /// 已存在的主题只追加回调并返回 `true`；首次订阅时底层订阅最多尝试
    /// `retry_count` 次，第n次失败后等待 `retry_base * n`。
    pub async fn subscribe_with_retry(
        &self,
        topic: &str,
        callback: Option<MessageCallback>,
        qos: Qos,
        retry_count: u32,
    ) -> bool {
        if let Err(e) = validate_subscription(topic) {
            error!("Rejecting subscription: {}", e);
            return false;
        }
        let Some(client) = self.client().await else {
            error!(topic, "Broker client not bound, cannot subscribe");
            return false;
        };

        {
            let mut state = self.state.lock().await;
            if state.subscriptions.contains_key(topic) {
                warn!(topic, "Already subscribed, registering additional callback");
                if let Some(callback) = callback {
                    state.register_callback(topic, callback);
                }
                return true;
            }

            state
                .subscriptions
                .insert(topic.to_string(), Subscription::pending(topic, qos));
            if let Some(callback) = callback {
                state.register_callback(topic, callback);
            }
        }

        let success = self.do_subscribe(client.as_ref(), topic, qos, retry_count).await;

        let mut state = self.state.lock().await;
        match state.subscriptions.get_mut(topic) {
            Some(subscription) if success => subscription.mark_active(),
            Some(subscription) => subscription.mark_failed(),
            None => {
                warn!(topic, "Subscription removed while subscribe was in flight");
                return false;
            }
        }
        self.metrics.record_subscription(success);
        success
    }

    async fn do_subscribe(
        &self,
        client: &dyn BrokerClient,
        topic: &str,
        qos: Qos,
        retry_count: u32,
    ) -> bool {
        let attempts = retry_count.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match client.subscribe(topic, qos).await {
                Ok(()) => {
                    info!(topic, qos = u8::from(qos), "Subscribed");
                    return true;
                }
                Err(e) => {
                    warn!(topic, attempt, "Subscribe attempt failed: {}", e);
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.retry_base * attempt).await;
                    }
                }
            }
        }

        if let Some(e) = last_error {
            error!(topic, "Subscribe failed after {} attempts: {}", attempts, e);
        }
        false
    }

    /// 取消订阅；未知主题返回 `false`
    pub async fn unsubscribe(&self, topic: &str) -> bool {
        let Some(client) = self.client().await else {
            return false;
        };

        let mut state = self.state.lock().await;
        let Some(subscription) = state.subscriptions.get(topic) else {
            warn!(topic, "Not subscribed");
            return false;
        };
        let was_active = subscription.is_active();

        if let Err(e) = client.unsubscribe(topic).await {
            error!(topic, "Unsubscribe failed: {}", e);
            return false;
        }

        state.subscriptions.remove(topic);
        state.callbacks.remove(topic);
        if was_active {
            self.metrics.record_unsubscription();
        }
        info!(topic, "Unsubscribed");
        true
    }

    /// 取消全部订阅，返回成功数量
    pub async fn unsubscribe_all(&self) -> usize {
        let topics: Vec<String> = {
            let state = self.state.lock().await;
            state.subscriptions.keys().cloned().collect()
        };

        let mut success_count = 0;
        for topic in topics {
            if self.unsubscribe(&topic).await {
                success_count += 1;
            }
        }
        success_count
    }

    /// 批量订阅，单个主题失败不影响其余主题
    pub async fn batch_subscribe(
        &self,
        topics: &[&str],
        callback: Option<MessageCallback>,
        qos: Qos,
    ) -> HashMap<String, bool> {
        let mut results = HashMap::with_capacity(topics.len());
        for topic in topics {
            let ok = self.subscribe(topic, callback.clone(), qos).await;
            results.insert(topic.to_string(), ok);
        }
        results
    }

    /// 为已订阅的主题追加回调
    pub async fn add_callback(&self, topic: &str, callback: MessageCallback) -> bool {
        let mut state = self.state.lock().await;
        if !state.subscriptions.contains_key(topic) {
            warn!(topic, "Cannot add callback: not subscribed");
            return false;
        }
        state.register_callback(topic, callback);
        true
    }

    /// 分发代理收到的原始消息，返回成功执行的回调数
    ///
    /// 负载无法解码时丢弃消息；单个回调失败只记录错误，不影响其余回调。
    pub async fn dispatch(&self, raw_topic: &str, payload: &[u8], qos: Qos, retain: bool) -> usize {
        self.metrics.record_message();

        let message = match decode_json_payload(payload) {
            Ok(message) => message,
            Err(e) => {
                error!(topic = raw_topic, "Failed to parse message: {}", e);
                self.metrics.record_decode_error();
                return 0;
            }
        };

        let targets: Vec<(String, Vec<MessageCallback>)> = {
            let mut state = self.state.lock().await;
            let RegistryState {
                subscriptions,
                callbacks,
            } = &mut *state;

            subscriptions
                .iter_mut()
                .filter(|(pattern, _)| topic_matches(pattern, raw_topic))
                .map(|(pattern, subscription)| {
                    subscription.record_message();
                    let handlers = callbacks.get(pattern).cloned().unwrap_or_default();
                    (pattern.clone(), handlers)
                })
                .collect()
        };

        if targets.is_empty() {
            debug!(topic = raw_topic, "No subscription matches topic");
            return 0;
        }

        let ctx = MessageContext::new(raw_topic, message).with_qos(qos, retain);
        let mut executed = 0;
        let mut failures: Vec<String> = Vec::new();

        for (pattern, handlers) in &targets {
            for handler in handlers {
                match handler.invoke(ctx.clone()).await {
                    Ok(()) => {
                        executed += 1;
                        self.metrics.record_callback_success();
                    }
                    Err(e) => {
                        error!(subscription = %pattern, topic = raw_topic, "Callback error: {}", e);
                        self.metrics.record_callback_error();
                        failures.push(pattern.clone());
                    }
                }
            }
        }

        if !failures.is_empty() {
            let mut state = self.state.lock().await;
            for pattern in failures {
                if let Some(subscription) = state.subscriptions.get_mut(&pattern) {
                    subscription.record_error();
                }
            }
        }

        executed
    }

    pub async fn subscription_info(&self, topic: &str) -> Option<SubscriptionInfo> {
        let state = self.state.lock().await;
        state.subscriptions.get(topic).map(|subscription| SubscriptionInfo {
            subscription: subscription.clone(),
            callback_count: state.callbacks.get(topic).map_or(0, Vec::len),
        })
    }

    pub async fn list_subscriptions(&self) -> Vec<SubscriptionInfo> {
        let state = self.state.lock().await;
        state
            .subscriptions
            .values()
            .map(|subscription| SubscriptionInfo {
                subscription: subscription.clone(),
                callback_count: state.callbacks.get(&subscription.topic).map_or(0, Vec::len),
            })
            .collect()
    }

    pub async fn is_subscribed(&self, topic: &str) -> bool {
        self.state.lock().await.subscriptions.contains_key(topic)
    }

    pub async fn active_topics(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .subscriptions
            .values()
            .filter(|subscription| subscription.is_active())
            .map(|subscription| subscription.topic.clone())
            .collect()
    }

    pub fn metrics(&self) -> DeliveryMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// 取消全部订阅并清空注册表
    pub async fn destroy(&self) {
        self.unsubscribe_all().await;
        let mut state = self.state.lock().await;
        state.subscriptions.clear();
        state.callbacks.clear();
        info!("Subscription registry destroyed");
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::with_config(&TransportConfig::default())
    }
}
