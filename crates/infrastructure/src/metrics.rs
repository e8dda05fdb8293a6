use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// 订阅与投递统计
///
/// 由注册表或传输层实例持有，只通过自身方法更新；
/// 同时把计数转发到 `metrics` 门面，便于挂接外部导出器。
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    total_subscriptions: AtomicU64,
    active_subscriptions: AtomicU64,
    failed_subscriptions: AtomicU64,
    messages_received: AtomicU64,
    callbacks_executed: AtomicU64,
    callback_errors: AtomicU64,
    decode_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryMetricsSnapshot {
    pub total_subscriptions: u64,
    pub active_subscriptions: u64,
    pub failed_subscriptions: u64,
    pub messages_received: u64,
    pub callbacks_executed: u64,
    pub callback_errors: u64,
    pub decode_errors: u64,
}

impl DeliveryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_subscription(&self, success: bool) {
        self.total_subscriptions.fetch_add(1, Ordering::Relaxed);
        if success {
            self.active_subscriptions.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("agentbus_subscriptions_total", "outcome" => "active").increment(1);
        } else {
            self.failed_subscriptions.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("agentbus_subscriptions_total", "outcome" => "failed").increment(1);
        }
    }

    /// 活跃订阅数减一，不会低于0
    pub fn record_unsubscription(&self) {
        let _ = self
            .active_subscriptions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("agentbus_messages_received_total").increment(1);
    }

    pub fn record_callback_success(&self) {
        self.callbacks_executed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("agentbus_callbacks_executed_total").increment(1);
    }

    pub fn record_callback_error(&self) {
        self.callback_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("agentbus_callback_errors_total").increment(1);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("agentbus_decode_errors_total").increment(1);
    }

    pub fn snapshot(&self) -> DeliveryMetricsSnapshot {
        DeliveryMetricsSnapshot {
            total_subscriptions: self.total_subscriptions.load(Ordering::Relaxed),
            active_subscriptions: self.active_subscriptions.load(Ordering::Relaxed),
            failed_subscriptions: self.failed_subscriptions.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            callbacks_executed: self.callbacks_executed.load(Ordering::Relaxed),
            callback_errors: self.callback_errors.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}
