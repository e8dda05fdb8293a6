use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Qos;

/// 订阅状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Failed,
    Unsubscribed,
}

/// 订阅记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub topic: String,
    pub qos: Qos,
    pub status: SubscriptionStatus,
    pub subscribed_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub message_count: u64,
    pub error_count: u64,
}

impl Subscription {
    pub fn pending(topic: impl Into<String>, qos: Qos) -> Self {
        Self {
            topic: topic.into(),
            qos,
            status: SubscriptionStatus::Pending,
            subscribed_at: None,
            last_message_at: None,
            message_count: 0,
            error_count: 0,
        }
    }

    pub fn mark_active(&mut self) {
        self.status = SubscriptionStatus::Active;
        self.subscribed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self) {
        self.status = SubscriptionStatus::Failed;
    }

    pub fn record_message(&mut self) {
        self.last_message_at = Some(Utc::now());
        self.message_count += 1;
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}

/// 订阅信息快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub callback_count: usize,
}
