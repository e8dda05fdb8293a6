#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use agentbus_core::{AgentBusError, AgentBusResult, BrokerClient, BrokerMessage, Qos};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// 记录调用的代理客户端替身
///
/// `fail_subscribes` 指定每个主题前n次订阅失败。
#[derive(Default)]
pub struct MockBrokerClient {
    pub subscribe_calls: Mutex<Vec<String>>,
    pub unsubscribe_calls: Mutex<Vec<String>>,
    pub published: Mutex<Vec<(String, Vec<u8>, Qos, bool)>>,
    pub fail_subscribes: Mutex<HashMap<String, usize>>,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    incoming: Mutex<Option<mpsc::Receiver<BrokerMessage>>>,
}

impl MockBrokerClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 带入站消息流的客户端，返回用于注入消息的发送端
    pub fn with_incoming() -> (Arc<Self>, mpsc::Sender<BrokerMessage>) {
        let (tx, rx) = mpsc::channel(16);
        let client = Self {
            incoming: Mutex::new(Some(rx)),
            ..Self::default()
        };
        (Arc::new(client), tx)
    }

    pub fn fail_subscribe(&self, topic: &str, times: usize) {
        self.fail_subscribes
            .lock()
            .unwrap()
            .insert(topic.to_string(), times);
    }

    pub fn subscribe_count(&self, topic: &str) -> usize {
        self.subscribe_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.as_str() == topic)
            .count()
    }
}

#[async_trait]
impl BrokerClient for MockBrokerClient {
    async fn connect(&self) -> AgentBusResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> AgentBusResult<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, topic: &str, _qos: Qos) -> AgentBusResult<()> {
        self.subscribe_calls.lock().unwrap().push(topic.to_string());
        let mut failures = self.fail_subscribes.lock().unwrap();
        if let Some(remaining) = failures.get_mut(topic) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AgentBusError::transport("broker refused subscription"));
            }
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> AgentBusResult<()> {
        self.unsubscribe_calls.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: Qos,
        retain: bool,
    ) -> AgentBusResult<()> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload, qos, retain));
        Ok(())
    }

    fn take_incoming(&self) -> Option<mpsc::Receiver<BrokerMessage>> {
        self.incoming.lock().unwrap().take()
    }
}
