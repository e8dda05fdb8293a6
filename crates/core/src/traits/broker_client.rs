use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::models::{BrokerMessage, Qos};
use crate::AgentBusResult;

/// 外部消息代理客户端（MQTT等）接口
///
/// 由上层注入，[`Transport`](super::Transport) 的代理实现只依赖这些原始操作。
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// 认证并连接到消息代理
    async fn connect(&self) -> AgentBusResult<()>;

    async fn disconnect(&self) -> AgentBusResult<()>;

    async fn subscribe(&self, topic: &str, qos: Qos) -> AgentBusResult<()>;

    async fn unsubscribe(&self, topic: &str) -> AgentBusResult<()>;

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: Qos,
        retain: bool,
    ) -> AgentBusResult<()>;

    /// 取走入站消息流，只能取走一次
    fn take_incoming(&self) -> Option<mpsc::Receiver<BrokerMessage>> {
        None
    }
}
