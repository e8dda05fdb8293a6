use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::models::Qos;
use crate::{AgentBusError, AgentBusResult};

/// 投递给回调的消息上下文
#[derive(Debug, Clone, PartialEq)]
pub struct MessageContext {
    /// 实际发布的主题（不是订阅模式）
    pub topic: String,
    pub payload: Value,
    pub qos: Qos,
    pub retain: bool,
}

impl MessageContext {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            qos: Qos::default(),
            retain: false,
        }
    }

    pub fn with_qos(mut self, qos: Qos, retain: bool) -> Self {
        self.qos = qos;
        self.retain = retain;
        self
    }
}

pub type SyncHandler = dyn Fn(&MessageContext) -> anyhow::Result<()> + Send + Sync;
pub type AsyncHandler =
    dyn Fn(MessageContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// 消息回调
///
/// 同步与异步回调用枚举区分，在调用处分支一次。
#[derive(Clone)]
pub enum MessageCallback {
    Sync(Arc<SyncHandler>),
    Async(Arc<AsyncHandler>),
}

impl MessageCallback {
    pub fn sync<F>(handler: F) -> Self
    where
        F: Fn(&MessageContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(handler))
    }

    pub fn from_async<F, Fut>(handler: F) -> Self
    where
        F: Fn(MessageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::Async(Arc::new(move |ctx| handler(ctx).boxed()))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }

    /// 调用回调；错误与panic都转换为 [`AgentBusError::Delivery`]
    pub async fn invoke(&self, ctx: MessageContext) -> AgentBusResult<()> {
        let outcome = match self {
            Self::Sync(handler) => {
                std::panic::catch_unwind(AssertUnwindSafe(|| handler(&ctx)))
            }
            Self::Async(handler) => AssertUnwindSafe(handler(ctx)).catch_unwind().await,
        };

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(AgentBusError::Delivery(format!("{e:#}"))),
            Err(panic) => Err(AgentBusError::Delivery(format!(
                "回调发生panic: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }
}

impl fmt::Debug for MessageCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("MessageCallback::Sync"),
            Self::Async(_) => f.write_str("MessageCallback::Async"),
        }
    }
}

/// 提取panic负载中的文本信息
pub fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
