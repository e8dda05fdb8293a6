use async_trait::async_trait;
use serde_json::Value;

use crate::config::TransportMode;

use super::MessageCallback;

/// 发布/订阅传输层抽象接口
///
/// 所有操作都不向调用方抛出错误：连接、发布、订阅失败会被记录日志，
/// 并以 `false` 返回。
#[async_trait]
pub trait Transport: Send + Sync {
    /// 建立连接并启动后台消息监听
    async fn connect(&self) -> bool;

    /// 停止监听并断开连接；返回前保证不再触发任何回调
    async fn disconnect(&self) -> bool;

    /// 发布消息到指定主题
    async fn publish(&self, topic: &str, payload: &Value) -> bool;

    /// 订阅主题（支持 `+`/`#` 通配符）
    async fn subscribe(&self, topic: &str, callback: MessageCallback) -> bool;

    /// 取消订阅
    async fn unsubscribe(&self, topic: &str) -> bool;

    fn is_connected(&self) -> bool;

    fn mode(&self) -> TransportMode;
}
