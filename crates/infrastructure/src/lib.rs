//! # agentbus-infrastructure
//!
//! 传输层实现：本地IPC队列与桥接、基于代理的传输层及其订阅注册表、
//! 投递统计以及按配置选择实现的工厂。

pub mod broker_transport;
pub mod ipc;
pub mod local_ipc;
pub mod metrics;
pub mod subscription_registry;
pub mod transport_factory;

pub use broker_transport::BrokerTransport;
pub use ipc::{IpcEndpoint, IpcQueue, StreamBridge};
pub use local_ipc::LocalIpcTransport;
pub use metrics::{DeliveryMetrics, DeliveryMetricsSnapshot};
pub use subscription_registry::SubscriptionRegistry;
pub use transport_factory::{TransportDeps, TransportFactory};
