use std::sync::Arc;

use agentbus_core::config::ConfigValidator;
use agentbus_core::{
    AgentBusError, AgentBusResult, BrokerClient, Transport, TransportConfig, TransportMode,
};
use tracing::{debug, info};

use crate::broker_transport::BrokerTransport;
use crate::ipc::IpcEndpoint;
use crate::local_ipc::LocalIpcTransport;

/// 构造传输层时可注入的外部依赖
#[derive(Default)]
pub struct TransportDeps {
    /// 本地IPC端点；缺省时使用回环端点
    pub ipc: Option<IpcEndpoint>,
    /// MQTT模式下必需的代理客户端
    pub broker_client: Option<Arc<dyn BrokerClient>>,
}

impl TransportDeps {
    pub fn with_ipc(endpoint: IpcEndpoint) -> Self {
        Self {
            ipc: Some(endpoint),
            broker_client: None,
        }
    }

    pub fn with_broker_client(client: Arc<dyn BrokerClient>) -> Self {
        Self {
            ipc: None,
            broker_client: Some(client),
        }
    }
}

pub struct TransportFactory;

impl TransportFactory {
    pub fn create(
        config: &TransportConfig,
        deps: TransportDeps,
    ) -> AgentBusResult<Arc<dyn Transport>> {
        debug!("Creating transport with mode: {}", config.mode);
        Self::validate_config(config)?;

        match config.mode {
            TransportMode::LocalIpc => {
                info!("Initializing local IPC transport");
                let transport = match deps.ipc {
                    Some(endpoint) => LocalIpcTransport::new(endpoint, config),
                    None => LocalIpcTransport::loopback(config),
                };
                Ok(Arc::new(transport))
            }
            TransportMode::MqttBroker => {
                info!("Initializing MQTT broker transport");
                let client = deps.broker_client.ok_or_else(|| {
                    AgentBusError::configuration("MQTT模式需要提供代理客户端")
                })?;
                Ok(Arc::new(BrokerTransport::new(client, config)))
            }
        }
    }

    /// 按模式字符串创建，未知模式返回配置错误
    pub fn create_from_mode_str(
        mode: &str,
        config: &TransportConfig,
        deps: TransportDeps,
    ) -> AgentBusResult<Arc<dyn Transport>> {
        let config = TransportConfig {
            mode: Self::parse_type_string(mode)?,
            ..config.clone()
        };
        Self::create(&config, deps)
    }

    pub fn validate_config(config: &TransportConfig) -> AgentBusResult<()> {
        config.validate()
    }

    pub fn get_type_string(mode: &TransportMode) -> &'static str {
        mode.as_str()
    }

    pub fn parse_type_string(type_str: &str) -> AgentBusResult<TransportMode> {
        type_str.parse()
    }
}
