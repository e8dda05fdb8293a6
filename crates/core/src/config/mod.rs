//! 配置加载
//!
//! 加载顺序（后者覆盖前者）：内置默认值 → TOML配置文件 → 环境变量。
//! 环境变量使用 `AGENTBUS_` 前缀，层级之间用 `__` 分隔，例如
//! `AGENTBUS_CLUSTER__MAX_WORKERS=4`、`AGENTBUS_TRANSPORT__MODE=mqtt_broker`。

pub mod models;
pub mod validation;

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

pub use models::*;
pub use validation::{ConfigValidator, ValidationUtils};

use crate::{AgentBusError, AgentBusResult};

pub const ENV_PREFIX: &str = "AGENTBUS";
pub const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/agentbus.toml",
    "agentbus.toml",
    "/etc/agentbus/config.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub transport: TransportConfig,
    pub cluster: ClusterConfig,
    pub supervisor: SupervisorConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 加载配置；未指定路径时依次尝试 [`DEFAULT_CONFIG_PATHS`]
    pub fn load(config_path: Option<&str>) -> AgentBusResult<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(AgentBusError::configuration(format!("配置文件不存在: {path}")));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> AgentBusResult<Self> {
        let config: AppConfig = ConfigBuilder::builder()
            .add_source(File::from_str(toml_str, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> AgentBusResult<()> {
        self.transport.validate()?;
        self.cluster.validate()?;
        self.supervisor.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
