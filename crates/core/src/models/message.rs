use serde::{Deserialize, Serialize};

use crate::{AgentBusError, AgentBusResult};

/// MQTT风格的服务质量等级，仅作为元数据传递
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Qos {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for Qos {
    type Error = AgentBusError;

    fn try_from(value: u8) -> AgentBusResult<Self> {
        match value {
            0 => Ok(Qos::AtMostOnce),
            1 => Ok(Qos::AtLeastOnce),
            2 => Ok(Qos::ExactlyOnce),
            other => Err(AgentBusError::configuration(format!(
                "无效的QoS等级: {other}，支持的等级: 0, 1, 2"
            ))),
        }
    }
}

impl From<Qos> for u8 {
    fn from(qos: Qos) -> Self {
        match qos {
            Qos::AtMostOnce => 0,
            Qos::AtLeastOnce => 1,
            Qos::ExactlyOnce => 2,
        }
    }
}

/// 本地IPC传输的线上单元: `{"topic": ..., "payload": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferMessage {
    pub topic: String,
    pub payload: serde_json::Value,
}

impl TransferMessage {
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// 编码为单行JSON（不含换行符）
    pub fn to_line(&self) -> AgentBusResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_line(line: &str) -> AgentBusResult<Self> {
        Ok(serde_json::from_str(line.trim_end())?)
    }
}

/// 从消息代理收到的原始消息
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: Qos,
    pub retain: bool,
}

impl BrokerMessage {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>, qos: Qos, retain: bool) -> Self {
        Self {
            topic: topic.into(),
            payload,
            qos,
            retain,
        }
    }

    /// 以JSON编码负载构造消息
    pub fn json(
        topic: impl Into<String>,
        payload: &serde_json::Value,
        qos: Qos,
        retain: bool,
    ) -> AgentBusResult<Self> {
        Ok(Self::new(topic, serde_json::to_vec(payload)?, qos, retain))
    }

    pub fn decode_payload(&self) -> AgentBusResult<serde_json::Value> {
        decode_json_payload(&self.payload)
    }
}

/// 解码UTF-8 JSON负载，失败时返回 [`AgentBusError::Delivery`]
pub fn decode_json_payload(payload: &[u8]) -> AgentBusResult<serde_json::Value> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| AgentBusError::Delivery(format!("负载不是有效的UTF-8: {e}")))?;
    serde_json::from_str(text)
        .map_err(|e| AgentBusError::Delivery(format!("负载不是有效的JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transfer_message_wire_shape() {
        let message = TransferMessage::new("agents/a1/status", json!({"state": "ready"}));
        let line = message.to_line().unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value, json!({"topic": "agents/a1/status", "payload": {"state": "ready"}}));
        assert_eq!(TransferMessage::from_line(&format!("{line}\n")).unwrap(), message);
    }

    #[test]
    fn test_qos_conversion() {
        assert_eq!(Qos::try_from(1).unwrap(), Qos::AtLeastOnce);
        assert!(Qos::try_from(3).is_err());
        assert_eq!(serde_json::to_string(&Qos::ExactlyOnce).unwrap(), "2");
        let qos: Qos = serde_json::from_str("0").unwrap();
        assert_eq!(qos, Qos::AtMostOnce);
    }

    #[test]
    fn test_broker_payload_decoding() {
        let ok = BrokerMessage::json("a/b", &json!({"x": 1}), Qos::AtMostOnce, false).unwrap();
        assert_eq!(ok.decode_payload().unwrap(), json!({"x": 1}));

        let not_utf8 = BrokerMessage::new("a/b", vec![0xff, 0xfe], Qos::AtMostOnce, false);
        assert!(matches!(not_utf8.decode_payload(), Err(AgentBusError::Delivery(_))));

        let not_json = BrokerMessage::new("a/b", b"hello".to_vec(), Qos::AtMostOnce, false);
        assert!(matches!(not_json.decode_payload(), Err(AgentBusError::Delivery(_))));
    }
}
