use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 传递给代理进程的环境变量名，值为代理ID
pub const AGENT_ID_ENV: &str = "AGENTBUS_AGENT_ID";

/// 代理进程入口描述
///
/// 可序列化的启动描述，重启时按原样重新拉起进程。代理ID作为最后一个
/// 命令行参数追加，同时通过 [`AGENT_ID_ENV`] 传入。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl EntryPoint {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// 针对某个代理展开后的完整参数列表
    pub fn args_for(&self, agent_id: &str) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(agent_id.to_string());
        args
    }
}

/// 代理运行状态快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent_id: String,
    pub agent_type: String,
    pub pid: Option<u32>,
    pub is_alive: bool,
    pub uptime: Duration,
    pub last_heartbeat: DateTime<Utc>,
    pub restart_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_point_appends_agent_id() {
        let entry = EntryPoint::new("sh").args(["-c", "sleep 1"]);
        assert_eq!(entry.args_for("a1"), vec!["-c", "sleep 1", "a1"]);
        assert_eq!(entry.args, vec!["-c", "sleep 1"]);
    }

    #[test]
    fn test_entry_point_roundtrips_through_json() {
        let entry = EntryPoint::new("/usr/bin/agent").arg("--verbose").env("MODE", "test");
        let json = serde_json::to_string(&entry).unwrap();
        let decoded: EntryPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, entry);
    }
}
