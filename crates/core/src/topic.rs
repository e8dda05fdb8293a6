//! MQTT风格的主题匹配
//!
//! 主题由 `/` 分隔为若干层级。订阅方可使用两种通配符：
//! - `+`：匹配恰好一个层级
//! - `#`：匹配当前层级及其后的所有层级，只在模式末尾生效
//!
//! 发布方的主题中不允许出现通配符。

use crate::{AgentBusError, AgentBusResult};

pub const TOPIC_SEPARATOR: char = '/';
pub const SINGLE_LEVEL_WILDCARD: &str = "+";
pub const MULTI_LEVEL_WILDCARD: &str = "#";

/// 判断订阅模式是否匹配具体主题
///
/// 非末尾位置的 `#` 按字面量处理，不会展开为多级匹配。
///
/// 末尾的 `#` 同样匹配父级主题本身（MQTT 3.1.1 第4.7.1.2节）：订阅
/// `agents/a1/#` 也会收到发往 `agents/a1` 的消息。
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    if pattern == MULTI_LEVEL_WILDCARD {
        return true;
    }

    let pattern_parts: Vec<&str> = pattern.split(TOPIC_SEPARATOR).collect();
    let topic_parts: Vec<&str> = topic.split(TOPIC_SEPARATOR).collect();
    let last_index = pattern_parts.len() - 1;

    for (i, part) in pattern_parts.iter().enumerate() {
        if *part == MULTI_LEVEL_WILDCARD && i == last_index {
            return true;
        }

        let Some(topic_part) = topic_parts.get(i) else {
            return false;
        };

        if *part == SINGLE_LEVEL_WILDCARD {
            continue;
        }

        if part != topic_part {
            return false;
        }
    }

    pattern_parts.len() == topic_parts.len()
}

/// 模式中是否包含通配符层级
pub fn has_wildcards(pattern: &str) -> bool {
    pattern
        .split(TOPIC_SEPARATOR)
        .any(|part| part == SINGLE_LEVEL_WILDCARD || part == MULTI_LEVEL_WILDCARD)
}

/// 校验订阅模式
pub fn validate_subscription(pattern: &str) -> AgentBusResult<()> {
    if pattern.is_empty() {
        return Err(AgentBusError::InvalidTopic("订阅主题不能为空".to_string()));
    }
    Ok(())
}

/// 校验发布主题：非空且不含通配符
pub fn validate_publish_topic(topic: &str) -> AgentBusResult<()> {
    if topic.is_empty() {
        return Err(AgentBusError::InvalidTopic("发布主题不能为空".to_string()));
    }
    if has_wildcards(topic) {
        return Err(AgentBusError::InvalidTopic(format!(
            "发布主题不能包含通配符: {topic}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_matches_everything() {
        for topic in ["", "a", "a/b/c", "/leading", "trailing/", "sport/tennis/player"] {
            assert!(topic_matches("#", topic), "# should match {topic:?}");
        }
    }

    #[test]
    fn test_single_level_wildcard() {
        assert!(topic_matches("a/+/c", "a/b/c"));
        assert!(!topic_matches("a/+/c", "a/b/x/c"));
        assert!(topic_matches("sport/+/player", "sport/tennis/player"));
        assert!(!topic_matches("sport/+/player", "sport/tennis/player/ranking"));
        assert!(topic_matches("+", "a"));
        assert!(!topic_matches("+", "a/b"));
        assert!(topic_matches("+/+", "a/"));
    }

    #[test]
    fn test_multi_level_wildcard() {
        assert!(topic_matches("a/#", "a/b/c/d"));
        assert!(topic_matches("a/#", "a/b"));
        // 父级主题本身也被 `#` 覆盖
        assert!(topic_matches("a/#", "a"));
        assert!(topic_matches("agents/a1/#", "agents/a1"));
        assert!(!topic_matches("a/#", "b/c"));
        assert!(topic_matches("a/+/#", "a/b/c"));
        assert!(!topic_matches("a/b/#", "a"));
    }

    #[test]
    fn test_exact_match_requires_equal_length() {
        assert!(topic_matches("a/b", "a/b"));
        assert!(!topic_matches("a/b", "a/b/c"));
        assert!(!topic_matches("a/b/c", "a/b"));
        assert!(!topic_matches("a/b", "a/x"));
    }

    #[test]
    fn test_non_trailing_hash_is_literal() {
        assert!(!topic_matches("a/#/c", "a/b/c"));
        assert!(!topic_matches("a/#/c", "a/b/x/c"));
    }

    #[test]
    fn test_topic_validation() {
        assert!(validate_publish_topic("agents/a1/status").is_ok());
        assert!(validate_publish_topic("").is_err());
        assert!(validate_publish_topic("agents/+/status").is_err());
        assert!(validate_publish_topic("agents/#").is_err());
        assert!(validate_subscription("agents/#").is_ok());
        assert!(validate_subscription("").is_err());
    }
}
