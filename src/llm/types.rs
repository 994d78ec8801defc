//! LLM 类型定义

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// 解析角色名，只接受 system / user / assistant
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单条对话消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// 角色：system, user, assistant
    pub role: Role,
    /// 消息内容
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// 转换为 `{"role", "content"}` 形式的 JSON
    pub fn to_value(&self) -> Value {
        json!({ "role": self.role.as_str(), "content": self.content })
    }
}

/// 有序对话
pub type ConversationTurns = Vec<ChatTurn>;

/// 请求参数包
///
/// 只包含调用方显式设置过的参数，未设置的参数不会出现对应的键。
pub type ParameterBag = Map<String, Value>;

/// 单次生成请求，每次调用新建，不做持久化
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub turns: ConversationTurns,
    pub params: ParameterBag,
    pub stream: bool,
}

impl GenerationRequest {
    /// 线上参数视图：`model`、`stream`、`messages` 在前，参数包在后
    ///
    /// 参数包中的同名键会覆盖前三个基础键。
    pub fn wire_parameters(&self) -> Map<String, Value> {
        let mut wire = Map::new();
        wire.insert("model".to_string(), Value::String(self.model.clone()));
        wire.insert("stream".to_string(), Value::Bool(self.stream));
        wire.insert(
            "messages".to_string(),
            Value::Array(self.turns.iter().map(ChatTurn::to_value).collect()),
        );
        for (key, value) in &self.params {
            wire.insert(key.clone(), value.clone());
        }
        wire
    }

    /// 参数包中的模型覆盖（如果 extra 中带了 `model`）
    pub fn effective_model(&self) -> &str {
        self.params
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.model)
    }
}

/// 模型描述
///
/// 各后端返回的字段不完全相同，公共部分只有 `id`。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub capabilities: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// 本地模型的磁盘占用
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_capability(mut self, tag: impl Into<String>) -> Self {
        self.capabilities.insert(tag.into());
        self
    }

    pub fn with_created_at(mut self, created_at: Option<DateTime<Utc>>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_size(mut self, size_bytes: Option<u64>) -> Self {
        self.size_bytes = size_bytes;
        self
    }
}

/// 模型目录过滤条件（目前只有 Bedrock 使用）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelFilters {
    pub by_provider: Option<String>,
    pub by_output_modality: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("system"), Some(Role::System));
        assert_eq!(Role::parse("assistant"), Some(Role::Assistant));
        assert_eq!(Role::parse("User"), None);
        assert_eq!(Role::parse("bogus"), None);
    }

    #[test]
    fn test_turn_serialization() {
        let turn = ChatTurn::user("test");
        let json = serde_json::to_string(&turn).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"test"}"#);
        assert_eq!(turn.to_value(), json!({"role": "user", "content": "test"}));
    }

    #[test]
    fn test_wire_parameters_extras_override_base_keys() {
        let mut params = ParameterBag::new();
        params.insert("model".into(), json!("override"));
        let request = GenerationRequest {
            model: "m".into(),
            turns: vec![ChatTurn::user("hi")],
            params,
            stream: false,
        };

        let wire = request.wire_parameters();
        assert_eq!(wire["model"], json!("override"));
        assert_eq!(request.effective_model(), "override");
        assert_eq!(wire.keys().collect::<Vec<_>>(), vec!["model", "stream", "messages"]);
    }
}
