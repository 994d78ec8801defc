//! 消息规范化
//!
//! 把调用方给出的 `prompt` / `user` / `system` / `messages` 转换为有序的对话列表，
//! 并提供清理、系统提示提取、单文本拼接等工具函数。

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::types::{ChatTurn, ConversationTurns, Role};
use crate::error::{WrapperError, WrapperResult};

/// C0 / C1 控制字符（保留 \t \n \r）
static CONTROL_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x{00}-\x{08}\x{0B}\x{0C}\x{0E}-\x{1F}\x{7F}-\x{9F}]")
        .expect("control character pattern is valid")
});

/// 调用方的原始输入
#[derive(Debug, Clone, Default)]
pub struct PromptInput {
    pub prompt: Option<String>,
    pub user: Option<String>,
    pub system: Option<String>,
    /// 显式消息列表，每个元素必须是只含 `role` 和 `content` 的对象
    pub messages: Option<Vec<Value>>,
}

/// 去除控制字符并裁剪首尾空白
///
/// 只用于防御协议/请求头注入，可打印字符不会被改动。
pub fn sanitize(text: &str) -> String {
    CONTROL_CHARS.replace_all(text, "").trim().to_string()
}

/// 生成对话列表
///
/// - 给了 `messages` 时只校验并使用它，其余三项忽略
/// - 否则按 system（或适配器默认系统提示）→ user（或 prompt）的顺序生成
pub fn normalize(
    input: &PromptInput,
    default_system_prompt: Option<&str>,
    sanitize_content: bool,
) -> WrapperResult<ConversationTurns> {
    if let Some(messages) = &input.messages {
        return validate_messages(messages, sanitize_content);
    }

    let clean = |text: &Option<String>| -> Option<String> {
        let text = text.as_deref()?;
        let text = if sanitize_content {
            sanitize(text)
        } else {
            text.to_string()
        };
        (!text.is_empty()).then_some(text)
    };

    let mut turns = Vec::with_capacity(2);

    if let Some(system) = clean(&input.system) {
        turns.push(ChatTurn::system(system));
    } else if let Some(default) = default_system_prompt {
        turns.push(ChatTurn::system(default));
    }

    // user 优先于 prompt
    if let Some(user) = clean(&input.user).or_else(|| clean(&input.prompt)) {
        turns.push(ChatTurn::user(user));
    }

    Ok(turns)
}

/// 校验显式消息列表
pub fn validate_messages(
    messages: &[Value],
    sanitize_content: bool,
) -> WrapperResult<ConversationTurns> {
    messages
        .iter()
        .enumerate()
        .map(|(index, message)| validate_message(index, message, sanitize_content))
        .collect()
}

fn validate_message(index: usize, message: &Value, sanitize_content: bool) -> WrapperResult<ChatTurn> {
    let invalid = |reason: String| WrapperError::InvalidInput(format!("messages[{index}]: {reason}"));

    let object = message
        .as_object()
        .ok_or_else(|| invalid("必须是对象".to_string()))?;

    if object.len() != 2 || !object.contains_key("role") || !object.contains_key("content") {
        let keys: Vec<&str> = object.keys().map(String::as_str).collect();
        return Err(invalid(format!(
            "必须恰好包含 role 和 content 两个键，实际为 {keys:?}"
        )));
    }

    let role = object
        .get("role")
        .and_then(Value::as_str)
        .and_then(Role::parse)
        .ok_or_else(|| {
            invalid(format!(
                "role 必须是 system / user / assistant 之一，实际为 {}",
                object["role"]
            ))
        })?;

    let content = object
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("content 必须是字符串".to_string()))?;

    let cleaned = sanitize(content);
    if cleaned.is_empty() {
        return Err(invalid("content 清理后为空".to_string()));
    }

    let content = if sanitize_content {
        cleaned
    } else {
        content.to_string()
    };
    Ok(ChatTurn::new(role, content))
}

/// 拆出系统提示
///
/// 多条 system 消息按顺序以换行拼接；其余消息保持原顺序返回。
pub fn split_system(turns: &[ChatTurn]) -> (Option<String>, Vec<ChatTurn>) {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut rest = Vec::with_capacity(turns.len());

    for turn in turns {
        match turn.role {
            Role::System => system_parts.push(&turn.content),
            _ => rest.push(turn.clone()),
        }
    }

    let system = (!system_parts.is_empty()).then(|| system_parts.join("\n"));
    (system, rest)
}

/// 拼接为单个文本提示（本地推理后端使用）
///
/// system 内容与 user 内容之间空一行；assistant 消息会被丢弃，
/// 多轮对话在这里是有损的。
pub fn flatten_prompt(turns: &[ChatTurn]) -> String {
    let join_role = |role: Role| {
        turns
            .iter()
            .filter(|t| t.role == role)
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!("{}\n\n{}", join_role(Role::System), join_role(Role::User))
        .trim()
        .to_string()
}
