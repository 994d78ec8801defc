//! 统一错误处理模块
//!
//! 定义调用方可见的错误分类。适配器内部产生的传输错误在边界处统一归类为
//! `Authentication` / `Timeout` / `BackendRequest` / `Network` 之一，
//! 原始错误信息保留在消息中。

use std::error::Error as StdError;

use thiserror::Error;

/// 包装层错误枚举
#[derive(Error, Debug)]
pub enum WrapperError {
    /// 调用方传入的消息或参数不合法（在任何网络请求之前抛出）
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// 未注册的提供商名称
    #[error("不支持的提供商: {0}")]
    UnsupportedProvider(String),

    /// 凭据缺失或被后端拒绝
    #[error("认证失败: {0}")]
    Authentication(String),

    /// 请求超过截止时间
    #[error("请求超时: {0}")]
    Timeout(String),

    /// 后端拒绝了请求（模型不存在、请求体格式错误等）
    #[error("后端请求错误{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    BackendRequest { status: Option<u16>, message: String },

    /// 传输层失败（连接被拒绝、被重置等）
    #[error("网络错误: {0}")]
    Network(String),

    /// 配置或密钥存储错误
    #[error("配置错误: {0}")]
    Config(String),
}

impl WrapperError {
    /// 构造不带状态码的后端错误
    pub fn backend(message: impl Into<String>) -> Self {
        Self::BackendRequest {
            status: None,
            message: message.into(),
        }
    }

    /// 按 HTTP 状态码归类非成功响应
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => Self::Authentication(format!("HTTP {status}: {body}")),
            408 => Self::Timeout(format!("HTTP {status}: {body}")),
            _ => Self::BackendRequest {
                status: Some(status),
                message: body,
            },
        }
    }

    /// 调用方是否可以自行重试（本库不做任何自动重试）
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Network(_))
    }
}

/// 拼接错误及其 source 链，避免丢失底层原因（例如 "Connection refused"）
pub fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}

impl From<reqwest::Error> for WrapperError {
    fn from(err: reqwest::Error) -> Self {
        let message = error_chain(&err);
        if err.is_timeout() {
            Self::Timeout(message)
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), message)
        } else if err.is_decode() {
            Self::backend(format!("无法解析响应: {message}"))
        } else {
            Self::Network(message)
        }
    }
}

impl From<serde_json::Error> for WrapperError {
    fn from(err: serde_json::Error) -> Self {
        Self::backend(format!("无法解析响应: {err}"))
    }
}

/// 便捷类型别名
pub type WrapperResult<T> = Result<T, WrapperError>;
