//! 提供商注册表
//!
//! 名称到构造函数的静态映射，构造函数只在查找成功后才会被调用。

use once_cell::sync::Lazy;
use std::collections::BTreeMap;

use super::anthropic::AnthropicProvider;
use super::bedrock::BedrockProvider;
use super::ollama::OllamaProvider;
use super::openai::OpenAiProvider;
use super::provider::{Provider, ProviderContext};
use crate::error::{WrapperError, WrapperResult};

/// 适配器构造函数
pub type Constructor = fn(&ProviderContext) -> WrapperResult<Box<dyn Provider>>;

fn anthropic(ctx: &ProviderContext) -> WrapperResult<Box<dyn Provider>> {
    Ok(Box::new(AnthropicProvider::new(ctx)?))
}

fn openai(ctx: &ProviderContext) -> WrapperResult<Box<dyn Provider>> {
    Ok(Box::new(OpenAiProvider::openai(ctx)?))
}

fn groq(ctx: &ProviderContext) -> WrapperResult<Box<dyn Provider>> {
    Ok(Box::new(OpenAiProvider::groq(ctx)?))
}

fn mistral(ctx: &ProviderContext) -> WrapperResult<Box<dyn Provider>> {
    Ok(Box::new(OpenAiProvider::mistral(ctx)?))
}

fn azure(ctx: &ProviderContext) -> WrapperResult<Box<dyn Provider>> {
    Ok(Box::new(OpenAiProvider::azure(ctx)?))
}

fn ollama(ctx: &ProviderContext) -> WrapperResult<Box<dyn Provider>> {
    Ok(Box::new(OllamaProvider::new(ctx)?))
}

fn bedrock(ctx: &ProviderContext) -> WrapperResult<Box<dyn Provider>> {
    Ok(Box::new(BedrockProvider::new(ctx)?))
}

static REGISTRY: Lazy<BTreeMap<&'static str, Constructor>> = Lazy::new(|| {
    let entries: [(&'static str, Constructor); 7] = [
        ("anthropic", anthropic),
        ("openai", openai),
        ("ollama", ollama),
        ("groq", groq),
        ("bedrock", bedrock),
        ("azure", azure),
        ("mistral", mistral),
    ];
    entries.into_iter().collect()
});

/// 按名称查找（忽略大小写和首尾空白）
pub fn lookup(name: &str) -> WrapperResult<Constructor> {
    let key = name.trim().to_ascii_lowercase();
    REGISTRY
        .get(key.as_str())
        .copied()
        .ok_or_else(|| WrapperError::UnsupportedProvider(name.to_string()))
}

/// 查找并构造适配器
pub fn create(name: &str, ctx: &ProviderContext) -> WrapperResult<Box<dyn Provider>> {
    let constructor = lookup(name)?;
    constructor(ctx)
}

/// 已注册的提供商名称（字母序）
pub fn supported_providers() -> Vec<&'static str> {
    REGISTRY.keys().copied().collect()
}
