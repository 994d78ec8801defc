//! 提供商适配器接口

use async_trait::async_trait;
use std::sync::Arc;

use super::catalog::{single_group, CatalogGroup};
use super::stream::Generation;
use super::types::{GenerationRequest, ModelDescriptor, ModelFilters};
use crate::config::{EnvFileSecrets, SecretProvider, Settings};
use crate::error::WrapperResult;
use crate::logging::Logger;

/// 所有后端共用的默认系统提示
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// 构造适配器所需的上下文
#[derive(Clone)]
pub struct ProviderContext {
    pub settings: Settings,
    pub secrets: Arc<dyn SecretProvider>,
    pub logger: Logger,
}

impl ProviderContext {
    pub fn new(settings: Settings, secrets: Arc<dyn SecretProvider>) -> Self {
        let logger = Logger::new(settings.show_logs);
        Self {
            settings,
            secrets,
            logger,
        }
    }

    /// 使用配置中的 `.env` 路径作为凭据来源
    pub fn from_settings(settings: Settings) -> Self {
        let secrets = Arc::new(EnvFileSecrets::new(settings.env_file.clone()));
        Self::new(settings, secrets)
    }

    /// 基础 URL：配置覆盖优先
    pub fn base_url(&self, provider: &str, default: &str) -> String {
        self.settings
            .base_url_for(provider)
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }
}

/// LLM 提供商适配器
///
/// 适配器在构造时拿到凭据和 HTTP 客户端，之后不再修改。
/// 所有失败都以 `Authentication` / `Timeout` / `BackendRequest` / `Network`
/// 之一返回。
#[async_trait]
pub trait Provider: Send + Sync {
    /// 注册名
    fn name(&self) -> &'static str;

    fn logger(&self) -> &Logger;

    /// 调用方没给 system 时使用的系统提示
    fn default_system_prompt(&self) -> Option<&str> {
        None
    }

    /// 是否需要在发送前清理控制字符
    fn sanitizes_input(&self) -> bool {
        false
    }

    /// 发出一次生成请求
    ///
    /// 非流式返回裁剪后的完整文本；流式返回片段流，片段到达时写到标准输出。
    async fn generate(&self, request: GenerationRequest) -> WrapperResult<Generation>;

    /// 查询模型目录，失败时返回错误
    async fn fetch_models(&self, filters: &ModelFilters) -> WrapperResult<Vec<ModelDescriptor>>;

    /// 查询模型目录；失败时记录一条警告并返回空列表
    async fn list_models(&self, filters: &ModelFilters) -> Vec<ModelDescriptor> {
        match self.fetch_models(filters).await {
            Ok(models) => models,
            Err(e) => {
                self.logger().warn(format!("Failed to retrieve models: {e}"));
                Vec::new()
            }
        }
    }

    /// 日志中的模型分组方式
    fn catalog_groups<'a>(&self, models: &'a [ModelDescriptor]) -> Vec<CatalogGroup<'a>> {
        single_group(self.name(), models)
    }
}
