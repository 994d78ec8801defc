//! OpenAI Chat Completions 兼容实现
//!
//! openai / groq / mistral / azure 共用同一套请求与解析逻辑，
//! 区别只在端点、认证头和默认系统提示。

use async_stream::try_stream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

use super::catalog::{group_by_category, single_group, CatalogGroup};
use super::format::{
    build_azure_chat_endpoint, build_azure_models_endpoint, build_openai_endpoint,
    build_openai_models_endpoint, normalize_azure_endpoint,
};
use super::http::{build_client, lines, read_json, send, sse_data, LineStream};
use super::provider::{Provider, ProviderContext, DEFAULT_SYSTEM_PROMPT};
use super::stream::{finish, FragmentStream, Generation};
use super::types::{GenerationRequest, ModelDescriptor, ModelFilters};
use crate::error::{WrapperError, WrapperResult};
use crate::logging::Logger;
use crate::utils::mask_secret;

/// 请求目标
#[derive(Debug, Clone)]
enum Target {
    /// Bearer 认证，固定的 base URL
    Standard { base_url: String },
    /// Azure 部署：`api-key` 头加 `api-version` 查询参数，模型名即部署名
    Azure {
        endpoint: String,
        api_version: String,
    },
}

/// OpenAI 兼容适配器
pub struct OpenAiProvider {
    name: &'static str,
    client: Client,
    api_key: String,
    target: Target,
    logger: Logger,
}

impl OpenAiProvider {
    pub fn openai(ctx: &ProviderContext) -> WrapperResult<Self> {
        Self::standard(
            ctx,
            "openai",
            "OPENAI_API_KEY",
            "Please enter your OpenAI API Key",
            "https://api.openai.com",
        )
    }

    pub fn groq(ctx: &ProviderContext) -> WrapperResult<Self> {
        Self::standard(
            ctx,
            "groq",
            "GROQ_API_KEY",
            "Please enter your Groq API Key",
            "https://api.groq.com/openai/v1",
        )
    }

    pub fn mistral(ctx: &ProviderContext) -> WrapperResult<Self> {
        Self::standard(
            ctx,
            "mistral",
            "MISTRAL_API_KEY",
            "Please enter your Mistral API Key",
            "https://api.mistral.ai/v1",
        )
    }

    pub fn azure(ctx: &ProviderContext) -> WrapperResult<Self> {
        let api_key = ctx
            .secrets
            .get_or_prompt("AZURE_OPENAI_API_KEY", "Please enter your Azure OpenAI API Key")?;
        let endpoint = match ctx.settings.base_url_for("azure") {
            Some(url) => url.to_string(),
            None => ctx.secrets.get_or_prompt(
                "AZURE_OPENAI_ENDPOINT",
                "Please enter your Azure OpenAI Endpoint (e.g., https://your-resource.openai.azure.com)",
            )?,
        };
        let api_version = ctx.secrets.get_or_prompt(
            "AZURE_OPENAI_API_VERSION",
            "Please enter Azure OpenAI API Version (e.g., 2024-10-21)",
        )?;

        let target = Target::Azure {
            endpoint: normalize_azure_endpoint(&endpoint),
            api_version,
        };
        Self::build(ctx, "azure", api_key, target)
    }

    fn standard(
        ctx: &ProviderContext,
        name: &'static str,
        key_var: &str,
        key_prompt: &str,
        default_base_url: &str,
    ) -> WrapperResult<Self> {
        let api_key = ctx.secrets.get_or_prompt(key_var, key_prompt)?;
        let base_url = ctx.base_url(name, default_base_url);
        Self::build(ctx, name, api_key, Target::Standard { base_url })
    }

    fn build(
        ctx: &ProviderContext,
        name: &'static str,
        api_key: String,
        target: Target,
    ) -> WrapperResult<Self> {
        let logger = ctx.logger.for_provider(name);
        logger.debug(format!(
            "Client ready: target={:?}, api_key={}",
            target,
            mask_secret(&api_key)
        ));

        Ok(Self {
            name,
            client: build_client(&ctx.settings)?,
            api_key,
            target,
            logger,
        })
    }

    fn is_azure(&self) -> bool {
        matches!(self.target, Target::Azure { .. })
    }

    fn chat_request(&self, model: &str) -> RequestBuilder {
        match &self.target {
            Target::Standard { base_url } => self
                .client
                .post(build_openai_endpoint(base_url))
                .bearer_auth(&self.api_key),
            Target::Azure {
                endpoint,
                api_version,
            } => self
                .client
                .post(build_azure_chat_endpoint(endpoint, model))
                .header("api-key", &self.api_key)
                .query(&[("api-version", api_version)]),
        }
    }

    fn models_request(&self) -> RequestBuilder {
        match &self.target {
            Target::Standard { base_url } => self
                .client
                .get(build_openai_models_endpoint(base_url))
                .bearer_auth(&self.api_key),
            Target::Azure {
                endpoint,
                api_version,
            } => self
                .client
                .get(build_azure_models_endpoint(endpoint))
                .header("api-key", &self.api_key)
                .query(&[("api-version", api_version)]),
        }
    }
}

/// 非流式响应
#[derive(Deserialize, Debug)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize, Debug)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize, Debug)]
struct CompletionMessage {
    content: Option<String>,
}

/// SSE 响应块
#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Debug, Default)]
struct StreamDelta {
    content: Option<String>,
}

/// 模型列表
#[derive(Deserialize, Debug)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize, Debug)]
struct ModelEntry {
    id: String,
    created: Option<i64>,
    created_at: Option<i64>,
    owned_by: Option<String>,
    capabilities: Option<AzureCapabilities>,
}

/// Azure 模型能力标记
#[derive(Deserialize, Debug, Default)]
struct AzureCapabilities {
    #[serde(default)]
    chat_completion: bool,
    #[serde(default)]
    completion: bool,
    #[serde(default)]
    embeddings: bool,
}

impl ModelEntry {
    fn into_descriptor(self) -> ModelDescriptor {
        let created_at = self
            .created
            .or(self.created_at)
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

        let mut descriptor = ModelDescriptor::new(self.id).with_created_at(created_at);
        if let Some(owner) = self.owned_by {
            descriptor = descriptor.with_provider(owner);
        }
        if let Some(caps) = self.capabilities {
            for (enabled, tag) in [
                (caps.chat_completion, "chat"),
                (caps.completion, "completion"),
                (caps.embeddings, "embeddings"),
            ] {
                if enabled {
                    descriptor = descriptor.with_capability(tag);
                }
            }
        }
        descriptor
    }
}

/// 从 SSE 行中提取 `choices[0].delta.content`
///
/// 遇到 `[DONE]` 结束；无法解析的行记录后跳过。
fn delta_stream(mut lines: LineStream, logger: Logger) -> FragmentStream {
    Box::pin(try_stream! {
        while let Some(line) = lines.next().await {
            let line = line?;
            let Some(data) = sse_data(&line) else {
                continue;
            };
            if data == "[DONE]" {
                break;
            }

            match serde_json::from_str::<StreamChunk>(data) {
                Ok(chunk) => {
                    let content = chunk
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.delta.content);
                    if let Some(text) = content.filter(|t| !t.is_empty()) {
                        yield text;
                    }
                }
                Err(e) => {
                    logger.debug(format!("Failed to parse stream chunk: {}, data: {}", e, data));
                }
            }
        }
    })
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn logger(&self) -> &Logger {
        &self.logger
    }

    fn default_system_prompt(&self) -> Option<&str> {
        self.is_azure().then_some(DEFAULT_SYSTEM_PROMPT)
    }

    fn sanitizes_input(&self) -> bool {
        self.is_azure()
    }

    async fn generate(&self, request: GenerationRequest) -> WrapperResult<Generation> {
        let model = request.effective_model().to_string();
        let body = request.wire_parameters();
        self.logger.debug(format!(
            "Chat completion request: model={}, stream={}",
            model, request.stream
        ));

        let response = send(self.chat_request(&model).json(&body), &self.logger).await?;

        if request.stream {
            let fragments = delta_stream(lines(response), self.logger);
            return finish(fragments, true, self.logger).await;
        }

        let completion: ChatCompletion = read_json(response).await?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| WrapperError::backend("响应中没有 choices"))?;
        self.logger.success(format!("Received response from {model}"));
        Ok(Generation::Text(
            choice.message.content.unwrap_or_default().trim().to_string(),
        ))
    }

    async fn fetch_models(&self, _filters: &ModelFilters) -> WrapperResult<Vec<ModelDescriptor>> {
        let response = send(self.models_request(), &self.logger).await?;
        let listing: ModelList = read_json(response).await?;

        let mut models: Vec<ModelDescriptor> = listing
            .data
            .into_iter()
            .map(ModelEntry::into_descriptor)
            .collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));

        if models.is_empty() {
            self.logger.warn("No models found from API!");
        }
        Ok(models)
    }

    fn catalog_groups<'a>(&self, models: &'a [ModelDescriptor]) -> Vec<CatalogGroup<'a>> {
        if self.name == "openai" {
            group_by_category(models)
        } else {
            single_group(self.name, models)
        }
    }
}
