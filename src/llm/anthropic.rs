//! Anthropic Messages API 实现
//!
//! 系统提示走独立的 `system` 字段，`max_tokens` 必填。
//! 事件解析与请求体构建同时供 Bedrock 使用。

use async_stream::try_stream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::format::{build_anthropic_endpoint, build_anthropic_models_endpoint};
use super::http::{build_client, lines, read_json, send, sse_data, LineStream};
use super::messages::split_system;
use super::provider::{Provider, ProviderContext, DEFAULT_SYSTEM_PROMPT};
use super::stream::{finish, FragmentStream, Generation};
use super::types::{ChatTurn, GenerationRequest, ModelDescriptor, ModelFilters};
use crate::error::{WrapperError, WrapperResult};
use crate::logging::Logger;
use crate::utils::mask_secret;

/// 调用方未设置 `max_tokens` 时发送的值
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// 构建 Messages 请求体
///
/// `base` 中的键在最前；随后是 `max_tokens`、`system`、`messages`；
/// 参数包最后写入并覆盖同名键。没有 system 消息时使用 `default_system`。
pub(crate) fn messages_body(
    base: Map<String, Value>,
    request: &GenerationRequest,
    default_system: Option<&str>,
) -> Map<String, Value> {
    let (system, rest) = split_system(&request.turns);

    let mut body = base;
    body.insert("max_tokens".to_string(), json!(DEFAULT_MAX_TOKENS));
    if let Some(system) = system.or_else(|| default_system.map(str::to_string)) {
        body.insert("system".to_string(), Value::String(system));
    }
    body.insert(
        "messages".to_string(),
        Value::Array(rest.iter().map(ChatTurn::to_value).collect()),
    );
    for (key, value) in &request.params {
        body.insert(key.clone(), value.clone());
    }
    body
}

/// 流式事件
#[derive(Deserialize, Debug)]
pub(crate) struct AnthropicEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<AnthropicDelta>,
    #[serde(default)]
    error: Option<AnthropicErrorBody>,
}

#[derive(Deserialize, Debug)]
struct AnthropicDelta {
    #[serde(rename = "type")]
    delta_type: Option<String>,
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct AnthropicErrorBody {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: Option<String>,
}

/// 单个事件的处理结果
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum EventOutcome {
    Text(String),
    Stop,
    Error(String),
    Skip,
}

impl AnthropicEvent {
    /// 先按事件类型过滤，再取文本
    pub(crate) fn outcome(self) -> EventOutcome {
        match self.event_type.as_str() {
            "content_block_delta" => match self.delta {
                Some(AnthropicDelta {
                    delta_type,
                    text: Some(text),
                }) if delta_type.as_deref() == Some("text_delta") && !text.is_empty() => {
                    EventOutcome::Text(text)
                }
                _ => EventOutcome::Skip,
            },
            "message_stop" => EventOutcome::Stop,
            "error" => {
                let error = self.error.unwrap_or(AnthropicErrorBody {
                    error_type: None,
                    message: None,
                });
                EventOutcome::Error(format!(
                    "{}: {}",
                    error.error_type.unwrap_or_else(|| "error".to_string()),
                    error.message.unwrap_or_default()
                ))
            }
            _ => EventOutcome::Skip,
        }
    }
}

/// 非流式响应
#[derive(Deserialize, Debug)]
pub(crate) struct MessageResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize, Debug)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: Option<String>,
    text: Option<String>,
}

impl MessageResponse {
    /// 拼接全部文本块并裁剪
    pub(crate) fn into_text(self) -> WrapperResult<String> {
        let texts: Vec<String> = self
            .content
            .into_iter()
            .filter(|block| block.block_type.as_deref().unwrap_or("text") == "text")
            .filter_map(|block| block.text)
            .collect();

        if texts.is_empty() {
            return Err(WrapperError::backend("响应中没有文本内容"));
        }
        Ok(texts.concat().trim().to_string())
    }
}

#[derive(Deserialize, Debug)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize, Debug)]
struct ModelEntry {
    id: Option<String>,
    display_name: Option<String>,
    created_at: Option<String>,
}

/// Anthropic 适配器
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    logger: Logger,
}

impl AnthropicProvider {
    pub fn new(ctx: &ProviderContext) -> WrapperResult<Self> {
        let api_key = ctx
            .secrets
            .get_or_prompt("ANTHROPIC_API_KEY", "Please enter your Anthropic API Key")?;
        let logger = ctx.logger.for_provider("anthropic");
        logger.debug(format!("Client ready: api_key={}", mask_secret(&api_key)));

        Ok(Self {
            client: build_client(&ctx.settings)?,
            api_key,
            base_url: ctx.base_url("anthropic", "https://api.anthropic.com"),
            logger,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
    }
}

/// 从 SSE 行中提取文本增量
fn event_stream(mut lines: LineStream, logger: Logger) -> FragmentStream {
    Box::pin(try_stream! {
        while let Some(line) = lines.next().await {
            let line = line?;
            let Some(data) = sse_data(&line) else {
                continue;
            };

            let event = match serde_json::from_str::<AnthropicEvent>(data) {
                Ok(event) => event,
                Err(e) => {
                    logger.debug(format!("Failed to parse event: {}, data: {}", e, data));
                    continue;
                }
            };

            match event.outcome() {
                EventOutcome::Text(text) => {
                    yield text;
                }
                EventOutcome::Stop => break,
                EventOutcome::Error(message) => {
                    logger.error(format!("Stream error event: {message}"));
                    Err::<(), _>(WrapperError::backend(message))?;
                }
                EventOutcome::Skip => {}
            }
        }
    })
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn logger(&self) -> &Logger {
        &self.logger
    }

    fn default_system_prompt(&self) -> Option<&str> {
        Some(DEFAULT_SYSTEM_PROMPT)
    }

    fn sanitizes_input(&self) -> bool {
        true
    }

    async fn generate(&self, request: GenerationRequest) -> WrapperResult<Generation> {
        let mut base = Map::new();
        base.insert("model".to_string(), Value::String(request.model.clone()));
        base.insert("stream".to_string(), Value::Bool(request.stream));
        let body = messages_body(base, &request, Some(DEFAULT_SYSTEM_PROMPT));

        let endpoint = build_anthropic_endpoint(&self.base_url);
        self.logger.debug(format!(
            "Messages request: endpoint={}, model={}, stream={}",
            endpoint, request.model, request.stream
        ));

        let response = send(
            self.authorize(self.client.post(&endpoint)).json(&body),
            &self.logger,
        )
        .await?;

        if request.stream {
            let fragments = event_stream(lines(response), self.logger);
            return finish(fragments, true, self.logger).await;
        }

        let message: MessageResponse = read_json(response).await?;
        let text = message.into_text()?;
        self.logger.success(format!("Received response from {}", request.model));
        Ok(Generation::Text(text))
    }

    async fn fetch_models(&self, _filters: &ModelFilters) -> WrapperResult<Vec<ModelDescriptor>> {
        let endpoint = build_anthropic_models_endpoint(&self.base_url);
        let response = send(self.authorize(self.client.get(&endpoint)), &self.logger).await?;
        let listing: ModelList = read_json(response).await?;

        let models: Vec<ModelDescriptor> = listing
            .data
            .into_iter()
            .filter_map(|entry| {
                let id = entry.id.filter(|id| !id.is_empty())?;
                let created_at = entry
                    .created_at
                    .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                    .map(|dt| dt.with_timezone(&Utc));
                let mut model = ModelDescriptor::new(id).with_created_at(created_at);
                if let Some(name) = entry.display_name {
                    model = model.with_display_name(name);
                }
                Some(model)
            })
            .collect();

        if models.is_empty() {
            self.logger.warn("No models found from API!");
        }
        Ok(models)
    }
}
