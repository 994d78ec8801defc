//! Amazon Bedrock 上的 Anthropic 模型
//!
//! 认证只支持 Bedrock API key（Bearer，`AWS_BEARER_TOKEN_BEDROCK`），
//! 不做 access key 的 SigV4 签名。流式响应是 AWS event-stream 二进制帧，
//! 每个 `chunk` 事件的负载为 `{"bytes": base64(json)}`，解码后即 Anthropic 流式事件。

use async_stream::try_stream;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::StreamExt;
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::anthropic::{messages_body, AnthropicEvent, EventOutcome, MessageResponse};
use super::catalog::{group_by_vendor, CatalogGroup};
use super::event_stream::{EventMessage, EventStreamDecoder};
use super::format::{bedrock_control_base, bedrock_runtime_base};
use super::http::{build_client, read_json, send};
use super::provider::{Provider, ProviderContext};
use super::stream::{finish, FragmentStream, Generation};
use super::types::{GenerationRequest, ModelDescriptor, ModelFilters};
use crate::error::{WrapperError, WrapperResult};
use crate::logging::Logger;
use crate::utils::mask_secret;

const BEDROCK_ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

const TOKEN_KEY: &str = "AWS_BEARER_TOKEN_BEDROCK";

/// 模型目录地址在配置中的覆盖键
const CATALOG_URL_KEY: &str = "bedrock-catalog";

/// Bedrock 适配器
pub struct BedrockProvider {
    client: Client,
    token: String,
    runtime_base: String,
    control_base: String,
    logger: Logger,
}

impl BedrockProvider {
    pub fn new(ctx: &ProviderContext) -> WrapperResult<Self> {
        let region = ctx
            .secrets
            .get_or_prompt("AWS_REGION", "Enter your AWS region")?;
        let logger = ctx.logger.for_provider("bedrock");
        if ctx.secrets.get_silent(TOKEN_KEY).is_none()
            && ctx.secrets.get_silent("AWS_ACCESS_KEY_ID").is_some()
        {
            logger.warn(format!(
                "AWS_ACCESS_KEY_ID is set but access-key (SigV4) signing is not supported; \
                 set a Bedrock API key in {TOKEN_KEY} instead."
            ));
        }
        let token = ctx.secrets.get_or_prompt(
            TOKEN_KEY,
            "Enter your Amazon Bedrock API key (AWS_BEARER_TOKEN_BEDROCK, not an access key)",
        )?;

        logger.debug(format!(
            "Client ready: region={}, token={}",
            region,
            mask_secret(&token)
        ));

        Ok(Self {
            client: build_client(&ctx.settings)?,
            token,
            runtime_base: ctx.base_url("bedrock", &bedrock_runtime_base(&region)),
            control_base: ctx.base_url(CATALOG_URL_KEY, &bedrock_control_base(&region)),
            logger,
        })
    }

    /// `{runtime}/model/{id}/invoke[-with-response-stream]`，模型 ID 按路径段编码
    fn invoke_url(&self, model: &str, stream: bool) -> WrapperResult<Url> {
        let invalid = || WrapperError::Config(format!("无效的 Bedrock 地址: {}", self.runtime_base));
        let mut url = Url::parse(&self.runtime_base).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .push("model")
            .push(model)
            .push(if stream {
                "invoke-with-response-stream"
            } else {
                "invoke"
            });
        Ok(url)
    }
}

/// `chunk` 事件负载
#[derive(Deserialize, Debug)]
struct ChunkPayload {
    bytes: String,
}

/// 解出 `chunk` 帧里的 Anthropic 事件；其他事件类型返回 `None`
fn decode_chunk(message: &EventMessage, logger: &Logger) -> WrapperResult<Option<AnthropicEvent>> {
    if let Some(kind @ ("exception" | "error")) = message.message_type() {
        let name = message
            .exception_type()
            .or_else(|| message.header_str(":error-code"))
            .unwrap_or(kind);
        let detail = String::from_utf8_lossy(&message.payload);
        logger.error(format!("Stream {kind}: {name}: {detail}"));
        return Err(WrapperError::backend(format!("{name}: {detail}")));
    }

    if message.event_type() != Some("chunk") {
        return Ok(None);
    }

    let decoded = serde_json::from_slice::<ChunkPayload>(&message.payload)
        .map_err(|e| e.to_string())
        .and_then(|chunk| BASE64.decode(chunk.bytes).map_err(|e| e.to_string()))
        .and_then(|raw| serde_json::from_slice::<AnthropicEvent>(&raw).map_err(|e| e.to_string()));

    match decoded {
        Ok(event) => Ok(Some(event)),
        Err(e) => {
            logger.debug(format!("Failed to decode chunk: {e}"));
            Ok(None)
        }
    }
}

fn chunk_stream(response: Response, logger: Logger) -> FragmentStream {
    Box::pin(try_stream! {
        let mut decoder = EventStreamDecoder::new();
        let mut body = response.bytes_stream();

        'frames: while let Some(bytes) = body.next().await {
            let bytes = bytes?;
            decoder.push(&bytes);

            while let Some(message) = decoder.next_message()? {
                let Some(event) = decode_chunk(&message, &logger)? else {
                    continue;
                };
                match event.outcome() {
                    EventOutcome::Text(text) => {
                        yield text;
                    }
                    EventOutcome::Stop => break 'frames,
                    EventOutcome::Error(message) => {
                        Err::<(), _>(WrapperError::backend(message))?;
                    }
                    EventOutcome::Skip => {}
                }
            }
        }

        if decoder.has_remaining() {
            logger.debug("Stream ended with a partial frame");
        }
    })
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FoundationModels {
    #[serde(default)]
    model_summaries: Vec<ModelSummary>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ModelSummary {
    model_id: String,
    model_name: Option<String>,
    provider_name: Option<String>,
    #[serde(default)]
    input_modalities: Vec<String>,
    #[serde(default)]
    output_modalities: Vec<String>,
    #[serde(default)]
    response_streaming_supported: bool,
}

impl ModelSummary {
    fn into_descriptor(self) -> ModelDescriptor {
        let mut model = ModelDescriptor::new(self.model_id);
        if let Some(name) = self.model_name {
            model = model.with_display_name(name);
        }
        if let Some(provider) = self.provider_name {
            model = model.with_provider(provider);
        }
        for modality in &self.input_modalities {
            model = model.with_capability(format!("input:{}", modality.to_ascii_lowercase()));
        }
        for modality in &self.output_modalities {
            model = model.with_capability(format!("output:{}", modality.to_ascii_lowercase()));
        }
        if self.response_streaming_supported {
            model = model.with_capability("streaming");
        }
        model
    }
}

#[async_trait]
impl Provider for BedrockProvider {
    fn name(&self) -> &'static str {
        "bedrock"
    }

    fn logger(&self) -> &Logger {
        &self.logger
    }

    async fn generate(&self, request: GenerationRequest) -> WrapperResult<Generation> {
        let model = request.effective_model().to_string();
        let mut base = Map::new();
        base.insert(
            "anthropic_version".to_string(),
            Value::String(BEDROCK_ANTHROPIC_VERSION.to_string()),
        );
        let body = messages_body(base, &request, None);

        let url = self.invoke_url(&model, request.stream)?;
        self.logger.debug(format!("Invoke request: url={}, stream={}", url, request.stream));

        let http_request = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .header("accept", "application/json")
            .json(&body);
        let response = send(http_request, &self.logger).await?;

        if request.stream {
            return finish(chunk_stream(response, self.logger), true, self.logger).await;
        }

        let message: MessageResponse = read_json(response).await?;
        let text = message.into_text()?;
        self.logger.success(format!("Received response from {model}"));
        Ok(Generation::Text(text))
    }

    async fn fetch_models(&self, filters: &ModelFilters) -> WrapperResult<Vec<ModelDescriptor>> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(provider) = filters.by_provider.as_deref() {
            query.push(("byProvider", provider));
        }
        if let Some(modality) = filters.by_output_modality.as_deref() {
            query.push(("byOutputModality", modality));
        }

        let endpoint = format!("{}/foundation-models", self.control_base);
        let request = self
            .client
            .get(&endpoint)
            .bearer_auth(&self.token)
            .query(&query);
        let response = send(request, &self.logger).await?;
        let listing: FoundationModels = read_json(response).await?;

        Ok(listing
            .model_summaries
            .into_iter()
            .map(ModelSummary::into_descriptor)
            .collect())
    }

    fn catalog_groups<'a>(&self, models: &'a [ModelDescriptor]) -> Vec<CatalogGroup<'a>> {
        group_by_vendor(models)
    }
}
