//! Ollama 本地推理后端
//!
//! 使用 `/api/generate`：对话被拼接为单个提示，请求中不设置 `stream`，
//! 服务端总是返回 NDJSON，每行带一个 `response` 片段和 `done` 标记。

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::format::build_ollama_endpoint;
use super::http::{build_client, lines, read_json, send, LineStream};
use super::messages::flatten_prompt;
use super::provider::{Provider, ProviderContext};
use super::stream::{finish, FragmentStream, Generation};
use super::types::{GenerationRequest, ModelDescriptor, ModelFilters};
use crate::error::{WrapperError, WrapperResult};
use crate::logging::Logger;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// 放进 `options` 的采样参数，以及在 Ollama 中的名字
const OPTION_KEYS: [(&str, &str); 5] = [
    ("temperature", "temperature"),
    ("top_p", "top_p"),
    ("frequency_penalty", "frequency_penalty"),
    ("presence_penalty", "presence_penalty"),
    ("max_tokens", "num_predict"),
];

/// 构建 `/api/generate` 请求体
///
/// 采样参数进入 `options`，其余参数放在顶层。
fn generate_body(model: &str, prompt: String, params: &Map<String, Value>) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.to_string()));
    body.insert("prompt".to_string(), Value::String(prompt));

    let mut options = Map::new();
    for (key, value) in params {
        match OPTION_KEYS.iter().find(|(name, _)| *name == key.as_str()) {
            Some((_, option)) => {
                options.insert(option.to_string(), value.clone());
            }
            None if key == "model" => {}
            None => {
                body.insert(key.clone(), value.clone());
            }
        }
    }
    if !options.is_empty() {
        body.insert("options".to_string(), Value::Object(options));
    }
    body
}

/// NDJSON 中的一行
#[derive(Deserialize, Debug)]
struct GenerateLine {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

/// 逐行解析，遇到 `done: true` 结束；无法解析的行跳过
fn ndjson_stream(mut lines: LineStream, logger: Logger) -> FragmentStream {
    Box::pin(try_stream! {
        while let Some(line) = lines.next().await {
            let line = line?;
            let parsed = match serde_json::from_str::<GenerateLine>(&line) {
                Ok(parsed) => parsed,
                Err(e) => {
                    logger.debug(format!("Skipping malformed line: {}", e));
                    continue;
                }
            };

            if let Some(message) = parsed.error {
                logger.error(format!("Ollama error: {message}"));
                Err::<(), _>(WrapperError::backend(message))?;
            }
            if !parsed.response.is_empty() {
                yield parsed.response;
            }
            if parsed.done {
                break;
            }
        }
    })
}

#[derive(Deserialize, Debug)]
struct TagList {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize, Debug)]
struct TagEntry {
    name: Option<String>,
    model: Option<String>,
    size: Option<u64>,
    #[serde(default)]
    details: Option<TagDetails>,
}

#[derive(Deserialize, Debug, Default)]
struct TagDetails {
    family: Option<String>,
    parameter_size: Option<String>,
}

impl TagEntry {
    fn into_descriptor(self) -> Option<ModelDescriptor> {
        let id = self.model.clone().or_else(|| self.name.clone())?;
        let mut model = ModelDescriptor::new(id).with_size(self.size);
        if let Some(name) = self.name {
            model = model.with_display_name(name);
        }
        let details = self.details.unwrap_or_default();
        if let Some(family) = details.family {
            model = model.with_capability(format!("family:{family}"));
        }
        if let Some(size) = details.parameter_size {
            model = model.with_capability(format!("parameters:{size}"));
        }
        Some(model)
    }
}

/// Ollama 适配器
pub struct OllamaProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    logger: Logger,
}

impl OllamaProvider {
    /// 凭据都是可选的，构造时从不询问
    pub fn new(ctx: &ProviderContext) -> WrapperResult<Self> {
        let logger = ctx.logger.for_provider("ollama");
        let api_key = ctx.secrets.get_silent("OLLAMA_API_KEY");
        let base_url = match ctx.settings.base_url_for("ollama") {
            Some(url) => url.to_string(),
            None => ctx
                .secrets
                .get_silent("OLLAMA_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        };

        logger.debug(format!(
            "API key: {}, base URL: {}",
            if api_key.is_some() { "FOUND" } else { "MISSING" },
            base_url
        ));

        Ok(Self {
            client: build_client(&ctx.settings)?,
            api_key,
            base_url,
            logger,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn logger(&self) -> &Logger {
        &self.logger
    }

    async fn generate(&self, request: GenerationRequest) -> WrapperResult<Generation> {
        let model = request.effective_model().to_string();
        let body = generate_body(&model, flatten_prompt(&request.turns), &request.params);

        let endpoint = build_ollama_endpoint(&self.base_url, "generate");
        self.logger
            .debug(format!("Generate request: endpoint={}, model={}", endpoint, model));

        let response = send(
            self.authorize(self.client.post(&endpoint)).json(&body),
            &self.logger,
        )
        .await
        .map_err(|e| {
            if matches!(e, WrapperError::Network(_)) {
                self.logger
                    .error(format!("Please ensure Ollama is running at {}", self.base_url));
            }
            e
        })?;

        let generation = finish(ndjson_stream(lines(response), self.logger), request.stream, self.logger).await?;
        if !generation.is_stream() {
            self.logger.success("Received full response from Ollama API");
        }
        Ok(generation)
    }

    async fn fetch_models(&self, _filters: &ModelFilters) -> WrapperResult<Vec<ModelDescriptor>> {
        let endpoint = build_ollama_endpoint(&self.base_url, "tags");
        let response = send(self.authorize(self.client.get(&endpoint)), &self.logger).await?;
        let tags: TagList = read_json(response).await?;

        let models: Vec<ModelDescriptor> = tags
            .models
            .into_iter()
            .filter_map(TagEntry::into_descriptor)
            .collect();

        if models.is_empty() {
            self.logger.warn("No models found!");
            self.logger.info("Download one using: ollama pull <model_name>");
        }
        Ok(models)
    }
}
