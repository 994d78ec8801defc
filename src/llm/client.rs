//! 统一 LLM 客户端
//!
//! 绑定一个提供商后只做路由：规范化消息、构建参数包、交给适配器。
//! 不重试，不缓存。

use serde_json::{Map, Value};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::catalog::log_catalog;
use super::messages::{normalize, PromptInput};
use super::params::{build_parameter_bag, SamplingParams};
use super::provider::{Provider, ProviderContext};
use super::registry;
use super::stream::Generation;
use super::types::{GenerationRequest, ModelDescriptor, ModelFilters};
use crate::error::{WrapperError, WrapperResult};

/// 一次生成调用的全部输入
#[derive(Debug, Clone, Default)]
pub struct GenerateArgs {
    pub model: String,
    pub input: PromptInput,
    pub sampling: SamplingParams,
    pub stream: bool,
    /// 原样透传给后端的额外参数，同名时覆盖内置参数
    pub extra: Map<String, Value>,
}

impl GenerateArgs {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.input.prompt = Some(prompt.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.input.user = Some(user.into());
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.input.system = Some(system.into());
        self
    }

    pub fn messages(mut self, messages: Vec<Value>) -> Self {
        self.input.messages = Some(messages);
        self
    }

    pub fn temperature(mut self, value: f64) -> Self {
        self.sampling.temperature = Some(value);
        self
    }

    pub fn max_tokens(mut self, value: u32) -> Self {
        self.sampling.max_tokens = Some(value);
        self
    }

    pub fn top_p(mut self, value: f64) -> Self {
        self.sampling.top_p = Some(value);
        self
    }

    pub fn frequency_penalty(mut self, value: f64) -> Self {
        self.sampling.frequency_penalty = Some(value);
        self
    }

    pub fn presence_penalty(mut self, value: f64) -> Self {
        self.sampling.presence_penalty = Some(value);
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// 统一 LLM 客户端
///
/// 构造后绑定到一个提供商，之后不可更换。
pub struct Wrapper {
    provider: Box<dyn Provider>,
}

impl Wrapper {
    /// 按名称创建；未注册的名称在实例化任何适配器之前就失败
    pub fn new(provider: &str, ctx: &ProviderContext) -> WrapperResult<Self> {
        let constructor = registry::lookup(provider)?;
        Ok(Self::with_provider(constructor(ctx)?))
    }

    /// 使用已有的适配器
    pub fn with_provider(provider: Box<dyn Provider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// 规范化输入并构建请求（不触发网络）
    pub fn build_request(&self, args: GenerateArgs) -> WrapperResult<GenerationRequest> {
        if args.model.trim().is_empty() {
            return Err(WrapperError::InvalidInput("模型名称不能为空".to_string()));
        }

        let turns = normalize(
            &args.input,
            self.provider.default_system_prompt(),
            self.provider.sanitizes_input(),
        )?;
        let params = build_parameter_bag(&args.sampling, &args.extra);

        Ok(GenerationRequest {
            model: args.model,
            turns,
            params,
            stream: args.stream,
        })
    }

    /// 生成文本
    ///
    /// `stream = false` 返回裁剪后的完整文本；`stream = true` 返回片段流，
    /// 片段在被消费时写到标准输出。
    pub async fn generate(&self, args: GenerateArgs) -> WrapperResult<Generation> {
        let request = self.build_request(args)?;
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "generate",
            %request_id,
            provider = self.provider.name(),
            model = %request.model,
            stream = request.stream
        );

        self.provider.generate(request).instrument(span).await
    }

    /// 列出绑定提供商的模型，并在日志中按提供商的方式分组展示
    pub async fn models(&self, filters: &ModelFilters) -> Vec<ModelDescriptor> {
        let models = self.provider.list_models(filters).await;
        let groups = self.provider.catalog_groups(&models);
        log_catalog(self.provider.logger(), self.provider.name(), &groups);
        models
    }

    /// 无状态的模型列表：临时创建适配器并查询
    ///
    /// 未注册的名称只记录一条警告并返回空列表；构造适配器失败（如凭据缺失）仍返回错误。
    pub async fn list_models(
        provider: &str,
        filters: &ModelFilters,
        ctx: &ProviderContext,
    ) -> WrapperResult<Vec<ModelDescriptor>> {
        let Ok(constructor) = registry::lookup(provider) else {
            ctx.logger
                .warn(format!("No wrapper available for provider '{provider}'."));
            return Ok(Vec::new());
        };
        let wrapper = Self::with_provider(constructor(ctx)?);
        Ok(wrapper.models(filters).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Settings, StaticSecrets};
    use crate::llm::provider::DEFAULT_SYSTEM_PROMPT;
    use crate::llm::stream::{finish, FragmentStream};
    use crate::llm::types::ChatTurn;
    use crate::logging::Logger;
    use crate::test_support::{capture_logs, refused_url, StubResponse, StubServer};
    use async_trait::async_trait;
    use futures::{stream, StreamExt};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    /// 返回固定片段的适配器，记录收到的请求
    struct FakeProvider {
        fragments: Vec<&'static str>,
        default_system: Option<&'static str>,
        seen: Arc<Mutex<Vec<GenerationRequest>>>,
        logger: Logger,
    }

    impl FakeProvider {
        fn new(fragments: Vec<&'static str>) -> Self {
            Self {
                fragments,
                default_system: None,
                seen: Arc::new(Mutex::new(Vec::new())),
                logger: Logger::default(),
            }
        }
    }

    #[async_trait]
    impl Provider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn logger(&self) -> &Logger {
            &self.logger
        }

        fn default_system_prompt(&self) -> Option<&str> {
            self.default_system
        }

        async fn generate(&self, request: GenerationRequest) -> WrapperResult<Generation> {
            let stream_flag = request.stream;
            self.seen.lock().push(request);
            let items: Vec<WrapperResult<String>> =
                self.fragments.iter().map(|f| Ok(f.to_string())).collect();
            let fragments: FragmentStream = Box::pin(stream::iter(items));
            finish(fragments, stream_flag, self.logger).await
        }

        async fn fetch_models(&self, _filters: &ModelFilters) -> WrapperResult<Vec<ModelDescriptor>> {
            Ok(vec![ModelDescriptor::new("fake-1"), ModelDescriptor::new("fake-2")])
        }
    }

    fn context(secrets: StaticSecrets) -> ProviderContext {
        ProviderContext::new(Settings::default(), Arc::new(secrets))
    }

    #[tokio::test]
    async fn test_streaming_concatenation_equals_non_streaming() {
        let wrapper = Wrapper::with_provider(Box::new(FakeProvider::new(vec![
            "  The ", "answer ", "is 42.\n",
        ])));

        let full = wrapper
            .generate(GenerateArgs::new("m").prompt("q"))
            .await
            .unwrap()
            .into_text()
            .await
            .unwrap();

        let streamed = wrapper
            .generate(GenerateArgs::new("m").prompt("q").stream(true))
            .await
            .unwrap();
        assert!(streamed.is_stream());
        let fragments: Vec<String> = streamed
            .into_stream()
            .map(|f| f.unwrap())
            .collect()
            .await;

        assert_eq!(full, "The answer is 42.");
        assert_eq!(fragments.concat().trim(), full);
    }

    #[tokio::test]
    async fn test_only_model_and_user_gives_minimal_wire_parameters() {
        let fake = FakeProvider::new(vec!["ok"]);
        let seen = Arc::clone(&fake.seen);
        let wrapper = Wrapper::with_provider(Box::new(fake));

        wrapper
            .generate(GenerateArgs::new("m").user("hello"))
            .await
            .unwrap();

        let request = seen.lock()[0].clone();
        let wire = request.wire_parameters();
        let keys: Vec<&str> = wire.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["model", "stream", "messages"]);
        assert_eq!(wire["messages"], json!([{"role": "user", "content": "hello"}]));
    }

    #[tokio::test]
    async fn test_extra_overrides_builtin_parameter() {
        let fake = FakeProvider::new(vec!["ok"]);
        let seen = Arc::clone(&fake.seen);
        let wrapper = Wrapper::with_provider(Box::new(fake));

        wrapper
            .generate(
                GenerateArgs::new("m")
                    .prompt("hi")
                    .temperature(0.2)
                    .extra("temperature", json!(0.9)),
            )
            .await
            .unwrap();

        assert_eq!(seen.lock()[0].params["temperature"], json!(0.9));
    }

    #[tokio::test]
    async fn test_default_system_prompt_is_applied() {
        let mut fake = FakeProvider::new(vec!["ok"]);
        fake.default_system = Some(DEFAULT_SYSTEM_PROMPT);
        let seen = Arc::clone(&fake.seen);
        let wrapper = Wrapper::with_provider(Box::new(fake));

        wrapper.generate(GenerateArgs::new("m").prompt("hi")).await.unwrap();
        assert_eq!(
            seen.lock()[0].turns,
            vec![ChatTurn::system(DEFAULT_SYSTEM_PROMPT), ChatTurn::user("hi")]
        );
    }

    #[tokio::test]
    async fn test_invalid_input_never_reaches_adapter() {
        let fake = FakeProvider::new(vec!["ok"]);
        let seen = Arc::clone(&fake.seen);
        let wrapper = Wrapper::with_provider(Box::new(fake));

        let err = wrapper
            .generate(GenerateArgs::new("m").messages(vec![json!({"role": "bogus", "content": "x"})]))
            .await
            .unwrap_err();
        assert!(matches!(err, WrapperError::InvalidInput(_)));

        let err = wrapper
            .generate(GenerateArgs::new("  ").prompt("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, WrapperError::InvalidInput(_)));

        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_unknown_provider_fails_before_construction() {
        let err = Wrapper::new("unknown-backend", &context(StaticSecrets::new()))
            .err()
            .unwrap();
        assert!(matches!(err, WrapperError::UnsupportedProvider(name) if name == "unknown-backend"));
    }

    #[tokio::test]
    async fn test_list_models_unknown_provider_is_empty_with_warning() {
        let (_guard, logs) = capture_logs();
        let models = Wrapper::list_models("cohere", &ModelFilters::default(), &context(StaticSecrets::new()))
            .await
            .unwrap();
        assert!(models.is_empty());
        assert_eq!(logs.count_level("WARN"), 1);
        assert!(logs.contents().contains("No wrapper available for provider 'cohere'"));
    }

    #[tokio::test]
    async fn test_models_returns_adapter_listing() {
        let wrapper = Wrapper::with_provider(Box::new(FakeProvider::new(vec![])));
        let ids: Vec<String> = wrapper
            .models(&ModelFilters::default())
            .await
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["fake-1", "fake-2"]);
    }

    #[tokio::test]
    async fn test_connection_refused_keeps_original_message() {
        let url = refused_url().await;
        let mut settings = Settings::default();
        settings.base_urls.insert("openai".into(), url);
        let ctx = ProviderContext::new(
            settings,
            Arc::new(StaticSecrets::new().with("OPENAI_API_KEY", "sk")),
        );
        let wrapper = Wrapper::new("openai", &ctx).unwrap();
        assert_eq!(wrapper.provider_name(), "openai");

        let err = wrapper
            .generate(GenerateArgs::new("gpt-4o").prompt("hi"))
            .await
            .unwrap_err();
        match err {
            WrapperError::Network(message) => assert!(!message.is_empty()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failing_catalog_returns_empty_with_one_warning() {
        let server = StubServer::start(vec![StubResponse::text(503, "text/plain", &["down"])]).await;
        let mut settings = Settings::default();
        settings.base_urls.insert("anthropic".into(), server.base_url.clone());
        let ctx = ProviderContext::new(
            settings,
            Arc::new(StaticSecrets::new().with("ANTHROPIC_API_KEY", "sk-ant")),
        );

        let (_guard, logs) = capture_logs();
        let models = Wrapper::list_models("anthropic", &ModelFilters::default(), &ctx)
            .await
            .unwrap();
        assert!(models.is_empty());
        assert_eq!(logs.count_level("WARN"), 1);
    }
}
