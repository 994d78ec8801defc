//! LLM 模块
//!
//! 统一的生成与模型目录接口，后端包括 OpenAI 兼容接口（openai / groq /
//! mistral / azure）、Anthropic、Amazon Bedrock 和 Ollama。

mod anthropic;
mod bedrock;
pub mod catalog;
mod client;
mod event_stream;
mod format;
mod http;
pub mod messages;
mod ollama;
mod openai;
pub mod params;
mod provider;
pub mod registry;
mod stream;
mod types;

pub use anthropic::AnthropicProvider;
pub use bedrock::BedrockProvider;
pub use client::{GenerateArgs, Wrapper};
pub use event_stream::{EventMessage, EventStreamDecoder, HeaderValue};
pub use messages::PromptInput;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use params::SamplingParams;
pub use provider::{Provider, ProviderContext, DEFAULT_SYSTEM_PROMPT};
pub use stream::{collect_text, FragmentStream, Generation};
pub use types::*;
