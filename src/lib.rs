//! llm-wrapper
//!
//! 多个 LLM 提供商之上的统一调用层：一个 `generate` 入口、一个模型目录入口，
//! 凭据通过可替换的 `SecretProvider` 获取。

pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use config::{EnvFileSecrets, SecretProvider, Settings, StaticSecrets};
pub use error::{WrapperError, WrapperResult};
pub use llm::{GenerateArgs, Generation, ModelDescriptor, ModelFilters, ProviderContext, Wrapper};
pub use logging::Logger;
