//! 配置模块
//!
//! - `Settings`：超时、日志开关、基础 URL 覆盖
//! - `SecretProvider`：凭据读取（默认实现基于 `.env` 文件）

mod app_config;
mod secrets;

pub use app_config::{Settings, CONFIG_FILE_NAME, SHOW_LOGS_ENV};
pub use secrets::{
    find_env_file, read_env_file, write_env_key, EnvFileSecrets, Prompter, SecretProvider, StaticSecrets,
};
