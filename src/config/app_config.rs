//! 应用配置管理
//!
//! 从 JSON 文件加载配置，所有字段都有默认值；文件不存在时使用默认配置。

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{WrapperError, WrapperResult};

/// 默认配置文件名（位于当前工作目录）
pub const CONFIG_FILE_NAME: &str = "llm-wrapper.json";

/// 覆盖 `show_logs` 的环境变量
pub const SHOW_LOGS_ENV: &str = "LLM_WRAPPER_SHOW_LOGS";

/// 配置结构体
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 是否输出 info / debug 级别日志
    #[serde(default)]
    pub show_logs: bool,

    /// 单次请求超时（秒），流式请求同样适用
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// 建立连接超时（秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// 密钥文件路径
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,

    /// 按提供商名称覆盖基础 URL
    #[serde(default)]
    pub base_urls: HashMap<String, String>,
}

fn default_request_timeout() -> u64 {
    120
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_env_file() -> PathBuf {
    PathBuf::from(".env")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_logs: false,
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            env_file: default_env_file(),
            base_urls: HashMap::new(),
        }
    }
}

impl Settings {
    /// 从当前目录的 `llm-wrapper.json` 加载
    pub fn load() -> WrapperResult<Self> {
        Self::load_from(Path::new(CONFIG_FILE_NAME))
    }

    /// 从指定文件加载，并应用环境变量覆盖
    pub fn load_from(path: &Path) -> WrapperResult<Self> {
        let mut settings = if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| WrapperError::Config(format!("读取配置文件失败 {}: {}", path.display(), e)))?;
            serde_json::from_str(&content)
                .map_err(|e| WrapperError::Config(format!("解析配置文件失败 {}: {}", path.display(), e)))?
        } else {
            Self::default()
        };

        settings.apply_show_logs_override(std::env::var(SHOW_LOGS_ENV).ok().as_deref());
        Ok(settings)
    }

    /// `1` / `true` 打开日志，`0` / `false` 关闭，其他值忽略
    pub fn apply_show_logs_override(&mut self, value: Option<&str>) {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("1") | Some("true") => self.show_logs = true,
            Some("0") | Some("false") => self.show_logs = false,
            _ => {}
        }
    }

    /// 某个提供商的基础 URL 覆盖
    pub fn base_url_for(&self, provider: &str) -> Option<&str> {
        self.base_urls.get(provider).map(String::as_str)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let settings = Settings::default();
        assert!(!settings.show_logs);
        assert_eq!(settings.request_timeout_secs, 120);
        assert_eq!(settings.connect_timeout_secs, 30);
        assert_eq!(settings.env_file, PathBuf::from(".env"));
        assert!(settings.base_url_for("openai").is_none());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            r#"{"request_timeout_secs": 5, "base_urls": {"ollama": "http://gpu-box:11434"}}"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.request_timeout(), Duration::from_secs(5));
        assert_eq!(settings.connect_timeout(), Duration::from_secs(30));
        assert_eq!(settings.base_url_for("ollama"), Some("http://gpu-box:11434"));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings.request_timeout_secs, 120);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Settings::load_from(&path), Err(WrapperError::Config(_))));
    }

    #[test]
    fn test_show_logs_override() {
        let mut settings = Settings::default();
        settings.apply_show_logs_override(Some("TRUE"));
        assert!(settings.show_logs);
        settings.apply_show_logs_override(Some("maybe"));
        assert!(settings.show_logs);
        settings.apply_show_logs_override(Some("0"));
        assert!(!settings.show_logs);
        settings.apply_show_logs_override(None);
        assert!(!settings.show_logs);
    }
}
