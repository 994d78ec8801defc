//! 日志
//!
//! 全局订阅器只由二进制入口安装一次；库内部通过 `Logger` 输出，
//! `Logger` 由调用方按单个 verbose 开关构造后交给各个适配器。

use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 安装 tracing 订阅器，`RUST_LOG` 优先
pub fn init(verbose: bool) {
    let default_filter = if verbose {
        "llm_wrapper=info"
    } else {
        "llm_wrapper=warn"
    };

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// 适配器持有的日志句柄
///
/// info / debug / success 只在 verbose 时输出，warn / error 总是输出。
#[derive(Debug, Clone, Copy)]
pub struct Logger {
    provider: &'static str,
    verbose: bool,
}

impl Logger {
    pub fn new(verbose: bool) -> Self {
        Self {
            provider: "wrapper",
            verbose,
        }
    }

    /// 派生一个带提供商标签的句柄
    pub fn for_provider(&self, provider: &'static str) -> Self {
        Self {
            provider,
            verbose: self.verbose,
        }
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn info(&self, message: impl AsRef<str>) {
        if self.verbose {
            info!(provider = self.provider, "{}", message.as_ref());
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        if self.verbose {
            debug!(provider = self.provider, "{}", message.as_ref());
        }
    }

    pub fn success(&self, message: impl AsRef<str>) {
        if self.verbose {
            info!(provider = self.provider, outcome = "success", "{}", message.as_ref());
        }
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        warn!(provider = self.provider, "{}", message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        error!(provider = self.provider, "{}", message.as_ref());
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(false)
    }
}
