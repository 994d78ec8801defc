//! 密钥提供者
//!
//! 提供按名称读取凭据的接口，以及基于 `.env` 文本文件的默认实现。
//!
//! 文件格式：每行一条 `KEY=VALUE`；同一个键出现多次时以最后一次为准，
//! 重写时原地替换最后一次出现的行，新键追加到文件末尾。
//! 读取交给 `dotenvy`，只有原地重写是自己实现的。

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use crate::error::{WrapperError, WrapperResult};

/// 凭据来源
pub trait SecretProvider: Send + Sync {
    /// 读取凭据，缺失时可以交互式询问；仍然拿不到时返回错误
    fn get_or_prompt(&self, name: &str, prompt: &str) -> WrapperResult<String>;

    /// 只读取，不询问
    fn get_silent(&self, name: &str) -> Option<String>;
}

/// 交互输入函数：参数是提示文字，返回用户输入的一行
pub type Prompter = Box<dyn Fn(&str) -> io::Result<String> + Send + Sync>;

/// 基于 `.env` 文件的凭据来源
///
/// 查找顺序：已缓存的值 → 进程环境变量 → 文件内容。
/// 配置的是相对路径且当前目录下没有时，会逐级向上查找同名文件。
pub struct EnvFileSecrets {
    path: PathBuf,
    read_process_env: bool,
    cache: RwLock<HashMap<String, String>>,
    prompter: Prompter,
}

impl EnvFileSecrets {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            read_process_env: true,
            cache: RwLock::new(HashMap::new()),
            prompter: Box::new(prompt_stdin),
        }
    }

    /// 替换交互输入方式
    pub fn with_prompter(mut self, prompter: Prompter) -> Self {
        self.prompter = prompter;
        self
    }

    /// 只看文件，不读取进程环境变量
    pub fn without_process_env(mut self) -> Self {
        self.read_process_env = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 实际读写的文件：找到的已有文件，找不到时为配置路径
    fn env_path(&self) -> PathBuf {
        let cwd = std::env::current_dir().unwrap_or_default();
        find_env_file(&self.path, &cwd).unwrap_or_else(|| self.path.clone())
    }

    /// 写入文件并更新缓存
    pub fn set(&self, name: &str, value: &str) -> WrapperResult<()> {
        let path = self.env_path();
        write_env_key(&path, name, value).map_err(|e| {
            WrapperError::Config(format!("写入 {} 失败: {}", path.display(), e))
        })?;
        self.cache.write().insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<String> {
        if let Some(value) = self.cache.read().get(name) {
            return Some(value.clone());
        }

        let from_env = self
            .read_process_env
            .then(|| std::env::var(name).ok())
            .flatten();

        from_env
            .or_else(|| read_env_file(&self.env_path()).remove(name))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

impl SecretProvider for EnvFileSecrets {
    fn get_or_prompt(&self, name: &str, prompt: &str) -> WrapperResult<String> {
        if let Some(value) = self.lookup(name) {
            return Ok(value);
        }

        println!("{name} not found in .env");
        let input = (self.prompter)(&format!("{prompt} (will be saved in .env): "))
            .map_err(|e| WrapperError::Config(format!("读取 {name} 输入失败: {e}")))?;
        let value = input.trim();
        if value.is_empty() {
            return Err(WrapperError::Config(format!("未提供 {name}")));
        }

        self.set(name, value)?;
        Ok(value.to_string())
    }

    fn get_silent(&self, name: &str) -> Option<String> {
        self.lookup(name)
    }
}

/// 内存中的凭据来源，从不询问
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl SecretProvider for StaticSecrets {
    fn get_or_prompt(&self, name: &str, _prompt: &str) -> WrapperResult<String> {
        self.get_silent(name)
            .ok_or_else(|| WrapperError::Authentication(format!("缺少凭据 {name}")))
    }

    fn get_silent(&self, name: &str) -> Option<String> {
        self.values
            .get(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

fn prompt_stdin(prompt: &str) -> io::Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{prompt}")?;
    stdout.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

/// 定位 `.env` 文件
///
/// 配置的路径存在时直接使用；相对路径不存在时从 `start` 逐级向上查找。
pub fn find_env_file(configured: &Path, start: &Path) -> Option<PathBuf> {
    if configured.is_file() {
        return Some(configured.to_path_buf());
    }
    if configured.is_absolute() {
        return None;
    }
    start
        .ancestors()
        .map(|dir| dir.join(configured))
        .find(|candidate| candidate.is_file())
}

/// 读取 `.env` 文件，最后一次出现的键生效；无法解析的行跳过
pub fn read_env_file(path: &Path) -> HashMap<String, String> {
    let Ok(entries) = dotenvy::from_path_iter(path) else {
        return HashMap::new();
    };
    entries
        .filter_map(Result::ok)
        .map(|(key, value)| (key, value.trim().to_string()))
        .collect()
}

/// 写入单个键：替换最后一次出现的行，不存在时追加
pub fn write_env_key(path: &Path, key: &str, value: &str) -> io::Result<()> {
    let mut lines: Vec<String> = if path.exists() {
        fs::read_to_string(path)?.lines().map(str::to_string).collect()
    } else {
        Vec::new()
    };

    let prefix = format!("{key}=");
    let entry = format!("{key}={value}");
    match lines.iter().rposition(|line| line.starts_with(&prefix)) {
        Some(index) => lines[index] = entry,
        None => lines.push(entry),
    }

    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(path, content)
}
