//! llm-wrapper 命令行
//!
//! `generate` 调用一次生成，`models` 列出模型，`providers` 列出已注册的提供商。

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;

use llm_wrapper::config::Settings;
use llm_wrapper::llm::registry;
use llm_wrapper::logging;
use llm_wrapper::{GenerateArgs, Generation, ModelFilters, ProviderContext, Wrapper};

#[derive(Parser, Debug)]
#[command(name = "llm-wrapper", version, about = "Unified access to multiple LLM providers")]
struct Cli {
    /// 输出 info / debug 日志（也可以设置 LLM_WRAPPER_SHOW_LOGS=1）
    #[arg(long, global = true)]
    verbose: bool,

    /// 配置文件路径（默认 ./llm-wrapper.json）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 生成文本
    Generate(GenerateCommand),
    /// 列出提供商的模型
    Models(ModelsCommand),
    /// 列出已注册的提供商
    Providers,
}

#[derive(Args, Debug)]
struct GenerateCommand {
    provider: String,
    model: String,

    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    system: Option<String>,
    /// JSON 数组，例如 '[{"role":"user","content":"hi"}]'
    #[arg(long)]
    messages: Option<String>,

    #[arg(long)]
    temperature: Option<f64>,
    #[arg(long)]
    max_tokens: Option<u32>,
    #[arg(long)]
    top_p: Option<f64>,
    #[arg(long)]
    frequency_penalty: Option<f64>,
    #[arg(long)]
    presence_penalty: Option<f64>,

    /// 额外参数 key=value，value 按 JSON 解析，失败时当作字符串
    #[arg(long = "extra", value_parser = parse_extra)]
    extra: Vec<(String, Value)>,

    #[arg(long)]
    stream: bool,
}

#[derive(Args, Debug)]
struct ModelsCommand {
    provider: String,
    #[arg(long)]
    by_provider: Option<String>,
    #[arg(long)]
    by_output_modality: Option<String>,
}

fn parse_extra(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// 在 Windows 上设置控制台代码页为 UTF-8
#[cfg(windows)]
fn setup_console_encoding() {
    unsafe {
        // 设置控制台输出代码页为 UTF-8 (65001)
        extern "system" {
            fn SetConsoleOutputCP(code_page: u32) -> i32;
            fn SetConsoleCP(code_page: u32) -> i32;
        }
        SetConsoleOutputCP(65001);
        SetConsoleCP(65001);
    }
}

#[cfg(not(windows))]
fn setup_console_encoding() {}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("无法加载配置文件 {}", path.display()))?,
        None => Settings::load().context("无法加载配置文件")?,
    };
    if cli.verbose {
        settings.show_logs = true;
    }
    Ok(settings)
}

async fn generate(ctx: &ProviderContext, cmd: GenerateCommand) -> Result<()> {
    let wrapper = Wrapper::new(&cmd.provider, ctx)?;

    let mut args = GenerateArgs::new(cmd.model).stream(cmd.stream);
    args.input.prompt = cmd.prompt;
    args.input.user = cmd.user;
    args.input.system = cmd.system;
    if let Some(raw) = cmd.messages {
        let messages: Vec<Value> =
            serde_json::from_str(&raw).context("--messages 必须是 JSON 数组")?;
        args.input.messages = Some(messages);
    }
    args.sampling.temperature = cmd.temperature;
    args.sampling.max_tokens = cmd.max_tokens;
    args.sampling.top_p = cmd.top_p;
    args.sampling.frequency_penalty = cmd.frequency_penalty;
    args.sampling.presence_penalty = cmd.presence_penalty;
    args.extra.extend(cmd.extra);

    match wrapper.generate(args).await? {
        Generation::Text(text) => println!("{text}"),
        Generation::Stream(mut fragments) => {
            // 片段在消费时已经写到标准输出
            while let Some(fragment) = fragments.next().await {
                fragment?;
            }
            println!();
        }
    }
    Ok(())
}

async fn models(ctx: &ProviderContext, cmd: ModelsCommand) -> Result<()> {
    let filters = ModelFilters {
        by_provider: cmd.by_provider,
        by_output_modality: cmd.by_output_modality,
    };
    for model in Wrapper::list_models(&cmd.provider, &filters, ctx).await? {
        println!("{}", model.id);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;
    logging::init(settings.show_logs);
    let ctx = ProviderContext::from_settings(settings);

    match cli.command {
        Command::Generate(cmd) => generate(&ctx, cmd).await,
        Command::Models(cmd) => models(&ctx, cmd).await,
        Command::Providers => {
            for name in registry::supported_providers() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    setup_console_encoding();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("错误: {e:#}");
            ExitCode::FAILURE
        }
    }
}
