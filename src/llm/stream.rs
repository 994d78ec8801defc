//! 生成结果
//!
//! 非流式调用返回完整文本；流式调用返回惰性的片段流，
//! 片段到达时会同步写到标准输出。

use futures::{stream, Stream, StreamExt};
use std::fmt;
use std::io::{self, Write};
use std::pin::Pin;

use crate::error::{WrapperError, WrapperResult};
use crate::logging::Logger;

/// 文本片段流
pub type FragmentStream = Pin<Box<dyn Stream<Item = WrapperResult<String>> + Send>>;

/// 统一输出
///
/// `Stream` 只能被消费一次，想重新获取只能重新调用 `generate`。
pub enum Generation {
    Text(String),
    Stream(FragmentStream),
}

impl Generation {
    pub fn is_stream(&self) -> bool {
        matches!(self, Generation::Stream(_))
    }

    /// 取得最终文本：流式结果会被完整消费，拼接后裁剪首尾空白
    pub async fn into_text(self) -> WrapperResult<String> {
        match self {
            Generation::Text(text) => Ok(text),
            Generation::Stream(fragments) => collect_text(fragments).await,
        }
    }

    /// 统一为片段流；非流式结果视为只有一个片段
    pub fn into_stream(self) -> FragmentStream {
        match self {
            Generation::Text(text) => Box::pin(stream::once(async move { Ok::<_, WrapperError>(text) })),
            Generation::Stream(fragments) => fragments,
        }
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Generation::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// 拼接全部片段并裁剪
pub async fn collect_text(mut fragments: FragmentStream) -> WrapperResult<String> {
    let mut output = String::new();
    while let Some(fragment) = fragments.next().await {
        output.push_str(&fragment?);
    }
    Ok(output.trim().to_string())
}

/// 片段被消费时写入 `writer`
///
/// 只回显已经被拉取的片段；写入失败记录日志，不影响片段本身。
pub fn echo_fragments<W>(fragments: FragmentStream, mut writer: W, logger: Logger) -> FragmentStream
where
    W: Write + Send + 'static,
{
    Box::pin(fragments.inspect(move |item| {
        if let Ok(fragment) = item {
            if let Err(e) = writer
                .write_all(fragment.as_bytes())
                .and_then(|()| writer.flush())
            {
                logger.error(format!("Failed to echo stream fragment: {e}"));
            }
        }
    }))
}

/// 按调用方的 stream 标志包装片段流
///
/// 流式：回显到标准输出并原样交给调用方；非流式：在这里消费完毕。
pub async fn finish(
    fragments: FragmentStream,
    stream: bool,
    logger: Logger,
) -> WrapperResult<Generation> {
    if stream {
        Ok(Generation::Stream(echo_fragments(fragments, io::stdout(), logger)))
    } else {
        collect_text(fragments).await.map(Generation::Text)
    }
}
