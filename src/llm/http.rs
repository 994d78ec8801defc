//! HTTP 传输公共部分
//!
//! 客户端构建、状态码检查、按行读取响应体（SSE 与 NDJSON 共用）。

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::pin::Pin;

use crate::config::Settings;
use crate::error::{WrapperError, WrapperResult};
use crate::logging::Logger;
use crate::utils::truncate;

/// 按行输出的响应体
pub type LineStream = Pin<Box<dyn Stream<Item = WrapperResult<String>> + Send>>;

/// 构建 HTTP 客户端
pub fn build_client(settings: &Settings) -> WrapperResult<Client> {
    Client::builder()
        .timeout(settings.request_timeout())
        .connect_timeout(settings.connect_timeout())
        .pool_max_idle_per_host(5)
        .build()
        .map_err(|e| WrapperError::Config(format!("创建 HTTP 客户端失败: {e}")))
}

/// 发送请求并检查状态码
///
/// 传输层失败在这里记录并归类，调用方拿到的一定是成功响应或 `WrapperError`。
pub async fn send(request: RequestBuilder, logger: &Logger) -> WrapperResult<Response> {
    let response = request.send().await.map_err(|e| {
        let err = WrapperError::from(e);
        logger.error(format!("Request failed: {err}"));
        err
    })?;
    ensure_success(response, logger).await
}

/// 读取完整响应体并解析为 JSON
pub async fn read_json<T: DeserializeOwned>(response: Response) -> WrapperResult<T> {
    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

/// 非 2xx 响应转为错误，错误体截断后写日志
pub async fn ensure_success(response: Response, logger: &Logger) -> WrapperResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let status_code = status.as_u16();
    let error_text = response.text().await.unwrap_or_default();
    logger.error(format!(
        "API error: status={}, body={}",
        status_code,
        truncate(&error_text, 500)
    ));
    Err(WrapperError::from_status(status_code, error_text))
}

/// 逐行读取响应体
///
/// 去掉首尾空白后为空的行会被跳过；末尾没有换行的最后一行同样会输出。
/// 响应对象归流所有，流被丢弃时连接随之释放。
pub fn lines(response: Response) -> LineStream {
    Box::pin(try_stream! {
        // 按字节缓冲，多字节字符可能被拆在两个数据块里
        let mut buffer: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = stream.next().await {
            let bytes = chunk_result?;
            buffer.extend_from_slice(&bytes);

            while let Some(newline_pos) = buffer.iter().position(|b| *b == b'\n') {
                let line = String::from_utf8_lossy(&buffer[..newline_pos]).trim().to_string();
                buffer.drain(..=newline_pos);

                if !line.is_empty() {
                    yield line;
                }
            }
        }

        let tail = String::from_utf8_lossy(&buffer).trim().to_string();
        if !tail.is_empty() {
            yield tail;
        }
    })
}

/// 取出 SSE 的 `data:` 负载
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}
