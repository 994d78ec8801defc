//! 测试辅助：进程内 HTTP 桩服务与日志捕获

use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// 内存日志缓冲
#[derive(Clone, Default)]
pub(crate) struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// 直接写入缓冲的 writer
    pub(crate) fn writer(&self) -> LogWriter {
        LogWriter(Arc::clone(&self.0))
    }

    /// 某一级别日志的条数
    pub(crate) fn count_level(&self, level: &str) -> usize {
        self.contents()
            .lines()
            .filter(|line| line.split_whitespace().nth(1) == Some(level))
            .count()
    }
}

pub(crate) struct LogWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter(Arc::clone(&self.0))
    }
}

/// 在当前线程上捕获日志，guard 释放后恢复
pub(crate) fn capture_logs() -> (DefaultGuard, LogBuffer) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (guard, buffer)
}

/// 桩服务记录到的请求
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub(crate) fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

/// 预设响应，`chunks` 逐段写出以模拟流式输出
#[derive(Debug, Clone)]
pub(crate) struct StubResponse {
    pub status: u16,
    pub content_type: String,
    pub chunks: Vec<Vec<u8>>,
}

impl StubResponse {
    pub(crate) fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json".to_string(),
            chunks: vec![body.to_string().into_bytes()],
        }
    }

    pub(crate) fn text(status: u16, content_type: &str, chunks: &[&str]) -> Self {
        Self {
            status,
            content_type: content_type.to_string(),
            chunks: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
        }
    }

    pub(crate) fn bytes(status: u16, content_type: &str, chunks: Vec<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: content_type.to_string(),
            chunks,
        }
    }
}

/// 按顺序为每个连接返回一个预设响应
pub(crate) struct StubServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
    pub(crate) async fn start(responses: Vec<StubResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub server");
        let addr = listener.local_addr().expect("stub server address");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);

        tokio::spawn(async move {
            let mut responses = responses.into_iter();
            while let Ok((mut socket, _)) = listener.accept().await {
                let Some(request) = read_request(&mut socket).await else {
                    continue;
                };
                recorded.lock().push(request);
                let response = responses.next().unwrap_or_else(|| {
                    StubResponse::text(500, "text/plain", &["no stub response left"])
                });
                write_response(&mut socket, response).await;
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
        }
    }

    pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

/// 一个没有任何服务监听的本地地址
pub(crate) async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("ephemeral address");
    drop(listener);
    format!("http://{addr}")
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let read = socket.read(&mut chunk).await.ok()?;
        if read == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    while buffer.len() < header_end + content_length {
        let read = socket.read(&mut chunk).await.ok()?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }

    let body = String::from_utf8_lossy(&buffer[header_end..]).into_owned();
    Some(RecordedRequest {
        method,
        path,
        headers,
        body,
    })
}

async fn write_response(socket: &mut TcpStream, response: StubResponse) {
    let length: usize = response.chunks.iter().map(Vec::len).sum();
    let head = format!(
        "HTTP/1.1 {} Stub\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status, response.content_type, length
    );
    if socket.write_all(head.as_bytes()).await.is_err() {
        return;
    }
    for chunk in response.chunks {
        if socket.write_all(&chunk).await.is_err() {
            return;
        }
        let _ = socket.flush().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let _ = socket.shutdown().await;
}
