//! AWS event-stream 二进制帧解码
//!
//! 帧结构：4 字节总长、4 字节头部长、4 字节前导 CRC、头部、负载、4 字节消息 CRC，
//! 整数均为大端。前导 CRC 覆盖前 8 字节，消息 CRC 覆盖除自身外的整帧，均为 CRC32。

use crate::error::{WrapperError, WrapperResult};

const PRELUDE_LEN: usize = 12;
const TRAILER_LEN: usize = 4;
/// 单帧上限，超过即视为数据损坏
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// 头部值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Bytes(Vec<u8>),
    String(String),
    Timestamp(i64),
    Uuid([u8; 16]),
}

/// 一个完整的帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMessage {
    pub headers: Vec<(String, HeaderValue)>,
    pub payload: Vec<u8>,
}

impl EventMessage {
    /// 取字符串类型的头部
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|(key, value)| match value {
            HeaderValue::String(s) if key == name => Some(s.as_str()),
            _ => None,
        })
    }

    /// `:message-type`，正常事件为 `event`
    pub fn message_type(&self) -> Option<&str> {
        self.header_str(":message-type")
    }

    /// `:event-type`，Bedrock 的文本块为 `chunk`
    pub fn event_type(&self) -> Option<&str> {
        self.header_str(":event-type")
    }

    /// `:exception-type`
    pub fn exception_type(&self) -> Option<&str> {
        self.header_str(":exception-type")
    }
}

/// 增量解码器：喂入任意切分的字节，按帧取出
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buffer: Vec<u8>,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// 缓冲中是否还有未成帧的数据
    pub fn has_remaining(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// 取出下一个完整帧；数据不够时返回 `Ok(None)`
    pub fn next_message(&mut self) -> WrapperResult<Option<EventMessage>> {
        if self.buffer.len() < PRELUDE_LEN {
            return Ok(None);
        }

        let total_len = read_u32(&self.buffer[0..4]) as usize;
        let headers_len = read_u32(&self.buffer[4..8]) as usize;
        if total_len < PRELUDE_LEN + TRAILER_LEN
            || total_len > MAX_FRAME_LEN
            || headers_len > total_len - PRELUDE_LEN - TRAILER_LEN
        {
            return Err(malformed(format!(
                "帧长度异常: total={total_len}, headers={headers_len}"
            )));
        }
        let prelude_crc = read_u32(&self.buffer[8..12]);
        if crc32fast::hash(&self.buffer[0..8]) != prelude_crc {
            return Err(malformed("前导 CRC 校验失败".to_string()));
        }
        if self.buffer.len() < total_len {
            return Ok(None);
        }

        let frame: Vec<u8> = self.buffer.drain(..total_len).collect();
        let message_crc = read_u32(&frame[total_len - TRAILER_LEN..]);
        if crc32fast::hash(&frame[..total_len - TRAILER_LEN]) != message_crc {
            return Err(malformed("消息 CRC 校验失败".to_string()));
        }
        let headers_end = PRELUDE_LEN + headers_len;
        let headers = parse_headers(&frame[PRELUDE_LEN..headers_end])?;
        let payload = frame[headers_end..total_len - TRAILER_LEN].to_vec();

        Ok(Some(EventMessage { headers, payload }))
    }
}

fn malformed(detail: String) -> WrapperError {
    WrapperError::backend(format!("event-stream 数据损坏: {detail}"))
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// 顺序读取头部字节
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> WrapperResult<&'a [u8]> {
        let end = self.pos + len;
        if end > self.bytes.len() {
            return Err(malformed("头部被截断".to_string()));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> WrapperResult<[u8; N]> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }
}

fn parse_headers(bytes: &[u8]) -> WrapperResult<Vec<(String, HeaderValue)>> {
    let mut cursor = Cursor { bytes, pos: 0 };
    let mut headers = Vec::new();

    while !cursor.is_empty() {
        let name_len = cursor.take(1)?[0] as usize;
        let name = String::from_utf8_lossy(cursor.take(name_len)?).into_owned();
        let value_type = cursor.take(1)?[0];

        let value = match value_type {
            0 => HeaderValue::Bool(true),
            1 => HeaderValue::Bool(false),
            2 => HeaderValue::Byte(i8::from_be_bytes(cursor.take_array()?)),
            3 => HeaderValue::Short(i16::from_be_bytes(cursor.take_array()?)),
            4 => HeaderValue::Int(i32::from_be_bytes(cursor.take_array()?)),
            5 => HeaderValue::Long(i64::from_be_bytes(cursor.take_array()?)),
            6 | 7 => {
                let len = u16::from_be_bytes(cursor.take_array()?) as usize;
                let data = cursor.take(len)?;
                if value_type == 6 {
                    HeaderValue::Bytes(data.to_vec())
                } else {
                    HeaderValue::String(String::from_utf8_lossy(data).into_owned())
                }
            }
            8 => HeaderValue::Timestamp(i64::from_be_bytes(cursor.take_array()?)),
            9 => HeaderValue::Uuid(cursor.take_array()?),
            other => return Err(malformed(format!("未知的头部类型 {other}"))),
        };
        headers.push((name, value));
    }

    Ok(headers)
}

/// 编码只含字符串头部的帧
#[cfg(test)]
pub(crate) fn encode_message(headers: &[(&str, &str)], payload: &[u8]) -> Vec<u8> {
    let mut header_bytes = Vec::new();
    for (name, value) in headers {
        header_bytes.push(name.len() as u8);
        header_bytes.extend_from_slice(name.as_bytes());
        header_bytes.push(7);
        header_bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
        header_bytes.extend_from_slice(value.as_bytes());
    }

    let total_len = PRELUDE_LEN + header_bytes.len() + payload.len() + TRAILER_LEN;
    let mut frame = Vec::with_capacity(total_len);
    frame.extend_from_slice(&(total_len as u32).to_be_bytes());
    frame.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
    let prelude_crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&prelude_crc.to_be_bytes());
    frame.extend_from_slice(&header_bytes);
    frame.extend_from_slice(payload);
    let message_crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&message_crc.to_be_bytes());
    frame
}
