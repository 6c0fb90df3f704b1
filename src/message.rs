//! 프로토콜 메시지 정의
//!
//! - ControlHeader: 세션 시작 시 한 번 보내는 텍스트 헤더 (CRLF 줄 단위)
//! - StatusReply: 백엔드의 SUCCESS/FAILURE 응답
//! - AckMessage: 정확히 4바이트, 확인한 시퀀스 번호
//!
//! 텍스트 메시지는 인식한 마지막 줄 뒤의 바이트를 무시한다.

use std::fmt;

use bytes::Bytes;

use crate::chunk::{decode_sequence, encode_sequence, SequenceNumber};
use crate::{Error, Result, SEQ_BYTES};

const CRLF: &str = "\r\n";

/// 요청 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// 리소스 저장 (개시측 -> 백엔드)
    Store,
    /// 리소스 조회 (백엔드 -> 개시측)
    Fetch,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Store => "STORE",
            Operation::Fetch => "FETCH",
        }
    }

    fn parse(token: &str) -> Option<Self> {
        // POST/GET은 초기 버전 헤더 호환용
        match token.trim() {
            "STORE" | "POST" => Some(Operation::Store),
            "FETCH" | "GET" => Some(Operation::Fetch),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 리소스 이름 최대 길이 (바이트)
pub const MAX_NAME_LEN: usize = 255;

/// 헤더 한 줄에 들어갈 수 있는 리소스 이름인지 확인
pub fn validate_resource_name(name: &str) -> Result<()> {
    let invalid = name.trim().is_empty()
        || name.len() > MAX_NAME_LEN
        || name.trim() != name
        || name.contains(|c: char| c == '\r' || c == '\n' || c == '\0');
    if invalid {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

/// 종료된 줄만 순서대로 반환 (종료되지 않은 꼬리 바이트는 무시)
fn terminated_lines(bytes: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = bytes;
    std::iter::from_fn(move || {
        let pos = rest.iter().position(|&b| b == b'\n')?;
        let mut line = &rest[..pos];
        rest = &rest[pos + 1..];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        Some(line)
    })
}

fn line_str(line: &[u8]) -> Option<&str> {
    std::str::from_utf8(line).ok()
}

/// 세션 컨트롤 헤더
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlHeader {
    /// 리소스 이름
    pub resource_name: String,

    /// 동작
    pub operation: Operation,

    /// 청크 수 (STORE 전용)
    pub chunk_count: Option<u32>,
}

impl ControlHeader {
    pub fn store(resource_name: impl Into<String>, chunk_count: u32) -> Self {
        Self {
            resource_name: resource_name.into(),
            operation: Operation::Store,
            chunk_count: Some(chunk_count),
        }
    }

    pub fn fetch(resource_name: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
            operation: Operation::Fetch,
            chunk_count: None,
        }
    }

    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> Bytes {
        let mut text = format!("{}{CRLF}{}{CRLF}", self.resource_name, self.operation);
        if self.operation == Operation::Store {
            text.push_str(&format!("{}{CRLF}", self.chunk_count.unwrap_or(0)));
        }
        Bytes::from(text)
    }

    /// 바이트에서 역직렬화
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut lines = terminated_lines(bytes);

        let resource_name = lines
            .next()
            .and_then(line_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::MalformedHeader("missing resource name".into()))?
            .to_string();

        let operation = lines
            .next()
            .and_then(line_str)
            .and_then(Operation::parse)
            .ok_or_else(|| Error::MalformedHeader("missing or unknown operation".into()))?;

        let chunk_count = match operation {
            Operation::Store => {
                let count = lines
                    .next()
                    .and_then(line_str)
                    .and_then(|s| s.trim().parse::<u32>().ok())
                    .ok_or_else(|| Error::MalformedHeader("STORE without chunk count".into()))?;
                Some(count)
            }
            Operation::Fetch => None,
        };

        Ok(Self {
            resource_name,
            operation,
            chunk_count,
        })
    }
}

/// 응답 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "SUCCESS",
            Outcome::Failure => "FAILURE",
        }
    }
}

/// 백엔드 상태 응답
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReply {
    pub outcome: Outcome,

    /// FETCH 성공 시에만 존재
    pub chunk_count: Option<u32>,
}

impl StatusReply {
    pub fn success() -> Self {
        Self {
            outcome: Outcome::Success,
            chunk_count: None,
        }
    }

    pub fn success_with_count(chunk_count: u32) -> Self {
        Self {
            outcome: Outcome::Success,
            chunk_count: Some(chunk_count),
        }
    }

    pub fn failure() -> Self {
        Self {
            outcome: Outcome::Failure,
            chunk_count: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut text = format!("{}{CRLF}", self.outcome.as_str());
        if let Some(count) = self.chunk_count {
            text.push_str(&format!("{count}{CRLF}"));
        }
        Bytes::from(text)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut lines = terminated_lines(bytes);

        let outcome = match lines.next().and_then(line_str).map(str::trim) {
            Some(token) if token.starts_with("SUCCESS") => Outcome::Success,
            Some(token) if token.starts_with("FAILURE") => Outcome::Failure,
            _ => return Err(Error::MalformedStatus("missing SUCCESS/FAILURE line".into())),
        };

        let chunk_count = match outcome {
            Outcome::Success => lines
                .next()
                .and_then(line_str)
                .and_then(|s| s.trim().parse::<u32>().ok()),
            Outcome::Failure => None,
        };

        Ok(Self {
            outcome,
            chunk_count,
        })
    }
}

/// ACK 메시지 (정확히 4바이트)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckMessage {
    pub sequence: SequenceNumber,
}

impl AckMessage {
    pub fn new(sequence: SequenceNumber) -> Self {
        Self { sequence }
    }

    pub fn to_bytes(&self) -> [u8; SEQ_BYTES] {
        encode_sequence(self.sequence)
    }

    /// 길이가 정확히 4바이트가 아니면 ACK가 아님
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != SEQ_BYTES {
            return None;
        }
        Some(Self::new(decode_sequence(bytes)))
    }
}
