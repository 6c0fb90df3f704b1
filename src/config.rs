//! 프로토콜 설정

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result, MAX_CHUNK_SIZE, MAX_DATAGRAM_SIZE};

/// 전송 엔진 + 게이트웨이 설정
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 청크 페이로드 크기 (1 ~ 1024 바이트)
    pub max_chunk_size: usize,

    /// 송신측 ACK 대기 타임아웃 (밀리초)
    pub ack_timeout_ms: u64,

    /// 수신측 청크 대기 타임아웃 (밀리초)
    pub recv_timeout_ms: u64,

    /// 청크당 최대 재전송 횟수 / 연속 빈 대기 허용 횟수
    pub max_retries: u32,

    /// 수신 완료 후 중복 청크에 ACK를 다시 보내는 유예 시간 (밀리초)
    pub linger_ms: u64,

    /// 백엔드 세션 채널 용량 (데이터그램 수)
    pub session_channel_capacity: usize,

    /// UDP 수신 버퍼 크기
    pub recv_buffer_size: usize,

    /// 게이트웨이 요청 본문 최대 크기
    pub max_request_size: usize,

    /// 전송 엔진을 거치는 Content-Type 접두사 목록
    pub binary_types: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_chunk_size: MAX_CHUNK_SIZE,
            ack_timeout_ms: 300,
            recv_timeout_ms: 1000,
            max_retries: 10,
            linger_ms: 500,
            session_channel_capacity: 256,
            recv_buffer_size: 2048,
            max_request_size: 64 * 1024 * 1024, // 64MB
            binary_types: vec!["image".to_string()],
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// TOML 문자열에서 설정 로드 (빠진 필드는 기본값)
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정 로드
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 || self.max_chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::Config(format!(
                "max_chunk_size must be in 1..={}, got {}",
                MAX_CHUNK_SIZE, self.max_chunk_size
            )));
        }
        if self.ack_timeout_ms == 0 || self.recv_timeout_ms == 0 {
            return Err(Error::Config("timeouts must be non-zero".into()));
        }
        if self.recv_buffer_size < MAX_DATAGRAM_SIZE {
            return Err(Error::Config(format!(
                "recv_buffer_size must be at least {}",
                MAX_DATAGRAM_SIZE
            )));
        }
        if self.session_channel_capacity == 0 {
            return Err(Error::Config("session_channel_capacity must be non-zero".into()));
        }
        Ok(())
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }

    /// 핸드쉐이크에서 받아들일 최대 청크 수 (`max_request_size` 기준)
    pub fn max_chunks(&self) -> u32 {
        let chunks = self.max_request_size.div_ceil(self.max_chunk_size.max(1));
        u32::try_from(chunks).unwrap_or(u32::MAX)
    }

    /// Content-Type이 바이너리 클래스(전송 엔진 경유)인지 확인
    pub fn is_binary_type(&self, content_type: &str) -> bool {
        let content_type = content_type.trim().to_ascii_lowercase();
        self.binary_types
            .iter()
            .any(|prefix| content_type.starts_with(&prefix.to_ascii_lowercase()))
    }

    /// 손실이 많은 네트워크용 설정
    pub fn lossy_network() -> Self {
        Self {
            ack_timeout_ms: 500,
            recv_timeout_ms: 2000,
            max_retries: 30,
            linger_ms: 1500,
            ..Self::default()
        }
    }

    /// 루프백/LAN용 짧은 타임아웃 설정
    pub fn low_latency() -> Self {
        Self {
            ack_timeout_ms: 50,
            recv_timeout_ms: 200,
            max_retries: 8,
            linger_ms: 150,
            ..Self::default()
        }
    }
}
