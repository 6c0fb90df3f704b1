//! 전송 통계

use std::fmt;
use std::time::{Duration, Instant};

/// 전송 하나(송신 또는 수신)의 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 최초 전송/수신된 청크 수
    pub total_chunks: u64,

    /// 최초 전송/수신된 페이로드 바이트
    pub total_bytes: u64,

    /// 재전송 청크 수 (송신측)
    pub retransmitted_chunks: u64,

    /// 중복 수신 청크 수 (수신측)
    pub duplicate_chunks: u64,

    /// 기대와 다른 ACK 수
    pub ack_mismatches: u64,

    /// 타임아웃된 대기 수
    pub timeouts: u64,

    /// 버린 데이터그램 수 (잘못된 형식, 범위 밖)
    pub discarded_datagrams: u64,
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_chunks: 0,
            total_bytes: 0,
            retransmitted_chunks: 0,
            duplicate_chunks: 0,
            ack_mismatches: 0,
            timeouts: 0,
            discarded_datagrams: 0,
        }
    }

    /// 청크 최초 전송/수신 기록
    pub fn record_chunk(&mut self, payload_len: usize) {
        self.total_chunks += 1;
        self.total_bytes += payload_len as u64;
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / secs
    }

    /// 재전송률
    pub fn retransmission_rate(&self) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }
        self.retransmitted_chunks as f64 / self.total_chunks as f64
    }
}

impl fmt::Display for TransferStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} chunks / {} bytes in {:.1}ms (retransmits={}, duplicates={}, mismatches={}, timeouts={}, discarded={})",
            self.total_chunks,
            self.total_bytes,
            self.elapsed().as_secs_f64() * 1000.0,
            self.retransmitted_chunks,
            self.duplicate_chunks,
            self.ack_mismatches,
            self.timeouts,
            self.discarded_datagrams
        )
    }
}

/// 백엔드 누적 통계
#[derive(Debug, Clone, Default)]
pub struct BackendStats {
    pub sessions_started: u64,
    pub sessions_completed: u64,
    pub sessions_failed: u64,
    pub not_found: u64,
    pub bytes_stored: u64,
    pub bytes_served: u64,
    /// 세션 없는 피어에게서 온, 헤더가 아닌 데이터그램
    pub stray_datagrams: u64,
}
