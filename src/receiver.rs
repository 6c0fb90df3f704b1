//! 수신자
//!
//! - 청크 수신 즉시 ACK (도착 순서 무관)
//! - 중복 청크는 ACK만 다시 보내고 저장/카운트하지 않음
//! - 완료 후 유예 시간 동안 늦은 재전송에 ACK 재응답

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::chunk::{Chunk, Insert, Reassembly};
use crate::link::PeerLink;
use crate::message::AckMessage;
use crate::stats::TransferStats;
use crate::{Config, Error, Result};

/// 수신자
pub struct Receiver {
    /// 설정
    config: Config,
}

impl Receiver {
    /// 새 수신자 생성
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// `expected`개의 청크를 모두 받아 순서대로 조립
    pub async fn receive_all<L: PeerLink>(
        &self,
        link: &mut L,
        expected: u32,
    ) -> Result<(Bytes, TransferStats)> {
        let mut reassembly = Reassembly::new(expected);
        let mut stats = TransferStats::new();
        let mut idle_waits = 0u32;
        let recv_timeout = self.config.recv_timeout();

        while !reassembly.is_complete() {
            let datagram = match link.recv(recv_timeout).await? {
                Some(datagram) => datagram,
                None => {
                    stats.timeouts += 1;
                    idle_waits += 1;
                    if idle_waits > self.config.max_retries {
                        let sequence = reassembly.missing().first().copied().unwrap_or(0);
                        warn!(
                            "청크 대기 타임아웃: {}/{} 수신, peer={}",
                            reassembly.received_count(),
                            expected,
                            link.peer()
                        );
                        return Err(Error::TransferTimeout {
                            sequence,
                            attempts: idle_waits,
                        });
                    }
                    continue;
                }
            };

            let chunk = match Chunk::from_bytes(&datagram) {
                Ok(chunk) => chunk,
                Err(e) => {
                    debug!("데이터그램 무시: {}", e);
                    stats.discarded_datagrams += 1;
                    continue;
                }
            };

            let sequence = chunk.sequence;
            let payload_len = chunk.payload.len();

            match reassembly.insert(chunk) {
                Insert::Inserted => {
                    stats.record_chunk(payload_len);
                    debug!(
                        "청크 {} 저장 ({}/{})",
                        sequence,
                        reassembly.received_count(),
                        expected
                    );
                }
                Insert::Duplicate => {
                    // 보낸 ACK가 손실된 경우, ACK만 다시
                    stats.duplicate_chunks += 1;
                    debug!("중복 청크 {}", sequence);
                }
                Insert::OutOfRange => {
                    debug!("범위 밖 청크 {} 무시 (expected={})", sequence, expected);
                    stats.discarded_datagrams += 1;
                    continue;
                }
            }

            idle_waits = 0;
            link.send(&AckMessage::new(sequence).to_bytes()).await?;
        }

        let data = reassembly.into_bytes()?;
        Ok((data, stats))
    }

    /// 완료 후 유예 시간 동안 중복 청크에 ACK 재응답
    ///
    /// `terminal`이 있으면 피어에게서 데이터그램이 올 때마다 같이 다시 보낸다
    /// (STORE 종료 응답 손실 복구). 반환값은 처리한 늦은 데이터그램 수.
    pub async fn linger<L: PeerLink>(
        &self,
        link: &mut L,
        expected: u32,
        terminal: Option<&[u8]>,
        grace: Duration,
    ) -> Result<u64> {
        let deadline = Instant::now() + grace;
        let mut late = 0u64;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let datagram = match link.recv(remaining).await {
                Ok(Some(datagram)) => datagram,
                Ok(None) | Err(Error::ChannelClosed) => break,
                Err(e) => return Err(e),
            };
            late += 1;

            if let Ok(chunk) = Chunk::from_bytes(&datagram) {
                if chunk.sequence >= 1 && chunk.sequence <= expected {
                    debug!("유예 중 중복 청크 {} -> ACK 재전송", chunk.sequence);
                    link.send(&AckMessage::new(chunk.sequence).to_bytes()).await?;
                }
            }
            if let Some(terminal) = terminal {
                link.send(terminal).await?;
            }
        }

        Ok(late)
    }
}
