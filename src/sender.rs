//! 송신자 (stop-and-wait)
//!
//! - 청크 하나 전송 후 ACK 대기
//! - ACK 불일치 / 타임아웃이면 같은 청크 그대로 재전송
//! - 청크당 재전송 횟수 제한 초과 시 `TransferTimeout`

use tracing::{debug, warn};

use crate::chunk::Chunk;
use crate::link::PeerLink;
use crate::message::AckMessage;
use crate::stats::TransferStats;
use crate::{Config, Error, Result};

/// 송신자
pub struct Sender {
    /// 설정
    config: Config,
}

impl Sender {
    /// 새 송신자 생성
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// 모든 청크를 순서대로 전달
    pub async fn send_all<L: PeerLink>(&self, link: &mut L, chunks: &[Chunk]) -> Result<TransferStats> {
        self.transmit(link, chunks, None).await
    }

    /// 핸드쉐이크 데이터그램과 함께 전달
    ///
    /// 첫 ACK를 받기 전까지 청크 1을 재전송할 때마다 `handshake`를 먼저 다시 보낸다.
    /// 핸드쉐이크 데이터그램 자체가 손실돼도 같은 재전송 타이머로 복구된다.
    pub async fn send_all_with_handshake<L: PeerLink>(
        &self,
        link: &mut L,
        chunks: &[Chunk],
        handshake: &[u8],
    ) -> Result<TransferStats> {
        self.transmit(link, chunks, Some(handshake)).await
    }

    async fn transmit<L: PeerLink>(
        &self,
        link: &mut L,
        chunks: &[Chunk],
        handshake: Option<&[u8]>,
    ) -> Result<TransferStats> {
        let mut stats = TransferStats::new();
        let mut acked_any = false;
        let ack_timeout = self.config.ack_timeout();

        for chunk in chunks {
            let wire = chunk.to_bytes();
            link.send(&wire).await?;
            stats.record_chunk(chunk.payload.len());

            let mut attempts = 0u32;
            loop {
                match link.recv(ack_timeout).await? {
                    Some(datagram) => match AckMessage::from_bytes(&datagram) {
                        Some(ack) if ack.sequence == chunk.sequence => {
                            debug!("ACK {} 수신 ({} 재전송)", ack.sequence, attempts);
                            acked_any = true;
                            break;
                        }
                        Some(ack) => {
                            // 이전 청크나 ACK 손실로 간주
                            debug!(
                                "ACK 불일치: expected={}, got={}",
                                chunk.sequence, ack.sequence
                            );
                            stats.ack_mismatches += 1;
                        }
                        None => {
                            debug!("ACK 아닌 데이터그램 무시: {} bytes", datagram.len());
                            stats.discarded_datagrams += 1;
                            continue;
                        }
                    },
                    None => {
                        debug!("ACK {} 대기 타임아웃", chunk.sequence);
                        stats.timeouts += 1;
                    }
                }

                attempts += 1;
                if attempts > self.config.max_retries {
                    warn!(
                        "청크 {} 재전송 한도 초과 ({}회), peer={}",
                        chunk.sequence,
                        self.config.max_retries,
                        link.peer()
                    );
                    return Err(Error::TransferTimeout {
                        sequence: chunk.sequence,
                        attempts,
                    });
                }

                if !acked_any {
                    if let Some(handshake) = handshake {
                        link.send(handshake).await?;
                    }
                }
                link.send(&wire).await?;
                stats.retransmitted_chunks += 1;
            }
        }

        Ok(stats)
    }
}
