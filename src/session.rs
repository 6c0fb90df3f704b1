//! 백엔드 전송 세션
//!
//! 컨트롤 헤더를 받으면 생성되고, 완료나 종료 실패 시 소멸한다.
//! - STORE: Receiver로 조립 -> 저장 -> SUCCESS/FAILURE
//! - FETCH: 조회 -> FAILURE 또는 SUCCESS(청크 수) -> Sender

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::chunk::{chunk_count, split_into_chunks};
use crate::link::PeerLink;
use crate::message::{ControlHeader, Operation, StatusReply};
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::stats::TransferStats;
use crate::storage::ResourceStore;
use crate::{Config, Error, Result};

/// 세션 종료 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// STORE 완료, 저장 성공
    Stored,
    /// FETCH 완료, 모든 청크 전달
    Served,
    /// FETCH 대상 없음
    NotFound,
    /// 저장소 에러나 허용 범위를 넘는 청크 수로 FAILURE 응답
    Rejected,
}

/// 세션 보고서
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub peer: SocketAddr,
    pub resource_name: String,
    pub operation: Operation,
    pub outcome: SessionOutcome,
    /// 저장/전달된 리소스 크기
    pub bytes: usize,
    /// 리소스 CRC32 (무결성 진단용)
    pub checksum: u32,
    pub stats: TransferStats,
}

/// 백엔드 세션 (피어 주소로 식별)
pub struct Session {
    peer: SocketAddr,
    header: ControlHeader,
    config: Config,
}

impl Session {
    pub fn new(peer: SocketAddr, header: ControlHeader, config: Config) -> Self {
        Self {
            peer,
            header,
            config,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn header(&self) -> &ControlHeader {
        &self.header
    }

    /// 핸드쉐이크 이후 전송을 끝까지 실행
    pub async fn run<L: PeerLink>(
        self,
        link: &mut L,
        store: Arc<dyn ResourceStore>,
    ) -> Result<SessionReport> {
        info!(
            "세션 시작: {} {} from {}",
            self.header.operation, self.header.resource_name, self.peer
        );

        match self.header.operation {
            Operation::Store => self.run_store(link, store).await,
            Operation::Fetch => self.run_fetch(link, store).await,
        }
    }

    async fn run_store<L: PeerLink>(
        self,
        link: &mut L,
        store: Arc<dyn ResourceStore>,
    ) -> Result<SessionReport> {
        let expected = self.header.chunk_count.unwrap_or(0);
        let max_chunks = self.config.max_chunks();
        if expected > max_chunks {
            warn!(
                "청크 수 초과: {} {} > {} from {}",
                self.header.resource_name, expected, max_chunks, self.peer
            );
            link.send(&StatusReply::failure().to_bytes()).await?;
            return Ok(self.report(SessionOutcome::Rejected, 0, 0, TransferStats::new()));
        }

        let receiver = Receiver::new(self.config.clone());

        let (data, stats) = match receiver.receive_all(link, expected).await {
            Ok(received) => received,
            Err(e) => {
                // 피어가 아직 살아 있으면 실패를 알림
                if let Err(send_err) = link.send(&StatusReply::failure().to_bytes()).await {
                    debug!("실패 응답 전송 실패: {}: {}", self.peer, send_err);
                }
                return Err(e);
            }
        };

        let checksum = crc32fast::hash(&data);
        let bytes = data.len();

        let (reply, outcome) = match store.store(&self.header.resource_name, data).await {
            Ok(()) => (StatusReply::success(), SessionOutcome::Stored),
            Err(e) => {
                warn!("저장 실패: {}: {}", self.header.resource_name, e);
                (StatusReply::failure(), SessionOutcome::Rejected)
            }
        };

        let reply_bytes = reply.to_bytes();
        link.send(&reply_bytes).await?;

        // 마지막 ACK나 응답이 손실된 경우 재응답
        let late = receiver
            .linger(link, expected, Some(&reply_bytes), self.config.linger())
            .await?;
        if late > 0 {
            debug!("유예 중 늦은 데이터그램 {}개 처리", late);
        }

        Ok(self.report(outcome, bytes, checksum, stats))
    }

    async fn run_fetch<L: PeerLink>(
        self,
        link: &mut L,
        store: Arc<dyn ResourceStore>,
    ) -> Result<SessionReport> {
        let data = match store.fetch(&self.header.resource_name).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                link.send(&StatusReply::failure().to_bytes()).await?;
                return Ok(self.report(SessionOutcome::NotFound, 0, 0, TransferStats::new()));
            }
            Err(e) => {
                warn!("조회 실패: {}: {}", self.header.resource_name, e);
                link.send(&StatusReply::failure().to_bytes()).await?;
                return match e {
                    Error::InvalidName(_) => {
                        Ok(self.report(SessionOutcome::NotFound, 0, 0, TransferStats::new()))
                    }
                    _ => Ok(self.report(SessionOutcome::Rejected, 0, 0, TransferStats::new())),
                };
            }
        };

        let count = chunk_count(data.len(), self.config.max_chunk_size);
        let reply_bytes = StatusReply::success_with_count(count).to_bytes();
        link.send(&reply_bytes).await?;

        let chunks = split_into_chunks(&data, self.config.max_chunk_size);
        let stats = Sender::new(self.config.clone())
            .send_all_with_handshake(link, &chunks, &reply_bytes)
            .await?;

        let checksum = crc32fast::hash(&data);
        Ok(self.report(SessionOutcome::Served, data.len(), checksum, stats))
    }

    fn report(
        self,
        outcome: SessionOutcome,
        bytes: usize,
        checksum: u32,
        stats: TransferStats,
    ) -> SessionReport {
        SessionReport {
            peer: self.peer,
            resource_name: self.header.resource_name,
            operation: self.header.operation,
            outcome,
            bytes,
            checksum,
            stats,
        }
    }
}
