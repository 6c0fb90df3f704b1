//! 전송 개시측 (게이트웨이 -> 백엔드)
//!
//! 작업마다 임시 UDP 소켓을 열어 백엔드와 세션 하나를 진행한다.
//! - store: 헤더 -> 청크 송신 -> 상태 응답 대기
//! - fetch: 헤더 -> 상태 응답(청크 수) -> 청크 수신

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::chunk::{chunk_count, split_into_chunks};
use crate::link::{PeerLink, SocketLink};
use crate::message::{validate_resource_name, AckMessage, ControlHeader, StatusReply};
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::stats::TransferStats;
use crate::{Config, Error, Result};

/// 전송 개시측
#[derive(Debug, Clone)]
pub struct Initiator {
    config: Config,
    backend_addr: SocketAddr,
}

impl Initiator {
    /// 설정이 유효하지 않으면 `Error::Config`
    pub fn new(config: Config, backend_addr: SocketAddr) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend_addr,
        })
    }

    pub fn backend_addr(&self) -> SocketAddr {
        self.backend_addr
    }

    /// 백엔드에 리소스 저장
    pub async fn store(&self, name: &str, data: Bytes) -> Result<TransferStats> {
        validate_resource_name(name)?;
        let mut link = SocketLink::bind_ephemeral(self.backend_addr, self.config.recv_buffer_size).await?;
        self.store_over(&mut link, name, data).await
    }

    /// 백엔드에서 리소스 조회
    ///
    /// 데이터를 돌려준 뒤에도 유예 시간 동안 백그라운드에서 늦은 청크에 ACK를 보낸다.
    /// 마지막 ACK가 손실되면 백엔드 송신자가 그 ACK를 기다리며 재전송하기 때문.
    pub async fn fetch(&self, name: &str) -> Result<Bytes> {
        validate_resource_name(name)?;
        let mut link = SocketLink::bind_ephemeral(self.backend_addr, self.config.recv_buffer_size).await?;
        let (data, expected) = self.fetch_over(&mut link, name).await?;

        if expected > 0 {
            let receiver = Receiver::new(self.config.clone());
            let grace = self.config.linger();
            tokio::spawn(async move {
                if let Err(e) = receiver.linger(&mut link, expected, None, grace).await {
                    debug!("조회 유예 종료: {}", e);
                }
            });
        }

        Ok(data)
    }

    /// 주어진 링크로 STORE 세션 진행
    pub async fn store_over<L: PeerLink>(
        &self,
        link: &mut L,
        name: &str,
        data: Bytes,
    ) -> Result<TransferStats> {
        let count = chunk_count(data.len(), self.config.max_chunk_size);
        if count > self.config.max_chunks() {
            return Err(Error::InvalidRequest(format!(
                "{name}: {} bytes exceeds max_request_size",
                data.len()
            )));
        }
        let header = ControlHeader::store(name, count).to_bytes();
        link.send(&header).await?;

        let chunks = split_into_chunks(&data, self.config.max_chunk_size);
        let stats = Sender::new(self.config.clone())
            .send_all_with_handshake(link, &chunks, &header)
            .await?;

        // 상태 응답이 손실되면 마지막으로 보낸 것을 다시 보내 백엔드 응답 유도
        let (nudge, sequence) = match chunks.last() {
            Some(last) => (last.to_bytes(), last.sequence),
            None => (header, 0),
        };
        let reply = self.await_status(link, &nudge, sequence).await?;

        if !reply.is_success() {
            warn!("저장 거부: {}", name);
            return Err(Error::StorageFailure(format!("backend rejected {name}")));
        }

        info!("저장 완료: {} ({} bytes) {}", name, data.len(), stats);
        Ok(stats)
    }

    /// 주어진 링크로 FETCH 세션 진행. 조립된 데이터와 청크 수를 반환.
    pub async fn fetch_over<L: PeerLink>(&self, link: &mut L, name: &str) -> Result<(Bytes, u32)> {
        let header = ControlHeader::fetch(name).to_bytes();
        link.send(&header).await?;

        let reply = self.await_status(link, &header, 0).await?;
        if !reply.is_success() {
            return Err(Error::ResourceNotFound {
                name: name.to_string(),
            });
        }

        let expected = reply
            .chunk_count
            .ok_or_else(|| Error::MalformedStatus("SUCCESS without chunk count".into()))?;
        if expected > self.config.max_chunks() {
            return Err(Error::MalformedStatus(format!(
                "chunk count {} exceeds limit {}",
                expected,
                self.config.max_chunks()
            )));
        }

        let (data, stats) = Receiver::new(self.config.clone())
            .receive_all(link, expected)
            .await?;

        info!("조회 완료: {} ({} bytes) {}", name, data.len(), stats);
        Ok((data, expected))
    }

    /// 상태 응답 대기. 타임아웃마다 `nudge`를 다시 보낸다.
    async fn await_status<L: PeerLink>(
        &self,
        link: &mut L,
        nudge: &[u8],
        sequence: u32,
    ) -> Result<StatusReply> {
        let ack_timeout = self.config.ack_timeout();
        let mut attempts = 0u32;

        loop {
            let deadline = Instant::now() + ack_timeout;

            while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
                let datagram = match link.recv(remaining).await? {
                    Some(datagram) => datagram,
                    None => break,
                };
                // 늦은 ACK나 상태 응답보다 먼저 온 청크
                if AckMessage::from_bytes(&datagram).is_some() {
                    continue;
                }
                match StatusReply::from_bytes(&datagram) {
                    Ok(reply) => return Ok(reply),
                    Err(e) => debug!("상태 응답 대기 중 무시: {}", e),
                }
            }

            attempts += 1;
            if attempts > self.config.max_retries {
                return Err(Error::TransferTimeout { sequence, attempts });
            }
            debug!("상태 응답 타임아웃, 재요청 ({}회)", attempts);
            link.send(nudge).await?;
        }
    }
}
