//! 고정 피어와의 데이터그램 링크
//!
//! 세션의 모든 데이터그램은 세션을 연 피어 주소와만 주고받는다.
//! - SocketLink: 전용 소켓 (게이트웨이, 작업마다 임시 소켓)
//! - ChannelLink: 공유 소켓 + 세션 채널 (백엔드, 세션 테이블이 라우팅)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::{Error, Result};

/// 전송 엔진이 사용하는 링크
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// 세션 피어 주소
    fn peer(&self) -> SocketAddr;

    /// 피어로 데이터그램 하나 전송
    async fn send(&self, datagram: &[u8]) -> Result<()>;

    /// 피어의 데이터그램 하나 수신. 타임아웃이면 `None`.
    ///
    /// 반환된 바이트는 수신마다 새로 할당된다.
    async fn recv(&mut self, timeout: Duration) -> Result<Option<Bytes>>;
}

/// 전용 소켓 링크
pub struct SocketLink {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    buf: Vec<u8>,
}

impl SocketLink {
    pub fn new(socket: Arc<UdpSocket>, peer: SocketAddr, recv_buffer_size: usize) -> Self {
        Self {
            socket,
            peer,
            buf: vec![0u8; recv_buffer_size],
        }
    }

    /// 피어와 같은 주소 체계의 임시 포트에 바인딩
    pub async fn bind_ephemeral(peer: SocketAddr, recv_buffer_size: usize) -> Result<Self> {
        let local: SocketAddr = if peer.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        Ok(Self::new(Arc::new(socket), peer, recv_buffer_size))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl PeerLink for SocketLink {
    fn peer(&self) -> SocketAddr {
        self.peer
    }

    async fn send(&self, datagram: &[u8]) -> Result<()> {
        self.socket.send_to(datagram, self.peer).await?;
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        let deadline = Instant::now() + timeout;

        loop {
            match tokio::time::timeout_at(deadline, self.socket.recv_from(&mut self.buf)).await {
                Ok(Ok((len, from))) if from == self.peer => {
                    return Ok(Some(Bytes::copy_from_slice(&self.buf[..len])));
                }
                Ok(Ok((len, from))) => {
                    debug!("세션 외 피어 데이터그램 무시: {} ({} bytes)", from, len);
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Ok(None),
            }
        }
    }
}

/// 백엔드 세션 링크 (공유 소켓으로 송신, 세션 채널로 수신)
pub struct ChannelLink {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    rx: mpsc::Receiver<Bytes>,
}

impl ChannelLink {
    pub fn new(socket: Arc<UdpSocket>, peer: SocketAddr, rx: mpsc::Receiver<Bytes>) -> Self {
        Self { socket, peer, rx }
    }
}

#[async_trait]
impl PeerLink for ChannelLink {
    fn peer(&self) -> SocketAddr {
        self.peer
    }

    async fn send(&self, datagram: &[u8]) -> Result<()> {
        self.socket.send_to(datagram, self.peer).await?;
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(datagram)) => {
                trace!("세션 데이터그램: {} bytes from {}", datagram.len(), self.peer);
                Ok(Some(datagram))
            }
            Ok(None) => Err(Error::ChannelClosed),
            Err(_) => Ok(None),
        }
    }
}
