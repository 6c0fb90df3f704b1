//! 백엔드 서비스
//!
//! 하나의 UDP 소켓으로 여러 피어의 세션을 동시에 처리한다.
//! - 세션 테이블: 피어 주소 -> 세션 채널
//! - 알려진 피어의 데이터그램은 해당 세션으로 라우팅
//! - 새 피어의 데이터그램은 컨트롤 헤더일 때만 세션 생성

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::link::ChannelLink;
use crate::message::ControlHeader;
use crate::session::{Session, SessionOutcome, SessionReport};
use crate::stats::BackendStats;
use crate::storage::ResourceStore;
use crate::{Config, Result};

type SessionTable = DashMap<SocketAddr, mpsc::Sender<Bytes>>;

/// 백엔드 서비스
#[derive(Clone)]
pub struct Backend {
    config: Config,
    store: Arc<dyn ResourceStore>,
    sessions: Arc<SessionTable>,
    stats: Arc<Mutex<BackendStats>>,
}

impl Backend {
    /// 설정이 유효하지 않으면 `Error::Config`
    pub fn new(config: Config, store: Arc<dyn ResourceStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            sessions: Arc::new(DashMap::new()),
            stats: Arc::new(Mutex::new(BackendStats::default())),
        })
    }

    /// 누적 통계 스냅샷
    pub fn stats(&self) -> BackendStats {
        self.stats.lock().clone()
    }

    /// 진행 중인 세션 수
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// 소켓이 닫히거나 수신 에러가 날 때까지 데이터그램 처리
    pub async fn run(self, socket: Arc<UdpSocket>) -> Result<()> {
        info!("백엔드 시작: {}", socket.local_addr()?);
        let mut buf = vec![0u8; self.config.recv_buffer_size];

        loop {
            let (len, peer) = socket.recv_from(&mut buf).await?;
            let datagram = Bytes::copy_from_slice(&buf[..len]);
            self.dispatch(&socket, peer, datagram);
        }
    }

    /// 데이터그램 하나를 세션으로 라우팅하거나 새 세션 시작
    fn dispatch(&self, socket: &Arc<UdpSocket>, peer: SocketAddr, datagram: Bytes) {
        let datagram = match self.route(peer, datagram) {
            Some(datagram) => datagram,
            None => return,
        };

        let header = match ControlHeader::from_bytes(&datagram) {
            Ok(header) => header,
            Err(e) => {
                debug!("세션 없는 피어 {}의 데이터그램 무시: {}", peer, e);
                self.stats.lock().stray_datagrams += 1;
                return;
            }
        };

        self.spawn_session(socket.clone(), peer, header);
    }

    /// 진행 중인 세션이 있으면 전달. 처리되지 않은 데이터그램은 돌려준다.
    fn route(&self, peer: SocketAddr, datagram: Bytes) -> Option<Bytes> {
        let tx = self.sessions.get(&peer).map(|entry| entry.value().clone())?;

        match tx.try_send(datagram) {
            Ok(()) => None,
            Err(mpsc::error::TrySendError::Full(_)) => {
                // 손실과 동일하게 취급, 재전송으로 복구
                warn!("세션 채널 가득 참, 데이터그램 버림: {}", peer);
                None
            }
            Err(mpsc::error::TrySendError::Closed(datagram)) => {
                // 끝난 세션의 항목, 새 요청일 수 있음
                self.sessions.remove_if(&peer, |_, current| current.same_channel(&tx));
                Some(datagram)
            }
        }
    }

    fn spawn_session(&self, socket: Arc<UdpSocket>, peer: SocketAddr, header: ControlHeader) {
        let (tx, rx) = mpsc::channel(self.config.session_channel_capacity);
        self.sessions.insert(peer, tx.clone());
        self.stats.lock().sessions_started += 1;

        let backend = self.clone();
        tokio::spawn(async move {
            let mut link = ChannelLink::new(socket, peer, rx);
            let session = Session::new(peer, header, backend.config.clone());
            let result = session.run(&mut link, backend.store.clone()).await;

            backend
                .sessions
                .remove_if(&peer, |_, current| current.same_channel(&tx));
            backend.finish(peer, result);
        });
    }

    fn finish(&self, peer: SocketAddr, result: Result<SessionReport>) {
        let mut stats = self.stats.lock();
        match result {
            Ok(report) => {
                match report.outcome {
                    SessionOutcome::Stored => {
                        stats.sessions_completed += 1;
                        stats.bytes_stored += report.bytes as u64;
                    }
                    SessionOutcome::Served => {
                        stats.sessions_completed += 1;
                        stats.bytes_served += report.bytes as u64;
                    }
                    SessionOutcome::NotFound => stats.not_found += 1,
                    SessionOutcome::Rejected => stats.sessions_failed += 1,
                }
                info!(
                    "세션 종료: {} {} {:?} ({} bytes, crc32={:08x}) {}",
                    report.operation,
                    report.resource_name,
                    report.outcome,
                    report.bytes,
                    report.checksum,
                    report.stats
                );
            }
            Err(e) => {
                stats.sessions_failed += 1;
                error!("세션 실패: {}: {}", peer, e);
            }
        }
    }
}
