//! # chunkbridge
//!
//! UDP 기반 stop-and-wait 재전송 리소스 전송 + HTTP 브리지
//!
//! ## 핵심 특징
//! - **Stop-and-wait ARQ**: 청크 하나씩 전송, ACK 확인 후 다음 청크
//! - **시퀀스 맵 조립**: 도착 순서와 무관하게 시퀀스 번호 순으로 조립
//! - **텍스트 핸드쉐이크**: 리소스 이름 + STORE/FETCH + 청크 수
//! - **세션 테이블**: 피어 주소별 독립 세션, 세션당 태스크 하나
//! - **타임아웃 + 재시도 제한**: 무한 대기 대신 `TransferTimeout` 보고
//! - **게이트웨이**: HTTP 요청을 전송 세션으로 변환

pub mod backend;
pub mod chunk;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod initiator;
pub mod link;
pub mod message;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod stats;
pub mod storage;

pub use backend::Backend;
pub use chunk::{split_into_chunks, Chunk, Reassembly, SequenceNumber};
pub use config::Config;
pub use error::{Error, Result};
pub use gateway::Gateway;
pub use message::{AckMessage, ControlHeader, Operation, Outcome, StatusReply};
pub use receiver::Receiver;
pub use sender::Sender;
pub use stats::TransferStats;
pub use storage::{FsStore, MemoryStore, ResourceStore};

/// 최대 청크 페이로드 크기 (바이트)
pub const MAX_CHUNK_SIZE: usize = 1024;

/// 시퀀스 번호 크기 (바이트)
pub const SEQ_BYTES: usize = 4;

/// 청크 데이터그램 최대 크기
pub const MAX_DATAGRAM_SIZE: usize = MAX_CHUNK_SIZE + SEQ_BYTES;

/// 백엔드 기본 UDP 포트
pub const DEFAULT_BACKEND_PORT: u16 = 41000;

/// 게이트웨이 기본 TCP 포트
pub const DEFAULT_GATEWAY_PORT: u16 = 40000;
