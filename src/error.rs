//! 에러 타입 정의

use thiserror::Error;

/// chunkbridge 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("잘못된 청크: {len} bytes (시퀀스 번호 4바이트 필요)")]
    MalformedChunk { len: usize },

    #[error("잘못된 컨트롤 헤더: {0}")]
    MalformedHeader(String),

    #[error("잘못된 상태 응답: {0}")]
    MalformedStatus(String),

    #[error("저장소 에러: {0}")]
    StorageFailure(String),

    #[error("리소스 없음: {name}")]
    ResourceNotFound { name: String },

    #[error("전송 타임아웃: sequence={sequence}, attempts={attempts}")]
    TransferTimeout { sequence: u32, attempts: u32 },

    #[error("시퀀스 누락: sequence={sequence}")]
    SequenceGap { sequence: u32 },

    #[error("유효하지 않은 리소스 이름: {0:?}")]
    InvalidName(String),

    #[error("유효하지 않은 요청: {0}")]
    InvalidRequest(String),

    #[error("세션 채널 종료")]
    ChannelClosed,

    #[error("설정 에러: {0}")]
    Config(String),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// 세션을 끝내지 않고 흡수해야 하는 프레임 수준 에러 여부
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            Error::MalformedChunk { .. } | Error::MalformedHeader(_) | Error::MalformedStatus(_)
        )
    }
}
