//! 청크 정의와 조립
//!
//! - Chunk: 시퀀스 번호(1부터, 연속) + 최대 1024바이트 페이로드
//! - Reassembly: 세션이 소유하는 시퀀스 번호 -> 페이로드 맵

use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, Result, SEQ_BYTES};

/// 시퀀스 번호 (32비트, 1부터 시작)
pub type SequenceNumber = u32;

/// 청크 (데이터그램 하나)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 시퀀스 번호
    pub sequence: SequenceNumber,

    /// 실제 데이터
    pub payload: Bytes,
}

impl Chunk {
    pub fn new(sequence: SequenceNumber, payload: Bytes) -> Self {
        Self { sequence, payload }
    }

    /// 와이어 크기 (4 + 페이로드)
    pub fn wire_len(&self) -> usize {
        SEQ_BYTES + self.payload.len()
    }

    /// 청크를 바이트로 직렬화
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        buf.put_u32(self.sequence);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// 바이트에서 청크 역직렬화
    ///
    /// 페이로드는 항상 새로 복사한다. 소켓 수신 버퍼와 공유하지 않음.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SEQ_BYTES {
            return Err(Error::MalformedChunk { len: bytes.len() });
        }

        let sequence = decode_sequence(&bytes[..SEQ_BYTES]);
        let payload = Bytes::copy_from_slice(&bytes[SEQ_BYTES..]);

        Ok(Self { sequence, payload })
    }
}

/// 4바이트 빅엔디안 시퀀스 번호 인코딩
pub fn encode_sequence(sequence: SequenceNumber) -> [u8; SEQ_BYTES] {
    sequence.to_be_bytes()
}

/// 4바이트 빅엔디안 시퀀스 번호 디코딩 (호출측에서 길이 보장)
pub fn decode_sequence(bytes: &[u8]) -> SequenceNumber {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// 데이터 길이에 대한 청크 수
pub fn chunk_count(len: usize, max_chunk_size: usize) -> u32 {
    ((len + max_chunk_size - 1) / max_chunk_size) as u32
}

/// 데이터를 청크들로 분할
///
/// `max_chunk_size`는 0보다 커야 한다 (`Config::validate`에서 보장).
pub fn split_into_chunks(data: &Bytes, max_chunk_size: usize) -> Vec<Chunk> {
    assert!(max_chunk_size > 0, "max_chunk_size must be positive");

    (0..data.len())
        .step_by(max_chunk_size)
        .enumerate()
        .map(|(idx, offset)| {
            let end = (offset + max_chunk_size).min(data.len());
            Chunk::new(idx as SequenceNumber + 1, data.slice(offset..end))
        })
        .collect()
}

/// 청크 삽입 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    /// 새 청크 저장됨
    Inserted,
    /// 이미 받은 시퀀스 번호 (재전송)
    Duplicate,
    /// 0 이거나 예상 청크 수 초과
    OutOfRange,
}

/// 미리 잡아 두는 조립 맵 용량 상한
const PREALLOC_CHUNKS: u32 = 1024;

/// 수신측 조립 맵
///
/// `expected`는 와이어에서 온 값이므로 용량은 상한까지만 미리 잡는다.
#[derive(Debug)]
pub struct Reassembly {
    expected: u32,
    received: HashMap<SequenceNumber, Bytes>,
    received_bytes: usize,
}

impl Reassembly {
    pub fn new(expected: u32) -> Self {
        Self {
            expected,
            received: HashMap::with_capacity(expected.min(PREALLOC_CHUNKS) as usize),
            received_bytes: 0,
        }
    }

    /// 청크 삽입. 이미 저장된 시퀀스 번호는 덮어쓰지 않는다.
    pub fn insert(&mut self, chunk: Chunk) -> Insert {
        if chunk.sequence == 0 || chunk.sequence > self.expected {
            return Insert::OutOfRange;
        }
        if self.received.contains_key(&chunk.sequence) {
            return Insert::Duplicate;
        }

        self.received_bytes += chunk.payload.len();
        self.received.insert(chunk.sequence, chunk.payload);
        Insert::Inserted
    }

    pub fn contains(&self, sequence: SequenceNumber) -> bool {
        self.received.contains_key(&sequence)
    }

    pub fn expected(&self) -> u32 {
        self.expected
    }

    pub fn received_count(&self) -> u32 {
        self.received.len() as u32
    }

    pub fn received_bytes(&self) -> usize {
        self.received_bytes
    }

    /// 완료 여부 확인
    pub fn is_complete(&self) -> bool {
        self.received_count() >= self.expected
    }

    /// 누락된 시퀀스 번호 목록
    pub fn missing(&self) -> Vec<SequenceNumber> {
        (1..=self.expected)
            .filter(|seq| !self.received.contains_key(seq))
            .collect()
    }

    /// 시퀀스 번호 순으로 이어붙인 최종 데이터
    pub fn into_bytes(mut self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.received_bytes);
        for sequence in 1..=self.expected {
            let payload = self
                .received
                .remove(&sequence)
                .ok_or(Error::SequenceGap { sequence })?;
            buf.extend_from_slice(&payload);
        }
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize) -> Bytes {
        (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
    }

    #[test]
    fn test_chunk_serialization() {
        let chunk = Chunk::new(258, Bytes::from_static(&[9, 8, 7]));
        let bytes = chunk.to_bytes();

        assert_eq!(&bytes[..4], &[0, 0, 1, 2]);
        assert_eq!(Chunk::from_bytes(&bytes).unwrap(), chunk);
    }

    #[test]
    fn test_short_datagram_is_malformed() {
        let err = Chunk::from_bytes(&[0, 1, 2]).unwrap_err();
        assert!(matches!(err, Error::MalformedChunk { len: 3 }));

        // 시퀀스 번호만 있는 빈 청크는 유효
        let empty = Chunk::from_bytes(&[0, 0, 0, 5]).unwrap();
        assert_eq!(empty.sequence, 5);
        assert!(empty.payload.is_empty());
    }

    #[test]
    fn test_photo_split_lengths() {
        let data = sample(2500);
        let chunks = split_into_chunks(&data, 1024);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunk_count(data.len(), 1024), 3);
        let lens: Vec<usize> = chunks.iter().map(|c| c.payload.len()).collect();
        assert_eq!(lens, vec![1024, 1024, 452]);
        let seqs: Vec<u32> = chunks.iter().map(|c| c.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn test_exact_multiple_and_empty() {
        let chunks = split_into_chunks(&sample(2048), 1024);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].payload.len(), 1024);

        assert!(split_into_chunks(&Bytes::new(), 1024).is_empty());
        assert_eq!(chunk_count(0, 1024), 0);
    }

    #[test]
    fn test_duplicate_does_not_recount() {
        let data = sample(3000);
        let chunks = split_into_chunks(&data, 1024);
        let mut reassembly = Reassembly::new(chunks.len() as u32);

        assert_eq!(reassembly.insert(chunks[0].clone()), Insert::Inserted);
        let tampered = Chunk::new(1, Bytes::from_static(b"other"));
        assert_eq!(reassembly.insert(tampered), Insert::Duplicate);
        assert_eq!(reassembly.received_count(), 1);

        for chunk in &chunks[1..] {
            reassembly.insert(chunk.clone());
        }
        assert!(reassembly.is_complete());
        assert_eq!(reassembly.into_bytes().unwrap(), data);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut reassembly = Reassembly::new(2);
        assert_eq!(reassembly.insert(Chunk::new(0, Bytes::new())), Insert::OutOfRange);
        assert_eq!(reassembly.insert(Chunk::new(3, Bytes::new())), Insert::OutOfRange);
        assert_eq!(reassembly.received_count(), 0);
        assert_eq!(reassembly.missing(), vec![1, 2]);
    }

    #[test]
    fn test_huge_expected_count_allocates_lazily() {
        let mut reassembly = Reassembly::new(u32::MAX);
        assert!(reassembly.received.capacity() <= 2 * PREALLOC_CHUNKS as usize);

        assert_eq!(reassembly.insert(Chunk::new(7, Bytes::from_static(b"x"))), Insert::Inserted);
        assert_eq!(reassembly.received_count(), 1);
        assert!(!reassembly.is_complete());
    }

    #[test]
    fn test_reverse_order_assembly() {
        let data = sample(5000);
        let chunks = split_into_chunks(&data, 700);
        let mut reassembly = Reassembly::new(chunks.len() as u32);

        for chunk in chunks.into_iter().rev() {
            reassembly.insert(chunk);
        }
        assert_eq!(reassembly.into_bytes().unwrap(), data);
    }

    #[test]
    fn test_gap_is_error() {
        let mut reassembly = Reassembly::new(3);
        reassembly.insert(Chunk::new(1, Bytes::from_static(b"a")));
        reassembly.insert(Chunk::new(3, Bytes::from_static(b"c")));

        assert!(!reassembly.is_complete());
        assert!(matches!(
            reassembly.into_bytes(),
            Err(Error::SequenceGap { sequence: 2 })
        ));
    }
}
