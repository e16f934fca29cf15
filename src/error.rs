//! 에러 타입 정의

use thiserror::Error;

use crate::partition::DownloadRange;

/// 프로토콜 위반
///
/// 수신 측은 이 에러를 받으면 해당 연결을 즉시 끊는다 (부분 복구 없음)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("헤더 길이 부족: {len} bytes")]
    TruncatedHeader { len: usize },

    #[error("허용되지 않은 메시지: role={role}, type={msg_type}")]
    UnexpectedMessage { role: u8, msg_type: u8 },

    #[error("필드 길이 초과: {field} = {len} bytes (최대 255)")]
    FieldTooLong { field: &'static str, len: usize },

    #[error("잘못된 페이로드: {0}")]
    MalformedPayload(String),
}

/// splitget 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("설정 에러: {0}")]
    Config(String),

    #[error("프로토콜 위반: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("연결이 조기 종료됨: expected {expected} bytes, received {received}")]
    PrematureClose { expected: usize, received: usize },

    #[error("타임아웃: {0}")]
    Timeout(&'static str),

    #[error("HTTP 에러: {0}")]
    Http(#[from] reqwest::Error),

    #[error("원본 서버가 범위 요청을 지원하지 않음: {url}")]
    RangesNotSupported { url: String },

    #[error("원본 응답에 Content-Length 없음: {url}")]
    MissingContentLength { url: String },

    #[error("원본 서버 응답 상태 이상: {status}")]
    UpstreamStatus { status: u16 },

    #[error("범위 {range} 길이 불일치: expected {}, got {got}", .range.len())]
    LengthMismatch { range: DownloadRange, got: u64 },

    #[error("다운로드 실패: 범위 {failed:?}")]
    DownloadFailed { failed: Vec<usize> },

    #[error("태스크 조인 에러: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// 프로토콜 위반 여부
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
