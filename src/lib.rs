//! # splitget
//!
//! 큰 HTTP 리소스 하나를 바이트 범위로 나눠 병렬로 받는 다운로더
//!
//! ## 구성
//! - **트래커**: 살아있는 릴레이 주소 목록을 관리하고 클라이언트에 전달
//! - **릴레이**: 클라이언트 대신 원본에서 범위 하나를 받아 돌려줌
//! - **클라이언트**: 릴레이 수 + 1개로 범위를 나눠 동시에 받고, 순서대로 병합
//!
//! 세 역할은 2바이트 `[role, type]` 헤더로 시작하는 TCP 프로토콜을 공유한다.

pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod framing;
pub mod message;
pub mod partition;
pub mod registry;
pub mod relay;
pub mod source;
pub mod stats;
pub mod tracker;

pub use config::{ClientConfig, ConfigFile, RelayConfig, TrackerConfig};
pub use coordinator::{DownloadOptions, FetchResult, RangeCoordinator};
pub use discovery::PeerDiscovery;
pub use error::{Error, ProtocolViolation, Result};
pub use message::{Message, MessageKind, RangeRequest, Role};
pub use partition::{DownloadRange, FetchTarget, PartitionPlan};
pub use registry::PeerRegistry;
pub use relay::{announce, Announcement, RelayServer};
pub use source::{HttpRangeSource, RangeSource, ResourceInfo};
pub use stats::{DownloadReport, FetchSource, RangeStats};
pub use tracker::Tracker;

/// 메시지 헤더 길이 (role + type)
pub const HEADER_LEN: usize = 2;

/// 1바이트 길이 접두 필드의 최대 길이
pub const MAX_FIELD_LEN: usize = u8::MAX as usize;

/// 데이터 응답 기본 송신 단위 (바이트)
pub const DEFAULT_SEND_CHUNK_SIZE: usize = 1024;

/// 기본 I/O 타임아웃 (초)
pub const DEFAULT_IO_TIMEOUT_SECS: u64 = 30;

/// 릴레이 응답 시작까지 기본 대기 시간 (초)
pub const DEFAULT_RELAY_RESPONSE_TIMEOUT_SECS: u64 = 600;
