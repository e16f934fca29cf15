//! 다운로드 통계

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::partition::DownloadRange;

/// 범위를 실제로 가져온 곳
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Relay(SocketAddr),
    Local,
    /// 릴레이 실패 후 로컬 재시도
    LocalFallback { failed_relay: SocketAddr },
}

impl fmt::Display for FetchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchSource::Relay(addr) => write!(f, "relay {}", addr),
            FetchSource::Local => write!(f, "local"),
            FetchSource::LocalFallback { failed_relay } => {
                write!(f, "local (fallback from {})", failed_relay)
            }
        }
    }
}

/// 범위별 결과
#[derive(Debug, Clone)]
pub struct RangeStats {
    pub index: usize,
    pub range: DownloadRange,
    pub source: FetchSource,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// 다운로드 전체 결과
#[derive(Debug, Clone, Default)]
pub struct DownloadReport {
    /// 원본 크기
    pub file_size: u64,

    /// 인덱스 순 범위 결과
    pub ranges: Vec<RangeStats>,

    /// 병합까지 포함한 총 소요 시간
    pub elapsed: Duration,
}

impl DownloadReport {
    /// 기록된 총 바이트
    pub fn total_bytes(&self) -> u64 {
        self.ranges.iter().map(|r| r.bytes).sum()
    }

    /// 릴레이가 처리한 바이트
    pub fn relay_bytes(&self) -> u64 {
        self.ranges
            .iter()
            .filter(|r| matches!(r.source, FetchSource::Relay(_)))
            .map(|r| r.bytes)
            .sum()
    }

    /// 로컬 재시도된 범위 수
    pub fn fallback_count(&self) -> usize {
        self.ranges
            .iter()
            .filter(|r| matches!(r.source, FetchSource::LocalFallback { .. }))
            .count()
    }

    /// 처리율 (MB/s)
    pub fn throughput_mbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_bytes() as f64 / secs / 1_000_000.0
        } else {
            0.0
        }
    }
}
