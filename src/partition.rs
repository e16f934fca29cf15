//! 다운로드 범위 분할
//!
//! - DownloadRange: 원본 리소스의 포함 구간 `[start, end]`
//! - PartitionPlan: 릴레이 + 로컬에 범위를 순서대로 배정
//!
//! 마지막 항목은 항상 로컬 다운로드이며, 병합 순서는 완료 순서가 아닌 인덱스 순서다.

use std::fmt;
use std::net::SocketAddr;

/// 바이트 범위 (양 끝 포함)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DownloadRange {
    pub start: u64,
    pub end: u64,
}

impl DownloadRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// 범위 바이트 수
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// HTTP `Range` 헤더 값
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl fmt::Display for DownloadRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// 범위를 가져올 대상
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTarget {
    Relay(SocketAddr),
    Local,
}

/// 분할 계획 항목
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanEntry {
    pub index: usize,
    pub range: DownloadRange,
    pub target: FetchTarget,
}

/// 분할 계획
#[derive(Debug, Clone, Default)]
pub struct PartitionPlan {
    entries: Vec<PlanEntry>,
}

impl PartitionPlan {
    /// 발견 순서대로 릴레이에 범위 배정, 나머지를 흡수하는 마지막 범위는 로컬
    ///
    /// 리소스가 너무 작으면 앞쪽 `file_size - 1`개의 릴레이만 사용한다.
    pub fn new(file_size: u64, relays: &[SocketAddr]) -> Self {
        let ranges = split(file_size, relays.len());
        let remote_count = ranges.len().saturating_sub(1);

        let entries = ranges
            .into_iter()
            .enumerate()
            .map(|(index, range)| PlanEntry {
                index,
                range,
                target: if index < remote_count {
                    FetchTarget::Relay(relays[index])
                } else {
                    FetchTarget::Local
                },
            })
            .collect();

        Self { entries }
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 릴레이에 배정된 항목 수
    pub fn remote_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.target, FetchTarget::Relay(_)))
            .count()
    }
}

/// `[0, file_size - 1]`를 `relay_count + 1`개의 연속 구간으로 분할
///
/// `q = file_size / n`일 때 i번째 범위는 `[q*i, q*(i+1) - 1]`, 마지막 범위는
/// `[q*(n-1), file_size - 1]`이다. 모든 범위가 비어있지 않도록 n은 file_size로 제한된다.
pub fn split(file_size: u64, relay_count: usize) -> Vec<DownloadRange> {
    if file_size == 0 {
        return Vec::new();
    }

    let n = (relay_count as u64 + 1).min(file_size);
    let q = file_size / n;

    let mut ranges: Vec<DownloadRange> = (0..n - 1)
        .map(|i| DownloadRange::new(q * i, q * (i + 1) - 1))
        .collect();
    ranges.push(DownloadRange::new(q * (n - 1), file_size - 1));
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relays(count: usize) -> Vec<SocketAddr> {
        (0..count)
            .map(|i| SocketAddr::from(([10, 0, 0, i as u8 + 1], 7000)))
            .collect()
    }

    #[test]
    fn test_split_300_bytes_two_relays() {
        let ranges = split(300, 2);
        assert_eq!(
            ranges,
            vec![
                DownloadRange::new(0, 99),
                DownloadRange::new(100, 199),
                DownloadRange::new(200, 299),
            ]
        );
    }

    #[test]
    fn test_last_range_absorbs_remainder() {
        let ranges = split(10, 2);
        assert_eq!(
            ranges,
            vec![
                DownloadRange::new(0, 2),
                DownloadRange::new(3, 5),
                DownloadRange::new(6, 9),
            ]
        );
    }

    #[test]
    fn test_split_covers_whole_resource() {
        for file_size in 1..=257u64 {
            for relay_count in 0..=9usize {
                let ranges = split(file_size, relay_count);

                assert!(!ranges.is_empty());
                assert!(ranges.len() <= relay_count + 1);
                assert_eq!(ranges[0].start, 0);
                assert_eq!(ranges.last().unwrap().end, file_size - 1);

                for pair in ranges.windows(2) {
                    assert_eq!(pair[0].end + 1, pair[1].start);
                }
                for range in &ranges {
                    assert!(range.start <= range.end);
                }

                let total: u64 = ranges.iter().map(DownloadRange::len).sum();
                assert_eq!(total, file_size);
            }
        }
    }

    #[test]
    fn test_empty_resource() {
        assert!(split(0, 3).is_empty());
        assert!(PartitionPlan::new(0, &relays(3)).is_empty());
    }

    #[test]
    fn test_plan_assigns_relays_in_order_and_local_last() {
        let relays = relays(2);
        let plan = PartitionPlan::new(300, &relays);

        assert_eq!(plan.len(), 3);
        assert_eq!(plan.remote_count(), 2);
        assert_eq!(plan.entries()[0].target, FetchTarget::Relay(relays[0]));
        assert_eq!(plan.entries()[1].target, FetchTarget::Relay(relays[1]));
        assert_eq!(plan.entries()[2].target, FetchTarget::Local);
        assert_eq!(plan.entries()[2].range, DownloadRange::new(200, 299));
    }

    #[test]
    fn test_plan_without_relays_is_local_only() {
        let plan = PartitionPlan::new(300, &[]);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.remote_count(), 0);
        assert_eq!(plan.entries()[0].range, DownloadRange::new(0, 299));
        assert_eq!(plan.entries()[0].target, FetchTarget::Local);
    }

    #[test]
    fn test_tiny_resource_uses_fewer_relays() {
        let plan = PartitionPlan::new(3, &relays(5));
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.remote_count(), 2);
        assert!(plan.entries().iter().all(|e| e.range.len() == 1));
    }

    #[test]
    fn test_range_header_value() {
        assert_eq!(DownloadRange::new(100, 199).header_value(), "bytes=100-199");
        assert_eq!(DownloadRange::new(100, 199).len(), 100);
    }
}
