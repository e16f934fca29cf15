//! 범위 다운로드 조정자
//!
//! 1. 원본 HEAD로 크기와 범위 지원 여부 확인
//! 2. 릴레이 + 로컬에 범위 분할
//! 3. 범위마다 태스크 하나로 동시에 가져오기 (모두 끝날 때까지 대기)
//! 4. 인덱스 순으로 병합해 출력에 순차 기록
//!
//! 릴레이 범위가 실패하면 해당 태스크만 실패로 처리하고, 설정에 따라 그 범위를 로컬에서 다시 받는다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::discovery::PeerDiscovery;
use crate::error::{Error, Result};
use crate::framing::{connect, read_data, with_timeout, write_message};
use crate::message::{Message, RangeRequest};
use crate::partition::{DownloadRange, FetchTarget, PartitionPlan, PlanEntry};
use crate::source::RangeSource;
use crate::stats::{DownloadReport, FetchSource, RangeStats};

/// 다운로드 옵션
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// 릴레이 연결/읽기 타임아웃 (None = 무제한)
    pub io_timeout: Option<Duration>,

    /// 릴레이가 원본에서 범위를 받아 응답을 시작할 때까지 기다리는 시간
    pub response_timeout: Option<Duration>,

    /// 릴레이 실패 시 로컬 재시도
    pub local_fallback: bool,

    /// 릴레이 연결에 쓸 로컬 포트 (0 = 자동)
    pub relay_local_port: u16,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            io_timeout: Some(Duration::from_secs(crate::DEFAULT_IO_TIMEOUT_SECS)),
            response_timeout: Some(Duration::from_secs(
                crate::DEFAULT_RELAY_RESPONSE_TIMEOUT_SECS,
            )),
            local_fallback: true,
            relay_local_port: 0,
        }
    }
}

impl From<&ClientConfig> for DownloadOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            io_timeout: config.io_timeout,
            response_timeout: config.response_timeout,
            local_fallback: config.local_fallback,
            relay_local_port: config.relay_local_port,
        }
    }
}

/// 범위 하나의 결과
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub index: usize,
    pub bytes: Bytes,
}

/// 범위 다운로드 조정자
pub struct RangeCoordinator<S> {
    source: Arc<S>,
    options: DownloadOptions,
}

impl<S: RangeSource + 'static> RangeCoordinator<S> {
    pub fn new(source: Arc<S>, options: DownloadOptions) -> Self {
        Self { source, options }
    }

    /// 트래커에서 릴레이를 찾은 뒤 다운로드
    ///
    /// 릴레이가 하나도 없으면 전체를 로컬 단일 범위로 받는다.
    pub async fn download_with_discovery<W>(
        &self,
        discovery: &PeerDiscovery,
        relay_port: u16,
        url: &str,
        sink: &mut W,
    ) -> Result<DownloadReport>
    where
        W: AsyncWrite + Unpin,
    {
        let relays = discovery.fetch_relay_addrs(relay_port).await?;
        if relays.is_empty() {
            warn!("릴레이 없음, 로컬 단일 범위로 다운로드");
        }
        self.download(url, &relays, sink).await
    }

    /// 주어진 릴레이 목록으로 다운로드
    pub async fn download<W>(
        &self,
        url: &str,
        relays: &[SocketAddr],
        sink: &mut W,
    ) -> Result<DownloadReport>
    where
        W: AsyncWrite + Unpin,
    {
        let started = Instant::now();

        let resource = self.source.probe(url).await?;
        if !resource.accepts_ranges {
            return Err(Error::RangesNotSupported {
                url: url.to_string(),
            });
        }
        info!("File size -> {} bytes", resource.size);

        let plan = PartitionPlan::new(resource.size, relays);
        if plan.remote_count() < relays.len() {
            warn!(
                "리소스가 작아 릴레이 {}개 중 {}개만 사용",
                relays.len(),
                plan.remote_count()
            );
        }
        for entry in plan.entries() {
            debug!("범위 {} {} -> {:?}", entry.index, entry.range, entry.target);
        }

        let (results, ranges) = self.fetch_all(url, &plan).await?;

        info!("Received all data, merging!");
        merge(&plan, results, sink).await?;

        let report = DownloadReport {
            file_size: resource.size,
            ranges,
            elapsed: started.elapsed(),
        };
        info!(
            "Download complete! {} bytes in {:.2}s ({:.2} MB/s)",
            report.total_bytes(),
            report.elapsed.as_secs_f64(),
            report.throughput_mbps()
        );
        Ok(report)
    }

    /// 범위마다 태스크를 띄우고 전부 끝날 때까지 대기
    async fn fetch_all(
        &self,
        url: &str,
        plan: &PartitionPlan,
    ) -> Result<(Vec<FetchResult>, Vec<RangeStats>)> {
        let mut tasks = JoinSet::new();
        for entry in plan.entries() {
            tasks.spawn(fetch_entry(
                self.source.clone(),
                url.to_string(),
                *entry,
                self.options.clone(),
            ));
        }

        // 인덱스마다 정확히 한 태스크만 기록
        let mut slots: Vec<Option<(FetchResult, RangeStats)>> = vec![None; plan.len()];
        let mut failed = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = joined?;
            match outcome {
                Ok(done) => slots[index] = Some(done),
                Err(e) => {
                    warn!("범위 {} 실패: {}", index, e);
                    failed.push(index);
                }
            }
        }

        if !failed.is_empty() {
            failed.sort_unstable();
            return Err(Error::DownloadFailed { failed });
        }

        Ok(slots.into_iter().flatten().unzip())
    }
}

/// 계획 항목 하나 처리
async fn fetch_entry<S: RangeSource>(
    source: Arc<S>,
    url: String,
    entry: PlanEntry,
    options: DownloadOptions,
) -> (usize, Result<(FetchResult, RangeStats)>) {
    let started = Instant::now();

    let outcome = match entry.target {
        FetchTarget::Local => {
            info!("Downloading locally for range {}", entry.range);
            source
                .fetch_range(&url, entry.range)
                .await
                .map(|bytes| (bytes, FetchSource::Local))
        }
        FetchTarget::Relay(addr) => {
            info!("Downloading range {} via relay {}", entry.range, addr);
            match fetch_remote_range(addr, &url, entry.range, &options).await {
                Ok(bytes) => Ok((bytes, FetchSource::Relay(addr))),
                Err(e) if options.local_fallback => {
                    warn!("릴레이 {} 범위 {} 실패, 로컬 재시도: {}", addr, entry.range, e);
                    source
                        .fetch_range(&url, entry.range)
                        .await
                        .map(|bytes| (bytes, FetchSource::LocalFallback { failed_relay: addr }))
                }
                Err(e) => Err(e),
            }
        }
    };

    let outcome = outcome.map(|(bytes, source)| {
        info!("Range {} done! -> {} bytes", entry.range, bytes.len());
        let stats = RangeStats {
            index: entry.index,
            range: entry.range,
            source,
            bytes: bytes.len() as u64,
            elapsed: started.elapsed(),
        };
        (
            FetchResult {
                index: entry.index,
                bytes,
            },
            stats,
        )
    });

    (entry.index, outcome)
}

/// 릴레이에서 범위 하나 가져오기
///
/// 연결과 요청 전송은 `io_timeout` 안에 끝나야 한다. 응답 헤더는 `response_timeout`까지
/// 기다리고, 이후 데이터는 읽기마다 `io_timeout`을 적용한다.
pub async fn fetch_remote_range(
    relay: SocketAddr,
    url: &str,
    range: DownloadRange,
    options: &DownloadOptions,
) -> Result<Bytes> {
    let mut stream = with_timeout(options.io_timeout, "relay request", async {
        let mut stream = connect(relay, options.relay_local_port).await?;
        write_message(&mut stream, &Message::RangeRequest(RangeRequest::new(url, range))).await?;
        Ok::<_, Error>(stream)
    })
    .await?;

    read_data(
        &mut stream,
        range.len() as usize,
        options.response_timeout,
        options.io_timeout,
    )
    .await
}

/// 인덱스 순으로 검증 후 순차 기록
///
/// 하나라도 길이가 맞지 않으면 아무것도 쓰지 않는다.
pub async fn merge<W>(plan: &PartitionPlan, results: Vec<FetchResult>, sink: &mut W) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    for (entry, result) in plan.entries().iter().zip(&results) {
        debug_assert_eq!(entry.index, result.index);
        if result.bytes.len() as u64 != entry.range.len() {
            return Err(Error::LengthMismatch {
                range: entry.range,
                got: result.bytes.len() as u64,
            });
        }
    }
    if results.len() != plan.len() {
        return Err(Error::DownloadFailed {
            failed: (results.len()..plan.len()).collect(),
        });
    }

    let mut written = 0u64;
    for result in results {
        sink.write_all(&result.bytes).await?;
        written += result.bytes.len() as u64;
    }
    sink.flush().await?;

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RelayConfig, TrackerConfig};
    use crate::framing::read_message;
    use crate::message::MessageKind;
    use crate::relay::{announce, Announcement, RelayServer};
    use crate::source::testing::{pattern, MemorySource};
    use crate::tracker::Tracker;
    use tokio::net::TcpListener;

    const TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

    fn options(local_fallback: bool) -> DownloadOptions {
        DownloadOptions {
            io_timeout: TIMEOUT,
            response_timeout: TIMEOUT,
            local_fallback,
            relay_local_port: 0,
        }
    }

    fn relay_config(tracker: SocketAddr) -> RelayConfig {
        RelayConfig {
            tracker_addr: tracker,
            client_port: 0,
            tracker_local_port: 0,
            io_timeout: TIMEOUT,
            send_chunk_size: 1024,
        }
    }

    async fn start_relay(source: Arc<MemorySource>) -> SocketAddr {
        start_relay_with(source, TIMEOUT).await
    }

    async fn start_relay_with(source: Arc<MemorySource>, io_timeout: Option<Duration>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = RelayServer::new(
            source,
            &RelayConfig {
                io_timeout,
                ..relay_config(addr)
            },
        );
        tokio::spawn(async move { server.serve(listener).await });
        addr
    }

    /// 범위 요청을 받고 헤더와 일부 바이트만 보낸 뒤 끊는 릴레이
    async fn start_tracker() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let tracker = Tracker::new(&TrackerConfig {
            port: addr.port(),
            io_timeout: TIMEOUT,
        });
        tokio::spawn(async move { tracker.serve(listener).await });
        addr
    }

    async fn start_truncating_relay(sent: usize) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                read_message(&mut stream, &[MessageKind::RangeRequest])
                    .await
                    .unwrap();
                let packet = Message::Data(Bytes::from(vec![0xEE; sent]))
                    .encode()
                    .unwrap();
                stream.write_all(&packet).await.unwrap();
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_three_way_download_merges_in_order() {
        let content = pattern(300);
        let relay_a = Arc::new(MemorySource::new(content.clone()));
        let relay_b = Arc::new(MemorySource::new(content.clone()));
        let local = Arc::new(MemorySource::new(content.clone()));

        let relays = vec![
            start_relay(relay_a.clone()).await,
            start_relay(relay_b.clone()).await,
        ];

        let coordinator = RangeCoordinator::new(local.clone(), options(false));
        let mut output = Vec::new();
        let report = coordinator
            .download("http://origin/file", &relays, &mut output)
            .await
            .unwrap();

        assert_eq!(output, content);
        assert_eq!(relay_a.fetch_count(), 1);
        assert_eq!(relay_b.fetch_count(), 1);
        assert_eq!(local.fetch_count(), 1);

        let ranges: Vec<_> = report.ranges.iter().map(|r| r.range).collect();
        assert_eq!(
            ranges,
            vec![
                DownloadRange::new(0, 99),
                DownloadRange::new(100, 199),
                DownloadRange::new(200, 299),
            ]
        );
        assert_eq!(report.ranges[0].source, FetchSource::Relay(relays[0]));
        assert_eq!(report.ranges[1].source, FetchSource::Relay(relays[1]));
        assert_eq!(report.ranges[2].source, FetchSource::Local);
        assert_eq!(report.relay_bytes(), 200);
    }

    #[tokio::test]
    async fn test_no_relays_downloads_locally() {
        let content = pattern(1000);
        let local = Arc::new(MemorySource::new(content.clone()));
        let coordinator = RangeCoordinator::new(local.clone(), options(true));

        let mut output = Vec::new();
        let report = coordinator
            .download("http://origin/file", &[], &mut output)
            .await
            .unwrap();

        assert_eq!(output, content);
        assert_eq!(report.ranges.len(), 1);
        assert_eq!(local.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_truncated_relay_response_is_transport_error() {
        let relay = start_truncating_relay(40).await;

        let err = fetch_remote_range(relay, "u", DownloadRange::new(0, 99), &options(false))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::PrematureClose {
                expected: 102,
                received: 42
            }
        ));
    }

    #[tokio::test]
    async fn test_failed_range_without_fallback_reports_partial_failure() {
        let content = pattern(300);
        let good = start_relay(Arc::new(MemorySource::new(content.clone()))).await;
        let bad = start_truncating_relay(10).await;

        let coordinator =
            RangeCoordinator::new(Arc::new(MemorySource::new(content)), options(false));
        let mut output = Vec::new();
        let err = coordinator
            .download("u", &[good, bad], &mut output)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DownloadFailed { ref failed } if failed == &vec![1]));
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_failed_range_falls_back_to_local() {
        let content = pattern(300);
        let bad = start_truncating_relay(10).await;
        let local = Arc::new(MemorySource::new(content.clone()));

        let coordinator = RangeCoordinator::new(local.clone(), options(true));
        let mut output = Vec::new();
        let report = coordinator.download("u", &[bad], &mut output).await.unwrap();

        assert_eq!(output, content);
        assert_eq!(local.fetch_count(), 2);
        assert_eq!(report.fallback_count(), 1);
        assert_eq!(
            report.ranges[0].source,
            FetchSource::LocalFallback { failed_relay: bad }
        );
    }

    #[tokio::test]
    async fn test_rejects_origin_without_ranges() {
        let mut source = MemorySource::new(pattern(10));
        source.accepts_ranges = false;

        let coordinator = RangeCoordinator::new(Arc::new(source), options(true));
        let mut output = Vec::new();
        let err = coordinator
            .download("http://origin/file", &[], &mut output)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RangesNotSupported { .. }));
    }

    #[tokio::test]
    async fn test_merge_checks_lengths_before_writing() {
        let plan = PartitionPlan::new(10, &["10.0.0.1:7000".parse().unwrap()]);
        let results = vec![
            FetchResult {
                index: 0,
                bytes: Bytes::from_static(b"01234"),
            },
            FetchResult {
                index: 1,
                bytes: Bytes::from_static(b"567"),
            },
        ];

        let mut output = Vec::new();
        let err = merge(&plan, results, &mut output).await.unwrap_err();
        assert!(matches!(err, Error::LengthMismatch { got: 3, .. }));
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_download_through_tracker() {
        let tracker_addr = start_tracker().await;

        let content = pattern(4096);
        let relay = Arc::new(MemorySource::new(content.clone()));
        let relay_addr = start_relay(relay.clone()).await;
        announce(tracker_addr, 0, Announcement::Add, TIMEOUT)
            .await
            .unwrap();

        let discovery = PeerDiscovery::new(tracker_addr, 0, TIMEOUT);
        let coordinator =
            RangeCoordinator::new(Arc::new(MemorySource::new(content.clone())), options(false));

        let output_file = tempfile::NamedTempFile::new().unwrap();
        let mut sink = tokio::fs::File::create(output_file.path()).await.unwrap();
        let report = coordinator
            .download_with_discovery(&discovery, relay_addr.port(), "u", &mut sink)
            .await
            .unwrap();
        drop(sink);

        assert_eq!(std::fs::read(output_file.path()).unwrap(), content);
        assert_eq!(relay.fetch_count(), 1);
        assert_eq!(report.ranges[0].range, DownloadRange::new(0, 2047));
        assert_eq!(report.ranges[1].range, DownloadRange::new(2048, 4095));
    }

    #[tokio::test]
    async fn test_slow_relay_is_not_abandoned() {
        let content = pattern(600);
        let short = Some(Duration::from_millis(150));

        // 원본 응답이 유휴 타임아웃보다 늦는 릴레이
        let mut slow = MemorySource::new(content.clone());
        slow.delay = Duration::from_millis(400);
        let slow = Arc::new(slow);
        let relay = start_relay_with(slow.clone(), short).await;

        let local = Arc::new(MemorySource::new(content.clone()));
        let coordinator = RangeCoordinator::new(
            local.clone(),
            DownloadOptions {
                io_timeout: short,
                response_timeout: TIMEOUT,
                local_fallback: true,
                relay_local_port: 0,
            },
        );

        let mut output = Vec::new();
        let report = coordinator.download("u", &[relay], &mut output).await.unwrap();

        assert_eq!(output, content);
        assert_eq!(report.ranges[0].source, FetchSource::Relay(relay));
        assert_eq!(report.fallback_count(), 0);
        assert_eq!(slow.fetch_count(), 1);
        assert_eq!(local.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_tracker_downloads_locally() {
        let tracker_addr = start_tracker().await;
        let content = pattern(2500);
        let local = Arc::new(MemorySource::new(content.clone()));

        let discovery = PeerDiscovery::new(tracker_addr, 0, TIMEOUT);
        let coordinator = RangeCoordinator::new(local.clone(), options(false));

        let output_file = tempfile::NamedTempFile::new().unwrap();
        let mut sink = tokio::fs::File::create(output_file.path()).await.unwrap();
        let report = coordinator
            .download_with_discovery(&discovery, 7000, "u", &mut sink)
            .await
            .unwrap();
        drop(sink);

        assert_eq!(std::fs::read(output_file.path()).unwrap(), content);
        assert_eq!(report.ranges.len(), 1);
        assert_eq!(report.ranges[0].range, DownloadRange::new(0, 2499));
        assert_eq!(report.ranges[0].source, FetchSource::Local);
        assert_eq!(local.fetch_count(), 1);
    }
}
