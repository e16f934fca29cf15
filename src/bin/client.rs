//! splitget 클라이언트
//!
//! 트래커에서 릴레이를 찾아 범위를 나눠 받고 하나의 파일로 병합한다.
//!
//! 사용법:
//!   cargo run --release --bin splitget-client -- -c client.config [-d]
//!
//! 설정 파일:
//!   TRACKER_IP 192.168.0.10
//!   TRACKER_PORT 6000
//!   URL http://example.com/big.iso
//!   PATH big.iso
//!   SERVER_CLIENT_PORT 7000
//!   LOCAL_FALLBACK true

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use splitget::{
    ClientConfig, ConfigFile, DownloadOptions, DownloadReport, HttpRangeSource, PeerDiscovery,
    RangeCoordinator,
};

#[derive(Parser, Debug)]
#[command(name = "splitget-client", about = "splitget 다운로드 클라이언트")]
struct Args {
    /// 설정 파일 경로
    #[arg(short, long, default_value = ".config")]
    config: PathBuf,

    /// 디버그 로그 출력
    #[arg(short, long)]
    debug: bool,
}

async fn run(config: &ClientConfig) -> splitget::Result<DownloadReport> {
    let discovery = PeerDiscovery::new(
        config.tracker_addr,
        config.tracker_local_port,
        config.io_timeout,
    );
    let coordinator = RangeCoordinator::new(
        Arc::new(HttpRangeSource::new()),
        DownloadOptions::from(config),
    );

    let mut output = tokio::fs::File::create(&config.output_path).await?;
    coordinator
        .download_with_discovery(&discovery, config.relay_port, &config.url, &mut output)
        .await
}

fn print_report(config: &ClientConfig, report: &DownloadReport) {
    for range in &report.ranges {
        info!(
            "range {} {}: {} bytes from {} in {:.2}s",
            range.index,
            range.range,
            range.bytes,
            range.source,
            range.elapsed.as_secs_f64()
        );
    }

    println!(
        "{} -> {} ({} bytes, {} ranges, {:.2}s, {:.2} MB/s)",
        config.url,
        config.output_path.display(),
        report.total_bytes(),
        report.ranges.len(),
        report.elapsed.as_secs_f64(),
        report.throughput_mbps()
    );
    if report.fallback_count() > 0 {
        println!("  {} range(s) retried locally", report.fallback_count());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // 로깅 설정
    let level = if args.debug { "debug" } else { "warn" };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match ConfigFile::load(&args.config).and_then(|f| ClientConfig::from_file(&f)) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    match run(&config).await {
        Ok(report) => {
            print_report(&config, &report);
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            // 실패한 다운로드의 불완전한 파일은 남기지 않는다
            let _ = tokio::fs::remove_file(&config.output_path).await;
            std::process::exit(1);
        }
    }
}
