//! splitget 트래커
//!
//! 릴레이 주소 목록을 관리하고 클라이언트에 전달한다.
//!
//! 사용법:
//!   cargo run --release --bin splitget-tracker -- -c tracker.config [-d]
//!
//! 설정 파일:
//!   TRACKER_PORT 6000

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use splitget::{ConfigFile, Tracker, TrackerConfig};

#[derive(Parser, Debug)]
#[command(name = "splitget-tracker", about = "splitget 트래커 서버")]
struct Args {
    /// 설정 파일 경로
    #[arg(short, long, default_value = ".config")]
    config: PathBuf,

    /// 디버그 로그 출력
    #[arg(short, long)]
    debug: bool,
}

async fn run(args: Args) -> splitget::Result<()> {
    let config = TrackerConfig::from_file(&ConfigFile::load(&args.config)?)?;
    info!("Tracker starting on port {}", config.port);

    let listener = TcpListener::bind(config.bind_addr()).await?;
    let tracker = Tracker::new(&config);
    tracker.serve(listener).await
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

    if let Err(e) = run(args).await {
        error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}
