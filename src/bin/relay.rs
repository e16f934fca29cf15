//! splitget 릴레이
//!
//! 시작 시 트래커에 자신을 등록하고, 클라이언트의 범위 요청을 원본에서 받아 전달한다.
//! Ctrl-C로 종료하면 트래커에서 자신을 제거한다.
//!
//! 사용법:
//!   cargo run --release --bin splitget-relay -- -c relay.config [-d]
//!
//! 설정 파일:
//!   TRACKER_IP 192.168.0.10
//!   TRACKER_PORT 6000
//!   SERVER_CLIENT_PORT 7000
//!   SERVER_TRACKER_PORT 7001

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use splitget::{announce, Announcement, ConfigFile, HttpRangeSource, RelayConfig, RelayServer};

#[derive(Parser, Debug)]
#[command(name = "splitget-relay", about = "splitget 릴레이 서버")]
struct Args {
    /// 설정 파일 경로
    #[arg(short, long, default_value = ".config")]
    config: PathBuf,

    /// 디버그 로그 출력
    #[arg(short, long)]
    debug: bool,
}

async fn run(args: Args) -> splitget::Result<()> {
    let config = RelayConfig::from_file(&ConfigFile::load(&args.config)?)?;

    // 등록 전에 먼저 수신을 열어둔다
    let listener = TcpListener::bind(config.bind_addr()).await?;
    announce(
        config.tracker_addr,
        config.tracker_local_port,
        Announcement::Add,
        config.io_timeout,
    )
    .await?;
    info!("Registered with tracker {}", config.tracker_addr);

    let server = RelayServer::new(Arc::new(HttpRangeSource::new()), &config);

    tokio::select! {
        result = server.serve(listener) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down, removing from tracker");
            if let Err(e) = announce(
                config.tracker_addr,
                config.tracker_local_port,
                Announcement::Remove,
                config.io_timeout,
            )
            .await
            {
                warn!("트래커에서 제거 실패: {}", e);
            }
            Ok(())
        }
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

    if let Err(e) = run(args).await {
        error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}
