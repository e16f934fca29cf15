//! 트래커 서버
//!
//! 연결마다 태스크 하나:
//! `핸드쉐이크 대기 → (Client: 피어 목록 요청 → 목록 전송) | (Relay: 추가/제거 → 적용)`
//!
//! 위반이 생기면 해당 연결만 끊고 다른 연결은 계속 처리한다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::framing::{read_message, with_timeout, write_message};
use crate::message::{encode_peer_list, Message, MessageKind, Role};
use crate::registry::PeerRegistry;
use crate::MAX_FIELD_LEN;

/// 트래커
pub struct Tracker {
    registry: Arc<PeerRegistry>,
    io_timeout: Option<Duration>,
}

impl Tracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            registry: Arc::new(PeerRegistry::new()),
            io_timeout: config.io_timeout,
        }
    }

    pub fn registry(&self) -> Arc<PeerRegistry> {
        self.registry.clone()
    }

    /// 수신 루프
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!("Tracker listening on {}", listener.local_addr()?);

        loop {
            let (stream, peer) = listener.accept().await?;
            debug!("연결 수락: {}", peer);

            let registry = self.registry.clone();
            let io_timeout = self.io_timeout;
            tokio::spawn(async move {
                if let Err(e) = handle_connection(&registry, stream, peer, io_timeout).await {
                    warn!("트래커 연결 {} 처리 에러: {}", peer, e);
                }
            });
        }
    }
}

/// 연결 하나 처리
pub async fn handle_connection(
    registry: &PeerRegistry,
    mut stream: TcpStream,
    peer: SocketAddr,
    io_timeout: Option<Duration>,
) -> Result<()> {
    with_timeout(io_timeout, "tracker session", session(registry, &mut stream, peer)).await?;
    stream.shutdown().await?;
    Ok(())
}

async fn session(registry: &PeerRegistry, stream: &mut TcpStream, peer: SocketAddr) -> Result<()> {
    let hello = read_message(
        stream,
        &[MessageKind::ClientHandshake, MessageKind::RelayHandshake],
    )
    .await?;
    write_message(stream, &Message::Handshake(Role::Tracker)).await?;

    match hello {
        Message::Handshake(Role::Client) => serve_client(registry, stream, peer).await,
        _ => serve_relay(registry, stream, peer).await,
    }
}

async fn serve_client(
    registry: &PeerRegistry,
    stream: &mut TcpStream,
    peer: SocketAddr,
) -> Result<()> {
    read_message(stream, &[MessageKind::FetchPeers]).await?;

    let mut peers = registry.snapshot();
    if peers.len() > MAX_FIELD_LEN {
        warn!("릴레이 {}개 중 {}개만 알림", peers.len(), MAX_FIELD_LEN);
        peers.truncate(MAX_FIELD_LEN);
    }

    // 피어 목록 응답에는 헤더가 없다
    stream.write_all(&encode_peer_list(&peers)?).await?;
    stream.flush().await?;

    info!("클라이언트 {}에 릴레이 {}개 전달", peer, peers.len());
    Ok(())
}

async fn serve_relay(
    registry: &PeerRegistry,
    stream: &mut TcpStream,
    peer: SocketAddr,
) -> Result<()> {
    let request = read_message(stream, &[MessageKind::AddPeer, MessageKind::RemovePeer]).await?;

    // 페이로드가 아닌 관측된 송신 주소만 등록
    match request {
        Message::AddPeer => {
            if !registry.add(peer.ip()) {
                debug!("이미 등록된 릴레이: {}", peer.ip());
            }
        }
        _ => {
            if !registry.remove(peer.ip()) {
                debug!("등록되지 않은 릴레이 제거 요청: {}", peer.ip());
            }
        }
    }

    Ok(())
}
