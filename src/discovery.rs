//! 피어 탐색 클라이언트
//!
//! 트래커에 클라이언트로 핸드쉐이크한 뒤 릴레이 주소 목록을 받는다.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::Result;
use crate::framing::{connect, read_header, read_peer_list, with_timeout, write_message};
use crate::message::{Message, MessageKind, Role};

/// 트래커 피어 탐색
#[derive(Debug, Clone)]
pub struct PeerDiscovery {
    tracker: SocketAddr,
    local_port: u16,
    io_timeout: Option<Duration>,
}

impl PeerDiscovery {
    pub fn new(tracker: SocketAddr, local_port: u16, io_timeout: Option<Duration>) -> Self {
        Self {
            tracker,
            local_port,
            io_timeout,
        }
    }

    /// 릴레이 주소 목록 (트래커 레지스트리 순서 그대로)
    pub async fn fetch_peers(&self) -> Result<Vec<IpAddr>> {
        let peers = with_timeout(self.io_timeout, "peer discovery", self.exchange()).await?;
        info!("트래커 {}에서 릴레이 {}개 수신: {:?}", self.tracker, peers.len(), peers);
        Ok(peers)
    }

    /// 릴레이 주소에 범위 요청 포트를 붙인다
    pub async fn fetch_relay_addrs(&self, relay_port: u16) -> Result<Vec<SocketAddr>> {
        Ok(self
            .fetch_peers()
            .await?
            .into_iter()
            .map(|ip| SocketAddr::new(ip, relay_port))
            .collect())
    }

    async fn exchange(&self) -> Result<Vec<IpAddr>> {
        let mut stream = connect(self.tracker, self.local_port).await?;
        debug!("트래커 연결: {}", self.tracker);

        write_message(&mut stream, &Message::Handshake(Role::Client)).await?;
        read_header(&mut stream, &[MessageKind::TrackerHandshake]).await?;

        write_message(&mut stream, &Message::FetchPeers).await?;
        read_peer_list(&mut stream).await
    }
}
