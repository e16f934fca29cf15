//! 릴레이 피어 레지스트리
//!
//! 트래커 프로세스만 소유하며 영속화하지 않는다 (재시작 시 빈 상태).
//! 연결 핸들러가 동시에 돌기 때문에 읽기/쓰기는 락으로 보호한다.

use std::net::IpAddr;

use parking_lot::RwLock;
use tracing::info;

/// 릴레이 주소 집합 (삽입 순서 유지, 중복 없음)
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: RwLock<Vec<IpAddr>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 없으면 추가, 새로 추가됐는지 반환
    pub fn add(&self, peer: IpAddr) -> bool {
        let mut peers = self.peers.write();
        if peers.contains(&peer) {
            return false;
        }
        peers.push(peer);
        info!("릴레이 추가: {} (총 {})", peer, peers.len());
        true
    }

    /// 있으면 제거, 없으면 아무 일도 하지 않음
    pub fn remove(&self, peer: IpAddr) -> bool {
        let mut peers = self.peers.write();
        let before = peers.len();
        peers.retain(|p| *p != peer);
        let removed = peers.len() != before;
        if removed {
            info!("릴레이 제거: {} (총 {})", peer, peers.len());
        }
        removed
    }

    pub fn contains(&self, peer: &IpAddr) -> bool {
        self.peers.read().contains(peer)
    }

    /// 현재 목록 복사본
    pub fn snapshot(&self) -> Vec<IpAddr> {
        self.peers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}
