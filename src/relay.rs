//! 릴레이 서버
//!
//! - 시작 시 트래커에 한 번 연결해 자신을 등록 (Add)
//! - 이후 범위 요청을 받아 원본에서 가져온 바이트를 데이터 응답으로 전송
//! - 종료 시 트래커에서 자신을 제거 (Remove)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::framing::{
    connect, read_header, read_range_request, with_timeout, write_chunked, write_message,
};
use crate::message::{Message, MessageKind, Role};
use crate::source::RangeSource;

/// 트래커에 보내는 등록 요청 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announcement {
    Add,
    Remove,
}

impl Announcement {
    fn message(self) -> Message {
        match self {
            Announcement::Add => Message::AddPeer,
            Announcement::Remove => Message::RemovePeer,
        }
    }
}

/// 트래커에 릴레이 핸드쉐이크 후 추가/제거 요청
///
/// 트래커가 연결을 닫을 때까지 기다리므로 반환 시점에는 요청이 반영되어 있다.
pub async fn announce(
    tracker: SocketAddr,
    local_port: u16,
    announcement: Announcement,
    io_timeout: Option<Duration>,
) -> Result<()> {
    with_timeout(io_timeout, "tracker announce", async move {
        let mut stream = connect(tracker, local_port).await?;

        write_message(&mut stream, &Message::Handshake(Role::Relay)).await?;
        read_header(&mut stream, &[MessageKind::TrackerHandshake]).await?;
        debug!("트래커 핸드쉐이크 완료: {}", tracker);

        write_message(&mut stream, &announcement.message()).await?;

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await?;
        Ok::<_, Error>(())
    })
    .await?;

    info!("트래커 {}에 {:?} 요청 완료", tracker, announcement);
    Ok(())
}

/// 릴레이 서버
pub struct RelayServer<S> {
    source: Arc<S>,
    io_timeout: Option<Duration>,
    send_chunk_size: usize,
}

impl<S: RangeSource + 'static> RelayServer<S> {
    pub fn new(source: Arc<S>, config: &RelayConfig) -> Self {
        Self {
            source,
            io_timeout: config.io_timeout,
            send_chunk_size: config.send_chunk_size,
        }
    }

    /// 수신 루프, 연결마다 태스크 하나
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!("Relay listening on {}", listener.local_addr()?);

        loop {
            let (stream, peer) = listener.accept().await?;
            debug!("클라이언트 연결: {}", peer);

            let source = self.source.clone();
            let io_timeout = self.io_timeout;
            let send_chunk_size = self.send_chunk_size;
            tokio::spawn(async move {
                if let Err(e) =
                    handle_connection(source.as_ref(), stream, io_timeout, send_chunk_size).await
                {
                    warn!("릴레이 연결 {} 처리 에러: {}", peer, e);
                }
            });
        }
    }
}

/// 범위 요청 하나 처리
pub async fn handle_connection<S: RangeSource + ?Sized>(
    source: &S,
    mut stream: TcpStream,
    io_timeout: Option<Duration>,
    send_chunk_size: usize,
) -> Result<()> {
    let request = with_timeout(io_timeout, "range request", read_range_request(&mut stream)).await?;
    info!("범위 요청 수신: {} {}", request.url, request.range);

    let content = source.fetch_range(&request.url, request.range).await?;
    if content.len() as u64 != request.range.len() {
        return Err(Error::LengthMismatch {
            range: request.range,
            got: content.len() as u64,
        });
    }

    let packet = Message::Data(content).encode()?;
    write_chunked(&mut stream, &packet, send_chunk_size, io_timeout).await?;
    stream.shutdown().await?;

    debug!("범위 {} 전송 완료 ({} bytes)", request.range, packet.len());
    Ok(())
}
