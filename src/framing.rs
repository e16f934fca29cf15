//! 스트림 위의 메시지 송수신
//!
//! 프로토콜에 전체 길이 필드가 없으므로 메시지 종류별로 필요한 만큼만 읽는다.
//! - 헤더만 있는 메시지: 2바이트
//! - 범위 요청: 길이 접두 필드 3개
//! - 데이터 응답: 호출자가 아는 길이만큼
//! - 피어 목록: count + 항목들

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};
use tracing::debug;

use crate::error::{Error, ProtocolViolation, Result};
use crate::message::{decode_header, parse_peer_address, Message, MessageKind, RangeRequest};
use crate::HEADER_LEN;

/// 타임아웃 적용 (None이면 무제한)
pub async fn with_timeout<T, F>(limit: Option<Duration>, what: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout(what))?,
        None => fut.await,
    }
}

/// 원격 주소로 연결, `local_port`가 0이 아니면 해당 포트에 바인딩
pub async fn connect(remote: SocketAddr, local_port: u16) -> Result<TcpStream> {
    if local_port == 0 {
        return Ok(TcpStream::connect(remote).await?);
    }

    let socket = match remote.ip() {
        IpAddr::V4(_) => TcpSocket::new_v4()?,
        IpAddr::V6(_) => TcpSocket::new_v6()?,
    };
    // 같은 로컬 포트로 여러 원격에 동시 연결
    socket.set_reuseaddr(true)?;
    let local = match remote.ip() {
        IpAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], local_port)),
        IpAddr::V6(_) => SocketAddr::from(([0u16; 8], local_port)),
    };
    socket.bind(local)?;

    Ok(socket.connect(remote).await?)
}

/// 메시지 하나 쓰기
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = message.encode()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    debug!("sent {:?} ({} bytes)", message.kind(), bytes.len());
    Ok(())
}

/// 버퍼를 고정 크기 조각으로 나눠 쓰기, `idle`은 조각당 제한 시간
pub async fn write_chunked<W>(
    writer: &mut W,
    bytes: &[u8],
    chunk_size: usize,
    idle: Option<Duration>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    for chunk in bytes.chunks(chunk_size.max(1)) {
        let write = writer.write_all(chunk);
        match idle {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .map_err(|_| Error::Timeout("idle write"))??,
            None => write.await?,
        }
    }
    writer.flush().await?;
    Ok(())
}

/// 헤더만 읽고 검증
pub async fn read_header<R>(reader: &mut R, accepted: &[MessageKind]) -> Result<MessageKind>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let received = read_full(reader, &mut header, None).await?;
    if received < HEADER_LEN {
        return Err(ProtocolViolation::TruncatedHeader { len: received }.into());
    }
    Ok(decode_header(&header, accepted)?)
}

/// 길이를 모르는 데이터 응답을 제외한 메시지 하나 읽기
pub async fn read_message<R>(reader: &mut R, accepted: &[MessageKind]) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    let kind = read_header(reader, accepted).await?;

    let message = match kind {
        MessageKind::RangeRequest => Message::RangeRequest(read_range_fields(reader).await?),
        MessageKind::Data => {
            return Err(ProtocolViolation::MalformedPayload(
                "데이터 응답은 길이를 알아야 읽을 수 있음".into(),
            )
            .into())
        }
        bare => Message::decode(&bare.header(), &[bare])?,
    };

    debug!("received {:?}", message.kind());
    Ok(message)
}

/// 범위 요청 하나 읽기 (다른 메시지는 위반)
pub async fn read_range_request<R>(reader: &mut R) -> Result<RangeRequest>
where
    R: AsyncRead + Unpin,
{
    read_header(reader, &[MessageKind::RangeRequest]).await?;
    let request = read_range_fields(reader).await?;
    debug!("received {:?}", MessageKind::RangeRequest);
    Ok(request)
}

/// `(Relay, Data)` 헤더 + 정확히 `expected_len` 바이트 읽기
///
/// 그 전에 연결이 닫히면 잘린 데이터를 돌려주지 않고 `PrematureClose`로 실패한다.
/// 릴레이는 원본에서 범위 전체를 받은 뒤에야 헤더를 보내므로, 헤더는 `response`
/// 안에 도착하면 되고 `idle`은 그 이후 읽기 한 번당 제한 시간이다.
pub async fn read_data<R>(
    reader: &mut R,
    expected_len: usize,
    response: Option<Duration>,
    idle: Option<Duration>,
) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let received = with_timeout(
        response,
        "relay response",
        read_full(reader, &mut header, None),
    )
    .await?;
    if received < HEADER_LEN {
        return Err(Error::PrematureClose {
            expected: expected_len + HEADER_LEN,
            received,
        });
    }
    decode_header(&header, &[MessageKind::Data])?;

    let mut payload = BytesMut::zeroed(expected_len);
    let received = read_full(reader, &mut payload, idle).await?;
    if received < expected_len {
        return Err(Error::PrematureClose {
            expected: expected_len + HEADER_LEN,
            received: received + HEADER_LEN,
        });
    }

    Ok(payload.freeze())
}

/// 헤더 없는 피어 목록 읽기
pub async fn read_peer_list<R>(reader: &mut R) -> Result<Vec<IpAddr>>
where
    R: AsyncRead + Unpin,
{
    let count = read_u8(reader, "peer count").await?;
    let mut peers = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let raw = read_field(reader, "peer address").await?;
        peers.push(parse_peer_address(&raw)?);
    }
    Ok(peers)
}

async fn read_range_fields<R>(reader: &mut R) -> Result<RangeRequest>
where
    R: AsyncRead + Unpin,
{
    let url = read_field(reader, "url").await?;
    let start = read_field(reader, "start").await?;
    let end = read_field(reader, "end").await?;
    Ok(RangeRequest::from_fields(&url, &start, &end)?)
}

async fn read_field<R>(reader: &mut R, field: &'static str) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = read_u8(reader, field).await? as usize;
    let mut value = vec![0u8; len];
    let received = read_full(reader, &mut value, None).await?;
    if received < len {
        return Err(ProtocolViolation::MalformedPayload(format!(
            "{} 필드 잘림: {} / {} bytes",
            field, received, len
        ))
        .into());
    }
    Ok(value)
}

async fn read_u8<R>(reader: &mut R, field: &'static str) -> Result<u8>
where
    R: AsyncRead + Unpin,
{
    let mut byte = [0u8; 1];
    if read_full(reader, &mut byte, None).await? == 0 {
        return Err(
            ProtocolViolation::MalformedPayload(format!("{} 길이 바이트 없음", field)).into(),
        );
    }
    Ok(byte[0])
}

/// EOF 전까지 버퍼를 채우고 읽은 바이트 수 반환
async fn read_full<R>(reader: &mut R, buf: &mut [u8], idle: Option<Duration>) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let read = reader.read(&mut buf[filled..]);
        let n = match idle {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| Error::Timeout("idle read"))??,
            None => read.await?,
        };
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
