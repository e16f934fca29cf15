//! 와이어 프로토콜 메시지 정의
//!
//! 모든 메시지는 2바이트 헤더로 시작한다: `[송신자 role, 메시지 type]`
//! type은 role 범위 안에서만 의미가 있다.
//!
//! | Role       | Type | 의미            | 페이로드                                  |
//! |------------|------|-----------------|-------------------------------------------|
//! | Client(0)  | 0    | 핸드쉐이크      | 없음                                      |
//! | Client(0)  | 1    | 피어 목록 요청  | 없음                                      |
//! | Client(0)  | 2    | 범위 요청       | 1B len + url, 1B len + start, 1B len + end |
//! | Relay(1)   | 0    | 핸드쉐이크      | 없음                                      |
//! | Relay(1)   | 1    | 레지스트리 추가 | 없음                                      |
//! | Relay(1)   | 2    | 레지스트리 제거 | 없음                                      |
//! | Relay(1)   | 3    | 데이터 응답     | 원본 바이트                               |
//! | Tracker(2) | 0    | 핸드쉐이크      | 없음                                      |
//!
//! 트래커의 피어 목록 응답만 예외적으로 헤더가 없다: 1B count, 항목마다 1B len + 주소.

use std::net::IpAddr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolViolation;
use crate::partition::DownloadRange;
use crate::{HEADER_LEN, MAX_FIELD_LEN};

type CodecResult<T> = std::result::Result<T, ProtocolViolation>;

/// 송신자 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Role {
    Client = 0,
    Relay = 1,
    Tracker = 2,
}

impl Role {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Role::Client),
            1 => Some(Role::Relay),
            2 => Some(Role::Tracker),
            _ => None,
        }
    }
}

/// 허용되는 (role, type) 쌍
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    ClientHandshake,
    FetchPeers,
    RangeRequest,
    RelayHandshake,
    AddPeer,
    RemovePeer,
    Data,
    TrackerHandshake,
}

impl MessageKind {
    pub const ALL: [MessageKind; 8] = [
        MessageKind::ClientHandshake,
        MessageKind::FetchPeers,
        MessageKind::RangeRequest,
        MessageKind::RelayHandshake,
        MessageKind::AddPeer,
        MessageKind::RemovePeer,
        MessageKind::Data,
        MessageKind::TrackerHandshake,
    ];

    pub fn role(self) -> Role {
        match self {
            MessageKind::ClientHandshake | MessageKind::FetchPeers | MessageKind::RangeRequest => {
                Role::Client
            }
            MessageKind::RelayHandshake
            | MessageKind::AddPeer
            | MessageKind::RemovePeer
            | MessageKind::Data => Role::Relay,
            MessageKind::TrackerHandshake => Role::Tracker,
        }
    }

    /// role 범위 내 type 값
    pub fn type_id(self) -> u8 {
        match self {
            MessageKind::ClientHandshake
            | MessageKind::RelayHandshake
            | MessageKind::TrackerHandshake => 0,
            MessageKind::FetchPeers | MessageKind::AddPeer => 1,
            MessageKind::RangeRequest | MessageKind::RemovePeer => 2,
            MessageKind::Data => 3,
        }
    }

    pub fn header(self) -> [u8; HEADER_LEN] {
        [self.role() as u8, self.type_id()]
    }

    pub fn from_header(role: u8, msg_type: u8) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.role() as u8 == role && kind.type_id() == msg_type)
    }

    /// 헤더 외 페이로드가 없는 메시지인지
    pub fn is_bare(self) -> bool {
        !matches!(self, MessageKind::RangeRequest | MessageKind::Data)
    }
}

/// 범위 요청 (클라이언트 → 릴레이)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    pub url: String,
    pub range: DownloadRange,
}

impl RangeRequest {
    pub fn new(url: impl Into<String>, range: DownloadRange) -> Self {
        Self {
            url: url.into(),
            range,
        }
    }

    /// 페이로드 직렬화 (start/end는 10진 ASCII)
    pub fn encode_payload(&self, buf: &mut BytesMut) -> CodecResult<()> {
        put_field(buf, "url", self.url.as_bytes())?;
        put_field(buf, "start", self.range.start.to_string().as_bytes())?;
        put_field(buf, "end", self.range.end.to_string().as_bytes())?;
        Ok(())
    }

    /// 페이로드 역직렬화, 남는 바이트가 있으면 위반
    pub fn decode_payload(mut payload: &[u8]) -> CodecResult<Self> {
        let url = get_field(&mut payload, "url")?;
        let start = get_field(&mut payload, "start")?;
        let end = get_field(&mut payload, "end")?;

        if !payload.is_empty() {
            return Err(ProtocolViolation::MalformedPayload(format!(
                "범위 요청 뒤에 {} bytes 남음",
                payload.len()
            )));
        }

        Self::from_fields(url, start, end)
    }

    pub(crate) fn from_fields(url: &[u8], start: &[u8], end: &[u8]) -> CodecResult<Self> {
        let url = std::str::from_utf8(url)
            .map_err(|_| ProtocolViolation::MalformedPayload("url이 UTF-8이 아님".into()))?;
        let start = parse_boundary("start", start)?;
        let end = parse_boundary("end", end)?;

        if start > end {
            return Err(ProtocolViolation::MalformedPayload(format!(
                "start {} > end {}",
                start, end
            )));
        }

        Ok(Self::new(url, DownloadRange::new(start, end)))
    }
}

/// 통합 메시지 enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Handshake(Role),
    FetchPeers,
    RangeRequest(RangeRequest),
    AddPeer,
    RemovePeer,
    Data(Bytes),
}

impl Message {
    /// 메시지 종류 반환
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Handshake(Role::Client) => MessageKind::ClientHandshake,
            Message::Handshake(Role::Relay) => MessageKind::RelayHandshake,
            Message::Handshake(Role::Tracker) => MessageKind::TrackerHandshake,
            Message::FetchPeers => MessageKind::FetchPeers,
            Message::RangeRequest(_) => MessageKind::RangeRequest,
            Message::AddPeer => MessageKind::AddPeer,
            Message::RemovePeer => MessageKind::RemovePeer,
            Message::Data(_) => MessageKind::Data,
        }
    }

    /// 헤더 + 페이로드 직렬화
    ///
    /// 길이 접두 필드가 255 바이트를 넘으면 잘라내지 않고 실패한다.
    pub fn encode(&self) -> CodecResult<Bytes> {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload_hint());
        buf.put_slice(&self.kind().header());

        match self {
            Message::RangeRequest(req) => req.encode_payload(&mut buf)?,
            Message::Data(content) => buf.put_slice(content),
            _ => {}
        }

        Ok(buf.freeze())
    }

    /// 하나의 완전한 메시지 버퍼를 역직렬화
    ///
    /// `accepted`에 없는 (role, type) 쌍은 항상 위반이다.
    pub fn decode(buf: &[u8], accepted: &[MessageKind]) -> CodecResult<Self> {
        let kind = decode_header(buf, accepted)?;
        let payload = &buf[HEADER_LEN..];

        if kind.is_bare() && !payload.is_empty() {
            return Err(ProtocolViolation::MalformedPayload(format!(
                "{:?} 메시지에 페이로드 {} bytes",
                kind,
                payload.len()
            )));
        }

        Ok(match kind {
            MessageKind::ClientHandshake => Message::Handshake(Role::Client),
            MessageKind::RelayHandshake => Message::Handshake(Role::Relay),
            MessageKind::TrackerHandshake => Message::Handshake(Role::Tracker),
            MessageKind::FetchPeers => Message::FetchPeers,
            MessageKind::AddPeer => Message::AddPeer,
            MessageKind::RemovePeer => Message::RemovePeer,
            MessageKind::RangeRequest => {
                Message::RangeRequest(RangeRequest::decode_payload(payload)?)
            }
            MessageKind::Data => Message::Data(Bytes::copy_from_slice(payload)),
        })
    }

    fn payload_hint(&self) -> usize {
        match self {
            Message::RangeRequest(req) => req.url.len() + 3 + 40,
            Message::Data(content) => content.len(),
            _ => 0,
        }
    }
}

/// 헤더 검증
pub fn decode_header(buf: &[u8], accepted: &[MessageKind]) -> CodecResult<MessageKind> {
    if buf.len() < HEADER_LEN {
        return Err(ProtocolViolation::TruncatedHeader { len: buf.len() });
    }

    let (role, msg_type) = (buf[0], buf[1]);
    MessageKind::from_header(role, msg_type)
        .filter(|kind| accepted.contains(kind))
        .ok_or(ProtocolViolation::UnexpectedMessage { role, msg_type })
}

/// 1바이트 길이 접두 필드 쓰기
pub(crate) fn put_field(buf: &mut BytesMut, field: &'static str, value: &[u8]) -> CodecResult<()> {
    if value.len() > MAX_FIELD_LEN {
        return Err(ProtocolViolation::FieldTooLong {
            field,
            len: value.len(),
        });
    }
    buf.put_u8(value.len() as u8);
    buf.put_slice(value);
    Ok(())
}

/// 1바이트 길이 접두 필드 읽기
pub(crate) fn get_field<'a>(buf: &mut &'a [u8], field: &'static str) -> CodecResult<&'a [u8]> {
    let (&len, rest) = buf.split_first().ok_or_else(|| {
        ProtocolViolation::MalformedPayload(format!("{} 길이 바이트 없음", field))
    })?;
    let len = len as usize;

    if rest.len() < len {
        return Err(ProtocolViolation::MalformedPayload(format!(
            "{} 필드 잘림: {} / {} bytes",
            field,
            rest.len(),
            len
        )));
    }

    let (value, rest) = rest.split_at(len);
    *buf = rest;
    Ok(value)
}

/// 10진 ASCII 범위 경계 파싱
pub fn parse_boundary(field: &'static str, bytes: &[u8]) -> CodecResult<u64> {
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return Err(ProtocolViolation::MalformedPayload(format!(
            "{}가 10진수가 아님",
            field
        )));
    }

    // 숫자만 있으므로 UTF-8 검사는 통과한다
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ProtocolViolation::MalformedPayload(format!("{} 값 범위 초과", field)))
}

/// 피어 목록 응답 직렬화 (헤더 없음)
pub fn encode_peer_list(peers: &[IpAddr]) -> CodecResult<Bytes> {
    if peers.len() > MAX_FIELD_LEN {
        return Err(ProtocolViolation::FieldTooLong {
            field: "peer count",
            len: peers.len(),
        });
    }

    let mut buf = BytesMut::with_capacity(1 + peers.len() * 16);
    buf.put_u8(peers.len() as u8);
    for peer in peers {
        put_field(&mut buf, "peer address", peer.to_string().as_bytes())?;
    }
    Ok(buf.freeze())
}

/// 피어 목록 응답 역직렬화
pub fn decode_peer_list(mut buf: &[u8]) -> CodecResult<Vec<IpAddr>> {
    let (&count, rest) = buf
        .split_first()
        .ok_or_else(|| ProtocolViolation::MalformedPayload("피어 수 바이트 없음".into()))?;
    buf = rest;

    let mut peers = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let raw = get_field(&mut buf, "peer address")?;
        peers.push(parse_peer_address(raw)?);
    }

    if !buf.is_empty() {
        return Err(ProtocolViolation::MalformedPayload(format!(
            "피어 목록 뒤에 {} bytes 남음",
            buf.len()
        )));
    }

    Ok(peers)
}

pub(crate) fn parse_peer_address(raw: &[u8]) -> CodecResult<IpAddr> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            ProtocolViolation::MalformedPayload(format!(
                "잘못된 피어 주소: {}",
                String::from_utf8_lossy(raw)
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn sample_messages() -> Vec<Message> {
        vec![
            Message::Handshake(Role::Client),
            Message::Handshake(Role::Relay),
            Message::Handshake(Role::Tracker),
            Message::FetchPeers,
            Message::AddPeer,
            Message::RemovePeer,
            Message::RangeRequest(RangeRequest::new(
                "http://example.com/big.iso",
                DownloadRange::new(100, 199),
            )),
            Message::Data(Bytes::from_static(b"\x00\x01payload\xff")),
        ]
    }

    #[test]
    fn test_catalogue_headers() {
        let expected = [
            (MessageKind::ClientHandshake, [0, 0]),
            (MessageKind::FetchPeers, [0, 1]),
            (MessageKind::RangeRequest, [0, 2]),
            (MessageKind::RelayHandshake, [1, 0]),
            (MessageKind::AddPeer, [1, 1]),
            (MessageKind::RemovePeer, [1, 2]),
            (MessageKind::Data, [1, 3]),
            (MessageKind::TrackerHandshake, [2, 0]),
        ];

        for (kind, header) in expected {
            assert_eq!(kind.header(), header);
            assert_eq!(MessageKind::from_header(header[0], header[1]), Some(kind));
        }
    }

    #[test]
    fn test_message_roundtrip() {
        for message in sample_messages() {
            let bytes = message.encode().unwrap();
            let decoded = Message::decode(&bytes, &[message.kind()]).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn test_range_request_uses_decimal_text() {
        let message = Message::RangeRequest(RangeRequest::new(
            "http://a/b",
            DownloadRange::new(0, 1234),
        ));
        let bytes = message.encode().unwrap();

        let mut expected = vec![0u8, 2, 10];
        expected.extend_from_slice(b"http://a/b");
        expected.extend_from_slice(&[1, b'0', 4]);
        expected.extend_from_slice(b"1234");
        assert_eq!(bytes.as_ref(), expected.as_slice());
    }

    #[test]
    fn test_unexpected_pair_is_violation() {
        let accepted = [MessageKind::ClientHandshake, MessageKind::RelayHandshake];

        for role in 0..=3u8 {
            for msg_type in 0..=4u8 {
                let result = decode_header(&[role, msg_type], &accepted);
                let allowed = (role == 0 || role == 1) && msg_type == 0;

                match result {
                    Ok(kind) => {
                        assert!(allowed);
                        assert_eq!(kind.header(), [role, msg_type]);
                    }
                    Err(e) => {
                        assert!(!allowed);
                        assert_eq!(e, ProtocolViolation::UnexpectedMessage { role, msg_type });
                    }
                }
            }
        }
    }

    #[test]
    fn test_truncated_header() {
        assert_eq!(
            decode_header(&[], &MessageKind::ALL),
            Err(ProtocolViolation::TruncatedHeader { len: 0 })
        );
        assert_eq!(
            Message::decode(&[2], &MessageKind::ALL),
            Err(ProtocolViolation::TruncatedHeader { len: 1 })
        );
    }

    #[test]
    fn test_bare_message_with_payload_rejected() {
        let result = Message::decode(&[0, 0, 9], &[MessageKind::ClientHandshake]);
        assert!(matches!(result, Err(ProtocolViolation::MalformedPayload(_))));
    }

    #[test]
    fn test_field_at_limit() {
        let url = "u".repeat(255);
        let message = Message::RangeRequest(RangeRequest::new(url.clone(), DownloadRange::new(1, 2)));
        let bytes = message.encode().unwrap();

        match Message::decode(&bytes, &[MessageKind::RangeRequest]).unwrap() {
            Message::RangeRequest(req) => assert_eq!(req.url, url),
            other => panic!("unexpected message: {:?}", other),
        }

        let mut buf = BytesMut::new();
        put_field(&mut buf, "start", &[b'7'; 255]).unwrap();
        let mut cursor: &[u8] = &buf;
        assert_eq!(get_field(&mut cursor, "start").unwrap(), &[b'7'; 255][..]);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_field_over_limit_fails() {
        let message = Message::RangeRequest(RangeRequest::new(
            "u".repeat(256),
            DownloadRange::new(1, 2),
        ));
        assert_eq!(
            message.encode(),
            Err(ProtocolViolation::FieldTooLong {
                field: "url",
                len: 256
            })
        );

        let mut buf = BytesMut::new();
        assert!(put_field(&mut buf, "end", &[b'1'; 256]).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_malformed_range_request() {
        // 잘린 필드
        assert!(RangeRequest::decode_payload(&[5, b'h', b't']).is_err());
        // 숫자가 아닌 경계
        assert!(RangeRequest::from_fields(b"u", b"1a", b"3").is_err());
        // 역전된 범위
        assert!(RangeRequest::from_fields(b"u", b"9", b"3").is_err());
        // u64 초과
        assert!(parse_boundary("end", &[b'9'; 30]).is_err());
    }

    #[test]
    fn test_peer_list_roundtrip_without_header() {
        let peers = vec![
            IpAddr::V4(Ipv4Addr::new(192, 168, 0, 10)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            IpAddr::V6(Ipv6Addr::LOCALHOST),
        ];

        let bytes = encode_peer_list(&peers).unwrap();
        assert_eq!(bytes[0], 3);
        assert_eq!(bytes[1] as usize, "192.168.0.10".len());
        assert_eq!(&bytes[2..14], b"192.168.0.10");

        assert_eq!(decode_peer_list(&bytes).unwrap(), peers);
        assert_eq!(decode_peer_list(&[0]).unwrap(), Vec::<IpAddr>::new());
    }

    #[test]
    fn test_peer_list_rejects_garbage() {
        assert!(decode_peer_list(&[]).is_err());
        assert!(decode_peer_list(&[1, 3, b'a', b'b', b'c']).is_err());
        assert!(decode_peer_list(&[2, 7, b'1', b'.', b'2', b'.', b'3', b'.', b'4']).is_err());
    }
}
