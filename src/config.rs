//! 역할별 설정
//!
//! 줄 단위 `KEY VALUE` 설정 파일을 읽는다. 각 줄의 첫 토큰이 키, 마지막 토큰이 값이다.
//! 필수 키가 없거나 값이 잘못되면 `Error::Config`.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::{DEFAULT_IO_TIMEOUT_SECS, DEFAULT_RELAY_RESPONSE_TIMEOUT_SECS, DEFAULT_SEND_CHUNK_SIZE};

/// 파싱된 설정 파일
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    values: HashMap<String, String>,
}

impl ConfigFile {
    /// 파일에서 읽기
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{} 읽기 실패: {}", path.display(), e)))?;
        Ok(Self::parse(&text))
    }

    /// 텍스트 파싱 (빈 줄, `#` 주석 무시)
    pub fn parse(text: &str) -> Self {
        let values = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let mut tokens = line.split_whitespace();
                let key = tokens.next()?;
                let value = tokens.last()?;
                Some((key.to_string(), value.to_string()))
            })
            .collect();

        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// 필수 값
    pub fn require<T: FromStr>(&self, key: &str) -> Result<T> {
        let raw = self
            .get(key)
            .ok_or_else(|| Error::Config(format!("{} 키 없음", key)))?;
        raw.parse()
            .map_err(|_| Error::Config(format!("{} 값이 잘못됨: {}", key, raw)))
    }

    /// 선택 값 (없으면 기본값)
    pub fn optional<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.get(key) {
            Some(_) => self.require(key),
            None => Ok(default),
        }
    }

    /// 모든 역할 공통 튜닝 값
    fn io_timeout(&self) -> Result<Option<Duration>> {
        self.timeout("IO_TIMEOUT_SECS", DEFAULT_IO_TIMEOUT_SECS)
    }

    /// 초 단위 타임아웃 (0 = 무제한)
    fn timeout(&self, key: &str, default_secs: u64) -> Result<Option<Duration>> {
        let secs: u64 = self.optional(key, default_secs)?;
        Ok((secs > 0).then(|| Duration::from_secs(secs)))
    }

    fn send_chunk_size(&self) -> Result<usize> {
        let size: usize = self.optional("SEND_CHUNK_SIZE", DEFAULT_SEND_CHUNK_SIZE)?;
        if size == 0 {
            return Err(Error::Config("SEND_CHUNK_SIZE는 0보다 커야 함".into()));
        }
        Ok(size)
    }
}

/// 트래커 설정
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// 수신 포트
    pub port: u16,

    /// 연결당 I/O 타임아웃 (None = 무제한)
    pub io_timeout: Option<Duration>,
}

impl TrackerConfig {
    pub fn from_file(file: &ConfigFile) -> Result<Self> {
        Ok(Self {
            port: file.require("TRACKER_PORT")?,
            io_timeout: file.io_timeout()?,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

/// 릴레이 설정
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// 트래커 주소
    pub tracker_addr: SocketAddr,

    /// 클라이언트 범위 요청 수신 포트
    pub client_port: u16,

    /// 트래커 연결에 쓸 로컬 포트 (0 = 자동)
    pub tracker_local_port: u16,

    pub io_timeout: Option<Duration>,

    /// 데이터 응답 송신 단위 (바이트)
    pub send_chunk_size: usize,
}

impl RelayConfig {
    pub fn from_file(file: &ConfigFile) -> Result<Self> {
        Ok(Self {
            tracker_addr: tracker_addr(file)?,
            client_port: file.require("SERVER_CLIENT_PORT")?,
            tracker_local_port: file.optional("SERVER_TRACKER_PORT", 0)?,
            io_timeout: file.io_timeout()?,
            send_chunk_size: file.send_chunk_size()?,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.client_port))
    }
}

/// 클라이언트 설정
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub tracker_addr: SocketAddr,

    /// 다운로드할 원본 URL
    pub url: String,

    /// 결과 파일 경로
    pub output_path: PathBuf,

    /// 릴레이의 범위 요청 수신 포트
    pub relay_port: u16,

    /// 트래커 연결에 쓸 로컬 포트 (0 = 자동)
    pub tracker_local_port: u16,

    /// 릴레이 연결에 쓸 로컬 포트 (0 = 자동)
    pub relay_local_port: u16,

    pub io_timeout: Option<Duration>,

    /// 릴레이 응답 시작까지 대기 시간 (None = 무제한)
    pub response_timeout: Option<Duration>,

    /// 릴레이 실패 시 해당 범위를 직접 받을지
    pub local_fallback: bool,
}

impl ClientConfig {
    pub fn from_file(file: &ConfigFile) -> Result<Self> {
        Ok(Self {
            tracker_addr: tracker_addr(file)?,
            url: file.require("URL")?,
            output_path: file.require("PATH")?,
            relay_port: file.require("SERVER_CLIENT_PORT")?,
            tracker_local_port: file.optional("CLIENT_TRACKER_PORT", 0)?,
            relay_local_port: file.optional("CLIENT_SERVER_PORT", 0)?,
            io_timeout: file.io_timeout()?,
            response_timeout: file.timeout(
                "RELAY_RESPONSE_TIMEOUT_SECS",
                DEFAULT_RELAY_RESPONSE_TIMEOUT_SECS,
            )?,
            local_fallback: file.optional("LOCAL_FALLBACK", true)?,
        })
    }
}

fn tracker_addr(file: &ConfigFile) -> Result<SocketAddr> {
    let ip: IpAddr = file.require("TRACKER_IP")?;
    let port: u16 = file.require("TRACKER_PORT")?;
    Ok(SocketAddr::new(ip, port))
}
