//! 원본 리소스 범위 다운로드
//!
//! 릴레이와 클라이언트의 로컬 범위가 모두 이 trait을 통해 원본에서 바이트를 가져온다.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, RANGE};
use reqwest::StatusCode;
use tracing::debug;

use crate::error::{Error, Result};
use crate::partition::DownloadRange;

/// HEAD로 얻은 리소스 정보
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceInfo {
    /// 전체 크기 (바이트)
    pub size: u64,

    /// `Accept-Ranges: bytes` 여부
    pub accepts_ranges: bool,
}

/// 범위 요청이 가능한 원본
#[async_trait]
pub trait RangeSource: Send + Sync {
    /// 크기와 범위 지원 여부 조회
    async fn probe(&self, url: &str) -> Result<ResourceInfo>;

    /// `Range: bytes=start-end` 요청
    async fn fetch_range(&self, url: &str, range: DownloadRange) -> Result<Bytes>;
}

/// reqwest 기반 HTTP 원본
#[derive(Debug, Clone, Default)]
pub struct HttpRangeSource {
    client: reqwest::Client,
}

impl HttpRangeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RangeSource for HttpRangeSource {
    async fn probe(&self, url: &str) -> Result<ResourceInfo> {
        let response = self.client.head(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::UpstreamStatus {
                status: response.status().as_u16(),
            });
        }

        let headers = response.headers();
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| Error::MissingContentLength {
                url: url.to_string(),
            })?;
        let accepts_ranges = headers
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().eq_ignore_ascii_case("bytes"))
            .unwrap_or(false);

        debug!("HEAD {}: {} bytes, ranges={}", url, size, accepts_ranges);
        Ok(ResourceInfo {
            size,
            accepts_ranges,
        })
    }

    async fn fetch_range(&self, url: &str, range: DownloadRange) -> Result<Bytes> {
        let response = self
            .client
            .get(url)
            .header(RANGE, range.header_value())
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::PARTIAL_CONTENT && status != StatusCode::OK {
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;

        // 200은 범위 전체를 돌려준 경우에만 허용
        if status == StatusCode::OK && body.len() as u64 != range.len() {
            return Err(Error::RangesNotSupported {
                url: url.to_string(),
            });
        }

        debug!("GET {} {}: {} bytes", url, range, body.len());
        Ok(body)
    }
}
