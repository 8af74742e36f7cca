//! 통계 스냅샷 소스.
//!
//! 통계 집계는 플랫폼의 다른 서비스가 담당하며, 중계 서버는 그 결과만
//! 가져옵니다.

use std::time::Duration;

use async_trait::async_trait;
use relay_core::{RealtimeStats, RelayError, RelayResult, StatisticsConfig};

/// 실시간 통계 스냅샷을 제공하는 소스.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// 현재 통계 스냅샷을 가져옵니다.
    async fn fetch(&self) -> RelayResult<RealtimeStats>;
}

/// HTTP 엔드포인트에서 통계 JSON을 가져오는 소스.
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSnapshotSource {
    /// 새 소스 생성.
    pub fn new(url: impl Into<String>, timeout: Duration) -> RelayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Config(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// 설정에서 소스를 생성합니다. `source_url`이 없으면 `None`.
    pub fn from_config(config: &StatisticsConfig) -> RelayResult<Option<Self>> {
        match config.source_url.as_deref() {
            Some(url) if !url.trim().is_empty() => {
                Self::new(url, config.request_timeout()).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// 요청 대상 URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self) -> RelayResult<RealtimeStats> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| RelayError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Snapshot(format!(
                "통계 엔드포인트 응답 오류: {}",
                status
            )));
        }

        response
            .json::<RealtimeStats>()
            .await
            .map_err(|e| RelayError::Snapshot(format!("통계 응답 파싱 실패: {}", e)))
    }
}
