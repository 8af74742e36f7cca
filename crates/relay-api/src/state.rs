//! 모든 핸들러에서 공유되는 애플리케이션 상태.
//!
//! AppState는 Arc로 래핑되어 HTTP 핸들러와 WebSocket 세션 간에 공유됩니다.
//! 전역 변수 없이 main에서 생성한 인스턴스를 명시적으로 전달합니다.

use std::sync::Arc;
use std::time::Duration;

use relay_core::{StreamConfig, Tick};
use relay_feed::{SubscriptionRegistry, UpbitRestClient, UpstreamFeedClient};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::statistics::{
    start_snapshot_broadcaster, DashboardAudience, PeriodicSnapshotBroadcaster, SnapshotSource,
};
use crate::websocket::fanout::start_fanout_router;
use crate::websocket::sessions::{ClientSessionManager, SharedSessionManager};

/// 애플리케이션 공유 상태.
#[derive(Clone)]
pub struct AppState {
    /// 업스트림 티커 피드
    pub feed: Arc<UpstreamFeedClient>,

    /// 종목 참조 카운트 레지스트리
    pub registry: Arc<SubscriptionRegistry>,

    /// 시세 세션 관리자
    pub sessions: SharedSessionManager,

    /// 대시보드 세션 목록
    pub dashboard: Arc<DashboardAudience>,

    /// 통계 브로드캐스터 (스냅샷 소스가 설정된 경우)
    pub broadcaster: Option<Arc<PeriodicSnapshotBroadcaster>>,

    /// 업스트림 REST 시세 조회 클라이언트
    pub market_data: Option<Arc<UpbitRestClient>>,

    /// 다운스트림 WebSocket 설정
    pub stream: StreamConfig,

    /// 서버 시작 시간 (업타임 계산용)
    pub started_at: chrono::DateTime<chrono::Utc>,

    /// API 버전
    pub version: String,
}

impl AppState {
    /// 새로운 AppState 생성.
    ///
    /// 레지스트리는 피드를 구독 대상으로 사용합니다.
    pub fn new(feed: Arc<UpstreamFeedClient>, stream: StreamConfig) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new(feed.clone()));
        let sessions = Arc::new(ClientSessionManager::new(
            registry.clone(),
            stream.session_queue_capacity,
        ));
        let dashboard = Arc::new(DashboardAudience::new(stream.session_queue_capacity));

        Self {
            feed,
            registry,
            sessions,
            dashboard,
            broadcaster: None,
            market_data: None,
            stream,
            started_at: chrono::Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// 통계 스냅샷 소스 설정.
    pub fn with_snapshot_source(mut self, source: Arc<dyn SnapshotSource>, interval: Duration) -> Self {
        self.broadcaster = Some(Arc::new(PeriodicSnapshotBroadcaster::new(
            source,
            self.dashboard.clone(),
            interval,
        )));
        self
    }

    /// REST 시세 조회 클라이언트 설정.
    pub fn with_market_data(mut self, client: Arc<UpbitRestClient>) -> Self {
        self.market_data = Some(client);
        self
    }

    /// 통계 브로드캐스트 사용 여부.
    pub fn has_statistics(&self) -> bool {
        self.broadcaster.is_some()
    }

    /// 팬아웃 라우터 시작.
    pub fn start_fanout(
        &self,
        ticks: mpsc::Receiver<Tick>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        start_fanout_router(self.sessions.clone(), ticks, shutdown)
    }

    /// 통계 브로드캐스터 시작 (설정된 경우).
    pub fn start_statistics(&self, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        self.broadcaster
            .as_ref()
            .map(|broadcaster| start_snapshot_broadcaster(broadcaster.clone(), shutdown))
    }

    /// 업타임 (초).
    pub fn uptime_secs(&self) -> i64 {
        (chrono::Utc::now() - self.started_at).num_seconds()
    }
}

/// 테스트용 AppState 생성.
///
/// 연결하지 않은 피드를 사용하므로 구독 목록은 기억만 됩니다.
#[cfg(test)]
pub fn create_test_state() -> AppState {
    let feed = Arc::new(UpstreamFeedClient::new(&relay_core::FeedConfig::default()));
    AppState::new(feed, StreamConfig::default())
}
