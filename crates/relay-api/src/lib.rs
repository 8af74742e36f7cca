//! 실시간 시세 중계 서버.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 종목별 구독을 받는 시세 WebSocket 서버
//! - 관리자 대시보드용 주기적 통계 브로드캐스트
//! - 헬스 체크 및 피드 운영 엔드포인트
//! - Prometheus 메트릭
//!
//! # 모듈 구성
//!
//! - [`state`]: 애플리케이션 공유 상태 (AppState)
//! - [`routes`]: REST API 엔드포인트
//! - [`websocket`]: 세션 관리, 팬아웃, WebSocket 핸들러
//! - [`statistics`]: 대시보드 통계 브로드캐스터
//! - [`metrics`]: Prometheus 메트릭 수집
//! - [`middleware`]: HTTP 미들웨어

pub mod error;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod statistics;
pub mod websocket;

pub use error::{ApiErrorResponse, ApiResult};
pub use metrics::setup_metrics_recorder;
pub use middleware::metrics_layer;
pub use routes::create_api_router;
pub use state::AppState;
pub use statistics::{HttpSnapshotSource, PeriodicSnapshotBroadcaster, SnapshotSource};
pub use websocket::{
    websocket_router, ClientMessage, ClientSessionManager, FanoutRouter, ServerEvent, WsError,
};
