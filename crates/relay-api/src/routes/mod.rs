//! API 라우트.
//!
//! 운영용 REST 엔드포인트를 정의하고 라우터를 구성합니다.
//!
//! # 라우트 구조
//!
//! - `/health` - 헬스 체크 (liveness)
//! - `/health/ready` - 상세 헬스 체크 (readiness)
//! - `/api/feed` - 업스트림 피드 상태 및 수동 재연결
//! - `/api/markets` - 종목, 현재가, 캔들 조회
//! - `/ws` - 시세/통계 WebSocket

pub mod feed;
pub mod health;
pub mod markets;

pub use feed::{feed_router, FeedStatusResponse, MarketRefCount, MarketSubscriptionResponse};
pub use health::{health_router, ComponentHealth, ComponentStatus, HealthResponse};
pub use markets::{markets_router, CandleQuery};

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;
use crate::websocket::websocket_router;

/// 전체 API 라우터 생성.
///
/// 모든 서브 라우터를 조합하여 하나의 라우터로 반환합니다.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/health", health_router())
        .nest("/api/feed", feed_router())
        .nest("/api/markets", markets_router())
        .nest("/ws", websocket_router())
}
