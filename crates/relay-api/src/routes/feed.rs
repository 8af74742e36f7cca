//! 업스트림 피드 운영 endpoint.
//!
//! # 엔드포인트
//!
//! - `GET /api/feed/status` - 연결 상태, 구독 종목과 참조 카운트, 세션 수
//! - `GET /api/feed/markets/{code}` - 종목별 구독 현황
//! - `POST /api/feed/reconnect` - 재연결 한도 소진 후 수동 재연결

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use relay_core::{InstrumentCode, RelayError};
use relay_feed::FeedStatus;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::error::{relay_error_response, ApiResult};
use crate::state::AppState;

// ==================== 응답 타입 ====================

/// 종목별 참조 카운트.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketRefCount {
    pub market: InstrumentCode,
    pub ref_count: usize,
}

/// 피드 상태 응답.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatusResponse {
    pub feed: FeedStatus,
    /// 업스트림에 구독 중인 종목 (정렬됨)
    pub markets: Vec<MarketRefCount>,
    /// 시세 세션 수
    pub market_sessions: usize,
    /// 대시보드 세션 수
    pub dashboard_sessions: usize,
}

/// 종목별 구독 현황 응답.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSubscriptionResponse {
    pub market: InstrumentCode,
    pub ref_count: usize,
    pub subscribers: usize,
}

// ==================== Handler ====================

async fn build_status(state: &AppState) -> FeedStatusResponse {
    let markets = state
        .registry
        .counts()
        .await
        .into_iter()
        .map(|(market, ref_count)| MarketRefCount { market, ref_count })
        .collect();

    FeedStatusResponse {
        feed: state.feed.status(),
        markets,
        market_sessions: state.sessions.session_count().await,
        dashboard_sessions: state.dashboard.len().await,
    }
}

/// 피드 상태 조회.
///
/// GET /api/feed/status
pub async fn feed_status(State(state): State<Arc<AppState>>) -> Json<FeedStatusResponse> {
    Json(build_status(&state).await)
}

/// 종목별 구독 현황 조회.
///
/// GET /api/feed/markets/{code}
pub async fn market_subscription(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<Json<MarketSubscriptionResponse>> {
    let market = InstrumentCode::new(code);
    if market.is_blank() {
        return Err(relay_error_response(&RelayError::InvalidInput(
            "종목 코드가 비어 있습니다".to_string(),
        )));
    }

    Ok(Json(MarketSubscriptionResponse {
        ref_count: state.registry.ref_count(&market).await,
        subscribers: state.sessions.subscriber_count(&market).await,
        market,
    }))
}

/// 수동 재연결.
///
/// 연결 태스크가 이미 실행 중이면 상태만 반환합니다.
/// POST /api/feed/reconnect
pub async fn reconnect_feed(State(state): State<Arc<AppState>>) -> Json<FeedStatusResponse> {
    info!(state = %state.feed.state(), "운영자 재연결 요청");
    state.feed.connect().await;
    Json(build_status(&state).await)
}

/// 피드 라우터 생성.
pub fn feed_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(feed_status))
        .route("/markets/{code}", get(market_subscription))
        .route("/reconnect", post(reconnect_feed))
}
