//! 헬스 체크 endpoint.
//!
//! 서버 상태 확인을 위한 헬스 체크 엔드포인트를 제공합니다.
//! 로드밸런서나 오케스트레이션 시스템(Kubernetes 등)에서 사용됩니다.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use relay_feed::ConnectionState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

/// 헬스 체크 응답 구조체.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// 전체 서비스 상태 ("healthy" | "degraded" | "unhealthy")
    pub status: String,

    /// API 버전
    pub version: String,

    /// 서버 업타임(초)
    pub uptime_secs: i64,

    /// 현재 시간 (ISO 8601)
    pub timestamp: String,

    /// 개별 컴포넌트 상태
    pub components: ComponentHealth,
}

/// 개별 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// 업스트림 피드 상태
    pub upstream_feed: ComponentStatus,

    /// 대시보드 통계 브로드캐스터 상태
    pub statistics: ComponentStatus,
}

/// 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// 상태 ("up" | "down" | "not_configured")
    pub status: String,

    /// 추가 정보 (선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentStatus {
    /// 비정상 상태.
    pub fn down(message: impl Into<String>) -> Self {
        Self {
            status: "down".to_string(),
            message: Some(message.into()),
        }
    }

    /// 미설정 상태.
    pub fn not_configured() -> Self {
        Self {
            status: "not_configured".to_string(),
            message: None,
        }
    }

    /// 정보 포함 정상 상태.
    pub fn up_with_info(message: impl Into<String>) -> Self {
        Self {
            status: "up".to_string(),
            message: Some(message.into()),
        }
    }
}

/// 현재 상태로 헬스 응답을 만듭니다.
///
/// 재연결 한도를 소진한 피드는 `unhealthy`, 재연결 중인 피드는 `degraded`로
/// 봅니다.
async fn build_health(state: &AppState) -> (StatusCode, HealthResponse) {
    let feed = state.feed.status();

    let (overall, status_code, feed_status) = match feed.state {
        ConnectionState::Connected => (
            "healthy",
            StatusCode::OK,
            ComponentStatus::up_with_info(format!(
                "{} markets wanted",
                state.registry.wanted().await.len()
            )),
        ),
        ConnectionState::Connecting | ConnectionState::Disconnected => (
            "degraded",
            StatusCode::OK,
            ComponentStatus::down(format!(
                "{} (연속 실패 {}회)",
                feed.state, feed.consecutive_failures
            )),
        ),
        ConnectionState::Unavailable => (
            "unhealthy",
            StatusCode::SERVICE_UNAVAILABLE,
            ComponentStatus::down(format!(
                "재연결 한도 초과 ({}회)",
                feed.max_reconnect_attempts
            )),
        ),
    };

    let statistics = if state.has_statistics() {
        ComponentStatus::up_with_info(format!(
            "{} dashboard clients",
            state.dashboard.len().await
        ))
    } else {
        ComponentStatus::not_configured()
    };

    let response = HealthResponse {
        status: overall.to_string(),
        version: state.version.clone(),
        uptime_secs: state.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        components: ComponentHealth {
            upstream_feed: feed_status,
            statistics,
        },
    };

    (status_code, response)
}

/// 헬스 체크 (liveness probe용).
///
/// 프로세스가 살아 있으면 항상 200을 반환하고, 피드 상태는 본문에 담습니다.
/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (_, response) = build_health(&state).await;
    (StatusCode::OK, Json(response))
}

/// 상세 헬스 체크 (readiness probe용).
///
/// 피드가 재연결 한도를 소진했으면 503을 반환합니다.
/// GET /health/ready
pub async fn health_ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status_code, response) = build_health(&state).await;
    (status_code, Json(response))
}

/// 헬스 체크 라우터 생성.
pub fn health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(health_ready))
}
