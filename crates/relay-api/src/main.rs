//! 실시간 시세 중계 서버.
//!
//! 업비트 티커 스트림을 하나의 업스트림 연결로 받아, 종목을 구독한
//! 다운스트림 WebSocket 클라이언트에게만 전달합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    http::{HeaderValue, Method, StatusCode},
    middleware,
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use relay_api::metrics::setup_metrics_recorder;
use relay_api::middleware::metrics_layer;
use relay_api::routes::create_api_router;
use relay_api::state::AppState;
use relay_api::statistics::HttpSnapshotSource;
use relay_core::{init_logging, LogConfig, RelayConfig};
use relay_feed::{UpbitRestClient, UpstreamFeedClient};

/// CORS 레이어 생성.
///
/// 프론트엔드 주소만 허용합니다. 주소가 유효하지 않으면 모든 origin을 허용합니다.
fn cors_layer(frontend_url: &str) -> CorsLayer {
    let allow_origin = match frontend_url.parse::<HeaderValue>() {
        Ok(origin) => {
            info!(origin = %frontend_url, "CORS origin configured");
            AllowOrigin::exact(origin)
        }
        Err(_) => {
            warn!(origin = %frontend_url, "유효하지 않은 FRONTEND_URL, 모든 origin 허용");
            AllowOrigin::any()
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ])
        .max_age(Duration::from_secs(3600))
}

/// /metrics 엔드포인트 핸들러.
async fn metrics_handler(
    axum::extract::State(handle): axum::extract::State<PrometheusHandle>,
) -> String {
    handle.render()
}

/// 전체 라우터 생성.
fn create_router(state: Arc<AppState>, metrics_handle: PrometheusHandle, frontend_url: &str) -> Router {
    // 메트릭 라우터 (별도 상태)
    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    Router::new()
        .merge(metrics_router)
        .merge(create_api_router().with_state(state))
        .layer(middleware::from_fn(metrics_layer))
        .layer(TraceLayer::new_for_http())
        // WebSocket 업그레이드 이후에는 적용되지 않음
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(cors_layer(frontend_url))
}

/// 애플리케이션 상태와 백그라운드 태스크 구성.
fn build_state(config: &RelayConfig, shutdown: &CancellationToken) -> anyhow::Result<Arc<AppState>> {
    let mut feed = UpstreamFeedClient::new(&config.feed);
    let ticks = feed
        .take_ticks()
        .context("티커 채널을 가져올 수 없습니다")?;

    let rest = UpbitRestClient::from_config(&config.feed)?;
    let mut state = AppState::new(Arc::new(feed), config.stream.clone())
        .with_market_data(Arc::new(rest));

    match HttpSnapshotSource::from_config(&config.statistics)? {
        Some(source) => {
            info!(url = %source.url(), "통계 스냅샷 소스 설정");
            state = state.with_snapshot_source(
                Arc::new(source),
                config.statistics.broadcast_interval(),
            );
        }
        None => warn!("statistics.source_url 미설정, 대시보드 통계 비활성화"),
    }

    let state = Arc::new(state);

    state.start_fanout(ticks, shutdown.clone());
    if state.start_statistics(shutdown.clone()).is_some() {
        info!(
            interval_secs = config.statistics.broadcast_interval().as_secs(),
            "통계 브로드캐스터 시작"
        );
    }

    Ok(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일 로드 (있는 경우)
    let _ = dotenvy::dotenv();

    let config = RelayConfig::load_default().context("설정 로드 실패")?;

    init_logging(LogConfig::from_settings(&config.logging))
        .map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {}", e))?;

    info!("Starting relay server...");

    // Prometheus 메트릭 레코더 설정
    let metrics_handle = setup_metrics_recorder()?;
    info!("Prometheus metrics recorder initialized");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| {
            error!(
                host = %config.server.host,
                port = config.server.port,
                error = %e,
                "소켓 주소 설정이 유효하지 않습니다"
            );
            e
        })?;

    // 전역 종료 토큰 (팬아웃, 통계 태스크에서 사용)
    let shutdown_token = CancellationToken::new();

    let state = build_state(&config, &shutdown_token)?;
    info!(
        version = %state.version,
        feed_url = %config.feed.url,
        has_statistics = state.has_statistics(),
        "Application state initialized"
    );

    // 구독이 없어도 연결은 미리 열어 둠
    state.feed.connect().await;

    let app = create_router(state.clone(), metrics_handle, &config.server.frontend_url);

    info!(%addr, "Relay server listening");
    info!("Market WebSocket at ws://{}/ws/market", addr);
    info!("Statistics WebSocket at ws://{}/ws/statistics", addr);
    info!("Metrics available at http://{}/metrics", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_token.clone()))
        .await?;

    info!("Server shutdown initiated, cleaning up...");

    shutdown_token.cancel();

    // 재연결 타이머가 남지 않도록 피드를 먼저 닫음
    if tokio::time::timeout(Duration::from_secs(10), state.feed.disconnect())
        .await
        .is_err()
    {
        warn!("Feed disconnect timeout, forcing shutdown");
    }

    info!("Server stopped gracefully");

    Ok(())
}

/// Graceful shutdown 시그널 대기.
///
/// Ctrl+C 또는 SIGTERM 시그널을 수신하면 종료 토큰을 취소합니다.
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    shutdown_token.cancel();
    info!("Shutdown signal propagated to background tasks");
}
