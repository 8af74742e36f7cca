//! Prometheus 메트릭 설정 및 유틸리티.
//!
//! HTTP 요청 메트릭과 중계 메트릭을 수집하고 `/metrics` 엔드포인트로 노출합니다.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Prometheus 메트릭 레코더를 설정하고 핸들을 반환합니다.
///
/// 레코더가 이미 설치되어 있으면 에러를 반환합니다.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
        )?
        .install_recorder()
}

// ============================================================================
// HTTP 메트릭
// ============================================================================

/// HTTP 요청 한 건을 기록합니다.
pub fn record_http_request(method: &str, route: &str, status: u16, duration_secs: f64) {
    counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(duration_secs);
}

// ============================================================================
// 중계 메트릭
// ============================================================================

/// WebSocket 연결 수 증가.
pub fn increment_websocket_connections(endpoint: &'static str) {
    gauge!("websocket_connections_active", "endpoint" => endpoint).increment(1.0);
}

/// WebSocket 연결 수 감소.
pub fn decrement_websocket_connections(endpoint: &'static str) {
    gauge!("websocket_connections_active", "endpoint" => endpoint).decrement(1.0);
}

/// 세션에 전달된 티커 수.
pub fn record_ticks_delivered(count: usize) {
    counter!("relay_ticks_delivered_total").increment(count as u64);
}

/// 큐가 가득 차거나 닫혀서 버린 티커 수.
pub fn record_ticks_dropped(count: usize) {
    counter!("relay_ticks_dropped_total").increment(count as u64);
}

/// 잘못된 클라이언트 요청.
pub fn record_client_error(code: &'static str) {
    counter!("relay_client_errors_total", "code" => code).increment(1);
}
