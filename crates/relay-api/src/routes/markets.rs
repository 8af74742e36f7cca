//! 시세 조회 endpoint.
//!
//! 업비트 REST API를 대신 호출합니다. 새로 구독한 클라이언트가 다음 체결
//! 전까지 빈 화면을 보지 않도록 현재가 스냅샷을 제공합니다.
//!
//! # 엔드포인트
//!
//! - `GET /api/markets` - 원화 마켓 종목 목록
//! - `GET /api/markets/{code}/ticker` - 현재가
//! - `GET /api/markets/{code}/candles` - 캔들 (`type`, `unit`, `count`, `to`)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use relay_core::{Candle, CandleInterval, InstrumentCode, MarketInfo, RelayError, MAX_CANDLE_COUNT};
use relay_feed::{FeedError, UpbitRestClient};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::error::{relay_error_response, ApiErrorResponse, ApiResult};
use crate::state::AppState;
use crate::websocket::TickerUpdate;

/// 캔들 조회 쿼리.
#[derive(Debug, Deserialize)]
pub struct CandleQuery {
    /// minutes, days, weeks, months (기본 minutes)
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// 분봉 단위 (기본 1)
    pub unit: Option<u32>,
    /// 개수 (기본 200, 최대 200)
    pub count: Option<u32>,
    /// 마지막 캔들 시각 (`yyyy-MM-ddTHH:mm:ss`)
    pub to: Option<String>,
}

fn market_data_error(err: FeedError) -> RelayError {
    match err {
        FeedError::ApiError { status: 404, message } => RelayError::NotFound(message),
        FeedError::ApiError { status, message } if (400..500).contains(&status) => {
            RelayError::InvalidInput(message)
        }
        FeedError::NetworkError(msg) | FeedError::Timeout(msg) => RelayError::Network(msg),
        other => RelayError::Upstream(other.to_string()),
    }
}

fn upstream_error_response(err: FeedError) -> (StatusCode, Json<ApiErrorResponse>) {
    warn!("업비트 REST 조회 실패: {}", err);

    let upstream_status = match &err {
        FeedError::ApiError { status, .. } => Some(*status),
        _ => None,
    };

    let (status, mut body) = relay_error_response(&market_data_error(err));
    if let Some(upstream_status) = upstream_status {
        body.details = Some(json!({ "upstreamStatus": upstream_status }));
    }
    (status, body)
}

fn rest_client(state: &AppState) -> ApiResult<&UpbitRestClient> {
    state.market_data.as_deref().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiErrorResponse::new(
                "MARKET_DATA_DISABLED",
                "시세 조회가 설정되지 않았습니다",
            )),
        )
    })
}

fn parse_code(code: String) -> ApiResult<InstrumentCode> {
    let code = InstrumentCode::new(code);
    if code.is_blank() {
        return Err(relay_error_response(&RelayError::InvalidInput(
            "종목 코드가 비어 있습니다".to_string(),
        )));
    }
    Ok(code)
}

/// 원화 마켓 종목 목록.
///
/// GET /api/markets
pub async fn list_markets(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<MarketInfo>>> {
    let client = rest_client(&state)?;
    let markets = client
        .get_krw_markets()
        .await
        .map_err(upstream_error_response)?;
    Ok(Json(markets))
}

/// 현재가 조회.
///
/// GET /api/markets/{code}/ticker
pub async fn get_ticker(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<Json<TickerUpdate>> {
    let code = parse_code(code)?;
    let client = rest_client(&state)?;

    let ticks = client
        .get_tickers(std::slice::from_ref(&code))
        .await
        .map_err(upstream_error_response)?;

    ticks
        .first()
        .map(|tick| Json(TickerUpdate::from(tick)))
        .ok_or_else(|| relay_error_response(&RelayError::NotFound(code.to_string())))
}

/// 캔들 조회.
///
/// GET /api/markets/{code}/candles?type=minutes&unit=5&count=100
pub async fn get_candles(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Query(query): Query<CandleQuery>,
) -> ApiResult<Json<Vec<Candle>>> {
    let code = parse_code(code)?;

    let interval = CandleInterval::from_query(
        query.kind.as_deref().unwrap_or("minutes"),
        query.unit.unwrap_or(1),
    )
    .map_err(|e| relay_error_response(&e))?;

    let count = query.count.unwrap_or(MAX_CANDLE_COUNT);
    if count == 0 || count > MAX_CANDLE_COUNT {
        return Err(relay_error_response(&RelayError::InvalidInput(format!(
            "count는 1~{} 범위여야 합니다",
            MAX_CANDLE_COUNT
        ))));
    }

    let client = rest_client(&state)?;
    let candles = client
        .get_candles(&code, interval, count, query.to.as_deref())
        .await
        .map_err(upstream_error_response)?;
    Ok(Json(candles))
}

/// 시세 조회 라우터 생성.
pub fn markets_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_markets))
        .route("/{code}/ticker", get(get_ticker))
        .route("/{code}/candles", get(get_candles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use mockito::Matcher;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::state::create_test_state;

    fn state_with_upstream(server: &mockito::Server) -> Arc<AppState> {
        let client = UpbitRestClient::new(server.url(), Duration::from_secs(2)).unwrap();
        Arc::new(create_test_state().with_market_data(Arc::new(client)))
    }

    async fn call(state: Arc<AppState>, uri: &str) -> (StatusCode, Value) {
        let app = Router::new()
            .nest("/api/markets", markets_router())
            .with_state(state);

        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_ticker_snapshot_uses_stream_shape() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/ticker")
            .match_query(Matcher::UrlEncoded("markets".into(), "KRW-BTC".into()))
            .with_status(200)
            .with_body(
                r#"[{"market":"KRW-BTC","trade_price":95000000.0,"change":"FALL",
                     "signed_change_rate":-0.012,"timestamp":1729213323100}]"#,
            )
            .create_async()
            .await;

        let (status, body) = call(state_with_upstream(&server), "/api/markets/KRW-BTC/ticker").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["market"], "KRW-BTC");
        assert_eq!(body["tradePrice"].as_f64(), Some(95_000_000.0));
        assert_eq!(body["change"], "FALL");
        assert_eq!(body["signedChangeRate"].as_f64(), Some(-0.012));
    }

    #[tokio::test]
    async fn test_unknown_code_maps_to_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/ticker")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"error":{"name":"404","message":"Code not found"}}"#)
            .create_async()
            .await;

        let (status, body) = call(state_with_upstream(&server), "/api/markets/KRW-NOPE/ticker").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["details"]["upstreamStatus"], 404);
    }

    #[tokio::test]
    async fn test_upstream_outage_is_bad_gateway() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/market/all")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("internal")
            .create_async()
            .await;

        let (status, body) = call(state_with_upstream(&server), "/api/markets").await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "UPSTREAM_ERROR");
    }

    #[tokio::test]
    async fn test_list_markets_filters_krw() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/market/all")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"[{"market":"KRW-BTC","korean_name":"비트코인","english_name":"Bitcoin"},
                    {"market":"USDT-BTC","korean_name":"비트코인","english_name":"Bitcoin"}]"#,
            )
            .create_async()
            .await;

        let (status, body) = call(state_with_upstream(&server), "/api/markets").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["koreanName"], "비트코인");
    }

    #[tokio::test]
    async fn test_day_candles_default_count() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/candles/days")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("market".into(), "KRW-ETH".into()),
                Matcher::UrlEncoded("count".into(), "200".into()),
            ]))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let (status, body) = call(
            state_with_upstream(&server),
            "/api/markets/KRW-ETH/candles?type=days",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_candle_query_validation() {
        let server = mockito::Server::new_async().await;
        let state = state_with_upstream(&server);

        let (status, _) = call(state.clone(), "/api/markets/KRW-BTC/candles?unit=7").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(state, "/api/markets/KRW-BTC/candles?count=201").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_disabled_without_client() {
        let (status, body) = call(Arc::new(create_test_state()), "/api/markets").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "MARKET_DATA_DISABLED");
    }
}
