//! 업비트 공개 REST API 클라이언트.
//!
//! 인증이 필요 없는 시세 조회만 지원합니다.
//!
//! - `GET /market/all` - 종목 목록
//! - `GET /ticker` - 현재가
//! - `GET /candles/{minutes/N|days|weeks|months}` - 캔들

use std::time::Duration;

use relay_core::{Candle, CandleInterval, FeedConfig, InstrumentCode, MarketInfo, Tick};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error};

use super::protocol::UpbitTicker;
use crate::{FeedError, FeedResult};

#[derive(Debug, Deserialize)]
struct UpbitMarket {
    market: String,
    korean_name: String,
    english_name: String,
    #[serde(default)]
    market_warning: Option<String>,
}

impl From<UpbitMarket> for MarketInfo {
    fn from(raw: UpbitMarket) -> Self {
        MarketInfo {
            market: InstrumentCode::new(raw.market),
            korean_name: raw.korean_name,
            english_name: raw.english_name,
            market_warning: raw.market_warning,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpbitCandle {
    market: String,
    candle_date_time_utc: String,
    candle_date_time_kst: String,
    opening_price: Decimal,
    high_price: Decimal,
    low_price: Decimal,
    trade_price: Decimal,
    timestamp: i64,
    candle_acc_trade_price: Decimal,
    candle_acc_trade_volume: Decimal,
    #[serde(default)]
    unit: Option<u32>,
}

impl From<UpbitCandle> for Candle {
    fn from(raw: UpbitCandle) -> Self {
        Candle {
            market: InstrumentCode::new(raw.market),
            candle_date_time_utc: raw.candle_date_time_utc,
            candle_date_time_kst: raw.candle_date_time_kst,
            opening_price: raw.opening_price,
            high_price: raw.high_price,
            low_price: raw.low_price,
            trade_price: raw.trade_price,
            timestamp: raw.timestamp,
            acc_trade_price: raw.candle_acc_trade_price,
            acc_trade_volume: raw.candle_acc_trade_volume,
            unit: raw.unit,
        }
    }
}

/// 업비트 에러 응답 (`{"error":{"name":..,"message":..}}`).
#[derive(Debug, Deserialize)]
struct UpbitErrorResponse {
    error: UpbitErrorBody,
}

#[derive(Debug, Deserialize)]
struct UpbitErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// 업비트 REST 클라이언트.
pub struct UpbitRestClient {
    client: Client,
    base_url: String,
}

impl UpbitRestClient {
    /// 새 클라이언트 생성.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `FeedError::NetworkError`를 반환합니다.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::NetworkError(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// 피드 설정에서 생성.
    pub fn from_config(config: &FeedConfig) -> FeedResult<Self> {
        Self::new(config.rest_url.clone(), config.rest_timeout())
    }

    /// 전체 종목 목록.
    pub async fn get_markets(&self) -> FeedResult<Vec<MarketInfo>> {
        let raw: Vec<UpbitMarket> = self
            .public_get("market/all", &[("isDetails", "true".to_string())])
            .await?;
        Ok(raw.into_iter().map(MarketInfo::from).collect())
    }

    /// 원화 마켓 종목 목록.
    pub async fn get_krw_markets(&self) -> FeedResult<Vec<MarketInfo>> {
        let markets = self.get_markets().await?;
        Ok(markets.into_iter().filter(MarketInfo::is_krw).collect())
    }

    /// 현재가 조회. 빈 목록이면 요청하지 않습니다.
    pub async fn get_tickers(&self, codes: &[InstrumentCode]) -> FeedResult<Vec<Tick>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }

        let markets = codes
            .iter()
            .map(InstrumentCode::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let raw: Vec<UpbitTicker> = self.public_get("ticker", &[("markets", markets)]).await?;
        Ok(raw.into_iter().map(Tick::from).collect())
    }

    /// 캔들 조회.
    ///
    /// `to`가 있으면 그 시각 이전의 캔들을 최신순으로 반환합니다.
    pub async fn get_candles(
        &self,
        code: &InstrumentCode,
        interval: CandleInterval,
        count: u32,
        to: Option<&str>,
    ) -> FeedResult<Vec<Candle>> {
        let mut params = vec![
            ("market", code.to_string()),
            ("count", count.to_string()),
        ];
        if let Some(to) = to {
            params.push(("to", to.to_string()));
        }

        let raw: Vec<UpbitCandle> = self.public_get(&interval.path(), &params).await?;
        Ok(raw.into_iter().map(Candle::from).collect())
    }

    /// 공개 API 요청.
    async fn public_get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> FeedResult<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!("GET {}", url);

        let response = self.client.get(&url).query(params).send().await?;
        Self::handle_response(response).await
    }

    /// API 응답 처리.
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> FeedResult<T> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| {
                error!("업비트 응답 파싱 실패: {} - Body: {}", e, body);
                FeedError::ParseError(e.to_string())
            });
        }

        let message = serde_json::from_str::<UpbitErrorResponse>(&body)
            .ok()
            .and_then(|e| e.error.message)
            .unwrap_or(body);

        Err(FeedError::ApiError {
            status: status.as_u16(),
            message,
        })
    }
}
