//! WebSocket 메시지 타입.
//!
//! 클라이언트-서버 간 교환되는 메시지 정의.

use relay_core::{InstrumentCode, PriceChange, RealtimeStats, Tick};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 구독 요청의 `markets` 필드가 잘못되었을 때의 메시지.
pub const INVALID_MARKETS: &str = "Invalid markets array";

/// WebSocket 에러.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("잘못된 메시지 형식: {0}")]
    InvalidMessage(String),
    #[error("{}", INVALID_MARKETS)]
    InvalidMarkets,
    #[error("직렬화 실패: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl WsError {
    /// 클라이언트에 전달할 에러 코드.
    pub fn code(&self) -> &'static str {
        match self {
            WsError::InvalidMessage(_) => "INVALID_MESSAGE",
            WsError::InvalidMarkets => "INVALID_MARKETS",
            WsError::SerializationError(_) => "INTERNAL_ERROR",
        }
    }
}

// ==================== 클라이언트 → 서버 메시지 ====================

/// 클라이언트에서 서버로 보내는 메시지.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// 종목 구독
    #[serde(rename = "subscribe")]
    Subscribe {
        /// 구독할 종목 코드 배열
        #[serde(default)]
        markets: Value,
    },
    /// 종목 구독 해제
    #[serde(rename = "unsubscribe")]
    Unsubscribe {
        /// 구독 해제할 종목 코드 배열
        #[serde(default)]
        markets: Value,
    },
    /// 핑 (연결 유지)
    #[serde(rename = "ping")]
    Ping,
    /// 통계 즉시 요청 (대시보드)
    #[serde(rename = "stats:subscribe")]
    StatsSubscribe,
}

impl ClientMessage {
    /// JSON 문자열에서 파싱.
    pub fn from_json(json: &str) -> Result<Self, WsError> {
        serde_json::from_str(json).map_err(|e| WsError::InvalidMessage(e.to_string()))
    }
}

/// `markets` 필드를 종목 코드 목록으로 변환합니다.
///
/// 문자열 배열이 아니거나 빈 코드가 섞여 있으면 요청 전체를 거부합니다.
/// 중복은 첫 등장 순서를 유지하며 제거합니다.
pub fn parse_markets(markets: &Value) -> Result<Vec<InstrumentCode>, WsError> {
    let items = markets.as_array().ok_or(WsError::InvalidMarkets)?;
    let mut codes: Vec<InstrumentCode> = Vec::with_capacity(items.len());

    for item in items {
        let code = item
            .as_str()
            .map(InstrumentCode::from)
            .ok_or(WsError::InvalidMarkets)?;
        if code.is_blank() {
            return Err(WsError::InvalidMarkets);
        }
        if !codes.contains(&code) {
            codes.push(code);
        }
    }

    Ok(codes)
}

// ==================== 서버 → 클라이언트 메시지 ====================

/// 서버에서 클라이언트로 보내는 이벤트.
///
/// `{"event": "...", "data": {...}}` 형태로 직렬화됩니다.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// 연결 환영 메시지
    #[serde(rename = "connected", rename_all = "camelCase")]
    Connected {
        /// 세션 ID
        session_id: String,
        /// 서버 버전
        version: String,
        /// 서버 타임스탬프
        timestamp: i64,
    },
    /// 시세 갱신
    #[serde(rename = "ticker:update")]
    TickerUpdate(TickerUpdate),
    /// 구독 확인
    #[serde(rename = "subscribed")]
    Subscribed {
        /// 요청한 종목 목록
        markets: Vec<InstrumentCode>,
    },
    /// 구독 해제 확인
    #[serde(rename = "unsubscribed")]
    Unsubscribed {
        /// 요청한 종목 목록
        markets: Vec<InstrumentCode>,
    },
    /// 에러 (잘못된 클라이언트 요청에 한함)
    #[serde(rename = "error")]
    Error {
        /// 에러 코드
        code: String,
        /// 에러 메시지
        message: String,
    },
    /// 퐁 응답
    #[serde(rename = "pong")]
    Pong {
        /// 서버 타임스탬프
        timestamp: i64,
    },
    /// 대시보드 실시간 통계
    #[serde(rename = "stats:realtime")]
    StatsRealtime(RealtimeStats),
}

impl ServerEvent {
    /// JSON 문자열로 직렬화.
    pub fn to_json(&self) -> Result<String, WsError> {
        serde_json::to_string(self).map_err(WsError::from)
    }

    /// 에러 이벤트 생성 헬퍼.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&WsError> for ServerEvent {
    fn from(err: &WsError) -> Self {
        ServerEvent::error(err.code(), err.to_string())
    }
}

// ==================== 데이터 타입 ====================

/// 클라이언트용 시세 데이터 (camelCase).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerUpdate {
    /// 종목 코드
    pub market: InstrumentCode,
    #[serde(with = "rust_decimal::serde::float")]
    pub trade_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub opening_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub high_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub low_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub prev_closing_price: Decimal,
    pub change: PriceChange,
    #[serde(with = "rust_decimal::serde::float")]
    pub change_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub change_rate: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub signed_change_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub signed_change_rate: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub trade_volume: Decimal,
    #[serde(rename = "accTradePrice24h", with = "rust_decimal::serde::float")]
    pub acc_trade_price_24h: Decimal,
    #[serde(rename = "accTradeVolume24h", with = "rust_decimal::serde::float")]
    pub acc_trade_volume_24h: Decimal,
    #[serde(rename = "highest52WeekPrice", with = "rust_decimal::serde::float")]
    pub highest_52_week_price: Decimal,
    #[serde(rename = "highest52WeekDate")]
    pub highest_52_week_date: String,
    #[serde(rename = "lowest52WeekPrice", with = "rust_decimal::serde::float")]
    pub lowest_52_week_price: Decimal,
    #[serde(rename = "lowest52WeekDate")]
    pub lowest_52_week_date: String,
    /// 업스트림 타임스탬프 (ms)
    pub timestamp: i64,
}

impl From<&Tick> for TickerUpdate {
    fn from(tick: &Tick) -> Self {
        Self {
            market: tick.code.clone(),
            trade_price: tick.trade_price,
            opening_price: tick.opening_price,
            high_price: tick.high_price,
            low_price: tick.low_price,
            prev_closing_price: tick.prev_closing_price,
            change: tick.change,
            change_price: tick.change_price,
            change_rate: tick.change_rate,
            signed_change_price: tick.signed_change_price,
            signed_change_rate: tick.signed_change_rate,
            trade_volume: tick.trade_volume,
            acc_trade_price_24h: tick.acc_trade_price_24h,
            acc_trade_volume_24h: tick.acc_trade_volume_24h,
            highest_52_week_price: tick.highest_52_week_price,
            highest_52_week_date: tick.highest_52_week_date.clone(),
            lowest_52_week_price: tick.lowest_52_week_price,
            lowest_52_week_date: tick.lowest_52_week_date.clone(),
            timestamp: tick.timestamp,
        }
    }
}
