//! 거래소 종목 정보와 캔들 데이터.
//!
//! 업스트림 REST API에서 조회한 값을 그대로 담으며, 클라이언트에는
//! camelCase JSON으로 전달합니다.

use crate::error::{RelayError, RelayResult};
use crate::types::InstrumentCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 한 번에 조회할 수 있는 최대 캔들 수.
pub const MAX_CANDLE_COUNT: u32 = 200;

/// 분봉 단위로 허용되는 값.
pub const MINUTE_UNITS: [u32; 7] = [1, 3, 5, 15, 30, 60, 240];

/// 거래 가능한 종목 정보.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketInfo {
    /// 종목 코드 (예: "KRW-BTC")
    pub market: InstrumentCode,
    /// 한글 이름
    pub korean_name: String,
    /// 영문 이름
    pub english_name: String,
    /// 유의 종목 여부 ("NONE", "CAUTION")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_warning: Option<String>,
}

impl MarketInfo {
    /// 원화 마켓 종목인지 확인합니다.
    pub fn is_krw(&self) -> bool {
        self.market.as_str().starts_with("KRW-")
    }
}

/// 캔들 조회 단위.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleInterval {
    /// 분봉 (1, 3, 5, 15, 30, 60, 240)
    Minutes(u32),
    /// 일봉
    Days,
    /// 주봉
    Weeks,
    /// 월봉
    Months,
}

impl CandleInterval {
    /// 쿼리 파라미터(`type`, `unit`)에서 조회 단위를 결정합니다.
    ///
    /// 알 수 없는 `type`은 분봉으로 취급합니다.
    pub fn from_query(kind: &str, unit: u32) -> RelayResult<Self> {
        match kind {
            "days" => Ok(Self::Days),
            "weeks" => Ok(Self::Weeks),
            "months" => Ok(Self::Months),
            _ if MINUTE_UNITS.contains(&unit) => Ok(Self::Minutes(unit)),
            _ => Err(RelayError::InvalidInput(format!(
                "지원하지 않는 분봉 단위: {}",
                unit
            ))),
        }
    }

    /// REST 경로 (예: `candles/minutes/5`).
    pub fn path(&self) -> String {
        match self {
            Self::Minutes(unit) => format!("candles/minutes/{}", unit),
            Self::Days => "candles/days".to_string(),
            Self::Weeks => "candles/weeks".to_string(),
            Self::Months => "candles/months".to_string(),
        }
    }
}

/// OHLCV 캔들.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    /// 종목 코드
    pub market: InstrumentCode,
    /// 캔들 기준 시각 (UTC, `yyyy-MM-ddTHH:mm:ss`)
    pub candle_date_time_utc: String,
    /// 캔들 기준 시각 (KST)
    pub candle_date_time_kst: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub opening_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub high_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub low_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub trade_price: Decimal,
    /// 마지막 틱 타임스탬프 (밀리초)
    pub timestamp: i64,
    /// 누적 거래대금
    #[serde(with = "rust_decimal::serde::float")]
    pub acc_trade_price: Decimal,
    /// 누적 거래량
    #[serde(with = "rust_decimal::serde::float")]
    pub acc_trade_volume: Decimal,
    /// 분봉 단위 (분봉일 때만)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<u32>,
}
