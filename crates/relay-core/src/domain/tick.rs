//! 실시간 티커 데이터.
//!
//! 업스트림 거래소 스트림에서 디코딩된 한 번의 시세 갱신을 나타냅니다.
//! 디코딩 이후에는 변경되지 않으며 팬아웃 단계에서 읽기 전용으로만 사용됩니다.

use crate::types::InstrumentCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 전일 종가 대비 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceChange {
    /// 상승
    Rise,
    /// 보합
    #[default]
    Even,
    /// 하락
    Fall,
}

/// 업스트림에서 수신한 티커.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// 종목 코드
    pub code: InstrumentCode,
    /// 현재가 (최근 체결가)
    pub trade_price: Decimal,
    /// 시가
    pub opening_price: Decimal,
    /// 고가
    pub high_price: Decimal,
    /// 저가
    pub low_price: Decimal,
    /// 전일 종가
    pub prev_closing_price: Decimal,
    /// 전일 대비 방향
    pub change: PriceChange,
    /// 변화액 (절대값)
    pub change_price: Decimal,
    /// 변화율 (절대값)
    pub change_rate: Decimal,
    /// 부호가 있는 변화액
    pub signed_change_price: Decimal,
    /// 부호가 있는 변화율
    pub signed_change_rate: Decimal,
    /// 최근 체결량
    pub trade_volume: Decimal,
    /// 24시간 누적 거래량
    pub acc_trade_volume_24h: Decimal,
    /// 24시간 누적 거래대금
    pub acc_trade_price_24h: Decimal,
    /// 52주 최고가
    pub highest_52_week_price: Decimal,
    /// 52주 최고가 달성일 (yyyy-MM-dd)
    pub highest_52_week_date: String,
    /// 52주 최저가
    pub lowest_52_week_price: Decimal,
    /// 52주 최저가 달성일 (yyyy-MM-dd)
    pub lowest_52_week_date: String,
    /// 체결 타임스탬프 (밀리초)
    pub trade_timestamp: i64,
    /// 메시지 타임스탬프 (밀리초)
    pub timestamp: i64,
}

impl Tick {
    /// 현재가와 타임스탬프만 채운 티커를 생성합니다.
    ///
    /// 나머지 가격 필드는 현재가로, 변화량은 0으로 설정됩니다.
    pub fn new(code: impl Into<InstrumentCode>, trade_price: Decimal, timestamp: i64) -> Self {
        Self {
            code: code.into(),
            trade_price,
            opening_price: trade_price,
            high_price: trade_price,
            low_price: trade_price,
            prev_closing_price: trade_price,
            change: PriceChange::Even,
            change_price: Decimal::ZERO,
            change_rate: Decimal::ZERO,
            signed_change_price: Decimal::ZERO,
            signed_change_rate: Decimal::ZERO,
            trade_volume: Decimal::ZERO,
            acc_trade_volume_24h: Decimal::ZERO,
            acc_trade_price_24h: Decimal::ZERO,
            highest_52_week_price: trade_price,
            highest_52_week_date: String::new(),
            lowest_52_week_price: trade_price,
            lowest_52_week_date: String::new(),
            trade_timestamp: timestamp,
            timestamp,
        }
    }
}
