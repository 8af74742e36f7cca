//! 업비트 WebSocket 메시지 타입.
//!
//! # 구독 요청
//!
//! ```json
//! [{"ticket":"<uuid>"},{"type":"ticker","codes":["KRW-BTC"],"isOnlyRealtime":true},{"format":"DEFAULT"}]
//! ```
//!
//! 구독 요청은 항상 전체 목록이며, 새 요청이 이전 요청을 대체합니다.
//! 구독 해제 명령은 존재하지 않습니다.

use relay_core::{InstrumentCode, PriceChange, Tick};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{FeedError, FeedResult};

// ============================================================================
// 구독 요청
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct TicketField {
    ticket: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerRequest {
    #[serde(rename = "type")]
    kind: String,
    codes: Vec<InstrumentCode>,
    is_only_realtime: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct FormatField {
    format: String,
}

/// 티커 구독 프레임을 생성합니다.
///
/// `codes`는 현재 원하는 전체 종목 목록이어야 합니다.
pub fn subscribe_frame(ticket: &str, codes: &[InstrumentCode]) -> FeedResult<String> {
    let frame = (
        TicketField {
            ticket: ticket.to_string(),
        },
        TickerRequest {
            kind: "ticker".to_string(),
            codes: codes.to_vec(),
            is_only_realtime: true,
        },
        FormatField {
            format: "DEFAULT".to_string(),
        },
    );

    Ok(serde_json::to_string(&frame)?)
}

/// 구독 프레임에서 종목 목록을 추출합니다.
pub fn subscribed_codes(frame: &str) -> FeedResult<Vec<InstrumentCode>> {
    let (_, request, _): (TicketField, TickerRequest, FormatField) = serde_json::from_str(frame)?;
    Ok(request.codes)
}

// ============================================================================
// 티커 스트림
// ============================================================================

/// 업비트 티커 (DEFAULT 포맷).
///
/// WebSocket 스트림은 `code`, REST 현재가 API는 `market` 필드를 사용합니다.
#[derive(Debug, Deserialize)]
pub(crate) struct UpbitTicker {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(alias = "market")]
    code: String,
    trade_price: Decimal,
    #[serde(default)]
    opening_price: Decimal,
    #[serde(default)]
    high_price: Decimal,
    #[serde(default)]
    low_price: Decimal,
    #[serde(default)]
    prev_closing_price: Decimal,
    #[serde(default)]
    change: PriceChange,
    #[serde(default)]
    change_price: Decimal,
    #[serde(default)]
    change_rate: Decimal,
    #[serde(default)]
    signed_change_price: Decimal,
    #[serde(default)]
    signed_change_rate: Decimal,
    #[serde(default)]
    trade_volume: Decimal,
    #[serde(default)]
    acc_trade_volume_24h: Decimal,
    #[serde(default)]
    acc_trade_price_24h: Decimal,
    #[serde(default)]
    highest_52_week_price: Decimal,
    #[serde(default)]
    highest_52_week_date: String,
    #[serde(default)]
    lowest_52_week_price: Decimal,
    #[serde(default)]
    lowest_52_week_date: String,
    #[serde(default)]
    trade_timestamp: i64,
    timestamp: i64,
}

impl From<UpbitTicker> for Tick {
    fn from(ws: UpbitTicker) -> Self {
        Tick {
            code: InstrumentCode::new(ws.code),
            trade_price: ws.trade_price,
            opening_price: ws.opening_price,
            high_price: ws.high_price,
            low_price: ws.low_price,
            prev_closing_price: ws.prev_closing_price,
            change: ws.change,
            change_price: ws.change_price,
            change_rate: ws.change_rate,
            signed_change_price: ws.signed_change_price,
            signed_change_rate: ws.signed_change_rate,
            trade_volume: ws.trade_volume,
            acc_trade_volume_24h: ws.acc_trade_volume_24h,
            acc_trade_price_24h: ws.acc_trade_price_24h,
            highest_52_week_price: ws.highest_52_week_price,
            highest_52_week_date: ws.highest_52_week_date,
            lowest_52_week_price: ws.lowest_52_week_price,
            lowest_52_week_date: ws.lowest_52_week_date,
            trade_timestamp: ws.trade_timestamp,
            timestamp: ws.timestamp,
        }
    }
}

/// 업스트림 프레임(텍스트 또는 바이너리 JSON)을 티커로 디코딩합니다.
pub fn decode_ticker(payload: &[u8]) -> FeedResult<Tick> {
    let ws: UpbitTicker = serde_json::from_slice(payload)?;

    if let Some(kind) = ws.kind.as_deref() {
        if kind != "ticker" {
            return Err(FeedError::ParseError(format!(
                "unexpected frame type: {}",
                kind
            )));
        }
    }

    Ok(ws.into())
}
