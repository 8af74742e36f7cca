//! 도메인 모델.
//!
//! - `tick` - 업스트림에서 수신한 실시간 티커
//! - `market` - 종목 정보와 캔들
//! - `statistics` - 관리자 대시보드용 실시간 통계 스냅샷

pub mod market;
pub mod statistics;
pub mod tick;

pub use market::{Candle, CandleInterval, MarketInfo, MAX_CANDLE_COUNT, MINUTE_UNITS};
pub use statistics::RealtimeStats;
pub use tick::{PriceChange, Tick};
