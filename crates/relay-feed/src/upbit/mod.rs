//! 업비트 공개 시세 프로토콜.
//!
//! - `protocol` - 티커 WebSocket 구독/디코딩
//! - `rest` - 종목, 현재가, 캔들 REST 조회

pub mod protocol;
pub mod rest;

pub use protocol::{decode_ticker, subscribe_frame, subscribed_codes};
pub use rest::UpbitRestClient;
