//! 실시간 시세 중계를 위한 WebSocket 서버.
//!
//! 클라이언트가 구독한 종목의 티커만 해당 세션으로 전달합니다.
//!
//! # 엔드포인트
//!
//! - `/ws/market` - 종목별 시세 구독
//! - `/ws/statistics` - 관리자 대시보드 통계
//!
//! # 메시지 형식
//!
//! 모든 메시지는 JSON 형식으로 교환됩니다.
//!
//! ## 클라이언트 → 서버
//!
//! ```json
//! {"type": "subscribe", "markets": ["KRW-BTC", "KRW-ETH"]}
//! {"type": "unsubscribe", "markets": ["KRW-BTC"]}
//! {"type": "ping"}
//! {"type": "stats:subscribe"}
//! ```
//!
//! ## 서버 → 클라이언트
//!
//! ```json
//! {"event": "ticker:update", "data": {...}}
//! {"event": "subscribed", "data": {"markets": ["KRW-BTC"]}}
//! {"event": "error", "data": {"code": "INVALID_MARKETS", "message": "Invalid markets array"}}
//! {"event": "stats:realtime", "data": {...}}
//! ```

pub mod fanout;
pub mod handler;
pub mod messages;
pub mod sessions;

pub use fanout::{start_fanout_router, DispatchOutcome, FanoutRouter};
pub use handler::{market_ws_handler, statistics_ws_handler, websocket_router};
pub use messages::{parse_markets, ClientMessage, ServerEvent, TickerUpdate, WsError};
pub use sessions::{ClientSessionManager, SessionId, SharedSessionManager};
