//! 업스트림 시세 피드 연결 및 구독 관리.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - `UpstreamFeedClient`: 업비트 티커 WebSocket 연결, 재연결, 구독 전송
//! - `SubscriptionRegistry`: 종목별 참조 카운트와 전체 구독 목록 관리
//! - `ReconnectPolicy`: 선형 백오프 재연결 정책
//! - 업비트 구독/티커 메시지 코덱
//! - `UpbitRestClient`: 종목, 현재가, 캔들 REST 조회

pub mod client;
pub mod error;
pub mod reconnect;
pub mod registry;
pub mod traits;
pub mod upbit;

pub use client::{ConnectionState, FeedStatus, UpstreamFeedClient};
pub use error::*;
pub use reconnect::ReconnectPolicy;
pub use registry::SubscriptionRegistry;
pub use traits::*;
pub use upbit::UpbitRestClient;
