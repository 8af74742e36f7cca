//! 피드 trait 정의.

use async_trait::async_trait;
use relay_core::InstrumentCode;

/// 구독 목록 전체를 받아 업스트림에 반영하는 대상.
///
/// 업스트림 프로토콜에는 구독 해제 명령이 없으므로, 매 호출은
/// 증분이 아닌 **전체** 구독 목록을 전달합니다.
#[async_trait]
pub trait SubscriptionSink: Send + Sync {
    /// 전체 구독 목록을 교체합니다.
    async fn subscribe(&self, codes: Vec<InstrumentCode>);
}
