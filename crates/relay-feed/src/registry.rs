//! 종목별 참조 카운트 구독 레지스트리.
//!
//! 다운스트림 세션들이 원하는 종목을 참조 카운트로 관리하고, 카운트가
//! 0→1 또는 1→0으로 바뀔 때만 업스트림에 전체 구독 목록을 다시 보냅니다.
//! 카운트 갱신과 업스트림 전달은 하나의 잠금 아래에서 수행되므로 전송되는
//! 목록은 항상 카운트와 일치합니다.

use std::collections::BTreeMap;
use std::sync::Arc;

use relay_core::InstrumentCode;
use tokio::sync::Mutex;
use tracing::debug;

use crate::traits::SubscriptionSink;

/// 구독 레지스트리.
pub struct SubscriptionRegistry {
    counts: Mutex<BTreeMap<InstrumentCode, usize>>,
    sink: Arc<dyn SubscriptionSink>,
}

impl SubscriptionRegistry {
    /// 구독 목록을 전달할 대상과 함께 생성합니다.
    pub fn new(sink: Arc<dyn SubscriptionSink>) -> Self {
        Self {
            counts: Mutex::new(BTreeMap::new()),
            sink,
        }
    }

    /// 참조를 하나 추가합니다. 업스트림 목록이 바뀌었으면 `true`.
    pub async fn add(&self, code: &InstrumentCode) -> bool {
        let mut counts = self.counts.lock().await;
        let count = counts.entry(code.clone()).or_insert(0);
        *count += 1;

        if *count > 1 {
            return false;
        }

        debug!(code = %code, "새 종목 구독");
        let wanted: Vec<InstrumentCode> = counts.keys().cloned().collect();
        self.sink.subscribe(wanted).await;
        true
    }

    /// 참조를 하나 제거합니다. 업스트림 목록이 바뀌었으면 `true`.
    ///
    /// 카운트가 0인 종목 제거는 아무 효과가 없습니다.
    pub async fn remove(&self, code: &InstrumentCode) -> bool {
        let mut counts = self.counts.lock().await;

        let Some(count) = counts.get_mut(code) else {
            return false;
        };

        *count -= 1;
        if *count > 0 {
            return false;
        }

        counts.remove(code);
        debug!(code = %code, "마지막 구독 해제");
        let wanted: Vec<InstrumentCode> = counts.keys().cloned().collect();
        self.sink.subscribe(wanted).await;
        true
    }

    /// 종목의 현재 참조 카운트.
    pub async fn ref_count(&self, code: &InstrumentCode) -> usize {
        self.counts.lock().await.get(code).copied().unwrap_or(0)
    }

    /// 현재 원하는 종목 목록 (정렬됨).
    pub async fn wanted(&self) -> Vec<InstrumentCode> {
        self.counts.lock().await.keys().cloned().collect()
    }

    /// 종목별 참조 카운트 스냅샷.
    pub async fn counts(&self) -> Vec<(InstrumentCode, usize)> {
        self.counts
            .lock()
            .await
            .iter()
            .map(|(code, count)| (code.clone(), *count))
            .collect()
    }
}
