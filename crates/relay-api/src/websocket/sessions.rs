//! 다운스트림 클라이언트 세션 관리.
//!
//! 세션별 구독 종목을 관리하고, 구독 변화를 [`SubscriptionRegistry`]의
//! 참조 카운트로 반영합니다. 세션마다 제한된 크기의 송신 큐를 두며,
//! 큐가 가득 찬 세션의 메시지는 버립니다.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use chrono::{DateTime, Utc};
use relay_core::{InstrumentCode, RelayError, RelayResult};
use relay_feed::SubscriptionRegistry;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use super::messages::ServerEvent;

/// 세션 식별자.
pub type SessionId = Uuid;

/// 세션 송신 큐. 직렬화된 JSON 텍스트를 전달합니다.
pub type SessionSink = mpsc::Sender<Utf8Bytes>;

/// 클라이언트 세션 정보.
#[derive(Debug)]
struct ClientSession {
    sink: SessionSink,
    codes: BTreeSet<InstrumentCode>,
    connected_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SessionTable {
    sessions: HashMap<SessionId, ClientSession>,
    by_code: HashMap<InstrumentCode, HashSet<SessionId>>,
}

impl SessionTable {
    fn index(&mut self, id: SessionId, code: &InstrumentCode) {
        self.by_code.entry(code.clone()).or_default().insert(id);
    }

    fn unindex(&mut self, id: &SessionId, code: &InstrumentCode) {
        if let Some(ids) = self.by_code.get_mut(code) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_code.remove(code);
            }
        }
    }
}

/// 세션 관리자.
///
/// 세션 테이블의 쓰기 잠금은 레지스트리 호출이 끝날 때까지 유지되므로,
/// 세션의 구독 목록과 레지스트리의 참조 카운트는 항상 일치합니다.
pub struct ClientSessionManager {
    table: RwLock<SessionTable>,
    registry: Arc<SubscriptionRegistry>,
    queue_capacity: usize,
}

impl ClientSessionManager {
    /// 새로운 세션 관리자 생성.
    ///
    /// # Arguments
    ///
    /// * `registry` - 종목 참조 카운트 레지스트리
    /// * `queue_capacity` - 세션별 송신 큐 크기
    pub fn new(registry: Arc<SubscriptionRegistry>, queue_capacity: usize) -> Self {
        Self {
            table: RwLock::new(SessionTable::default()),
            registry,
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// 새 세션 등록.
    ///
    /// # Returns
    ///
    /// 세션 ID와 송신 큐 수신기
    pub async fn on_connect(&self) -> (SessionId, mpsc::Receiver<Utf8Bytes>) {
        let (sink, rx) = mpsc::channel(self.queue_capacity);
        let id = Uuid::new_v4();

        let session = ClientSession {
            sink,
            codes: BTreeSet::new(),
            connected_at: Utc::now(),
        };
        self.table.write().await.sessions.insert(id, session);

        debug!(session_id = %id, "세션 등록");
        (id, rx)
    }

    /// 종목 구독 추가.
    ///
    /// 이미 구독 중인 종목은 무시하며, 새로 추가된 종목만 반환합니다.
    pub async fn on_subscribe(
        &self,
        id: SessionId,
        codes: &[InstrumentCode],
    ) -> RelayResult<Vec<InstrumentCode>> {
        let mut table = self.table.write().await;

        let Some(session) = table.sessions.get_mut(&id) else {
            warn!(session_id = %id, "알 수 없는 세션의 구독 요청");
            return Err(RelayError::InvalidSession(id.to_string()));
        };

        let added: Vec<InstrumentCode> = codes
            .iter()
            .filter(|code| session.codes.insert((*code).clone()))
            .cloned()
            .collect();

        for code in &added {
            table.index(id, code);
            self.registry.add(code).await;
        }

        debug!(session_id = %id, added = added.len(), "세션 구독 추가");
        Ok(added)
    }

    /// 종목 구독 해제.
    ///
    /// 실제로 구독 중이던 종목만 해제하고 반환합니다.
    pub async fn on_unsubscribe(
        &self,
        id: SessionId,
        codes: &[InstrumentCode],
    ) -> RelayResult<Vec<InstrumentCode>> {
        let mut table = self.table.write().await;

        let Some(session) = table.sessions.get_mut(&id) else {
            warn!(session_id = %id, "알 수 없는 세션의 구독 해제 요청");
            return Err(RelayError::InvalidSession(id.to_string()));
        };

        let removed: Vec<InstrumentCode> = codes
            .iter()
            .filter(|code| session.codes.remove(*code))
            .cloned()
            .collect();

        for code in &removed {
            table.unindex(&id, code);
            self.registry.remove(code).await;
        }

        debug!(session_id = %id, removed = removed.len(), "세션 구독 해제");
        Ok(removed)
    }

    /// 세션 제거.
    ///
    /// 세션이 보유하던 종목마다 참조를 하나씩 반환합니다.
    /// 이미 제거된 세션이면 아무것도 하지 않습니다.
    pub async fn on_disconnect(&self, id: SessionId) -> Vec<InstrumentCode> {
        let mut table = self.table.write().await;

        let Some(session) = table.sessions.remove(&id) else {
            return Vec::new();
        };

        let released: Vec<InstrumentCode> = session.codes.into_iter().collect();
        for code in &released {
            table.unindex(&id, code);
            self.registry.remove(code).await;
        }

        let lifetime = Utc::now() - session.connected_at;
        debug!(
            session_id = %id,
            released = released.len(),
            lifetime_secs = lifetime.num_seconds(),
            "세션 제거"
        );
        released
    }

    /// 종목을 구독 중인 세션들의 송신 큐 스냅샷.
    pub async fn sinks_for(&self, code: &InstrumentCode) -> Vec<(SessionId, SessionSink)> {
        let table = self.table.read().await;

        let Some(ids) = table.by_code.get(code) else {
            return Vec::new();
        };

        ids.iter()
            .filter_map(|id| {
                table
                    .sessions
                    .get(id)
                    .map(|session| (*id, session.sink.clone()))
            })
            .collect()
    }

    /// 특정 세션에 이벤트 전송.
    ///
    /// 큐가 가득 찼거나 세션이 없으면 `false`를 반환합니다.
    pub async fn reply(&self, id: SessionId, event: &ServerEvent) -> bool {
        let sink = match self.table.read().await.sessions.get(&id) {
            Some(session) => session.sink.clone(),
            None => return false,
        };

        match event.to_json() {
            Ok(json) => sink.try_send(Utf8Bytes::from(json)).is_ok(),
            Err(e) => {
                warn!(session_id = %id, "이벤트 직렬화 실패: {}", e);
                false
            }
        }
    }

    /// 연결된 세션 수.
    pub async fn session_count(&self) -> usize {
        self.table.read().await.sessions.len()
    }

    /// 세션의 구독 종목 목록 (정렬됨).
    pub async fn subscriptions_of(&self, id: SessionId) -> Option<Vec<InstrumentCode>> {
        self.table
            .read()
            .await
            .sessions
            .get(&id)
            .map(|session| session.codes.iter().cloned().collect())
    }

    /// 종목 구독 세션 수.
    pub async fn subscriber_count(&self, code: &InstrumentCode) -> usize {
        self.table
            .read()
            .await
            .by_code
            .get(code)
            .map(HashSet::len)
            .unwrap_or(0)
    }
}

/// 공유 가능한 세션 관리자 타입.
pub type SharedSessionManager = Arc<ClientSessionManager>;

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_feed::SubscriptionSink;

    #[derive(Default)]
    struct RecordingSink {
        frames: std::sync::Mutex<Vec<Vec<InstrumentCode>>>,
    }

    #[async_trait]
    impl SubscriptionSink for RecordingSink {
        async fn subscribe(&self, codes: Vec<InstrumentCode>) {
            self.frames.lock().unwrap().push(codes);
        }
    }

    fn setup(capacity: usize) -> (Arc<RecordingSink>, Arc<SubscriptionRegistry>, ClientSessionManager) {
        let sink = Arc::new(RecordingSink::default());
        let registry = Arc::new(SubscriptionRegistry::new(sink.clone()));
        let manager = ClientSessionManager::new(registry.clone(), capacity);
        (sink, registry, manager)
    }

    fn codes(list: &[&str]) -> Vec<InstrumentCode> {
        list.iter().map(|s| InstrumentCode::from(*s)).collect()
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let (sink, registry, manager) = setup(8);
        let (id, _rx) = manager.on_connect().await;

        let added = manager.on_subscribe(id, &codes(&["KRW-BTC"])).await.unwrap();
        assert_eq!(added, codes(&["KRW-BTC"]));

        let added = manager
            .on_subscribe(id, &codes(&["KRW-BTC", "KRW-ETH"]))
            .await
            .unwrap();
        assert_eq!(added, codes(&["KRW-ETH"]));

        assert_eq!(registry.ref_count(&"KRW-BTC".into()).await, 1);
        assert_eq!(sink.frames.lock().unwrap().len(), 2);
        assert_eq!(
            manager.subscriptions_of(id).await.unwrap(),
            codes(&["KRW-BTC", "KRW-ETH"])
        );
    }

    #[tokio::test]
    async fn test_disconnect_releases_each_code_once() {
        let (_sink, registry, manager) = setup(8);
        let (a, _rx_a) = manager.on_connect().await;
        let (b, _rx_b) = manager.on_connect().await;

        manager.on_subscribe(a, &codes(&["KRW-BTC", "KRW-ETH"])).await.unwrap();
        manager.on_subscribe(b, &codes(&["KRW-BTC"])).await.unwrap();
        assert_eq!(registry.ref_count(&"KRW-BTC".into()).await, 2);

        let released = manager.on_disconnect(a).await;
        assert_eq!(released, codes(&["KRW-BTC", "KRW-ETH"]));
        assert_eq!(registry.ref_count(&"KRW-BTC".into()).await, 1);
        assert_eq!(registry.ref_count(&"KRW-ETH".into()).await, 0);

        // 두 번째 호출은 아무 효과가 없음
        assert!(manager.on_disconnect(a).await.is_empty());
        assert_eq!(registry.ref_count(&"KRW-BTC".into()).await, 1);
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_only_held_codes() {
        let (_sink, registry, manager) = setup(8);
        let (id, _rx) = manager.on_connect().await;
        manager.on_subscribe(id, &codes(&["KRW-BTC"])).await.unwrap();

        let removed = manager
            .on_unsubscribe(id, &codes(&["KRW-BTC", "KRW-XRP"]))
            .await
            .unwrap();

        assert_eq!(removed, codes(&["KRW-BTC"]));
        assert_eq!(registry.ref_count(&"KRW-BTC".into()).await, 0);
        assert_eq!(registry.ref_count(&"KRW-XRP".into()).await, 0);
        assert_eq!(manager.subscriber_count(&"KRW-BTC".into()).await, 0);
    }

    #[tokio::test]
    async fn test_unknown_session_is_rejected() {
        let (sink, _registry, manager) = setup(8);
        let unknown = Uuid::new_v4();

        let result = manager.on_subscribe(unknown, &codes(&["KRW-BTC"])).await;
        assert!(matches!(result, Err(RelayError::InvalidSession(_))));

        let result = manager.on_unsubscribe(unknown, &codes(&["KRW-BTC"])).await;
        assert!(result.unwrap_err().is_programming_fault());
        assert!(sink.frames.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sinks_for_code() {
        let (_sink, _registry, manager) = setup(8);
        let (a, _rx_a) = manager.on_connect().await;
        let (b, _rx_b) = manager.on_connect().await;
        manager.on_subscribe(a, &codes(&["KRW-BTC"])).await.unwrap();
        manager.on_subscribe(b, &codes(&["KRW-ETH"])).await.unwrap();

        let sinks = manager.sinks_for(&"KRW-BTC".into()).await;
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks[0].0, a);
        assert!(manager.sinks_for(&"KRW-XRP".into()).await.is_empty());
    }

    #[tokio::test]
    async fn test_reply_drops_when_queue_full() {
        let (_sink, _registry, manager) = setup(1);
        let (id, mut rx) = manager.on_connect().await;
        let pong = ServerEvent::Pong { timestamp: 1 };

        assert!(manager.reply(id, &pong).await);
        assert!(!manager.reply(id, &pong).await);

        let frame = rx.recv().await.unwrap();
        assert!(frame.as_str().contains("pong"));
        assert!(!manager.reply(Uuid::new_v4(), &pong).await);
    }
}
