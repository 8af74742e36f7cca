//! 대시보드 통계 주기 브로드캐스트.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Utf8Bytes;
use relay_core::RelayResult;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::source::SnapshotSource;
use crate::websocket::messages::ServerEvent;
use crate::websocket::sessions::{SessionId, SessionSink};

/// 대시보드 세션 목록.
///
/// 시세 세션과는 별개의 청중입니다.
pub struct DashboardAudience {
    sessions: RwLock<HashMap<SessionId, SessionSink>>,
    queue_capacity: usize,
}

impl DashboardAudience {
    /// 새 청중 목록 생성.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// 대시보드 세션 등록.
    pub async fn join(&self) -> (SessionId, mpsc::Receiver<Utf8Bytes>) {
        let (sink, rx) = mpsc::channel(self.queue_capacity);
        let id = Uuid::new_v4();
        self.sessions.write().await.insert(id, sink);
        (id, rx)
    }

    /// 대시보드 세션 제거.
    pub async fn leave(&self, id: SessionId) {
        self.sessions.write().await.remove(&id);
    }

    /// 등록된 세션 수.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// 등록된 세션이 없는지 확인.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// 모든 세션에 전송합니다. 전달된 세션 수를 반환합니다.
    pub async fn broadcast(&self, frame: Utf8Bytes) -> usize {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|sink| sink.try_send(frame.clone()).is_ok())
            .count()
    }

    /// 특정 세션에 전송합니다.
    pub async fn send_to(&self, id: SessionId, frame: Utf8Bytes) -> bool {
        match self.sessions.read().await.get(&id) {
            Some(sink) => sink.try_send(frame).is_ok(),
            None => false,
        }
    }
}

/// 주기적으로 통계 스냅샷을 가져와 대시보드에 브로드캐스트합니다.
pub struct PeriodicSnapshotBroadcaster {
    source: Arc<dyn SnapshotSource>,
    audience: Arc<DashboardAudience>,
    interval: Duration,
}

impl PeriodicSnapshotBroadcaster {
    /// 새 브로드캐스터 생성.
    ///
    /// # Arguments
    ///
    /// * `source` - 통계 스냅샷 소스
    /// * `audience` - 대시보드 세션 목록
    /// * `interval` - 브로드캐스트 주기
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        audience: Arc<DashboardAudience>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            audience,
            interval,
        }
    }

    /// 메인 루프.
    ///
    /// 스냅샷 실패는 로그만 남기고 다음 주기를 기다립니다.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "PeriodicSnapshotBroadcaster 시작");

        // 첫 tick은 즉시 발생하므로 한 주기 뒤부터 시작
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.broadcast_once().await {
                        Ok(_) => {}
                        Err(e) if e.is_retryable() => warn!("통계 스냅샷 실패, 이번 주기 생략: {}", e),
                        Err(e) => error!("통계 브로드캐스트 실패: {}", e),
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("PeriodicSnapshotBroadcaster 종료");
                    break;
                }
            }
        }
    }

    /// 스냅샷을 한 번 가져와 모든 대시보드 세션에 전송합니다.
    pub async fn broadcast_once(&self) -> RelayResult<usize> {
        let frame = self.snapshot_frame().await?;
        let delivered = self.audience.broadcast(frame).await;
        debug!(delivered, "통계 브로드캐스트");
        Ok(delivered)
    }

    /// 새로 연결한 대시보드 세션에 즉시 스냅샷을 보냅니다.
    pub async fn snapshot_now(&self, session: SessionId) -> RelayResult<bool> {
        let frame = self.snapshot_frame().await?;
        let sent = self.audience.send_to(session, frame).await;
        if !sent {
            warn!(session_id = %session, "통계 스냅샷 전송 실패");
        }
        Ok(sent)
    }

    async fn snapshot_frame(&self) -> RelayResult<Utf8Bytes> {
        let stats = self.source.fetch().await?;
        let json = serde_json::to_string(&ServerEvent::StatsRealtime(stats))?;
        Ok(Utf8Bytes::from(json))
    }
}

/// 브로드캐스터를 백그라운드 태스크로 시작합니다.
pub fn start_snapshot_broadcaster(
    broadcaster: Arc<PeriodicSnapshotBroadcaster>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(broadcaster.run(shutdown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_core::{RealtimeStats, RelayError};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// 호출할 때마다 방문자 수가 증가하고, 짝수 번째 호출은 실패하는 소스.
    #[derive(Default)]
    struct FlakySource {
        calls: AtomicU64,
    }

    #[async_trait]
    impl SnapshotSource for FlakySource {
        async fn fetch(&self) -> RelayResult<RealtimeStats> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n % 2 == 0 {
                return Err(RelayError::Snapshot("temporarily unavailable".into()));
            }
            Ok(RealtimeStats {
                active_visitors: n,
                ..Default::default()
            })
        }
    }

    fn setup(interval: Duration) -> (Arc<FlakySource>, Arc<DashboardAudience>, Arc<PeriodicSnapshotBroadcaster>) {
        let source = Arc::new(FlakySource::default());
        let audience = Arc::new(DashboardAudience::new(8));
        let broadcaster = Arc::new(PeriodicSnapshotBroadcaster::new(
            source.clone(),
            audience.clone(),
            interval,
        ));
        (source, audience, broadcaster)
    }

    fn parse(frame: &Utf8Bytes) -> serde_json::Value {
        serde_json::from_str(frame.as_str()).unwrap()
    }

    #[tokio::test]
    async fn test_snapshot_now_targets_one_session() {
        let (_source, audience, broadcaster) = setup(Duration::from_secs(30));
        let (a, mut rx_a) = audience.join().await;
        let (_b, mut rx_b) = audience.join().await;

        assert!(broadcaster.snapshot_now(a).await.unwrap());

        let value = parse(&rx_a.recv().await.unwrap());
        assert_eq!(value["event"], "stats:realtime");
        assert_eq!(value["data"]["activeVisitors"], 1);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failure_skips_cycle() {
        let (_source, audience, broadcaster) = setup(Duration::from_secs(30));
        let (_id, mut rx) = audience.join().await;

        assert_eq!(broadcaster.broadcast_once().await.unwrap(), 1);
        assert!(broadcaster.broadcast_once().await.is_err());
        assert_eq!(broadcaster.broadcast_once().await.unwrap(), 1);

        assert_eq!(parse(&rx.recv().await.unwrap())["data"]["activeVisitors"], 1);
        assert_eq!(parse(&rx.recv().await.unwrap())["data"]["activeVisitors"], 3);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_broadcasts_every_interval() {
        let (source, audience, broadcaster) = setup(Duration::from_secs(30));
        let (_id, mut rx) = audience.join().await;
        let shutdown = CancellationToken::new();

        let handle = start_snapshot_broadcaster(broadcaster, shutdown.clone());

        // 첫 주기 이전에는 아무것도 보내지 않음
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(rx.try_recv().is_err());

        // 1번째(성공), 2번째(실패), 3번째(성공)
        tokio::time::sleep(Duration::from_secs(62)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(parse(&rx.recv().await.unwrap())["data"]["activeVisitors"], 1);
        assert_eq!(parse(&rx.recv().await.unwrap())["data"]["activeVisitors"], 3);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_left_session_receives_nothing() {
        let (_source, audience, broadcaster) = setup(Duration::from_secs(30));
        let (id, _rx) = audience.join().await;
        audience.leave(id).await;

        assert!(audience.is_empty().await);
        assert_eq!(broadcaster.broadcast_once().await.unwrap(), 0);
        assert!(!broadcaster.snapshot_now(id).await.unwrap());
    }
}
