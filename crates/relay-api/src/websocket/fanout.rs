//! 업스트림 티커를 구독 세션에 분배하는 라우터.
//!
//! 단일 태스크가 티커 채널을 순서대로 소비하므로 세션별 전달 순서는
//! 업스트림 수신 순서와 같습니다. 세션 큐가 가득 차거나 닫혀 있으면 해당
//! 세션의 메시지만 버리고, 다른 세션에는 영향을 주지 않습니다.
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! let ticks = feed.take_ticks().expect("티커 채널");
//! let handle = start_fanout_router(sessions.clone(), ticks, shutdown.clone());
//! ```

use axum::extract::ws::Utf8Bytes;
use relay_core::Tick;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::messages::{ServerEvent, TickerUpdate};
use super::sessions::SharedSessionManager;
use crate::metrics::{record_ticks_delivered, record_ticks_dropped};

/// 티커 팬아웃 라우터.
pub struct FanoutRouter {
    sessions: SharedSessionManager,
}

/// 한 티커의 분배 결과.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub delivered: usize,
    pub dropped: usize,
}

impl FanoutRouter {
    /// 새로운 라우터 생성.
    pub fn new(sessions: SharedSessionManager) -> Self {
        Self { sessions }
    }

    /// 라우터 실행.
    ///
    /// 티커 채널이 닫히거나 종료 토큰이 취소될 때까지 실행됩니다.
    pub async fn run(self, mut ticks: mpsc::Receiver<Tick>, shutdown: CancellationToken) {
        info!("FanoutRouter 시작");

        loop {
            tokio::select! {
                tick = ticks.recv() => match tick {
                    Some(tick) => {
                        self.dispatch(&tick).await;
                    }
                    None => {
                        warn!("FanoutRouter 종료 - 티커 채널 닫힘");
                        break;
                    }
                },
                _ = shutdown.cancelled() => {
                    info!("FanoutRouter 종료");
                    break;
                }
            }
        }
    }

    /// 티커 하나를 구독 세션들에 분배합니다.
    pub async fn dispatch(&self, tick: &Tick) -> DispatchOutcome {
        let sinks = self.sessions.sinks_for(&tick.code).await;
        if sinks.is_empty() {
            return DispatchOutcome::default();
        }

        let event = ServerEvent::TickerUpdate(TickerUpdate::from(tick));
        let frame = match event.to_json() {
            Ok(json) => Utf8Bytes::from(json),
            Err(e) => {
                warn!(code = %tick.code, "티커 직렬화 실패: {}", e);
                return DispatchOutcome::default();
            }
        };

        let mut outcome = DispatchOutcome::default();
        for (session_id, sink) in sinks {
            match sink.try_send(frame.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    outcome.dropped += 1;
                    debug!(session_id = %session_id, code = %tick.code, "세션 큐 가득 참, 티커 버림");
                }
                Err(TrySendError::Closed(_)) => {
                    outcome.dropped += 1;
                    debug!(session_id = %session_id, "세션 큐 닫힘");
                }
            }
        }

        record_ticks_delivered(outcome.delivered);
        if outcome.dropped > 0 {
            record_ticks_dropped(outcome.dropped);
        }

        outcome
    }
}

/// 팬아웃 라우터를 백그라운드 태스크로 시작합니다.
pub fn start_fanout_router(
    sessions: SharedSessionManager,
    ticks: mpsc::Receiver<Tick>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let router = FanoutRouter::new(sessions);
    tokio::spawn(router.run(ticks, shutdown))
}
