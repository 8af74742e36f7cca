//! 업스트림 티커 피드 클라이언트.
//!
//! 단일 WebSocket 연결을 소유하며, 연결이 끊기면 [`ReconnectPolicy`]에 따라
//! 재연결합니다. 원하는 구독 목록(wanted set)은 연결 상태와 무관하게 보관되며
//! 연결될 때마다 한 번 전송됩니다.
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use relay_feed::UpstreamFeedClient;
//!
//! let mut feed = UpstreamFeedClient::new(&config.feed);
//! let ticks = feed.take_ticks().expect("처음 한 번만 가져올 수 있음");
//! let feed = Arc::new(feed);
//!
//! feed.connect().await;
//! feed.subscribe(vec!["KRW-BTC".into()]).await;
//! ```

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use relay_core::{FeedConfig, InstrumentCode, Tick};
use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::reconnect::ReconnectPolicy;
use crate::traits::SubscriptionSink;
use crate::upbit;
use crate::{FeedError, FeedResult};

/// 업스트림 연결 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// 연결 끊김 (재연결 대기 포함)
    Disconnected,
    /// 연결 시도 중
    Connecting,
    /// 연결됨
    Connected,
    /// 재연결 한도 소진. 운영자가 `connect()`를 다시 호출해야 함
    Unavailable,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Unavailable => "unavailable",
        };
        write!(f, "{}", s)
    }
}

/// 피드 상태 스냅샷 (운영 API 노출용).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatus {
    pub state: ConnectionState,
    pub consecutive_failures: u32,
    pub max_reconnect_attempts: u32,
    pub frames_sent: u64,
    pub ticks_dropped: u64,
}

/// 구독 목록과 현재 세션의 명령 채널.
///
/// 두 값은 항상 같은 잠금 아래에서 갱신되므로, 연결 직후 전송되는 초기
/// 구독과 이후의 갱신이 누락되거나 중복되지 않습니다.
#[derive(Default)]
struct Subscriptions {
    wanted: Vec<InstrumentCode>,
    commands: Option<mpsc::UnboundedSender<Vec<InstrumentCode>>>,
}

struct Shared {
    url: String,
    connect_timeout: Duration,
    ping_interval: Duration,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<ConnectionState>,
    subscriptions: Mutex<Subscriptions>,
    failures: AtomicU32,
    frames_sent: AtomicU64,
    ticks_dropped: AtomicU64,
    tick_tx: mpsc::Sender<Tick>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "피드 상태 변경");
        }
    }

    fn forward_tick(&self, tick: Tick) {
        match self.tick_tx.try_send(tick) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(tick)) => {
                self.ticks_dropped.fetch_add(1, Ordering::Relaxed);
                debug!(code = %tick.code, "티커 채널 가득 참, 티커 버림");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("티커 수신자 없음");
            }
        }
    }
}

struct FeedTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// 업스트림 티커 피드 클라이언트.
pub struct UpstreamFeedClient {
    shared: Arc<Shared>,
    task: Mutex<Option<FeedTask>>,
    tick_rx: Option<mpsc::Receiver<Tick>>,
}

impl UpstreamFeedClient {
    /// 설정으로 클라이언트를 생성합니다. 연결은 `connect()`에서 시작합니다.
    pub fn new(config: &FeedConfig) -> Self {
        let (tick_tx, tick_rx) = mpsc::channel(config.tick_buffer.max(1));
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        let shared = Shared {
            url: config.url.clone(),
            connect_timeout: config.connect_timeout(),
            ping_interval: config.ping_interval(),
            policy: ReconnectPolicy::from_config(config),
            state_tx,
            subscriptions: Mutex::new(Subscriptions::default()),
            failures: AtomicU32::new(0),
            frames_sent: AtomicU64::new(0),
            ticks_dropped: AtomicU64::new(0),
            tick_tx,
        };

        Self {
            shared: Arc::new(shared),
            task: Mutex::new(None),
            tick_rx: Some(tick_rx),
        }
    }

    /// 디코딩된 티커 수신 채널을 가져옵니다. 소비자는 하나뿐입니다.
    pub fn take_ticks(&mut self) -> Option<mpsc::Receiver<Tick>> {
        self.tick_rx.take()
    }

    /// 연결 태스크를 시작합니다.
    ///
    /// 이미 연결 중이거나 연결된 상태면 아무것도 하지 않습니다. 재연결 한도를
    /// 소진한 뒤 호출하면 실패 횟수를 초기화하고 다시 시작합니다.
    pub async fn connect(&self) {
        let mut task = self.task.lock().await;

        if let Some(running) = task.as_ref() {
            if !running.handle.is_finished() {
                debug!("피드 태스크가 이미 실행 중");
                return;
            }
        }

        self.shared.failures.store(0, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Connecting);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_feed(self.shared.clone(), cancel.clone()));
        *task = Some(FeedTask { cancel, handle });
    }

    /// 연결을 닫고 대기 중인 재연결을 취소합니다.
    ///
    /// 정리가 끝날 때까지 태스크 잠금을 유지하므로, 동시에 호출된 `connect()`는
    /// 해제가 완료된 뒤에 새 연결을 시작합니다.
    pub async fn disconnect(&self) {
        let mut task = self.task.lock().await;

        if let Some(FeedTask { cancel, handle }) = task.take() {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!("피드 태스크 종료 대기 실패: {}", e);
            }
        }

        self.shared.subscriptions.lock().await.commands = None;
        self.shared.set_state(ConnectionState::Disconnected);
        drop(task);

        info!("업스트림 피드 연결 해제");
    }

    /// 현재 연결 상태.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// 상태 변경을 구독합니다.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// 현재 연속 실패 횟수.
    pub fn failures(&self) -> u32 {
        self.shared.failures.load(Ordering::SeqCst)
    }

    /// 지금까지 전송한 구독 프레임 수.
    pub fn frames_sent(&self) -> u64 {
        self.shared.frames_sent.load(Ordering::Relaxed)
    }

    /// 현재 원하는 구독 목록.
    pub async fn wanted(&self) -> Vec<InstrumentCode> {
        self.shared.subscriptions.lock().await.wanted.clone()
    }

    /// 상태 스냅샷.
    pub fn status(&self) -> FeedStatus {
        FeedStatus {
            state: self.state(),
            consecutive_failures: self.failures(),
            max_reconnect_attempts: self.shared.policy.max_attempts,
            frames_sent: self.frames_sent(),
            ticks_dropped: self.shared.ticks_dropped.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl SubscriptionSink for UpstreamFeedClient {
    async fn subscribe(&self, codes: Vec<InstrumentCode>) {
        let mut subscriptions = self.shared.subscriptions.lock().await;
        subscriptions.wanted = codes.clone();

        match &subscriptions.commands {
            Some(commands) => {
                if commands.send(codes).is_err() {
                    debug!("연결 세션 종료 중, 다음 연결 시 구독 전송");
                }
            }
            None => debug!("연결 전, 다음 연결 시 구독 전송"),
        }
    }
}

/// 재연결 루프.
async fn run_feed(shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        shared.set_state(ConnectionState::Connecting);

        let result = run_session(&shared, &cancel).await;

        shared.subscriptions.lock().await.commands = None;

        if cancel.is_cancelled() {
            break;
        }

        let err = match result {
            Ok(()) => break,
            Err(e) => e,
        };

        let failures = shared.failures.fetch_add(1, Ordering::SeqCst) + 1;
        shared.set_state(ConnectionState::Disconnected);

        match shared.policy.delay_for(failures) {
            Some(delay) => {
                warn!(
                    retryable = err.is_retryable(),
                    "업스트림 연결 실패: {} ({}ms 후 재연결, {}/{})",
                    err,
                    delay.as_millis(),
                    failures,
                    shared.policy.max_attempts
                );

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => {
                error!(
                    failures,
                    "{}",
                    FeedError::Unavailable(failures)
                );
                shared.set_state(ConnectionState::Unavailable);
                return;
            }
        }
    }

    shared.set_state(ConnectionState::Disconnected);
}

/// 단일 연결 세션. 취소되면 `Ok`, 연결이 끊기면 `Err`를 반환합니다.
async fn run_session(shared: &Shared, cancel: &CancellationToken) -> FeedResult<()> {
    info!("업스트림 연결 중: {}", shared.url);

    let connecting = tokio::time::timeout(shared.connect_timeout, connect_async(shared.url.as_str()));
    let ws_stream = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        result = connecting => match result {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(FeedError::Timeout(format!(
                    "{}ms 내에 연결되지 않음",
                    shared.connect_timeout.as_millis()
                )))
            }
        },
    };

    let (mut write, mut read) = ws_stream.split();

    // 명령 채널 등록과 초기 구독 스냅샷은 같은 잠금 아래에서 수행
    let (command_tx, mut command_rx) = mpsc::unbounded_channel();
    let initial = {
        let mut subscriptions = shared.subscriptions.lock().await;
        subscriptions.commands = Some(command_tx);
        subscriptions.wanted.clone()
    };

    shared.failures.store(0, Ordering::SeqCst);
    shared.set_state(ConnectionState::Connected);
    info!("업스트림 연결 성공");

    if !initial.is_empty() {
        send_subscribe(shared, &mut write, &initial).await?;
    }

    let mut ping = interval_at(Instant::now() + shared.ping_interval, shared.ping_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(());
            }
            Some(codes) = command_rx.recv() => {
                if codes.is_empty() {
                    debug!("빈 구독 목록은 전송하지 않음");
                    continue;
                }
                send_subscribe(shared, &mut write, &codes).await?;
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handle_frame(shared, text.as_bytes()),
                    Some(Ok(Message::Binary(data))) => handle_frame(shared, &data),
                    Some(Ok(Message::Close(frame))) => {
                        return Err(FeedError::Disconnected(format!(
                            "서버에서 연결 종료: {:?}",
                            frame
                        )));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        return Err(FeedError::Disconnected("스트림 종료".to_string()));
                    }
                }
            }
            _ = ping.tick() => {
                debug!("업스트림 Ping 전송");
                write.send(Message::Ping(Vec::new())).await?;
            }
        }
    }
}

async fn send_subscribe<S>(shared: &Shared, write: &mut S, codes: &[InstrumentCode]) -> FeedResult<()>
where
    S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let ticket = Uuid::new_v4().to_string();
    let frame = upbit::subscribe_frame(&ticket, codes)?;

    write.send(Message::Text(frame)).await?;
    shared.frames_sent.fetch_add(1, Ordering::Relaxed);

    info!(count = codes.len(), "업스트림 구독 전송");
    Ok(())
}

fn handle_frame(shared: &Shared, payload: &[u8]) {
    match upbit::decode_ticker(payload) {
        Ok(tick) => shared.forward_tick(tick),
        Err(e) => warn!("업스트림 프레임 디코딩 실패, 버림: {}", e),
    }
}
