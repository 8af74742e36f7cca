//! 업스트림 피드 통합 테스트.
//!
//! 로컬 tokio-tungstenite 서버를 가짜 업스트림으로 사용합니다.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use relay_core::{FeedConfig, InstrumentCode};
use relay_feed::upbit::subscribed_codes;
use relay_feed::{ConnectionState, SubscriptionRegistry, SubscriptionSink, UpstreamFeedClient};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{timeout, Instant};
use tokio_tungstenite::{accept_async, tungstenite::Message};

const WAIT: Duration = Duration::from_secs(5);

/// 가짜 업스트림 서버.
struct FakeUpstream {
    url: String,
    /// 클라이언트가 보낸 텍스트 프레임
    frames: mpsc::UnboundedReceiver<String>,
    /// 현재 연결로 내보낼 메시지
    outbound: mpsc::UnboundedSender<Message>,
    connections: Arc<AtomicUsize>,
}

impl FakeUpstream {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (outbound, outbound_rx) = mpsc::unbounded_channel::<Message>();
        let outbound_rx = Arc::new(Mutex::new(outbound_rx));
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = connections.clone();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let Ok(ws) = accept_async(stream).await else {
                    continue;
                };
                let frames_tx = frames_tx.clone();
                let outbound_rx = outbound_rx.clone();

                tokio::spawn(async move {
                    let (mut write, mut read) = ws.split();
                    let mut outbound_rx = outbound_rx.lock().await;

                    loop {
                        tokio::select! {
                            msg = read.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    let _ = frames_tx.send(text);
                                }
                                Some(Ok(_)) => {}
                                _ => break,
                            },
                            Some(out) = outbound_rx.recv() => {
                                let closing = matches!(out, Message::Close(_));
                                if write.send(out).await.is_err() || closing {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            url,
            frames,
            outbound,
            connections,
        }
    }

    async fn next_frame(&mut self) -> Vec<InstrumentCode> {
        let frame = timeout(WAIT, self.frames.recv())
            .await
            .expect("구독 프레임 대기 시간 초과")
            .expect("서버 종료");
        subscribed_codes(&frame).unwrap()
    }

    async fn assert_no_frame(&mut self) {
        let extra = timeout(Duration::from_millis(200), self.frames.recv()).await;
        assert!(extra.is_err(), "예상하지 않은 구독 프레임: {:?}", extra);
    }
}

/// TCP 연결을 받자마자 끊는 서버. 연결 시도 시각을 기록합니다.
async fn dropping_server() -> (String, mpsc::UnboundedReceiver<Instant>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let _ = tx.send(Instant::now());
            drop(stream);
        }
    });

    (url, rx)
}

fn feed_config(url: &str) -> FeedConfig {
    FeedConfig {
        url: url.to_string(),
        reconnect_base_delay_ms: 20,
        max_reconnect_attempts: 3,
        connect_timeout_ms: 1000,
        ..Default::default()
    }
}

async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{}", addr)
}

async fn wait_state(feed: &UpstreamFeedClient, expected: ConnectionState) {
    let mut state = feed.state_receiver();
    timeout(WAIT, state.wait_for(|s| *s == expected))
        .await
        .expect("상태 대기 시간 초과")
        .unwrap();
}

fn codes(list: &[&str]) -> Vec<InstrumentCode> {
    list.iter().map(|s| InstrumentCode::from(*s)).collect()
}

const TICKER: &str = r#"{"type":"ticker","code":"KRW-BTC","trade_price":95000000.0,"change":"RISE","timestamp":1729213323100}"#;

#[tokio::test]
async fn test_wanted_set_sent_once_connected() {
    let mut upstream = FakeUpstream::start().await;
    let feed = UpstreamFeedClient::new(&feed_config(&upstream.url));

    feed.subscribe(codes(&["KRW-BTC"])).await;
    feed.connect().await;
    wait_state(&feed, ConnectionState::Connected).await;

    assert_eq!(upstream.next_frame().await, codes(&["KRW-BTC"]));
    upstream.assert_no_frame().await;
    assert_eq!(feed.frames_sent(), 1);

    feed.disconnect().await;
}

#[tokio::test]
async fn test_empty_wanted_set_sends_nothing() {
    let mut upstream = FakeUpstream::start().await;
    let feed = UpstreamFeedClient::new(&feed_config(&upstream.url));

    feed.connect().await;
    wait_state(&feed, ConnectionState::Connected).await;
    feed.subscribe(Vec::new()).await;

    upstream.assert_no_frame().await;
    assert_eq!(feed.frames_sent(), 0);

    feed.disconnect().await;
}

#[tokio::test]
async fn test_unsubscribe_resends_reduced_set() {
    let mut upstream = FakeUpstream::start().await;
    let feed = Arc::new(UpstreamFeedClient::new(&feed_config(&upstream.url)));
    let registry = SubscriptionRegistry::new(feed.clone());

    feed.connect().await;
    wait_state(&feed, ConnectionState::Connected).await;

    registry.add(&"KRW-BTC".into()).await;
    registry.add(&"KRW-ETH".into()).await;
    assert_eq!(upstream.next_frame().await, codes(&["KRW-BTC"]));
    assert_eq!(upstream.next_frame().await, codes(&["KRW-BTC", "KRW-ETH"]));

    registry.remove(&"KRW-BTC".into()).await;
    assert_eq!(upstream.next_frame().await, codes(&["KRW-ETH"]));
    upstream.assert_no_frame().await;

    feed.disconnect().await;
}

#[tokio::test]
async fn test_ticks_forwarded_and_bad_frames_dropped() {
    let upstream = FakeUpstream::start().await;
    let mut feed = UpstreamFeedClient::new(&feed_config(&upstream.url));
    let mut ticks = feed.take_ticks().unwrap();

    feed.connect().await;
    wait_state(&feed, ConnectionState::Connected).await;

    upstream.outbound.send(Message::Text("not json".to_string())).unwrap();
    upstream
        .outbound
        .send(Message::Binary(TICKER.as_bytes().to_vec()))
        .unwrap();

    let tick = timeout(WAIT, ticks.recv()).await.unwrap().unwrap();
    assert_eq!(tick.code.as_str(), "KRW-BTC");
    assert_eq!(feed.state(), ConnectionState::Connected);
    assert_eq!(upstream.connections.load(Ordering::SeqCst), 1);

    feed.disconnect().await;
}

#[tokio::test]
async fn test_reconnect_restores_subscription() {
    let mut upstream = FakeUpstream::start().await;
    let feed = UpstreamFeedClient::new(&feed_config(&upstream.url));

    feed.subscribe(codes(&["KRW-BTC", "KRW-XRP"])).await;
    feed.connect().await;
    assert_eq!(upstream.next_frame().await, codes(&["KRW-BTC", "KRW-XRP"]));

    upstream.outbound.send(Message::Close(None)).unwrap();

    assert_eq!(upstream.next_frame().await, codes(&["KRW-BTC", "KRW-XRP"]));
    wait_state(&feed, ConnectionState::Connected).await;
    assert_eq!(upstream.connections.load(Ordering::SeqCst), 2);
    assert_eq!(feed.failures(), 0);

    feed.disconnect().await;
}

#[tokio::test]
async fn test_budget_exhaustion_then_operator_reconnect() {
    let url = refused_url().await;
    let feed = UpstreamFeedClient::new(&feed_config(&url));

    feed.connect().await;
    wait_state(&feed, ConnectionState::Unavailable).await;
    assert_eq!(feed.failures(), 3);

    // 한도 소진 후에는 더 이상 시도하지 않음
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(feed.failures(), 3);
    assert_eq!(feed.state(), ConnectionState::Unavailable);

    // 운영자 재연결은 카운트를 초기화하고 다시 시도함
    feed.connect().await;
    assert_ne!(feed.state(), ConnectionState::Unavailable);
    wait_state(&feed, ConnectionState::Unavailable).await;
    assert_eq!(feed.failures(), 3);
}

#[tokio::test]
async fn test_disconnect_cancels_pending_reconnect() {
    let url = refused_url().await;
    let feed = UpstreamFeedClient::new(&FeedConfig {
        reconnect_base_delay_ms: 60_000,
        ..feed_config(&url)
    });

    feed.connect().await;
    wait_state(&feed, ConnectionState::Disconnected).await;

    timeout(Duration::from_secs(1), feed.disconnect())
        .await
        .expect("재연결 대기 중에도 즉시 종료되어야 함");

    assert_eq!(feed.state(), ConnectionState::Disconnected);
    assert_eq!(feed.failures(), 1);
}

#[tokio::test]
async fn test_connect_is_noop_while_running() {
    let upstream = FakeUpstream::start().await;
    let feed = UpstreamFeedClient::new(&feed_config(&upstream.url));

    feed.connect().await;
    wait_state(&feed, ConnectionState::Connected).await;
    feed.connect().await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(upstream.connections.load(Ordering::SeqCst), 1);

    feed.disconnect().await;
}

#[tokio::test]
async fn test_backoff_waits_linear_delays() {
    let (url, mut attempts) = dropping_server().await;
    let base = Duration::from_millis(200);
    let feed = UpstreamFeedClient::new(&FeedConfig {
        reconnect_base_delay_ms: 200,
        max_reconnect_attempts: 4,
        ..feed_config(&url)
    });

    feed.connect().await;
    wait_state(&feed, ConnectionState::Unavailable).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let mut times = Vec::new();
    while let Ok(at) = attempts.try_recv() {
        times.push(at);
    }
    assert_eq!(times.len(), 4, "한도 소진 후 추가 시도 없음");

    // n번째 실패 후 base * n 대기
    for (i, pair) in times.windows(2).enumerate() {
        let gap = pair[1] - pair[0];
        let expected = base * (i as u32 + 1);
        assert!(gap >= expected, "{}번째 대기 {:?} < {:?}", i + 1, gap, expected);
        assert!(
            gap < expected + base / 2,
            "{}번째 대기 {:?}가 선형 지연보다 김",
            i + 1,
            gap
        );
    }
}

#[tokio::test]
async fn test_connect_during_disconnect_starts_fresh_session() {
    let mut upstream = FakeUpstream::start().await;
    let feed = UpstreamFeedClient::new(&feed_config(&upstream.url));

    feed.connect().await;
    wait_state(&feed, ConnectionState::Connected).await;

    // 해제가 먼저 잠금을 잡으므로 재연결은 정리가 끝난 뒤 시작됨
    tokio::join!(feed.disconnect(), feed.connect());
    assert_ne!(feed.state(), ConnectionState::Disconnected);

    wait_state(&feed, ConnectionState::Connected).await;
    feed.subscribe(codes(&["KRW-BTC"])).await;
    assert_eq!(upstream.next_frame().await, codes(&["KRW-BTC"]));
    assert_eq!(feed.state(), ConnectionState::Connected);
    assert_eq!(upstream.connections.load(Ordering::SeqCst), 2);

    feed.disconnect().await;
}
