//! WebSocket 연결 handler.
//!
//! Axum WebSocket 엔드포인트 및 메시지 처리.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::Utc;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, error, info, warn};

use super::messages::{parse_markets, ClientMessage, ServerEvent, WsError};
use super::sessions::SessionId;
use crate::metrics::{
    decrement_websocket_connections, increment_websocket_connections, record_client_error,
};
use crate::state::AppState;

const MARKET_ENDPOINT: &str = "market";
const STATISTICS_ENDPOINT: &str = "statistics";

/// 시세 WebSocket 업그레이드 핸들러.
///
/// # 엔드포인트
///
/// `GET /ws/market`
pub async fn market_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_market_socket(socket, state))
}

/// 통계 WebSocket 업그레이드 핸들러.
///
/// # 엔드포인트
///
/// `GET /ws/statistics`
pub async fn statistics_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_statistics_socket(socket, state))
}

/// 시세 WebSocket 연결 처리.
async fn handle_market_socket(socket: WebSocket, state: Arc<AppState>) {
    let (session_id, outbound) = state.sessions.on_connect().await;
    info!(session_id = %session_id, "시세 WebSocket 연결");
    increment_websocket_connections(MARKET_ENDPOINT);

    let (sender, receiver) = socket.split();

    let welcome = ServerEvent::Connected {
        session_id: session_id.to_string(),
        version: state.version.clone(),
        timestamp: Utc::now().timestamp_millis(),
    };
    state.sessions.reply(session_id, &welcome).await;

    let mut send_task = tokio::spawn(write_loop(sender, outbound, state.stream.ping_interval()));

    let state_clone = state.clone();
    let mut receive_task = tokio::spawn(async move {
        let idle = state_clone.stream.idle_timeout();
        read_loop(receiver, idle, session_id, |msg| {
            handle_market_message(&state_clone, session_id, msg)
        })
        .await;
    });

    // 하나의 태스크가 종료되면 다른 것도 종료
    tokio::select! {
        _ = &mut receive_task => {
            debug!(session_id = %session_id, "수신 태스크 종료");
            send_task.abort();
        }
        _ = &mut send_task => {
            debug!(session_id = %session_id, "송신 태스크 종료");
            receive_task.abort();
        }
    }

    let released = state.sessions.on_disconnect(session_id).await;
    decrement_websocket_connections(MARKET_ENDPOINT);

    info!(
        session_id = %session_id,
        released = released.len(),
        "시세 WebSocket 연결 종료"
    );
}

/// 통계 WebSocket 연결 처리.
async fn handle_statistics_socket(socket: WebSocket, state: Arc<AppState>) {
    let (session_id, outbound) = state.dashboard.join().await;
    info!(session_id = %session_id, "통계 WebSocket 연결");
    increment_websocket_connections(STATISTICS_ENDPOINT);

    let (sender, receiver) = socket.split();

    let mut send_task = tokio::spawn(write_loop(sender, outbound, state.stream.ping_interval()));

    let state_clone = state.clone();
    let mut receive_task = tokio::spawn(async move {
        let idle = state_clone.stream.idle_timeout();
        read_loop(receiver, idle, session_id, |msg| {
            handle_statistics_message(&state_clone, session_id, msg)
        })
        .await;
    });

    tokio::select! {
        _ = &mut receive_task => send_task.abort(),
        _ = &mut send_task => receive_task.abort(),
    }

    state.dashboard.leave(session_id).await;
    decrement_websocket_connections(STATISTICS_ENDPOINT);

    info!(session_id = %session_id, "통계 WebSocket 연결 종료");
}

/// 송신 루프.
///
/// 세션 큐의 프레임을 전송하고, 주기적으로 Ping을 보냅니다.
async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Utf8Bytes>,
    ping_every: Duration,
) {
    let mut ping = interval_at(Instant::now() + ping_every, ping_every);

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            _ = ping.tick() => {
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = sender.close().await;
}

/// 수신 루프.
///
/// `idle` 동안 아무 프레임도 받지 못하면 연결을 끊습니다.
/// 핸들러가 `false`를 반환하면 종료합니다.
async fn read_loop<F, Fut>(
    mut receiver: SplitStream<WebSocket>,
    idle: Duration,
    session_id: SessionId,
    mut handle: F,
) where
    F: FnMut(Message) -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    loop {
        match timeout(idle, receiver.next()).await {
            Err(_) => {
                info!(session_id = %session_id, "유휴 시간 초과, 연결 종료");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                warn!(session_id = %session_id, "WebSocket 수신 에러: {}", e);
                break;
            }
            Ok(Some(Ok(msg))) => {
                if !handle(msg).await {
                    break;
                }
            }
        }
    }
}

/// 시세 세션의 클라이언트 메시지 처리.
///
/// # Returns
///
/// `true`면 연결 유지, `false`면 연결 종료
async fn handle_market_message(state: &AppState, session_id: SessionId, msg: Message) -> bool {
    let text = match msg {
        Message::Text(text) => text,
        Message::Binary(_) => {
            warn!(session_id = %session_id, "바이너리 메시지는 지원하지 않음");
            return true;
        }
        Message::Ping(_) | Message::Pong(_) => return true,
        Message::Close(_) => {
            debug!(session_id = %session_id, "Close 메시지 수신");
            return false;
        }
    };

    let client_msg = match ClientMessage::from_json(text.as_str()) {
        Ok(msg) => msg,
        Err(e) => {
            reject_market_request(state, session_id, &e).await;
            return true;
        }
    };

    match client_msg {
        ClientMessage::Subscribe { markets } => {
            let codes = match parse_markets(&markets) {
                Ok(codes) => codes,
                Err(e) => {
                    reject_market_request(state, session_id, &e).await;
                    return true;
                }
            };

            match state.sessions.on_subscribe(session_id, &codes).await {
                Ok(added) => {
                    debug!(session_id = %session_id, added = added.len(), "구독 처리");
                    let ack = ServerEvent::Subscribed { markets: codes };
                    state.sessions.reply(session_id, &ack).await;
                }
                Err(e) if e.is_programming_fault() => {
                    warn!(session_id = %session_id, "구독 무시: {}", e)
                }
                Err(e) => error!(session_id = %session_id, "구독 실패: {}", e),
            }
        }

        ClientMessage::Unsubscribe { markets } => {
            let codes = match parse_markets(&markets) {
                Ok(codes) => codes,
                Err(e) => {
                    reject_market_request(state, session_id, &e).await;
                    return true;
                }
            };

            match state.sessions.on_unsubscribe(session_id, &codes).await {
                Ok(removed) => {
                    debug!(session_id = %session_id, removed = removed.len(), "구독 해제 처리");
                    let ack = ServerEvent::Unsubscribed { markets: codes };
                    state.sessions.reply(session_id, &ack).await;
                }
                Err(e) if e.is_programming_fault() => {
                    warn!(session_id = %session_id, "구독 해제 무시: {}", e)
                }
                Err(e) => error!(session_id = %session_id, "구독 해제 실패: {}", e),
            }
        }

        ClientMessage::Ping => {
            let pong = ServerEvent::Pong {
                timestamp: Utc::now().timestamp_millis(),
            };
            state.sessions.reply(session_id, &pong).await;
        }

        ClientMessage::StatsSubscribe => {
            let e = WsError::InvalidMessage("stats:subscribe는 /ws/statistics에서만 사용 가능".to_string());
            reject_market_request(state, session_id, &e).await;
        }
    }

    true
}

async fn reject_market_request(state: &AppState, session_id: SessionId, err: &WsError) {
    warn!(session_id = %session_id, "잘못된 요청: {}", err);
    record_client_error(err.code());
    state.sessions.reply(session_id, &ServerEvent::from(err)).await;
}

/// 통계 세션의 클라이언트 메시지 처리.
async fn handle_statistics_message(state: &AppState, session_id: SessionId, msg: Message) -> bool {
    let text = match msg {
        Message::Text(text) => text,
        Message::Close(_) => return false,
        _ => return true,
    };

    let reply = match ClientMessage::from_json(text.as_str()) {
        Ok(ClientMessage::StatsSubscribe) => {
            match &state.broadcaster {
                Some(broadcaster) => {
                    if let Err(e) = broadcaster.snapshot_now(session_id).await {
                        error!(session_id = %session_id, "초기 통계 전송 실패: {}", e);
                    }
                }
                None => debug!("통계 소스 미설정, 스냅샷 생략"),
            }
            None
        }
        Ok(ClientMessage::Ping) => Some(ServerEvent::Pong {
            timestamp: Utc::now().timestamp_millis(),
        }),
        Ok(_) => {
            let e = WsError::InvalidMessage("시세 구독은 /ws/market에서만 사용 가능".to_string());
            record_client_error(e.code());
            Some(ServerEvent::from(&e))
        }
        Err(e) => {
            warn!(session_id = %session_id, "잘못된 요청: {}", e);
            record_client_error(e.code());
            Some(ServerEvent::from(&e))
        }
    };

    if let Some(event) = reply {
        match event.to_json() {
            Ok(json) => {
                state.dashboard.send_to(session_id, Utf8Bytes::from(json)).await;
            }
            Err(e) => warn!("이벤트 직렬화 실패: {}", e),
        }
    }

    true
}

/// WebSocket 라우터 생성.
///
/// - `/ws/market` - 시세 구독
/// - `/ws/statistics` - 대시보드 통계
pub fn websocket_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/market", get(market_ws_handler))
        .route("/statistics", get(statistics_ws_handler))
}
