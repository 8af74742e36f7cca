//! 업스트림 피드 에러 타입.

use thiserror::Error;

/// 업스트림 피드 관련 에러.
#[derive(Debug, Error)]
pub enum FeedError {
    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    NetworkError(String),

    /// 업스트림 연결 끊김
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// WebSocket 프로토콜 에러
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// 프레임 파싱/역직렬화 에러
    #[error("Parse error: {0}")]
    ParseError(String),

    /// REST API 에러 응답
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 재연결 한도를 모두 소진함
    #[error("Feed unavailable after {0} consecutive failures")]
    Unavailable(u32),
}

/// 피드 작업을 위한 Result 타입.
pub type FeedResult<T> = Result<T, FeedError>;

impl FeedError {
    /// 재연결로 복구 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FeedError::NetworkError(_)
                | FeedError::Disconnected(_)
                | FeedError::WebSocket(_)
                | FeedError::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout(err.to_string())
        } else {
            FeedError::NetworkError(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                FeedError::Disconnected(err.to_string())
            }
            WsError::Io(e) => FeedError::NetworkError(e.to_string()),
            other => FeedError::WebSocket(other.to_string()),
        }
    }
}
