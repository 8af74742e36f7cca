//! 설정 관리.
//!
//! 기본값 → 설정 파일(선택) → `RELAY__` 환경 변수 순서로 덮어씁니다.
//!
//! ```text
//! RELAY__FEED__URL=wss://api.upbit.com/websocket/v1
//! RELAY__FEED__RECONNECT_BASE_DELAY_MS=3000
//! RELAY__STATISTICS__BROADCAST_INTERVAL_SECS=30
//! ```
//!
//! `FRONTEND_URL`, `STATS_SOURCE_URL`이 설정되어 있으면 가장 마지막에 적용합니다.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 기본 설정 파일 경로.
pub const DEFAULT_CONFIG_PATH: &str = "config/relay.toml";

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// 서버 설정
    pub server: ServerConfig,
    /// 업스트림 피드 설정
    pub feed: FeedConfig,
    /// 다운스트림 WebSocket 설정
    pub stream: StreamConfig,
    /// 통계 대시보드 설정
    pub statistics: StatisticsConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
    /// CORS 허용 오리진 (프론트엔드 주소)
    pub frontend_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            frontend_url: "http://localhost:5173".to_string(),
        }
    }
}

/// 업스트림 티커 피드 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedConfig {
    /// 업스트림 WebSocket URL
    pub url: String,
    /// 재연결 기본 대기 시간 (밀리초). n번째 실패 후 `base * n` 만큼 대기
    pub reconnect_base_delay_ms: u64,
    /// 최대 연속 재연결 시도 횟수
    pub max_reconnect_attempts: u32,
    /// 연결 타임아웃 (밀리초)
    pub connect_timeout_ms: u64,
    /// 업스트림 Ping 간격 (초)
    pub ping_interval_secs: u64,
    /// 디코딩된 티커 채널 버퍼 크기
    pub tick_buffer: usize,
    /// 업스트림 REST API 기본 URL (종목, 현재가, 캔들 조회)
    pub rest_url: String,
    /// REST 요청 타임아웃 (밀리초)
    pub rest_timeout_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "wss://api.upbit.com/websocket/v1".to_string(),
            reconnect_base_delay_ms: 3000,
            max_reconnect_attempts: 10,
            connect_timeout_ms: 10_000,
            ping_interval_secs: 60,
            tick_buffer: 4096,
            rest_url: "https://api.upbit.com/v1".to_string(),
            rest_timeout_ms: 5000,
        }
    }
}

impl FeedConfig {
    /// 재연결 기본 대기 시간.
    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    /// 연결 타임아웃.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// 업스트림 Ping 간격.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// REST 요청 타임아웃.
    pub fn rest_timeout(&self) -> Duration {
        Duration::from_millis(self.rest_timeout_ms)
    }
}

/// 다운스트림 WebSocket 세션 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// 세션별 송신 큐 크기 (가득 차면 해당 세션의 메시지는 버림)
    pub session_queue_capacity: usize,
    /// 클라이언트 Ping 간격 (초)
    pub ping_interval_secs: u64,
    /// 수신 없는 세션을 끊기까지의 시간 (초)
    pub idle_timeout_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            session_queue_capacity: 256,
            ping_interval_secs: 25,
            idle_timeout_secs: 60,
        }
    }
}

impl StreamConfig {
    /// 클라이언트 Ping 간격.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// 유휴 타임아웃.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// 통계 대시보드 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// 통계 스냅샷을 제공하는 엔드포인트. 없으면 대시보드 브로드캐스트 비활성화
    pub source_url: Option<String>,
    /// 브로드캐스트 주기 (초)
    pub broadcast_interval_secs: u64,
    /// 스냅샷 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            source_url: None,
            broadcast_interval_secs: 30,
            request_timeout_secs: 5,
        }
    }
}

impl StatisticsConfig {
    /// 브로드캐스트 주기.
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.broadcast_interval_secs)
    }

    /// 스냅샷 요청 타임아웃.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨 필터
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "relay_api=info,relay_feed=info,tower_http=info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl RelayConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("RELAY")
                    .separator("__")
                    .try_parsing(true),
            )
            // 게이트웨이와 공유하는 환경 변수
            .set_override_option("server.frontend_url", std::env::var("FRONTEND_URL").ok())?
            .set_override_option("statistics.source_url", std::env::var("STATS_SOURCE_URL").ok())?;

        let config = builder.build()?;
        let loaded: Self = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// 기본 경로(또는 `RELAY_CONFIG` 환경 변수가 가리키는 경로)에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        let path = std::env::var("RELAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path)
    }

    /// 값 범위를 검증합니다.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.feed.url.trim().is_empty() {
            return Err(config::ConfigError::Message("feed.url이 비어 있습니다".to_string()));
        }
        if self.feed.rest_url.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "feed.rest_url이 비어 있습니다".to_string(),
            ));
        }
        if self.feed.tick_buffer == 0 || self.stream.session_queue_capacity == 0 {
            return Err(config::ConfigError::Message(
                "채널 버퍼 크기는 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.feed.ping_interval_secs == 0 || self.stream.ping_interval_secs == 0 {
            return Err(config::ConfigError::Message(
                "ping 간격은 1초 이상이어야 합니다".to_string(),
            ));
        }
        if self.stream.idle_timeout_secs <= self.stream.ping_interval_secs {
            return Err(config::ConfigError::Message(
                "stream.idle_timeout_secs는 stream.ping_interval_secs보다 커야 합니다".to_string(),
            ));
        }
        if self.statistics.broadcast_interval_secs == 0 {
            return Err(config::ConfigError::Message(
                "statistics.broadcast_interval_secs는 1 이상이어야 합니다".to_string(),
            ));
        }
        Ok(())
    }
}
