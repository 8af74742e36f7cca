//! 업스트림 재연결 정책.
//!
//! n번째 연속 실패 후 다음 시도까지 `base_delay * n` 만큼 대기합니다.
//! 연속 실패가 `max_attempts`에 도달하면 더 이상 재연결하지 않습니다.

use std::time::Duration;

use relay_core::FeedConfig;

/// 선형 백오프 재연결 정책.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// 기본 대기 시간
    pub base_delay: Duration,
    /// 최대 연속 실패 횟수
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(3000),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// 새 정책을 생성합니다.
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// 설정에서 정책을 생성합니다.
    pub fn from_config(config: &FeedConfig) -> Self {
        Self::new(config.reconnect_base_delay(), config.max_reconnect_attempts)
    }

    /// `failures`번 연속 실패한 뒤 다음 시도까지의 대기 시간.
    ///
    /// 한도에 도달했으면 `None`을 반환합니다.
    pub fn delay_for(&self, failures: u32) -> Option<Duration> {
        if failures >= self.max_attempts {
            return None;
        }
        Some(self.base_delay.saturating_mul(failures))
    }
}
