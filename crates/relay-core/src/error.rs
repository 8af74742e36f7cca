//! 중계 시스템의 에러 타입.
//!
//! 이 모듈은 중계 시스템 전반에서 사용되는 에러 타입을 정의합니다.

use thiserror::Error;

/// 핵심 중계 에러.
#[derive(Debug, Error)]
pub enum RelayError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 알 수 없는 세션 참조 (프로그래밍 오류)
    #[error("유효하지 않은 세션: {0}")]
    InvalidSession(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 요청한 리소스 없음
    #[error("찾을 수 없음: {0}")]
    NotFound(String),

    /// 업스트림 REST API 에러
    #[error("업스트림 에러: {0}")]
    Upstream(String),

    /// 스냅샷 소스 에러
    #[error("스냅샷 에러: {0}")]
    Snapshot(String),

    /// 네트워크 에러
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 내부 에러
    #[error("내부 에러: {0}")]
    Internal(String),
}

/// 중계 작업을 위한 Result 타입.
pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    /// 재시도 가능한 에러인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::Network(_) | RelayError::Snapshot(_) | RelayError::Upstream(_)
        )
    }

    /// 호출자 버그로 인한 에러인지 확인합니다.
    ///
    /// 이 경우 로그만 남기고 요청을 무시합니다.
    pub fn is_programming_fault(&self) -> bool {
        matches!(self, RelayError::InvalidSession(_))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for RelayError {
    fn from(err: config::ConfigError) -> Self {
        RelayError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(RelayError::InvalidSession("s-1".into()).is_programming_fault());
        assert!(!RelayError::InvalidSession("s-1".into()).is_retryable());
        assert!(RelayError::Snapshot("timeout".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = RelayError::InvalidSession("abc".into());
        assert_eq!(err.to_string(), "유효하지 않은 세션: abc");
    }
}
