//! # Relay Core
//!
//! 실시간 시세 중계 서버의 핵심 도메인 타입을 제공합니다.
//!
//! 이 크레이트는 중계 시스템 전반에서 사용되는 기본 타입을 제공합니다:
//! - 종목 코드 (`InstrumentCode`)
//! - 업스트림 티커 (`Tick`)
//! - 대시보드 통계 스냅샷 (`RealtimeStats`)
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
