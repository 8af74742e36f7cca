//! 관리자 대시보드 실시간 통계.
//!
//! `/ws/statistics`에 연결한 대시보드 클라이언트에 주기적으로
//! `stats:realtime` 이벤트를 전송합니다.

pub mod broadcaster;
pub mod source;

pub use broadcaster::{start_snapshot_broadcaster, DashboardAudience, PeriodicSnapshotBroadcaster};
pub use source::{HttpSnapshotSource, SnapshotSource};
