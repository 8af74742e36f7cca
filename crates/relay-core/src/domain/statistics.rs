//! 관리자 대시보드 실시간 통계.
//!
//! 통계 집계 쿼리는 플랫폼의 다른 계층이 담당하며, 이 타입은
//! 그 결과를 주기적으로 대시보드 클라이언트에 전달하기 위한 형태입니다.

use serde::{Deserialize, Serialize};

/// 실시간 통계 스냅샷.
///
/// JSON 필드명은 camelCase로 직렬화됩니다 (`stats:realtime` 이벤트 페이로드).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealtimeStats {
    /// 최근 5분 내 활동한 방문자 수
    pub active_visitors: u64,
    /// 오늘 방문자 수
    pub today_visitors: u64,
    /// 오늘 로그인 성공 수
    pub today_logins: u64,
    /// 오늘 가입자 수
    pub today_registrations: u64,
    /// 오늘 페이지뷰 합계
    pub today_page_views: u64,
    /// 전체 사용자 수
    pub total_users: u64,
    /// 오늘 작성된 공지 수
    pub today_announcements: u64,
    /// 오늘 작성된 댓글 수
    pub today_comments: u64,
    /// 오늘 전송된 메시지 수
    pub today_messages: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case_payload() {
        let stats = RealtimeStats {
            active_visitors: 3,
            total_users: 120,
            ..Default::default()
        };
        let json = serde_json::to_value(&stats).unwrap();

        assert_eq!(json["activeVisitors"], 3);
        assert_eq!(json["totalUsers"], 120);
        assert_eq!(json["todayPageViews"], 0);
    }

    #[test]
    fn test_missing_fields_default_to_zero() {
        let stats: RealtimeStats =
            serde_json::from_str(r#"{"activeVisitors": 7, "todayLogins": 2}"#).unwrap();

        assert_eq!(stats.active_visitors, 7);
        assert_eq!(stats.today_logins, 2);
        assert_eq!(stats.today_messages, 0);
    }
}
