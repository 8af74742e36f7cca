//! 종목 코드 정의.
//!
//! 업비트 마켓 코드(예: `KRW-BTC`)를 감싸는 불투명한 식별자입니다.
//! 비교는 문자열 그대로 수행하며 대소문자 변환 등 정규화를 하지 않습니다.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// 거래 가능한 마켓 페어를 식별하는 종목 코드.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentCode(String);

impl InstrumentCode {
    /// 새 종목 코드를 생성합니다.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// 코드 문자열을 반환합니다.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 빈 코드(공백만 있는 경우 포함)인지 확인합니다.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// 내부 문자열을 꺼냅니다.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for InstrumentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstrumentCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl From<String> for InstrumentCode {
    fn from(code: String) -> Self {
        Self(code)
    }
}

impl AsRef<str> for InstrumentCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for InstrumentCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_exact_string_equality() {
        assert_eq!(InstrumentCode::from("KRW-BTC"), InstrumentCode::new("KRW-BTC"));
        assert_ne!(InstrumentCode::from("KRW-BTC"), InstrumentCode::from("krw-btc"));
    }

    #[test]
    fn test_borrow_lookup() {
        let mut set = HashSet::new();
        set.insert(InstrumentCode::from("KRW-ETH"));

        assert!(set.contains("KRW-ETH"));
        assert!(!set.contains("KRW-BTC"));
    }

    #[test]
    fn test_serde_transparent() {
        let code = InstrumentCode::from("KRW-XRP");
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"KRW-XRP\"");

        let parsed: InstrumentCode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, code);
    }

    #[test]
    fn test_blank() {
        assert!(InstrumentCode::from("   ").is_blank());
        assert!(!InstrumentCode::from("KRW-BTC").is_blank());
    }
}
