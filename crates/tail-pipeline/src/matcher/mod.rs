//! 매처 — 레코드 판정 프레디킷
//!
//! 매처는 레코드 바이트에 대한 순수 프레디킷입니다. 한 라우터의 매처
//! 집합은 AND로 결합되며, 왼쪽부터 차례로 평가해 처음 실패하는 매처에서
//! 단락(short-circuit)합니다. 빈 집합은 항상 매칭입니다.

pub mod contains;
pub mod format;
pub mod wildcard;

pub use contains::ContainsMatcher;
pub use format::Format;
pub use wildcard::wildcard_match;

use std::sync::Arc;

use tailpost_core::config::MatcherConfig;
use tailpost_core::error::ConfigError;

/// 레코드 판정 프레디킷
pub trait Matcher: Send + Sync {
    /// 레코드(헤드 라인)가 이 매처를 만족하는지 판정합니다.
    fn matches(&self, data: &[u8]) -> bool;
}

/// 매처 집합을 AND로 평가합니다. 빈 집합은 항상 `true`입니다.
pub fn matches_all(matchers: &[Arc<dyn Matcher>], data: &[u8]) -> bool {
    matchers.iter().all(|m| m.matches(data))
}

/// 매처 설정 목록에서 매처 집합을 생성하는 팩토리입니다.
///
/// `contains` 패턴은 포함 매처로, `not_contains` 패턴은 배제 매처로
/// 변환됩니다. 하나의 목록에서 생성된 매처는 모두 AND로 결합됩니다.
pub fn build_matchers(configs: &[MatcherConfig]) -> Result<Vec<Arc<dyn Matcher>>, ConfigError> {
    let mut matchers: Vec<Arc<dyn Matcher>> = Vec::new();

    for config in configs {
        for pattern in &config.contains {
            matchers.push(Arc::new(ContainsMatcher::new(pattern, true)?));
        }

        for pattern in &config.not_contains {
            matchers.push(Arc::new(ContainsMatcher::new(pattern, false)?));
        }
    }

    Ok(matchers)
}
