//! 포함/배제 매처 — KMP 기반 부분 문자열 검색
//!
//! [`ContainsMatcher`]는 생성 시 패턴의 KMP 실패 테이블을 미리 계산해
//! 레코드 길이 L, 패턴 길이 P에 대해 O(L+P)로 검색합니다. 레코드는
//! 멀티 KB 스택트레이스일 수 있고 청크마다 반복 판정되므로 백트래킹
//! 없는 검색이 중요합니다.

use tailpost_core::error::ConfigError;

use crate::matcher::Matcher;

/// 부분 문자열 포함/배제 매처
///
/// `include=true`면 패턴이 존재할 때, `include=false`면 패턴이 없을 때
/// 만족합니다. 즉 판정 결과는 항상 `발견 여부 == include`입니다.
#[derive(Debug)]
pub struct ContainsMatcher {
    include: bool,
    pattern: Vec<u8>,
    failure: Vec<isize>,
}

impl ContainsMatcher {
    /// 매처를 생성합니다. 빈 패턴은 설정 에러로 거부합니다.
    pub fn new(pattern: &str, include: bool) -> Result<Self, ConfigError> {
        if pattern.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "matcher pattern".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        let pattern = pattern.as_bytes().to_vec();
        let mut failure = vec![-1_isize; pattern.len()];

        for i in 1..pattern.len() {
            let mut j = failure[i - 1];

            while j > -1 && pattern[(j + 1) as usize] != pattern[i] {
                j = failure[j as usize];
            }

            if pattern[(j + 1) as usize] == pattern[i] {
                j += 1;
            }

            failure[i] = j;
        }

        Ok(Self {
            include,
            pattern,
            failure,
        })
    }

    /// 패턴 문자열을 반환합니다.
    pub fn pattern(&self) -> &[u8] {
        &self.pattern
    }

    /// 포함 매처인지 여부를 반환합니다.
    pub fn is_include(&self) -> bool {
        self.include
    }

    fn find(&self, data: &[u8]) -> bool {
        let plen = self.pattern.len() as isize;
        let mut j: isize = -1;

        for &b in data {
            while j > -1 && self.pattern[(j + 1) as usize] != b {
                j = self.failure[j as usize];
            }

            if self.pattern[(j + 1) as usize] == b {
                j += 1;
            }

            if j + 1 == plen {
                return true;
            }
        }

        false
    }
}

impl Matcher for ContainsMatcher {
    fn matches(&self, data: &[u8]) -> bool {
        self.find(data) == self.include
    }
}
