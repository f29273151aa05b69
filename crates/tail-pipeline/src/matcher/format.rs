//! 레코드 경계 포맷
//!
//! [`Format`]은 물리 라인이 새 레코드를 시작하는지(`prefix_match`)
//! 판정하는 접두 와일드카드 규칙입니다. 한 서버의 모든 필터가 같은
//! 포맷을 참조로 공유하며, 생성 후에는 불변입니다.

use std::fmt;

use tailpost_core::config::FormatConfig;

use crate::matcher::wildcard::{wildcard_match, wildcard_match_partial};

/// 레코드 경계 포맷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    prefix: String,
}

impl Format {
    /// 접두 와일드카드로 포맷을 생성합니다.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// 설정에서 포맷을 생성합니다.
    pub fn from_config(config: &FormatConfig) -> Self {
        Self::new(config.prefix.clone())
    }

    /// 접두 와일드카드를 반환합니다.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 입력이 새 레코드의 시작(헤드 라인)인지 판정합니다.
    pub fn prefix_match(&self, data: &[u8]) -> bool {
        wildcard_match(&self.prefix, data)
    }

    /// 청크 끝에 잘린 라인 조각이 아직 헤드 라인이 될 수 있는지
    /// 판정합니다. 도착한 바이트까지 접두와 어긋나지 않으면 참입니다.
    pub fn prefix_could_match(&self, data: &[u8]) -> bool {
        wildcard_match_partial(&self.prefix, data)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "format{{prefix:{}}}", self.prefix)
    }
}

/// 라인이 직전 레코드의 연속 라인인지 판정합니다.
///
/// 포맷이 있으면 접두 불일치 라인이 연속 라인입니다. 포맷이 없으면
/// 공백/탭으로 시작하는 라인(셸 스타일 들여쓰기)만 연속 라인으로 봅니다.
pub fn is_following_line(format: Option<&Format>, line: &[u8]) -> bool {
    match format {
        Some(f) => !f.prefix_match(line),
        None => line.first().is_some_and(|&b| b == b' ' || b == b'\t'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_match_uses_wildcard() {
        let format = Format::new("!!!!-!!-!!");
        assert!(format.prefix_match(b"2020-11-11 ERROR test"));
        assert!(!format.prefix_match(b" follow line"));
    }

    #[test]
    fn prefix_could_match_on_fragments() {
        let format = Format::new("!!!!-!!-!!");
        assert!(format.prefix_could_match(b"2020"));
        assert!(format.prefix_could_match(b"2020-11-11 full line"));
        assert!(!format.prefix_could_match(b" foll"));
        assert!(!format.prefix_could_match(b"2020x"));
    }

    #[test]
    fn following_line_with_format() {
        let format = Format::new("!!!!-!!-!!");
        assert!(is_following_line(Some(&format), b" stack frame"));
        assert!(is_following_line(Some(&format), b"caused by: x"));
        assert!(!is_following_line(Some(&format), b"2020-11-11 next"));
    }

    #[test]
    fn following_line_without_format_uses_indentation() {
        assert!(is_following_line(None, b" indented"));
        assert!(is_following_line(None, b"\tindented"));
        assert!(!is_following_line(None, b"plain line"));
        assert!(!is_following_line(None, b""));
    }

    #[test]
    fn from_config_keeps_prefix() {
        let config = FormatConfig {
            prefix: "!!!!-!!-!!".to_owned(),
        };
        assert_eq!(Format::from_config(&config).prefix(), "!!!!-!!-!!");
    }

    #[test]
    fn display_includes_prefix() {
        assert_eq!(Format::new("!!").to_string(), "format{prefix:!!}");
    }
}
