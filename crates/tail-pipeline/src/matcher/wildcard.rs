//! 바이트 와일드카드 매칭
//!
//! 레코드 경계 포맷의 접두 패턴에 쓰이는 단순 와일드카드입니다.
//! 지원 문자:
//! - `?` : 임의 바이트 하나
//! - `~` : 알파벳 바이트 하나 (`A-Z`, `a-z`)
//! - `!` : 숫자 바이트 하나 (`0-9`)
//! - 그 외 : 동일 바이트 리터럴
//!
//! `*` 같은 가변 길이 와일드카드는 지원하지 않습니다. 패턴의 각 문자는
//! 입력의 바이트 하나와 일대일 대응하므로, 패턴이 남은 입력보다 길면
//! 항상 실패합니다.

/// 입력이 패턴 와일드카드를 만족하는지 확인합니다.
///
/// 입력의 앞부분만 검사합니다. 패턴보다 입력이 길어도 무방합니다.
pub fn wildcard_match(pattern: &str, data: &[u8]) -> bool {
    if data.len() < pattern.len() {
        return false;
    }

    pattern
        .bytes()
        .zip(data)
        .all(|(p, &b)| byte_match(p, b))
}

/// 입력이 아직 다 도착하지 않았다는 전제에서, 도착한 바이트까지 패턴과
/// 어긋나지 않는지 확인합니다.
///
/// 입력이 패턴보다 짧을 때만 [`wildcard_match`]와 다릅니다. 청크 끝에
/// 잘린 라인 조각이 헤드가 될 가능성이 남았는지 판정할 때 씁니다.
pub fn wildcard_match_partial(pattern: &str, data: &[u8]) -> bool {
    pattern
        .bytes()
        .zip(data)
        .all(|(p, &b)| byte_match(p, b))
}

fn byte_match(p: u8, b: u8) -> bool {
    match p {
        b'?' => true,
        b'~' => b.is_ascii_alphabetic(),
        b'!' => b.is_ascii_digit(),
        _ => b == p,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_prefix_pattern() {
        assert!(wildcard_match("!!!!-!!-!!", b"2021-01-01"));
        assert!(!wildcard_match("!!!!-!!-!!", b"2021001001"));
    }

    #[test]
    fn alphabet_pattern_rejects_digits() {
        assert!(wildcard_match("~~~~", b"INFO"));
        assert!(!wildcard_match("~~~~", b"IN2O"));
        assert!(!wildcard_match("~~~~", b"1234"));
    }

    #[test]
    fn any_byte_pattern() {
        assert!(wildcard_match("??", b"ab"));
        assert!(wildcard_match("??", &[0x00, 0xff]));
    }

    #[test]
    fn pattern_longer_than_input_fails() {
        assert!(!wildcard_match("!!!!", b"202"));
        assert!(!wildcard_match("?", b""));
    }

    #[test]
    fn literal_bytes_must_match_exactly() {
        assert!(wildcard_match("[~]", b"[a] message"));
        assert!(!wildcard_match("[~]", b"(a) message"));
    }

    #[test]
    fn empty_pattern_matches_anything() {
        assert!(wildcard_match("", b""));
        assert!(wildcard_match("", b"whatever"));
    }

    #[test]
    fn partial_match_accepts_consistent_short_input() {
        assert!(wildcard_match_partial("!!!!-!!-!!", b"202"));
        assert!(wildcard_match_partial("!!!!-!!-!!", b""));
        assert!(!wildcard_match_partial("!!!!-!!-!!", b"20x"));
        // 패턴 길이를 넘는 입력은 wildcard_match와 같음
        assert!(wildcard_match_partial("!!", b"42 rest"));
        assert!(!wildcard_match_partial("!!", b"4x rest"));
    }

    #[test]
    fn input_longer_than_pattern_checks_prefix_only() {
        assert!(wildcard_match("!!!!-!!-!!", b"2020-11-11 ERROR test"));
    }
}
