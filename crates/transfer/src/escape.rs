//! 챗봇 메시지용 JSON 이스케이프와 길이 절단
//!
//! 챗봇 API는 페이로드 길이에 제한이 있으므로 레코드를 입력 기준
//! `capacity` 바이트에서 자릅니다. 잘린 끝이 UTF-8 문자 중간이면 그
//! 문자 전체를 버려 항상 유효한 UTF-8 경계에서 끝나게 합니다.

/// JSON 문자열 값에 넣을 수 있도록 이스케이프하며, 입력을 최대
/// `capacity` 바이트까지만 소비합니다.
///
/// 이스케이프 대상은 `\n`, `\t`, `"`, `\\`입니다. 반환 길이는
/// 이스케이프 확장 때문에 `capacity`를 넘을 수 있습니다.
pub fn escape_limit_json_bytes(data: &[u8], capacity: usize) -> Vec<u8> {
    let limit = data.len().min(capacity);
    let trimmed = trim_incomplete_utf8(&data[..limit]);

    let mut out = Vec::with_capacity(trimmed.len() + trimmed.len() / 2);

    for &b in trimmed {
        match b {
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\t' => out.extend_from_slice(b"\\t"),
            b'"' => out.extend_from_slice(b"\\\""),
            b'\\' => out.extend_from_slice(b"\\\\"),
            _ => out.push(b),
        }
    }

    out
}

/// 끝이 UTF-8 문자 중간이면 그 문자의 시작 직전까지로 자릅니다.
fn trim_incomplete_utf8(data: &[u8]) -> &[u8] {
    let mut follow = 0;

    for idx in (0..data.len()).rev() {
        match data[idx] & 0xC0 {
            // 연속 바이트: 리드 바이트를 찾을 때까지 거슬러 올라감
            0x80 => follow += 1,
            0xC0 => {
                if follow == 0 || utf8_follow_size(data[idx]) != follow {
                    return &data[..idx];
                }
                break;
            }
            // ASCII로 끝나면 완전함
            _ => break,
        }
    }

    data
}

/// 리드 바이트가 요구하는 연속 바이트 수
fn utf8_follow_size(lead: u8) -> usize {
    if lead & 0x20 == 0 {
        1
    } else if lead & 0x10 == 0 {
        2
    } else {
        3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn escape(input: &[u8], capacity: usize) -> Vec<u8> {
        escape_limit_json_bytes(input, capacity)
    }

    #[test]
    fn ascii_truncation() {
        assert_eq!(escape(b"abcd", 2), b"ab");
        assert_eq!(escape(b"abcd", 4), b"abcd");
        assert_eq!(escape(b"abcd", 100), b"abcd");
    }

    #[test]
    fn utf8_boundary_is_respected() {
        let input = "你好世界".as_bytes();
        assert_eq!(escape(input, 2), b"");
        assert_eq!(escape(input, 3), "你".as_bytes());
        assert_eq!(escape(input, 4), "你".as_bytes());
        assert_eq!(escape(input, 6), "你好".as_bytes());
        assert_eq!(escape(input, 8), "你好".as_bytes());
        assert_eq!(escape(input, 9), "你好世".as_bytes());
        assert_eq!(escape(input, 12), "你好世界".as_bytes());
        assert_eq!(escape("你好世界abc".as_bytes(), 16), "你好世界abc".as_bytes());
    }

    #[test]
    fn json_special_chars_are_escaped() {
        assert_eq!(escape(br#"ab"cd"#, 6), br#"ab\"cd"#);
        assert_eq!(escape(br#"ab\"cd"#, 6), br#"ab\\\"cd"#);
        assert_eq!(escape(b"ab\tcd", 8), br"ab\tcd");
        assert_eq!(escape(b"ab\ncd", 8), br"ab\ncd");
        // 입력 기준 절단이므로 이스케이프 확장은 길이 제한을 넘을 수 있음
        assert_eq!(escape(b"abc\nd", 4), br"abc\n");
    }

    #[test]
    fn mixed_utf8_passes_through() {
        let input = "test 操作异常".as_bytes();
        assert_eq!(escape(input, 1024), input);
    }
}
