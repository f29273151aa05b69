//! Transfer trait — 아웃바운드 싱크 확장 포인트
//!
//! 파이프라인이 싱크에게 요구하는 계약만 정의합니다. 구현은
//! `tailpost-transfer` 크레이트에 있으며, 새로운 싱크를 추가하려면
//! 이 trait을 구현합니다.

use bytes::Bytes;

use crate::error::TransferError;

/// 아웃바운드 싱크 계약
///
/// - `name`은 Tailer 내에서 유일하며 안정적이어야 합니다.
/// - `start`/`stop`은 멱등이어야 합니다 (리소스 획득/해제).
/// - `trans`는 하나의 레코드를 순서 있는 세그먼트 목록으로 전달받습니다.
///   세그먼트는 호출이 반환된 뒤에는 보관하면 안 됩니다. 에러 반환은
///   "이번 전달 시도 실패"를 뜻하며, 호출한 Filter를 정지시킵니다 —
///   회복력이 필요한 싱크는 내부에서 재시도/배칭해야 합니다.
///
/// `trans`는 블로킹 없이 빠르게 반환해야 합니다. 느린 I/O(HTTP, 파일)는
/// 내부 태스크로 넘기는 것이 구현 관례입니다.
pub trait Transfer: Send + Sync {
    /// 싱크 이름 (Tailer 내 유일)
    fn name(&self) -> &str;

    /// 싱크 리소스를 획득합니다. 멱등.
    fn start(&self) -> Result<(), TransferError> {
        Ok(())
    }

    /// 싱크 리소스를 해제합니다. 멱등.
    fn stop(&self) -> Result<(), TransferError> {
        Ok(())
    }

    /// `source`에서 발생한 레코드 하나를 전달합니다.
    ///
    /// `record`는 레코드의 순서 있는 세그먼트 목록입니다 (레코드가 청크
    /// 경계에 걸친 경우 둘 이상).
    fn trans(&self, source: &str, record: &[Bytes]) -> Result<(), TransferError>;
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct RecordingTransfer {
        name: String,
        seen: Mutex<Vec<Vec<u8>>>,
    }

    impl Transfer for RecordingTransfer {
        fn name(&self) -> &str {
            &self.name
        }

        fn trans(&self, _source: &str, record: &[Bytes]) -> Result<(), TransferError> {
            let mut joined = Vec::new();
            for segment in record {
                joined.extend_from_slice(segment);
            }
            self.seen.lock().unwrap().push(joined);
            Ok(())
        }
    }

    #[test]
    fn default_start_stop_are_noops() {
        let t = RecordingTransfer {
            name: "t".to_owned(),
            seen: Mutex::new(Vec::new()),
        };
        t.start().unwrap();
        t.stop().unwrap();

        t.trans("src", &[Bytes::from_static(b"a"), Bytes::from_static(b"b")])
            .unwrap();
        assert_eq!(t.seen.lock().unwrap()[0], b"ab");
    }
}
