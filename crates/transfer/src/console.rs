//! 표준 출력 싱크

use std::io::Write;

use bytes::Bytes;

use tailpost_core::error::TransferError;
use tailpost_core::transfer::Transfer;

/// 레코드를 표준 출력에 기록하는 싱크
///
/// 세그먼트를 순서대로 기록하고, 레코드가 개행으로 끝나지 않으면
/// 개행을 덧붙입니다.
pub struct ConsoleTransfer {
    name: String,
}

impl ConsoleTransfer {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Transfer for ConsoleTransfer {
    fn name(&self) -> &str {
        &self.name
    }

    fn trans(&self, _source: &str, record: &[Bytes]) -> Result<(), TransferError> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();

        let mut last = 0u8;
        for segment in record {
            let _ = out.write_all(segment);
            if let Some(&b) = segment.last() {
                last = b;
            }
        }

        if last != b'\n' {
            let _ = out.write_all(b"\n");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_transfer_never_errors() {
        let t = ConsoleTransfer::new("out");
        assert_eq!(t.name(), "out");
        t.start().unwrap();
        t.trans("src", &[Bytes::from_static(b"hello"), Bytes::from_static(b" world")])
            .unwrap();
        t.trans("src", &[Bytes::from_static(b"with newline\n")])
            .unwrap();
        t.stop().unwrap();
    }
}
