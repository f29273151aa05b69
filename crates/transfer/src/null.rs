//! 폐기 싱크

use bytes::Bytes;

use tailpost_core::error::TransferError;
use tailpost_core::transfer::Transfer;

/// 받은 레코드를 그대로 버리는 싱크. 테스트와 벤치마크에서 씁니다.
pub struct NullTransfer {
    name: String,
}

impl NullTransfer {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Transfer for NullTransfer {
    fn name(&self) -> &str {
        &self.name
    }

    fn trans(&self, _source: &str, _record: &[Bytes]) -> Result<(), TransferError> {
        Ok(())
    }
}
