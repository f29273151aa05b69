//! 라크(페이슈) 챗봇 싱크

use bytes::Bytes;

use tailpost_core::error::TransferError;
use tailpost_core::transfer::Transfer;

use crate::im::ImTransfer;

const LARK_JSON_PREFIX: &[u8] = br#"{"msg_type":"text","content":{"text":""#;
const LARK_JSON_SUFFIX: &[u8] = br#""}}"#;

/// 라크 봇 웹훅으로 텍스트 메시지를 보내는 싱크
pub struct LarkTransfer {
    inner: ImTransfer,
}

impl LarkTransfer {
    pub fn new(name: impl Into<String>, url: impl Into<String>, prefix: Option<&str>) -> Self {
        Self {
            inner: ImTransfer::new(name, url, prefix, LARK_JSON_PREFIX, LARK_JSON_SUFFIX),
        }
    }
}

impl Transfer for LarkTransfer {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn trans(&self, source: &str, record: &[Bytes]) -> Result<(), TransferError> {
        self.inner.trans(source, record)
    }
}
