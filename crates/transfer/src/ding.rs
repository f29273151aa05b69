//! 딩톡 챗봇 싱크

use bytes::Bytes;

use tailpost_core::error::TransferError;
use tailpost_core::transfer::Transfer;

use crate::im::ImTransfer;

const DING_JSON_PREFIX: &[u8] = br#"{"msgtype":"text","text":{"content":""#;
const DING_JSON_SUFFIX: &[u8] = br#""}}"#;

/// 딩톡 로봇 웹훅으로 텍스트 메시지를 보내는 싱크
pub struct DingTransfer {
    inner: ImTransfer,
}

impl DingTransfer {
    pub fn new(name: impl Into<String>, url: impl Into<String>, prefix: Option<&str>) -> Self {
        Self {
            inner: ImTransfer::new(name, url, prefix, DING_JSON_PREFIX, DING_JSON_SUFFIX),
        }
    }
}

impl Transfer for DingTransfer {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn trans(&self, source: &str, record: &[Bytes]) -> Result<(), TransferError> {
        self.inner.trans(source, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ding_payload_is_valid_message_json() {
        let t = DingTransfer::new("d", "http://127.0.0.1:9/x", None);
        let payload = t.inner.build_payload("app", &[Bytes::from_static(b"boom")]);

        assert_eq!(
            payload,
            br#"{"msgtype":"text","text":{"content":"[tailpost-app]: boom"}}"#
        );
    }
}
