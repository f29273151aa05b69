//! 챗봇(IM) 싱크 공통 구현
//!
//! 딩톡과 라크는 JSON 골격만 다르고 정책은 같습니다: 메시지 본문을
//! 이스케이프해 1 KiB에서 절단하고, 5초 간격 레이트 리밋으로 홍수를
//! 막습니다. 간격 안에 억제된 레코드 수는 다음 전송 때 요약 메시지로
//! 먼저 알립니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;

use tailpost_core::error::TransferError;
use tailpost_core::metrics::{
    LABEL_TRANSFER, TRANSFER_FAILURES_TOTAL, TRANSFER_SUPPRESSED_TOTAL,
};
use tailpost_core::transfer::Transfer;

use crate::escape::escape_limit_json_bytes;
use crate::http::http_post;

/// 메시지 본문 최대 길이 (입력 바이트 기준)
const MESSAGE_MAX_CONTENT_LEN: usize = 1024;

/// 레이트 리밋 간격
const MESSAGE_TRANSFER_INTERVAL: Duration = Duration::from_secs(5);

/// 메시지 제목 접두어 기본값
const DEFAULT_PREFIX: &str = "tailpost";

/// 챗봇 텍스트 메시지 싱크의 공통 코어
///
/// `json_prefix`/`json_suffix`가 플랫폼별 JSON 골격을 결정합니다. 본문은
/// `[{prefix}-{source}]: {레코드}` 형태입니다.
pub(crate) struct ImTransfer {
    name: String,
    url: String,
    prefix: String,
    json_prefix: &'static [u8],
    json_suffix: &'static [u8],
    interval: Duration,
    transferring: Arc<AtomicBool>,
    suppressed: AtomicU64,
    client: reqwest::Client,
}

impl ImTransfer {
    pub(crate) fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        prefix: Option<&str>,
        json_prefix: &'static [u8],
        json_suffix: &'static [u8],
    ) -> Self {
        let prefix = match prefix {
            Some(p) if !p.is_empty() => p.to_owned(),
            _ => DEFAULT_PREFIX.to_owned(),
        };

        Self {
            name: name.into(),
            url: url.into(),
            prefix,
            json_prefix,
            json_suffix,
            interval: MESSAGE_TRANSFER_INTERVAL,
            transferring: Arc::new(AtomicBool::new(false)),
            suppressed: AtomicU64::new(0),
            client: reqwest::Client::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// 플랫폼 JSON 골격 안에 제목과 절단된 본문을 넣은 페이로드
    pub(crate) fn build_payload(&self, source: &str, record: &[Bytes]) -> Vec<u8> {
        let mut body = Vec::with_capacity(MESSAGE_MAX_CONTENT_LEN + 64);

        body.extend_from_slice(self.json_prefix);
        body.push(b'[');
        body.extend_from_slice(self.prefix.as_bytes());
        body.push(b'-');
        body.extend_from_slice(source.as_bytes());
        body.extend_from_slice(b"]: ");

        let mut remaining = MESSAGE_MAX_CONTENT_LEN;
        for segment in record {
            if remaining == 0 {
                break;
            }

            let escaped = escape_limit_json_bytes(segment, remaining);
            remaining = remaining.saturating_sub(escaped.len());
            body.extend_from_slice(&escaped);
        }

        body.extend_from_slice(self.json_suffix);
        body
    }
}

impl Transfer for ImTransfer {
    fn name(&self) -> &str {
        &self.name
    }

    fn trans(&self, source: &str, record: &[Bytes]) -> Result<(), TransferError> {
        // 간격 안의 추가 메시지는 버리고 개수만 셈
        if self
            .transferring
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.suppressed.fetch_add(1, Ordering::SeqCst);
            metrics::counter!(TRANSFER_SUPPRESSED_TOTAL, LABEL_TRANSFER => self.name.clone())
                .increment(1);
            return Ok(());
        }

        let summary = match self.suppressed.swap(0, Ordering::SeqCst) {
            0 => None,
            n => {
                let text = format!("suppressed {n} records since last delivery");
                Some(self.build_payload(source, &[Bytes::from(text)]))
            }
        };

        let payload = self.build_payload(source, record);

        let name = self.name.clone();
        let url = self.url.clone();
        let client = self.client.clone();
        let interval = self.interval;
        let transferring = Arc::clone(&self.transferring);

        tokio::spawn(async move {
            if let Some(body) = summary {
                if let Err(reason) = http_post(&client, &url, body).await {
                    tracing::warn!(transfer = %name, %reason, "im summary post failed");
                }
            }

            if let Err(reason) = http_post(&client, &url, payload).await {
                tracing::warn!(transfer = %name, %reason, "im post failed");
                metrics::counter!(TRANSFER_FAILURES_TOTAL, LABEL_TRANSFER => name.clone())
                    .increment(1);
            }

            tokio::time::sleep(interval).await;
            transferring.store(false, Ordering::SeqCst);
        });

        Ok(())
    }
}
