//! 웹훅 싱크 — 원시 레코드를 HTTP POST
//!
//! HTTP 왕복이 파이프라인을 막지 않도록 전송은 백그라운드 태스크가
//! 수행합니다. 아웃바운드 큐가 가득 찬 경우는 전달 실패로 취급합니다.

use std::sync::Mutex as StdMutex;

use bytes::Bytes;
use tokio::sync::mpsc;

use tailpost_core::error::TransferError;
use tailpost_core::metrics::{LABEL_TRANSFER, TRANSFER_FAILURES_TOTAL};
use tailpost_core::scope::Scope;
use tailpost_core::transfer::Transfer;

use crate::http::http_post;

/// 아웃바운드 큐 용량 (레코드 개수)
const QUEUE_CAPACITY: usize = 256;

/// 레코드를 설정된 URL로 POST하는 싱크
pub struct WebhookTransfer {
    name: String,
    url: String,
    client: reqwest::Client,
    scope: Scope,
    tx: mpsc::Sender<Vec<u8>>,
    rx: StdMutex<Option<mpsc::Receiver<Vec<u8>>>>,
}

impl WebhookTransfer {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);

        Self {
            name: name.into(),
            url: url.into(),
            client: reqwest::Client::new(),
            scope: Scope::new(),
            tx,
            rx: StdMutex::new(Some(rx)),
        }
    }
}

impl Transfer for WebhookTransfer {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> Result<(), TransferError> {
        let Some(mut rx) = self
            .rx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        else {
            return Ok(());
        };

        let name = self.name.clone();
        let url = self.url.clone();
        let client = self.client.clone();
        let scope = self.scope.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = scope.cancelled() => break,
                    body = rx.recv() => {
                        let Some(body) = body else { break };

                        if let Err(reason) = http_post(&client, &url, body).await {
                            tracing::warn!(transfer = %name, %reason, "webhook post failed");
                            metrics::counter!(TRANSFER_FAILURES_TOTAL, LABEL_TRANSFER => name.clone())
                                .increment(1);
                        }
                    }
                }
            }

            tracing::info!(transfer = %name, "webhook sender stopped");
        });

        Ok(())
    }

    fn stop(&self) -> Result<(), TransferError> {
        self.scope.stop();
        Ok(())
    }

    fn trans(&self, _source: &str, record: &[Bytes]) -> Result<(), TransferError> {
        if self.scope.is_stopped() {
            return Err(TransferError::Stopped {
                name: self.name.clone(),
            });
        }

        let mut body = Vec::new();
        for segment in record {
            body.extend_from_slice(segment);
        }

        self.tx.try_send(body).map_err(|_| TransferError::Deliver {
            name: self.name.clone(),
            reason: "outbound queue full".to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queue_full_is_a_delivery_error() {
        // start하지 않으면 소비자가 없어 큐가 채워짐
        let t = WebhookTransfer::new("hook", "http://127.0.0.1:9/x");

        for _ in 0..QUEUE_CAPACITY {
            t.trans("src", &[Bytes::from_static(b"r")]).unwrap();
        }

        let err = t.trans("src", &[Bytes::from_static(b"r")]).unwrap_err();
        assert!(err.to_string().contains("queue full"));
    }

    #[tokio::test]
    async fn stopped_webhook_rejects_records() {
        let t = WebhookTransfer::new("hook", "http://127.0.0.1:9/x");
        t.start().unwrap();
        t.stop().unwrap();

        let err = t.trans("src", &[Bytes::from_static(b"r")]).unwrap_err();
        assert!(matches!(err, TransferError::Stopped { .. }));
    }
}
