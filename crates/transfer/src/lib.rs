#![doc = include_str!("../README.md")]

use std::sync::Arc;

use tailpost_core::config::{TransferConfig, TransferKind, check_transfer_config};
use tailpost_core::error::TailpostError;
use tailpost_core::transfer::Transfer;

pub mod console;
pub mod ding;
pub mod escape;
pub mod file;
pub mod lark;
pub mod null;
pub mod webhook;

mod http;
mod im;

// --- 주요 타입 re-export ---

pub use console::ConsoleTransfer;
pub use ding::DingTransfer;
pub use escape::escape_limit_json_bytes;
pub use file::FileTransfer;
pub use lark::LarkTransfer;
pub use null::NullTransfer;
pub use webhook::WebhookTransfer;

/// 설정에서 싱크 인스턴스를 만듭니다.
///
/// 타입별 필수 필드는 먼저 검증하므로, 반환된 싱크는 바로 `start`할 수
/// 있습니다. `Tailer`에 팩토리로 주입하는 진입점입니다.
pub fn build_transfer(
    name: &str,
    config: &TransferConfig,
) -> Result<Arc<dyn Transfer>, TailpostError> {
    check_transfer_config(name, config)?;

    let url = config.url.clone().unwrap_or_default();
    let prefix = config.prefix.as_deref();

    let transfer: Arc<dyn Transfer> = match config.kind {
        TransferKind::Console => Arc::new(ConsoleTransfer::new(name)),
        TransferKind::Null => Arc::new(NullTransfer::new(name)),
        TransferKind::File => Arc::new(FileTransfer::new(
            name,
            config.dir.clone().unwrap_or_default(),
        )),
        TransferKind::Webhook => Arc::new(WebhookTransfer::new(name, url)),
        TransferKind::Ding => Arc::new(DingTransfer::new(name, url, prefix)),
        TransferKind::Lark => Arc::new(LarkTransfer::new(name, url, prefix)),
    };

    Ok(transfer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: TransferKind) -> TransferConfig {
        TransferConfig {
            kind,
            url: Some("http://127.0.0.1:9/x".to_owned()),
            dir: Some("/tmp/tailpost-test".to_owned()),
            prefix: None,
        }
    }

    #[test]
    fn builds_every_kind() {
        for kind in [
            TransferKind::Console,
            TransferKind::Null,
            TransferKind::File,
            TransferKind::Webhook,
            TransferKind::Ding,
            TransferKind::Lark,
        ] {
            let transfer = build_transfer("t", &config(kind)).unwrap();
            assert_eq!(transfer.name(), "t");
        }
    }

    #[test]
    fn rejects_webhook_without_url() {
        let config = TransferConfig {
            kind: TransferKind::Webhook,
            url: None,
            dir: None,
            prefix: None,
        };
        assert!(build_transfer("hook", &config).is_err());
    }

    #[test]
    fn rejects_file_without_dir() {
        let config = TransferConfig {
            kind: TransferKind::File,
            url: None,
            dir: None,
            prefix: None,
        };
        assert!(build_transfer("f", &config).is_err());
    }
}
