//! 파일 싱크 — 디렉토리에 소스별 로그 파일 기록
//!
//! 느린 디스크가 파이프라인을 막지 않도록 쓰기는 백그라운드 writer
//! 태스크가 전담합니다. `trans`는 유한 버퍼에 넣기만 하고, 버퍼가 가득
//! 차면 레코드를 버립니다 (전달 보장 없음).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use tailpost_core::error::TransferError;
use tailpost_core::metrics::{LABEL_TRANSFER, TRANSFER_FAILURES_TOTAL, TRANSFER_SUPPRESSED_TOTAL};
use tailpost_core::scope::Scope;
use tailpost_core::transfer::Transfer;

/// writer 버퍼 용량 (레코드 개수)
const BUFFER_CAPACITY: usize = 1024;

struct Entry {
    source: String,
    data: Vec<u8>,
}

/// 소스별 로그 파일에 레코드를 기록하는 싱크
///
/// 출력 파일은 `{dir}/{source}.log`이며 항상 append합니다.
pub struct FileTransfer {
    name: String,
    dir: PathBuf,
    scope: Scope,
    tx: mpsc::Sender<Entry>,
    rx: StdMutex<Option<mpsc::Receiver<Entry>>>,
}

impl FileTransfer {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        let (tx, rx) = mpsc::channel(BUFFER_CAPACITY);

        Self {
            name: name.into(),
            dir: dir.into(),
            scope: Scope::new(),
            tx,
            rx: StdMutex::new(Some(rx)),
        }
    }
}

impl Transfer for FileTransfer {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> Result<(), TransferError> {
        let Some(rx) = self.rx.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take()
        else {
            // 이미 시작됨
            return Ok(());
        };

        std::fs::create_dir_all(&self.dir).map_err(|e| TransferError::Start {
            name: self.name.clone(),
            reason: e.to_string(),
        })?;

        let name = self.name.clone();
        let dir = self.dir.clone();
        let scope = self.scope.clone();

        tokio::spawn(async move {
            run_writer(name, dir, scope, rx).await;
        });

        Ok(())
    }

    fn stop(&self) -> Result<(), TransferError> {
        self.scope.stop();
        Ok(())
    }

    fn trans(&self, source: &str, record: &[Bytes]) -> Result<(), TransferError> {
        if self.scope.is_stopped() {
            return Ok(());
        }

        let mut data = Vec::new();
        for segment in record {
            data.extend_from_slice(segment);
        }

        let entry = Entry {
            source: source.to_owned(),
            data,
        };

        if self.tx.try_send(entry).is_err() {
            // 버퍼 가득 참: 드롭하고 계속
            tracing::debug!(transfer = %self.name, "file buffer full, record dropped");
            metrics::counter!(TRANSFER_SUPPRESSED_TOTAL, LABEL_TRANSFER => self.name.clone())
                .increment(1);
        }

        Ok(())
    }
}

async fn run_writer(name: String, dir: PathBuf, scope: Scope, mut rx: mpsc::Receiver<Entry>) {
    let mut files: HashMap<String, tokio::fs::File> = HashMap::new();

    loop {
        tokio::select! {
            _ = scope.cancelled() => break,
            entry = rx.recv() => {
                let Some(entry) = entry else { break };

                if let Err(err) = write_entry(&dir, &mut files, &entry).await {
                    tracing::warn!(transfer = %name, source = %entry.source, error = %err, "file write failed");
                    metrics::counter!(TRANSFER_FAILURES_TOTAL, LABEL_TRANSFER => name.clone())
                        .increment(1);
                }
            }
        }
    }

    for file in files.values_mut() {
        let _ = file.flush().await;
    }

    tracing::info!(transfer = %name, "file writer stopped");
}

async fn write_entry(
    dir: &Path,
    files: &mut HashMap<String, tokio::fs::File>,
    entry: &Entry,
) -> std::io::Result<()> {
    if !files.contains_key(&entry.source) {
        let path = dir.join(format!("{}.log", sanitize_file_name(&entry.source)));
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        files.insert(entry.source.clone(), file);
    }

    // contains_key 직후라 항상 존재
    if let Some(file) = files.get_mut(&entry.source) {
        file.write_all(&entry.data).await?;
        if entry.data.last() != Some(&b'\n') {
            file.write_all(b"\n").await?;
        }
    }

    Ok(())
}

/// 소스 식별자(경로일 수 있음)를 파일 이름으로 쓸 수 있게 바꿉니다.
fn sanitize_file_name(source: &str) -> String {
    source
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn sanitize_replaces_path_separators() {
        assert_eq!(sanitize_file_name("app"), "app");
        assert_eq!(sanitize_file_name("/var/log/app.log"), "_var_log_app.log");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn records_are_written_per_source() {
        let dir = tempfile::tempdir().unwrap();
        let t = FileTransfer::new("f", dir.path());
        t.start().unwrap();

        t.trans("app", &[Bytes::from_static(b"first record")])
            .unwrap();
        t.trans("app", &[Bytes::from_static(b"second"), Bytes::from_static(b" record\n")])
            .unwrap();
        t.trans("sys", &[Bytes::from_static(b"other source")])
            .unwrap();

        let app_path = dir.path().join("app.log");
        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        loop {
            let content = std::fs::read_to_string(&app_path).unwrap_or_default();
            if content == "first record\nsecond record\n" {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "unexpected content: {content:?}");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        loop {
            let content =
                std::fs::read_to_string(dir.path().join("sys.log")).unwrap_or_default();
            if content == "other source\n" {
                break;
            }
            assert!(std::time::Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        t.stop().unwrap();
    }

    #[tokio::test]
    async fn start_is_idempotent_and_missing_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        let t = FileTransfer::new("f", &nested);

        t.start().unwrap();
        t.start().unwrap();
        assert!(nested.is_dir());

        t.stop().unwrap();
        t.stop().unwrap();

        // 정지 후 trans는 무해한 no-op
        t.trans("app", &[Bytes::from_static(b"late")]).unwrap();
    }
}
