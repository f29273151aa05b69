//! 소스 — 외부 명령의 stdout을 워커의 청크 스트림으로
//!
//! 소스는 `/bin/sh -c <command>`로 tail 명령을 실행하고 stdout을 읽어
//! 워커에 청크 단위로 넘깁니다. 파일 소스는 `tail -F <path>` 명령으로
//! 변환됩니다.
//!
//! # 실패 정책
//! - 정적 소스: 실패 시 고정 간격으로 무한 재시도합니다.
//! - 동적 소스(`command_gen` 산출): 실패를 소유 서버에 한 번 보고하고
//!   정지합니다. 정상 종료도 동적 워커에게는 보고 대상입니다.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use tailpost_core::error::PipelineError;
use tailpost_core::metrics::{LABEL_SERVER, SOURCE_RETRIES_TOTAL};
use tailpost_core::scope::Scope;

use std::sync::Arc;

use crate::worker::Worker;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// 파일 경로를 follow/retry tail 명령으로 변환합니다.
///
/// `-F`는 `--follow=name --retry`와 같아서 로그 로테이션에도 계속
/// 따라갑니다.
pub fn follow_retry_tail_command(path: &str) -> String {
    format!("tail -F {path}")
}

/// 명령 하나를 끝까지 실행해 stdout을 수집합니다 (`command_gen` 용).
pub(crate) async fn exec_shell(command: &str) -> Result<Vec<u8>, String> {
    let output = tokio::process::Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| e.to_string())?;

    if !output.status.success() {
        return Err(format!("command exited with {}", output.status));
    }

    Ok(output.stdout)
}

/// 워커의 소스 루프 태스크를 시작합니다.
///
/// 루프는 워커 스코프가 정지될 때까지 명령을 실행/재시작합니다. 동적
/// 워커는 첫 종료(정상이든 실패든)를 `error_tx`로 보고하고 끝납니다.
pub(crate) fn spawn_command_source(
    worker: Arc<Worker>,
    command: String,
    retry_interval: Duration,
    error_tx: Option<mpsc::Sender<PipelineError>>,
) {
    tokio::spawn(async move {
        let scope = worker.scope().clone();

        loop {
            if scope.is_stopped() {
                break;
            }

            tracing::info!(worker = %worker.id(), %command, "worker command start");

            let outcome = run_command_once(&worker, &command, &scope).await;

            if scope.is_stopped() {
                break;
            }

            let reason = match outcome {
                Ok(()) => "command stopped".to_owned(),
                Err(reason) => {
                    tracing::error!(
                        worker = %worker.id(),
                        %command,
                        %reason,
                        "worker command failed"
                    );
                    reason
                }
            };

            if worker.is_dynamic() {
                let err = PipelineError::SourceFailed {
                    worker: worker.id().to_owned(),
                    reason,
                };

                if let Some(tx) = &error_tx {
                    let _ = tx.send(err).await;
                }

                break;
            }

            metrics::counter!(SOURCE_RETRIES_TOTAL, LABEL_SERVER => worker.source_id().to_owned())
                .increment(1);
            tracing::error!(
                worker = %worker.id(),
                retry_secs = retry_interval.as_secs(),
                "worker command failed, retrying"
            );

            tokio::select! {
                _ = scope.cancelled() => break,
                _ = tokio::time::sleep(retry_interval) => {}
            }
        }

        tracing::info!(worker = %worker.id(), "worker source stopped");
    });
}

/// 명령을 한 번 실행해 stdout 청크를 워커에 공급합니다.
///
/// 스코프 정지 시 자식 프로세스를 죽이고 `Ok`로 돌아갑니다.
async fn run_command_once(worker: &Worker, command: &str, scope: &Scope) -> Result<(), String> {
    let mut child = tokio::process::Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| e.to_string())?;

    let Some(mut stdout) = child.stdout.take() else {
        return Err("stdout unavailable".to_owned());
    };

    let mut buf = vec![0_u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            _ = scope.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Ok(());
            }
            read = stdout.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => worker.write(&buf[..n]),
                Err(e) => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    return Err(e.to_string());
                }
            },
        }
    }

    match child.wait().await {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(format!("command exited with {status}")),
        Err(e) => Err(e.to_string()),
    }
}
