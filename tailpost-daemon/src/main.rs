use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use tailpost_core::config::TailpostConfig;
use tailpost_tail_pipeline::{Tailer, TransferFactory};

mod cli;
mod logging;

use cli::DaemonCli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // 설정 로드 (환경 변수 오버라이드 + 검증 포함)
    let mut config = TailpostConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", cli.config.display(), e))?;

    // CLI 오버라이드는 설정 파일과 환경 변수보다 우선
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }

    if cli.validate {
        println!("configuration {} is valid", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;

    tracing::info!(config = %cli.config.display(), "tailpost-daemon starting");

    // 싱크 팩토리: 설정의 [transfers.*] 항목을 실제 싱크 인스턴스로 변환
    let factory: TransferFactory = Arc::new(|name, transfer_config| {
        tailpost_transfer::build_transfer(name, transfer_config)
    });

    let tailer = Tailer::new(config, factory)
        .map_err(|e| anyhow::anyhow!("failed to build tailer: {}", e))?;

    tailer
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start tailer: {}", e))?;
    tracing::info!("tailer started, servers active");

    // 종료 시그널 대기
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    // 우아한 종료
    tailer.stop().await;

    tracing::info!("tailpost-daemon shut down");
    Ok(())
}
