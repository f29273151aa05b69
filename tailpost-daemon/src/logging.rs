//! 데몬 로깅 초기화
//!
//! `[general]` 섹션의 `log_level`/`log_format`으로 전역 tracing
//! 구독자를 구성합니다. `RUST_LOG` 환경 변수가 있으면 필터는 그쪽이
//! 우선합니다.

use anyhow::{Context, Result, bail};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use tailpost_core::config::GeneralConfig;

/// 전역 tracing 구독자를 설치합니다. 프로세스당 한 번만 호출해야 합니다.
///
/// `log_format`은 `json`(기계 파싱용) 또는 `pretty`(개발용)입니다.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let subscriber = tracing_subscriber::registry().with(default_filter(&config.log_level));

    let format_layer = match config.log_format.as_str() {
        "json" => fmt::layer().json().boxed(),
        "pretty" => fmt::layer().pretty().boxed(),
        other => bail!("unknown log format '{other}', expected 'json' or 'pretty'"),
    };

    subscriber
        .with(format_layer)
        .try_init()
        .context("failed to install tracing subscriber")
}

/// `RUST_LOG`가 없으면 설정 레벨에 HTTP 클라이언트 소음 억제를 더한
/// 기본 필터를 만듭니다.
fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},hyper=warn,reqwest=warn")))
}
