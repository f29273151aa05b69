#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod metrics;
pub mod scope;
pub mod transfer;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{ConfigError, PipelineError, TailpostError, TransferError};

// 설정
pub use config::{
    FormatConfig, GeneralConfig, MatcherConfig, PipelineSettings, RouterConfig, ServerConfig,
    TailpostConfig, TransferConfig, TransferKind,
};

// 취소 스코프
pub use scope::Scope;

// 싱크 계약
pub use transfer::Transfer;
