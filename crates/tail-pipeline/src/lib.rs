#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`matcher`]: 와일드카드/포함 매처와 레코드 경계 포맷
//! - [`record`]: 청크 스트림에서 멀티라인 레코드 조립
//! - [`filter`]: (워커, 라우트) 쌍의 매칭/전달 실행 단위
//! - [`worker`]: 청크 소스 하나와 필터 팬아웃
//! - [`server`]: 논리 소스 하나의 워커 집합 + 병합 워커
//! - [`source`]: 외부 명령 실행과 stdout 청크 공급
//! - [`tailer`]: 최상위 레지스트리와 핫 재설정

pub mod filter;
pub mod matcher;
pub mod record;
pub mod server;
pub mod source;
pub mod tailer;
pub mod worker;

// --- 주요 타입 re-export ---

// 매처
pub use matcher::{ContainsMatcher, Format, Matcher, build_matchers, wildcard_match};

// 레코드 조립
pub use record::{ChunkFetch, RecordAssembler};

// 파이프라인 컴포넌트
pub use filter::{Filter, ResolvedRoute};
pub use server::{Server, SourceSpec};
pub use worker::Worker;

// 소스
pub use source::follow_retry_tail_command;

// 최상위 레지스트리
pub use tailer::{Tailer, TransferFactory};
