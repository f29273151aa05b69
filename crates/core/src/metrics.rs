//! 메트릭 상수
//!
//! 모든 메트릭의 이름을 중앙에서 정의합니다. 각 크레이트는 이 상수로
//! `metrics::counter!()` / `metrics::gauge!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//! - 접두어: `tailpost_`
//! - 영역: `pipeline_`, `transfer_`, `source_`
//! - 접미어: `_total` (counter), 없음 (gauge)

// --- 레이블 키 상수 ---

/// 서버 이름 레이블 키
pub const LABEL_SERVER: &str = "server";

/// 라우트(필터) 이름 레이블 키
pub const LABEL_ROUTE: &str = "route";

/// transfer 이름 레이블 키
pub const LABEL_TRANSFER: &str = "transfer";

// --- 파이프라인 메트릭 ---

/// 워커가 수신한 청크 수 (counter)
pub const PIPELINE_CHUNKS_TOTAL: &str = "tailpost_pipeline_chunks_total";

/// 백프레셔로 드롭된 청크 수 (counter, label: route)
pub const PIPELINE_CHUNKS_DROPPED_TOTAL: &str = "tailpost_pipeline_chunks_dropped_total";

/// 매처를 통과해 전달된 레코드 수 (counter, label: route)
pub const PIPELINE_RECORDS_MATCHED_TOTAL: &str = "tailpost_pipeline_records_matched_total";

/// 전달 에러로 정지한 필터 수 (counter, label: route)
pub const PIPELINE_FILTER_STOPS_TOTAL: &str = "tailpost_pipeline_filter_stops_total";

/// 현재 살아있는 필터 수 (gauge)
pub const PIPELINE_FILTERS_ACTIVE: &str = "tailpost_pipeline_filters_active";

// --- 소스 메트릭 ---

/// 소스 실패 후 재시도 횟수 (counter, label: server)
pub const SOURCE_RETRIES_TOTAL: &str = "tailpost_source_retries_total";

// --- transfer 메트릭 ---

/// 싱크 전달 실패 수 (counter, label: transfer)
pub const TRANSFER_FAILURES_TOTAL: &str = "tailpost_transfer_failures_total";

/// 레이트 리밋으로 억제된 챗봇 메시지 수 (counter, label: transfer)
pub const TRANSFER_SUPPRESSED_TOTAL: &str = "tailpost_transfer_suppressed_total";
