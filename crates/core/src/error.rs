//! 에러 타입 — 도메인별 에러 정의

/// Tailpost 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum TailpostError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 전송(싱크) 에러
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
///
/// 설정 추가/검증 단계에서 동기적으로 거부됩니다. 이 에러가 반환되면
/// 기존 레지스트리 상태는 변경되지 않습니다.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// 이름 중복
    #[error("duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },

    /// 존재하지 않는 이름 참조
    #[error("{kind} not exists: {name}")]
    UnknownReference { kind: &'static str, name: String },

    /// 필수 필드 누락
    #[error("missing required field '{field}' for {kind} '{name}'")]
    MissingField {
        kind: &'static str,
        name: String,
        field: &'static str,
    },

    /// 지원하지 않는 transfer 타입
    #[error("invalid transfer type: {0}")]
    UnknownTransferType(String),
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 삭제 대상이 아직 다른 설정에서 참조되는 중
    #[error("{kind} is in use: {name}")]
    ResourceInUse { kind: &'static str, name: String },

    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 외부 소스(명령/파일) 실패
    #[error("source failed for worker [{worker}]: {reason}")]
    SourceFailed { worker: String, reason: String },

    /// 이미 정지된 컴포넌트에 대한 요청
    #[error("component stopped: {0}")]
    Stopped(String),
}

/// 전송(싱크) 에러
///
/// `Transfer::trans`가 이 에러를 반환하면 해당 전달 시도가 실패한 것이며,
/// 호출한 Filter는 정지 정책을 따릅니다. 재시도/배칭은 싱크 내부 책임입니다.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// 싱크 리소스 획득 실패
    #[error("transfer [{name}] start failed: {reason}")]
    Start { name: String, reason: String },

    /// 전달 시도 실패
    #[error("transfer [{name}] delivery failed: {reason}")]
    Deliver { name: String, reason: String },

    /// 정지된 싱크로의 전달 시도
    #[error("transfer [{name}] already stopped")]
    Stopped { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let err = ConfigError::UnknownReference {
            kind: "router",
            name: "errors".to_owned(),
        };
        assert_eq!(err.to_string(), "router not exists: errors");

        let err: TailpostError = PipelineError::ResourceInUse {
            kind: "transfer",
            name: "ding1".to_owned(),
        }
        .into();
        assert!(err.to_string().contains("transfer is in use: ding1"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TailpostError = io.into();
        assert!(matches!(err, TailpostError::Io(_)));
    }
}
