//! 설정 관리 — tailpost.toml 파싱 및 런타임 설정
//!
//! [`TailpostConfig`]는 데몬 전체의 설정을 담는 최상위 구조체입니다.
//! 이름으로 구분되는 세 레지스트리(transfers/routers/servers)와
//! 파이프라인 튜닝 값, 로깅 설정을 포함합니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선, 데몬에서 적용)
//! 2. 환경변수 (`TAILPOST_GENERAL_LOG_LEVEL=debug` 형식)
//! 3. 설정 파일 (`tailpost.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), tailpost_core::error::TailpostError> {
//! use tailpost_core::config::TailpostConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = TailpostConfig::load("tailpost.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = TailpostConfig::parse("[servers.app]\ncommand = \"tail -F /var/log/app.log\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, TailpostError};

/// Tailpost 통합 설정
///
/// `tailpost.toml` 파일의 최상위 구조를 나타냅니다.
/// 레지스트리 항목의 이름은 테이블 키이므로 중복될 수 없습니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TailpostConfig {
    /// 일반 설정 (로깅)
    #[serde(default)]
    pub general: GeneralConfig,
    /// 파이프라인 튜닝 값
    #[serde(default)]
    pub pipeline: PipelineSettings,
    /// 기본 레코드 경계 포맷. 서버별 포맷이 없으면 이 값을 사용합니다.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_format: Option<FormatConfig>,
    /// 라우터가 없는 서버에 적용할 라우터 이름 목록
    #[serde(default)]
    pub default_routers: Vec<String>,
    /// 모든 서버에 추가로 적용할 라우터 이름 목록
    #[serde(default)]
    pub global_routers: Vec<String>,
    /// 이름별 아웃바운드 싱크 설정
    #[serde(default)]
    pub transfers: BTreeMap<String, TransferConfig>,
    /// 이름별 라우팅 정책 설정
    #[serde(default)]
    pub routers: BTreeMap<String, RouterConfig>,
    /// 이름별 tail 대상 설정
    #[serde(default)]
    pub servers: BTreeMap<String, ServerConfig>,
}

/// 일반 설정
///
/// 일부 필드만 있는 부분 테이블도 허용하며, 빠진 필드는 기본값을
/// 사용합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 포맷 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 파이프라인 튜닝 값
///
/// 일부 필드만 있는 부분 테이블도 허용하며, 빠진 필드는 기본값을
/// 사용합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Filter 인바운드 큐 용량 (청크 개수)
    pub channel_capacity: usize,
    /// 레코드 연속 청크 대기 시간 (밀리초)
    ///
    /// 청크 경계에서 레코드가 잘린 경우 다음 청크를 이 시간만큼만
    /// 기다립니다. 완전성과 지연 사이의 트레이드오프이며 정확성에는
    /// 영향을 주지 않습니다.
    pub read_next_timeout_ms: u64,
    /// 정적 소스 실패 시 재시도 간격 (초)
    pub retry_interval_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 16,
            read_next_timeout_ms: 60,
            retry_interval_secs: 10,
        }
    }
}

/// 레코드 경계 포맷 설정
///
/// `prefix`는 새 레코드를 시작하는 물리 라인의 접두 와일드카드입니다.
/// 와일드카드 문법: `?`=임의 바이트, `~`=알파벳, `!`=숫자, 그 외=리터럴.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatConfig {
    /// 라인 접두 와일드카드 (예: `"!!!!-!!-!!"`)
    pub prefix: String,
}

/// 싱크 타입 태그
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    /// 원시 레코드를 HTTP POST
    Webhook,
    /// 딩톡 챗봇 메시지
    Ding,
    /// 라크(페이슈) 챗봇 메시지
    Lark,
    /// 디렉토리 내 로그 파일 기록
    File,
    /// 표준 출력
    Console,
    /// 폐기 (테스트/벤치용)
    Null,
}

impl TransferKind {
    /// 태그 문자열을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Ding => "ding",
            Self::Lark => "lark",
            Self::File => "file",
            Self::Console => "console",
            Self::Null => "null",
        }
    }
}

/// 아웃바운드 싱크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// 싱크 타입
    #[serde(rename = "type")]
    pub kind: TransferKind,
    /// webhook/ding/lark의 대상 URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// file 싱크의 출력 디렉토리
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    /// 챗봇 메시지 제목 접두어
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// 매처 설정 — contains/not_contains 패턴 묶음
///
/// 하나의 설정에서 생성된 매처들은 모두 AND로 결합됩니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// 레코드가 포함해야 하는 패턴 목록
    #[serde(default)]
    pub contains: Vec<String>,
    /// 레코드가 포함하면 안 되는 패턴 목록
    #[serde(default)]
    pub not_contains: Vec<String>,
}

/// 라우팅 정책 설정 — 매처 집합 + 싱크 참조 목록
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    /// 매처 설정 목록 (비어 있으면 모든 레코드 매칭)
    #[serde(default)]
    pub matchers: Vec<MatcherConfig>,
    /// 참조하는 transfer 이름 목록
    #[serde(default)]
    pub transfers: Vec<String>,
}

/// tail 대상 설정
///
/// `command`/`commands`/`command_gen`/`file` 중 하나로 소스를 지정합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 단일 tail 명령
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// 개행으로 구분된 여러 tail 명령
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<String>,
    /// tail 명령 목록을 생성하는 명령 (동적 워커)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_gen: Option<String>,
    /// tail 대상 파일 경로 (`tail -F`로 변환됨)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// 서버별 레코드 경계 포맷 (없으면 default_format)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatConfig>,
    /// 참조하는 라우터 이름 목록
    #[serde(default)]
    pub routers: Vec<String>,
}

impl TailpostConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TailpostError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, TailpostError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TailpostError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                TailpostError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, TailpostError> {
        toml::from_str(toml_str).map_err(|e| {
            TailpostError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `TAILPOST_{SECTION}_{FIELD}`
    /// 예: `TAILPOST_GENERAL_LOG_LEVEL=debug`
    pub fn apply_env_overrides(&mut self) {
        override_string(&mut self.general.log_level, "TAILPOST_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "TAILPOST_GENERAL_LOG_FORMAT");

        override_usize(
            &mut self.pipeline.channel_capacity,
            "TAILPOST_PIPELINE_CHANNEL_CAPACITY",
        );
        override_u64(
            &mut self.pipeline.read_next_timeout_ms,
            "TAILPOST_PIPELINE_READ_NEXT_TIMEOUT_MS",
        );
        override_u64(
            &mut self.pipeline.retry_interval_secs,
            "TAILPOST_PIPELINE_RETRY_INTERVAL_SECS",
        );
    }

    /// 설정 전체의 유효성을 검증합니다.
    ///
    /// 레지스트리 간 참조(서버→라우터, 라우터→transfer)가 모두 존재하는지,
    /// 싱크 타입별 필수 필드가 채워졌는지 확인합니다. 실패 시 아무것도
    /// 적용되지 않습니다.
    pub fn validate(&self) -> Result<(), TailpostError> {
        self.pipeline.validate()?;

        for (name, transfer) in &self.transfers {
            check_transfer_config(name, transfer)?;
        }

        for (name, router) in &self.routers {
            self.check_router_config(name, router)?;
        }

        self.check_router_refs(&self.default_routers)?;
        self.check_router_refs(&self.global_routers)?;

        for (name, server) in &self.servers {
            self.check_server_config(name, server)?;
        }

        Ok(())
    }

    /// 서버 설정 하나를 기존 레지스트리에 대해 검증합니다.
    pub fn check_server_config(
        &self,
        name: &str,
        server: &ServerConfig,
    ) -> Result<(), TailpostError> {
        if server.command.is_none()
            && server.commands.is_none()
            && server.command_gen.is_none()
            && server.file.is_none()
        {
            tracing::warn!(server = name, "no tailing command/file config");
        }

        self.check_router_refs(&server.routers)
    }

    /// 라우터 설정 하나를 기존 레지스트리에 대해 검증합니다.
    pub fn check_router_config(
        &self,
        name: &str,
        router: &RouterConfig,
    ) -> Result<(), TailpostError> {
        for matcher in &router.matchers {
            check_matcher_config(name, matcher)?;
        }

        for transfer in &router.transfers {
            if !self.transfers.contains_key(transfer) {
                return Err(ConfigError::UnknownReference {
                    kind: "transfer",
                    name: transfer.clone(),
                }
                .into());
            }
        }

        Ok(())
    }

    fn check_router_refs(&self, routers: &[String]) -> Result<(), TailpostError> {
        for router in routers {
            if !self.routers.contains_key(router) {
                return Err(ConfigError::UnknownReference {
                    kind: "router",
                    name: router.clone(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// 서버에 적용할 라우터 이름 목록을 계산합니다.
    ///
    /// 서버 자신의 라우터가 없으면 `default_routers`를, 그 위에 항상
    /// `global_routers`를 덧붙입니다. 같은 이름은 한 번만 포함됩니다.
    pub fn effective_routers(&self, server: &ServerConfig) -> Vec<String> {
        let mut names: Vec<String> = if server.routers.is_empty() {
            self.default_routers.clone()
        } else {
            server.routers.clone()
        };

        for name in &self.global_routers {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }

        names
    }
}

impl PipelineSettings {
    /// 튜닝 값의 범위를 검증합니다.
    pub fn validate(&self) -> Result<(), TailpostError> {
        const MAX_CHANNEL_CAPACITY: usize = 65_536;
        const MAX_READ_NEXT_TIMEOUT_MS: u64 = 60_000;

        if self.channel_capacity == 0 || self.channel_capacity > MAX_CHANNEL_CAPACITY {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.channel_capacity".to_owned(),
                reason: format!("must be 1-{MAX_CHANNEL_CAPACITY}"),
            }
            .into());
        }

        if self.read_next_timeout_ms == 0 || self.read_next_timeout_ms > MAX_READ_NEXT_TIMEOUT_MS {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.read_next_timeout_ms".to_owned(),
                reason: format!("must be 1-{MAX_READ_NEXT_TIMEOUT_MS}"),
            }
            .into());
        }

        if self.retry_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.retry_interval_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// transfer 설정 하나를 검증합니다 (타입별 필수 필드).
pub fn check_transfer_config(name: &str, config: &TransferConfig) -> Result<(), TailpostError> {
    match config.kind {
        TransferKind::Webhook | TransferKind::Ding | TransferKind::Lark => {
            if config.url.as_deref().unwrap_or("").is_empty() {
                return Err(ConfigError::MissingField {
                    kind: "transfer",
                    name: name.to_owned(),
                    field: "url",
                }
                .into());
            }
        }
        TransferKind::File => {
            if config.dir.as_deref().unwrap_or("").is_empty() {
                return Err(ConfigError::MissingField {
                    kind: "transfer",
                    name: name.to_owned(),
                    field: "dir",
                }
                .into());
            }
        }
        TransferKind::Console | TransferKind::Null => {}
    }

    Ok(())
}

/// 매처 설정 하나를 검증합니다 (빈 패턴 금지).
pub fn check_matcher_config(router: &str, config: &MatcherConfig) -> Result<(), TailpostError> {
    for pattern in config.contains.iter().chain(config.not_contains.iter()) {
        if pattern.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("routers.{router}.matchers"),
                reason: "matcher pattern must not be empty".to_owned(),
            }
            .into());
        }
    }

    Ok(())
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(field: &mut String, env_key: &str) {
    if let Ok(value) = std::env::var(env_key)
        && !value.is_empty()
    {
        *field = value;
    }
}

fn override_u64(field: &mut u64, env_key: &str) {
    if let Ok(value) = std::env::var(env_key) {
        match value.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => tracing::warn!(env = env_key, value, "ignoring non-numeric env override"),
        }
    }
}

fn override_usize(field: &mut usize, env_key: &str) {
    if let Ok(value) = std::env::var(env_key) {
        match value.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => tracing::warn!(env = env_key, value, "ignoring non-numeric env override"),
        }
    }
}
