//! 데몬 명령행 인자
//!
//! 로깅 관련 인자는 설정 파일과 환경 변수보다 우선합니다.

use std::path::PathBuf;

use clap::Parser;

/// tailpost 로그 테일링 데몬
///
/// 설정된 소스를 tail 하고, 멀티라인 레코드를 조립해 라우트 규칙과
/// 매칭한 뒤 통과한 레코드를 transfer로 내보냅니다.
#[derive(Parser, Debug)]
#[command(name = "tailpost-daemon", version, about, long_about = None)]
pub struct DaemonCli {
    /// tailpost.toml 설정 파일 경로
    #[arg(
        short,
        long,
        value_name = "PATH",
        default_value = "/etc/tailpost/tailpost.toml"
    )]
    pub config: PathBuf,

    /// 로그 레벨 오버라이드 (trace|debug|info|warn|error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// 로그 포맷 오버라이드 (json|pretty)
    #[arg(long, value_name = "FORMAT")]
    pub log_format: Option<String>,

    /// 설정 파일만 검증하고 데몬을 시작하지 않음
    #[arg(long)]
    pub validate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides_parse() {
        let cli = DaemonCli::try_parse_from(["tailpost-daemon"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/tailpost/tailpost.toml"));
        assert!(!cli.validate);
        assert!(cli.log_level.is_none());

        let cli = DaemonCli::try_parse_from([
            "tailpost-daemon",
            "--config",
            "custom.toml",
            "--log-level",
            "debug",
            "--log-format",
            "json",
            "--validate",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.log_format.as_deref(), Some("json"));
        assert!(cli.validate);
    }
}
