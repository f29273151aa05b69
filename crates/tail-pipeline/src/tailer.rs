//! Tailer — 서버/라우터/transfer 최상위 레지스트리
//!
//! [`Tailer`]는 실행 컨텍스트 객체입니다. 설정과 라이브 컴포넌트
//! 레지스트리를 소유하고, 핫 추가/삭제(관리 연산)와 전체 수명주기를
//! 담당합니다. 전역 상태는 없으며 기본 포맷 같은 프로세스 전역값도
//! 이 객체의 설정을 통해 명시적으로 전달됩니다.
//!
//! # 잠금 규칙
//! 레지스트리는 하나의 coarse 락으로 보호하며, 락은 레지스트리
//! 변경(과 필터 바인딩 교체) 동안만 유지합니다. 레코드 전달은 필터
//! 자신의 락으로만 보호되므로 느린 transfer가 다른 필터의 재설정을
//! 막을 수 없습니다.
//!
//! # 검증 규칙
//! 모든 관리 연산은 레지스트리를 변경하기 전에 설정을 검증합니다.
//! 에러가 반환되면 기존 상태는 그대로입니다. 삭제는 설정 그래프
//! 스캔으로 사용 중 여부를 확인해 거부합니다 (참조 카운트가 아니라
//! 설정 기준).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use tailpost_core::config::{
    MatcherConfig, RouterConfig, ServerConfig, TailpostConfig, TransferConfig,
    check_matcher_config, check_transfer_config,
};
use tailpost_core::error::{ConfigError, PipelineError, TailpostError};
use tailpost_core::scope::Scope;
use tailpost_core::transfer::Transfer;

use crate::filter::ResolvedRoute;
use crate::matcher::{Format, build_matchers};
use crate::server::{Server, SourceSpec};

/// 설정에서 transfer 인스턴스를 만드는 팩토리
///
/// 구체 싱크 구현은 별도 크레이트에 있으므로 Tailer는 이 팩토리를
/// 주입받습니다.
pub type TransferFactory =
    Arc<dyn Fn(&str, &TransferConfig) -> Result<Arc<dyn Transfer>, TailpostError> + Send + Sync>;

/// 레지스트리 내부 상태 — coarse 락 아래에서만 접근
struct TailerState {
    config: TailpostConfig,
    servers: HashMap<String, Arc<Server>>,
    transfers: HashMap<String, Arc<dyn Transfer>>,
}

/// 최상위 레지스트리 겸 실행 컨텍스트
pub struct Tailer {
    scope: Scope,
    factory: TransferFactory,
    state: Mutex<TailerState>,
}

impl Tailer {
    /// 검증된 설정으로 Tailer를 생성합니다. 아직 아무것도 시작하지
    /// 않습니다.
    pub fn new(config: TailpostConfig, factory: TransferFactory) -> Result<Self, TailpostError> {
        config.validate()?;

        Ok(Self {
            scope: Scope::new(),
            factory,
            state: Mutex::new(TailerState {
                config,
                servers: HashMap::new(),
                transfers: HashMap::new(),
            }),
        })
    }

    /// 최상위 취소 스코프
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// 설정의 모든 transfer와 서버를 시작합니다.
    pub async fn start(&self) -> Result<(), TailpostError> {
        let mut state = self.state.lock().await;

        let transfer_configs: Vec<(String, TransferConfig)> = state
            .config
            .transfers
            .iter()
            .map(|(name, config)| (name.clone(), config.clone()))
            .collect();

        for (name, config) in transfer_configs {
            self.start_transfer(&mut state, &name, &config)?;
        }

        let server_configs: Vec<(String, ServerConfig)> = state
            .config
            .servers
            .iter()
            .map(|(name, config)| (name.clone(), config.clone()))
            .collect();

        for (name, config) in server_configs {
            if let Err(err) = self.start_server(&mut state, &name, &config) {
                tracing::error!(server = %name, error = %err, "server start failed");
            }
        }

        tracing::info!("tailer started");
        Ok(())
    }

    /// 모든 서버와 transfer를 정지합니다. 멱등입니다.
    pub async fn stop(&self) {
        let state = self.state.lock().await;

        self.scope.stop_with(|| {
            tracing::info!("tailer stopping");
        });

        for server in state.servers.values() {
            server.stop();
        }

        for transfer in state.transfers.values() {
            if let Err(err) = transfer.stop() {
                tracing::warn!(transfer = %transfer.name(), error = %err, "transfer stop failed");
            }
        }
    }

    // --- 관리 연산 ---

    /// transfer를 추가하거나 같은 이름의 것을 교체합니다.
    ///
    /// 교체는 필터 단위로 원자적입니다. 진행 중인 전달은 이전
    /// 인스턴스로 완결되고, 다음 전달부터 새 인스턴스를 사용합니다.
    pub async fn add_transfer(
        &self,
        name: &str,
        config: TransferConfig,
    ) -> Result<(), TailpostError> {
        check_transfer_config(name, &config)?;

        let mut state = self.state.lock().await;
        self.start_transfer(&mut state, name, &config)?;
        state.config.transfers.insert(name.to_owned(), config);

        Ok(())
    }

    /// transfer를 삭제합니다. 라우터가 참조 중이면 거부합니다.
    pub async fn delete_transfer(&self, name: &str) -> Result<(), TailpostError> {
        let mut state = self.state.lock().await;

        let in_use = state
            .config
            .routers
            .values()
            .any(|router| router.transfers.iter().any(|t| t == name));

        if in_use {
            return Err(PipelineError::ResourceInUse {
                kind: "transfer",
                name: name.to_owned(),
            }
            .into());
        }

        if let Some(old) = state.transfers.remove(name) {
            if let Err(err) = old.stop() {
                tracing::warn!(transfer = name, error = %err, "transfer stop failed");
            }
        }

        state.config.transfers.remove(name);
        tracing::info!(transfer = name, "transfer deleted");

        Ok(())
    }

    /// 라우터를 추가하거나 같은 이름의 것을 교체합니다.
    ///
    /// 교체된 라우터를 쓰는 라이브 서버마다 기존 필터를 정지하고 새
    /// 필터를 시작합니다 (stop-old-then-start-new).
    pub async fn add_router(&self, name: &str, config: RouterConfig) -> Result<(), TailpostError> {
        let mut state = self.state.lock().await;

        state.config.check_router_config(name, &config)?;
        let route = resolve_route_config(&state, name, &config)?;
        state.config.routers.insert(name.to_owned(), config);

        for (server_name, server) in &state.servers {
            let Some(server_config) = state.config.servers.get(server_name) else {
                continue;
            };

            if state
                .config
                .effective_routers(server_config)
                .iter()
                .any(|r| r == name)
            {
                server.set_route(route.clone());
            }
        }

        tracing::info!(router = name, "router applied");
        Ok(())
    }

    /// 라우터를 삭제합니다. 서버가 참조 중이면 거부합니다.
    pub async fn delete_router(&self, name: &str) -> Result<(), TailpostError> {
        let mut state = self.state.lock().await;

        let referenced_by_servers = state.config.servers.values().any(|server| {
            state
                .config
                .effective_routers(server)
                .iter()
                .any(|r| r == name)
        });

        let referenced_globally = state.config.default_routers.iter().any(|r| r == name)
            || state.config.global_routers.iter().any(|r| r == name);

        if referenced_by_servers || referenced_globally {
            return Err(PipelineError::ResourceInUse {
                kind: "router",
                name: name.to_owned(),
            }
            .into());
        }

        state.config.routers.remove(name);
        tracing::info!(router = name, "router deleted");

        Ok(())
    }

    /// 서버를 추가합니다. 같은 이름의 기존 서버는 먼저 정지됩니다.
    pub async fn add_server(&self, name: &str, config: ServerConfig) -> Result<(), TailpostError> {
        let mut state = self.state.lock().await;

        state.config.check_server_config(name, &config)?;
        self.start_server(&mut state, name, &config)?;
        state.config.servers.insert(name.to_owned(), config);

        Ok(())
    }

    /// 서버를 정지하고 삭제합니다.
    pub async fn delete_server(&self, name: &str) -> Result<(), TailpostError> {
        let mut state = self.state.lock().await;

        if let Some(server) = state.servers.remove(name) {
            server.stop();
        }

        state.config.servers.remove(name);
        tracing::info!(server = name, "server deleted");

        Ok(())
    }

    /// 서버에 원시 바이트를 주입합니다 (소스에서 온 것처럼 처리).
    pub async fn inject(&self, server: &str, data: &[u8]) -> Result<(), TailpostError> {
        let state = self.state.lock().await;

        let Some(live) = state.servers.get(server) else {
            return Err(ConfigError::UnknownReference {
                kind: "server",
                name: server.to_owned(),
            }
            .into());
        };

        live.fire(data);
        Ok(())
    }

    /// 라이브 필터의 매처 집합을 교체합니다.
    ///
    /// 레지스트리의 라우터 설정도 함께 갱신되므로 이후 생성되는 필터도
    /// 새 매처를 사용합니다.
    pub async fn update_router_matchers(
        &self,
        router: &str,
        matchers: Vec<MatcherConfig>,
    ) -> Result<(), TailpostError> {
        for config in &matchers {
            check_matcher_config(router, config)?;
        }

        let built = build_matchers(&matchers)?;

        let mut state = self.state.lock().await;

        let Some(router_config) = state.config.routers.get_mut(router) else {
            return Err(ConfigError::UnknownReference {
                kind: "router",
                name: router.to_owned(),
            }
            .into());
        };

        router_config.matchers = matchers;

        for server in state.servers.values() {
            server.set_route_matchers(router, built.clone());
        }

        Ok(())
    }

    /// JSON 직렬화된 매처 설정 목록으로 매처 집합을 교체합니다.
    ///
    /// 관리 계층이 직렬화 페이로드를 그대로 넘길 수 있는 편의
    /// 연산입니다.
    pub async fn update_router_matchers_json(
        &self,
        router: &str,
        payload: &str,
    ) -> Result<(), TailpostError> {
        let matchers: Vec<MatcherConfig> = serde_json::from_str(payload).map_err(|e| {
            ConfigError::ParseFailed {
                reason: e.to_string(),
            }
        })?;

        self.update_router_matchers(router, matchers).await
    }

    // --- 내부 헬퍼 (state 락 아래에서 호출) ---

    /// transfer를 생성/시작하고, 같은 이름의 기존 인스턴스가 있으면
    /// 모든 라이브 필터에서 교체한 뒤 정지합니다.
    fn start_transfer(
        &self,
        state: &mut TailerState,
        name: &str,
        config: &TransferConfig,
    ) -> Result<(), TailpostError> {
        let transfer = (self.factory)(name, config)?;
        transfer.start()?;

        tracing::info!(transfer = name, kind = config.kind.as_str(), "transfer started");

        let old = state.transfers.insert(name.to_owned(), Arc::clone(&transfer));

        if let Some(old) = old {
            for server in state.servers.values() {
                server.replace_transfer(&transfer);
            }

            if let Err(err) = old.stop() {
                tracing::warn!(transfer = name, error = %err, "old transfer stop failed");
            }
        }

        Ok(())
    }

    /// 서버를 생성/시작합니다. 같은 이름의 기존 서버는 먼저 정지합니다.
    fn start_server(
        &self,
        state: &mut TailerState,
        name: &str,
        config: &ServerConfig,
    ) -> Result<(), TailpostError> {
        let format = config
            .format
            .as_ref()
            .or(state.config.default_format.as_ref())
            .map(|f| Arc::new(Format::from_config(f)));

        let mut routes = Vec::new();
        for router_name in state.config.effective_routers(config) {
            routes.push(resolve_route(state, &router_name)?);
        }

        if let Some(existing) = state.servers.remove(name) {
            existing.stop();
        }

        let server = Server::new(
            name,
            SourceSpec::from_config(config),
            format,
            routes,
            state.config.pipeline.clone(),
            &self.scope,
        );
        server.start();

        state.servers.insert(name.to_owned(), server);
        Ok(())
    }
}

/// 라우터 이름을 라이브 transfer 레지스트리에 대해 해석합니다.
fn resolve_route(state: &TailerState, name: &str) -> Result<ResolvedRoute, TailpostError> {
    let Some(config) = state.config.routers.get(name) else {
        return Err(ConfigError::UnknownReference {
            kind: "router",
            name: name.to_owned(),
        }
        .into());
    };

    resolve_route_config(state, name, config)
}

/// 라우터 설정 하나를 라이브 transfer 레지스트리에 대해 해석합니다.
fn resolve_route_config(
    state: &TailerState,
    name: &str,
    config: &RouterConfig,
) -> Result<ResolvedRoute, TailpostError> {
    let matchers = build_matchers(&config.matchers)?;

    let mut transfers = Vec::new();
    for transfer_name in &config.transfers {
        let Some(transfer) = state.transfers.get(transfer_name) else {
            return Err(ConfigError::UnknownReference {
                kind: "transfer",
                name: transfer_name.clone(),
            }
            .into());
        };

        transfers.push(Arc::clone(transfer));
    }

    Ok(ResolvedRoute {
        name: name.to_owned(),
        matchers,
        transfers,
    })
}
