//! 서버 — 논리 소스 하나의 워커 집합
//!
//! [`Server`]는 tail 대상 하나(명령/명령 목록/생성 명령/파일)에 대한
//! 워커들을 소유합니다. 외부에서 주입된 데이터를 브로드캐스트하기 위한
//! 병합 워커를 하나 따로 둡니다. 일반 워커가 수신한 모든 청크는 병합
//! 워커에도 복제되어, 관리 계층이 병합 워커에 라우트를 붙이면 서버
//! 전체의 합쳐진 스트림을 구독할 수 있습니다.
//!
//! `command_gen` 소스는 명령 목록을 생성하는 명령입니다. 생성된 명령
//! 하나하나가 동적 워커가 되고, 그중 하나라도 종료를 보고하면 전체
//! 동적 워커를 정지하고 목록을 다시 생성합니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use tailpost_core::config::{PipelineSettings, ServerConfig};
use tailpost_core::scope::Scope;
use tailpost_core::transfer::Transfer;

use crate::filter::ResolvedRoute;
use crate::matcher::{Format, Matcher};
use crate::source::{exec_shell, follow_retry_tail_command, spawn_command_source};
use crate::worker::Worker;

/// 서버의 소스 지정
///
/// 설정의 `file`/`command_gen`/`commands`/`command` 중 하나로
/// 해석됩니다 (이 순서의 우선순위).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// 단일 tail 명령
    Command(String),
    /// 여러 tail 명령 (설정에서 개행 구분)
    Commands(Vec<String>),
    /// tail 명령 목록을 생성하는 명령 (동적 워커)
    CommandGen(String),
    /// tail 대상 파일 (`tail -F`로 변환)
    File(String),
    /// 소스 없음 (주입 전용)
    None,
}

impl SourceSpec {
    /// 서버 설정에서 소스 지정을 해석합니다.
    pub fn from_config(config: &ServerConfig) -> Self {
        if let Some(file) = &config.file {
            return Self::File(file.clone());
        }

        if let Some(generator) = &config.command_gen {
            return Self::CommandGen(generator.clone());
        }

        if let Some(commands) = &config.commands {
            let list: Vec<String> = commands
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(ToOwned::to_owned)
                .collect();

            return Self::Commands(list);
        }

        if let Some(command) = &config.command {
            return Self::Command(command.clone());
        }

        Self::None
    }
}

/// 논리 소스 하나의 실행 단위
pub struct Server {
    id: String,
    scope: Scope,
    format: Option<Arc<Format>>,
    settings: PipelineSettings,
    source: SourceSpec,
    merging: Arc<Worker>,
    workers: Mutex<HashMap<String, Arc<Worker>>>,
    routes: Mutex<Vec<ResolvedRoute>>,
    worker_seq: AtomicU64,
}

impl Server {
    /// 서버를 생성합니다. 스코프는 `parent`(Tailer)의 자식입니다.
    ///
    /// `routes`는 이 서버에 적용되는 라우터들의 해석 결과입니다. 아직
    /// 소스는 시작되지 않으며 [`Server::start`]가 워커를 만듭니다.
    pub fn new(
        id: impl Into<String>,
        source: SourceSpec,
        format: Option<Arc<Format>>,
        routes: Vec<ResolvedRoute>,
        settings: PipelineSettings,
        parent: &Scope,
    ) -> Arc<Self> {
        let id = id.into();
        let scope = parent.child();

        let merging = Worker::new(
            format!("{id}-merging"),
            id.as_str(),
            &scope,
            false,
            format.clone(),
            settings.clone(),
            None,
        );

        Arc::new(Self {
            id,
            scope,
            format,
            settings,
            source,
            merging,
            workers: Mutex::new(HashMap::new()),
            routes: Mutex::new(routes),
            worker_seq: AtomicU64::new(0),
        })
    }

    /// 서버 식별자
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 설정된 소스로 워커를 시작합니다.
    pub fn start(self: &Arc<Self>) {
        tracing::info!(server = %self.id, source = ?self.source, "server start");

        match self.source.clone() {
            SourceSpec::File(path) => {
                self.add_static_worker(follow_retry_tail_command(&path));
            }
            SourceSpec::CommandGen(generator) => {
                let server = Arc::clone(self);
                tokio::spawn(async move {
                    server.run_command_gen(generator).await;
                });
            }
            SourceSpec::Commands(commands) => {
                for command in commands {
                    self.add_static_worker(command);
                }
            }
            SourceSpec::Command(command) => {
                self.add_static_worker(command);
            }
            SourceSpec::None => {
                tracing::warn!(server = %self.id, "no source configured, inject only");
            }
        }
    }

    /// 외부 데이터를 첫 워커에 주입합니다 (소스에서 온 것처럼 처리).
    pub fn fire(&self, data: &[u8]) {
        let workers = self.lock_workers();

        let mut ids: Vec<&String> = workers.keys().collect();
        ids.sort();

        if let Some(first) = ids.first() {
            workers[first.as_str()].write(data);
        } else {
            tracing::warn!(server = %self.id, "fire with no live workers, data dropped");
        }
    }

    /// 외부 데이터를 병합 워커의 필터들로 브로드캐스트합니다.
    pub fn write(&self, data: &[u8]) {
        self.merging.write(data);
    }

    /// 병합 워커 — 서버 전체 스트림의 구독 지점
    pub fn merging_worker(&self) -> &Arc<Worker> {
        &self.merging
    }

    /// 라우트를 교체/추가하고 모든 라이브 워커에 전파합니다.
    ///
    /// 워커마다 같은 이름의 기존 필터를 먼저 정지한 뒤 새 필터를
    /// 시작합니다.
    pub fn set_route(&self, route: ResolvedRoute) {
        {
            let mut routes = self.lock_routes();

            if let Some(pos) = routes.iter().position(|r| r.name == route.name) {
                routes[pos] = route.clone();
            } else {
                routes.push(route.clone());
            }
        }

        for worker in self.worker_snapshot() {
            worker.set_route(route.clone());
        }
    }

    /// 같은 이름의 transfer 참조를 서버의 모든 필터에서 교체합니다.
    pub fn replace_transfer(&self, transfer: &Arc<dyn Transfer>) {
        {
            let mut routes = self.lock_routes();

            for route in routes.iter_mut() {
                for slot in &mut route.transfers {
                    if slot.name() == transfer.name() {
                        *slot = Arc::clone(transfer);
                    }
                }
            }
        }

        for worker in self.worker_snapshot() {
            worker.replace_transfer(transfer);
        }

        self.merging.replace_transfer(transfer);
    }

    /// 해당 이름의 transfer를 참조하는 필터가 있는지 확인합니다.
    pub fn uses_transfer(&self, name: &str) -> bool {
        if self
            .lock_routes()
            .iter()
            .any(|r| r.transfers.iter().any(|t| t.name() == name))
        {
            return true;
        }

        self.merging.filters().iter().any(|f| f.uses_transfer(name))
    }

    /// 특정 라우트의 매처 집합을 서버의 모든 필터에서 교체합니다.
    pub fn set_route_matchers(&self, route: &str, matchers: Vec<Arc<dyn Matcher>>) {
        for worker in self.worker_snapshot() {
            worker.set_route_matchers(route, matchers.clone());
        }

        self.merging.set_route_matchers(route, matchers);
    }

    /// 서버와 하위 워커/필터 전체를 정지합니다. 멱등입니다.
    pub fn stop(&self) {
        self.scope.stop_with(|| {
            tracing::info!(server = %self.id, "server stopping");
        });

        self.stop_workers();
        self.merging.stop();
    }

    /// 서버가 정지되었는지 확인합니다.
    pub fn is_stopped(&self) -> bool {
        self.scope.is_stopped()
    }

    /// 일반 워커 전체를 정지하고 목록에서 비웁니다 (병합 워커 제외).
    fn stop_workers(&self) {
        let drained: Vec<Arc<Worker>> = {
            let mut workers = self.lock_workers();
            workers.drain().map(|(_, w)| w).collect()
        };

        for worker in drained {
            worker.stop();
        }
    }

    fn add_static_worker(&self, command: String) {
        self.add_worker(command, false, None);
    }

    fn add_worker(
        &self,
        command: String,
        dynamic: bool,
        error_tx: Option<mpsc::Sender<tailpost_core::error::PipelineError>>,
    ) {
        let index = self.worker_seq.fetch_add(1, Ordering::SeqCst) + 1;

        let worker = Worker::new(
            format!("{}-{}", self.id, index),
            self.id.as_str(),
            &self.scope,
            dynamic,
            self.format.clone(),
            self.settings.clone(),
            Some(Arc::clone(&self.merging)),
        );

        for route in self.lock_routes().iter() {
            worker.set_route(route.clone());
        }

        self.lock_workers()
            .insert(worker.id().to_owned(), Arc::clone(&worker));

        spawn_command_source(
            worker,
            command,
            Duration::from_secs(self.settings.retry_interval_secs),
            error_tx,
        );
    }

    /// 생성 명령으로 동적 워커 집합을 운용하는 루프
    ///
    /// 동적 워커 하나가 종료를 보고하면 집합 전체를 정지하고, 고정
    /// 간격 후 명령 목록을 다시 생성합니다.
    async fn run_command_gen(self: Arc<Self>, generator: String) {
        loop {
            if self.scope.is_stopped() {
                break;
            }

            match exec_shell(&generator).await {
                Err(reason) => {
                    tracing::error!(server = %self.id, command = %generator, %reason, "command_gen failed");
                }
                Ok(output) => {
                    let commands: Vec<String> = String::from_utf8_lossy(&output)
                        .lines()
                        .map(str::trim)
                        .filter(|line| !line.is_empty())
                        .map(ToOwned::to_owned)
                        .collect();

                    if commands.is_empty() {
                        tracing::warn!(server = %self.id, command = %generator, "command_gen produced no commands");
                    } else {
                        let (tx, mut rx) = mpsc::channel(commands.len());

                        for command in commands {
                            self.add_worker(command, true, Some(tx.clone()));
                        }

                        drop(tx);

                        tokio::select! {
                            _ = self.scope.cancelled() => {
                                self.stop_workers();
                                break;
                            }
                            err = rx.recv() => {
                                if let Some(err) = err {
                                    tracing::error!(server = %self.id, error = %err, "dynamic worker stopped, regenerating");
                                }
                                self.stop_workers();
                            }
                        }
                    }
                }
            }

            tokio::select! {
                _ = self.scope.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(self.settings.retry_interval_secs)) => {}
            }
        }

        tracing::info!(server = %self.id, "command_gen loop stopped");
    }

    fn worker_snapshot(&self) -> Vec<Arc<Worker>> {
        self.lock_workers().values().cloned().collect()
    }

    fn lock_workers(&self) -> MutexGuard<'_, HashMap<String, Arc<Worker>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_routes(&self) -> MutexGuard<'_, Vec<ResolvedRoute>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
