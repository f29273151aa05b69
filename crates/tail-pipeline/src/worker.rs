//! 워커 — 원시 청크 소스 하나와 필터 팬아웃
//!
//! [`Worker`]는 tail 명령/파일 하나의 출력 스트림을 소유하고, 수신한
//! 청크를 자신에게 붙은 모든 필터에 팬아웃합니다. 소스 읽기 버퍼와의
//! 앨리어싱을 피하기 위해 청크마다 사본을 한 번 만들고, 필터 간에는
//! 그 불변 사본을 공유합니다.
//!
//! `dynamic=true` 워커의 소스는 다른 명령 실행으로 생성된 것이므로
//! 실패를 스스로 재시도하지 않고 소유 서버에 한 번 보고한 뒤
//! 정지합니다. 서버가 워커 집합을 다시 생성합니다.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use tailpost_core::config::PipelineSettings;
use tailpost_core::metrics::PIPELINE_CHUNKS_TOTAL;
use tailpost_core::scope::Scope;
use tailpost_core::transfer::Transfer;

use crate::filter::{Filter, ResolvedRoute};
use crate::matcher::{Format, Matcher};

/// 청크 소스 하나의 실행 단위
pub struct Worker {
    id: String,
    source_id: String,
    dynamic: bool,
    scope: Scope,
    format: Option<Arc<Format>>,
    settings: PipelineSettings,
    filters: Mutex<Vec<Arc<Filter>>>,
    /// 일반 워커가 수신 청크를 복제해 넘기는 병합 워커
    mirror: Option<Arc<Worker>>,
}

impl Worker {
    /// 워커를 생성합니다. 스코프는 `parent`(서버)의 자식입니다.
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        parent: &Scope,
        dynamic: bool,
        format: Option<Arc<Format>>,
        settings: PipelineSettings,
        mirror: Option<Arc<Worker>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            source_id: source_id.into(),
            dynamic,
            scope: parent.child(),
            format,
            settings,
            filters: Mutex::new(Vec::new()),
            mirror,
        })
    }

    /// 워커 식별자 (`{server}-{n}`)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 소유 서버(논리 소스) 이름
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// 동적(생성된 명령) 워커인지 여부
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// 워커의 취소 스코프
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// 소스에서 읽은 청크를 모든 필터에 팬아웃합니다.
    ///
    /// `data`는 소스의 재사용 버퍼일 수 있으므로 여기서 사본을 만들고,
    /// 이후로는 불변 `Bytes`만 공유합니다.
    pub fn write(&self, data: &[u8]) {
        if self.scope.is_stopped() || data.is_empty() {
            return;
        }

        metrics::counter!(PIPELINE_CHUNKS_TOTAL).increment(1);

        let chunk = Bytes::copy_from_slice(data);
        self.fan_out(chunk.clone());

        if let Some(mirror) = &self.mirror {
            mirror.fan_out(chunk);
        }
    }

    fn fan_out(&self, chunk: Bytes) {
        for filter in self.lock_filters().iter() {
            filter.receive(chunk.clone());
        }
    }

    /// 라우트를 이 워커에 활성화합니다.
    ///
    /// 같은 이름의 기존 필터가 있으면 먼저 정지한 뒤 새 필터를
    /// 시작합니다 (stop-old-then-start-new, 동시 실행 없음).
    pub fn set_route(&self, route: ResolvedRoute) {
        if self.scope.is_stopped() {
            return;
        }

        let mut filters = self.lock_filters();

        if let Some(pos) = filters.iter().position(|f| f.route_name() == route.name) {
            let old = filters.remove(pos);
            old.stop();
        }

        let filter = Filter::spawn(
            &self.id,
            &self.source_id,
            route,
            &self.scope,
            self.format.clone(),
            &self.settings,
        );

        filters.push(filter);
    }

    /// 라우트를 이 워커에서 제거하고 해당 필터를 정지합니다.
    pub fn remove_route(&self, name: &str) {
        let mut filters = self.lock_filters();

        if let Some(pos) = filters.iter().position(|f| f.route_name() == name) {
            let old = filters.remove(pos);
            old.stop();
        }
    }

    /// 현재 필터 목록의 스냅샷을 반환합니다.
    pub fn filters(&self) -> Vec<Arc<Filter>> {
        self.lock_filters().clone()
    }

    /// 같은 이름의 transfer 참조를 모든 필터에서 교체합니다.
    pub fn replace_transfer(&self, transfer: &Arc<dyn Transfer>) {
        for filter in self.filters() {
            filter.replace_transfer(transfer);
        }
    }

    /// 특정 라우트의 매처 집합을 교체합니다.
    pub fn set_route_matchers(&self, route: &str, matchers: Vec<Arc<dyn Matcher>>) {
        for filter in self.filters() {
            if filter.route_name() == route {
                filter.set_matchers(matchers.clone());
            }
        }
    }

    /// 워커와 소속 필터 전체를 정지합니다. 멱등입니다.
    pub fn stop(&self) {
        self.scope.stop_with(|| {
            tracing::info!(worker = %self.id, "worker stopping");
        });

        for filter in self.filters() {
            filter.stop();
        }
    }

    fn lock_filters(&self) -> MutexGuard<'_, Vec<Arc<Filter>>> {
        self.filters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
