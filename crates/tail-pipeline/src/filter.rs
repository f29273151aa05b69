//! 필터 — (워커, 라우트) 쌍의 매칭/전달 실행 단위
//!
//! [`Filter`]는 하나의 워커에 붙은 하나의 라우트를 실행합니다. 경계
//! 있는 인바운드 큐에서 청크를 꺼내 레코드를 조립하고, 매처 집합을
//! 평가한 뒤, 매칭된 레코드를 transfer 목록에 순서대로 전달합니다.
//!
//! # 백프레셔 정책
//! [`Filter::receive`]는 논블로킹입니다. 큐가 가득 찼거나 필터가 정지
//! 중이면 청크를 조용히 드롭합니다. 과부하에서 파이프라인 전체의
//! 생존성을 완전성보다 우선하는 의도된 정책입니다.
//!
//! # 정지 정책
//! transfer 하나가 전달 에러를 반환하면 그 레코드의 나머지 transfer
//! 전달을 중단하고 필터가 정지합니다. 워커와 형제 필터는 계속
//! 동작합니다.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use tailpost_core::config::PipelineSettings;
use tailpost_core::error::TransferError;
use tailpost_core::metrics::{
    LABEL_ROUTE, PIPELINE_CHUNKS_DROPPED_TOTAL, PIPELINE_FILTER_STOPS_TOTAL,
    PIPELINE_FILTERS_ACTIVE, PIPELINE_RECORDS_MATCHED_TOTAL,
};
use tailpost_core::scope::Scope;
use tailpost_core::transfer::Transfer;

use crate::matcher::{Format, Matcher};
use crate::record::{ChunkFetch, RecordAssembler};

/// 라우트 해석 결과 — 이름 + 매처 집합 + transfer 참조 목록
///
/// 설정의 라우터 항목을 라이브 레지스트리에 대해 해석한 형태입니다.
/// 워커가 라우트를 활성화할 때 필터 생성의 입력이 됩니다.
#[derive(Clone)]
pub struct ResolvedRoute {
    /// 라우터 이름
    pub name: String,
    /// AND로 결합되는 매처 집합
    pub matchers: Vec<Arc<dyn Matcher>>,
    /// 전달 순서대로의 transfer 참조
    pub transfers: Vec<Arc<dyn Transfer>>,
}

/// 필터의 교체 가능한 바인딩 (매처 집합 + transfer 참조)
///
/// 필터 자신의 락으로만 보호되며, 락은 읽기 스냅샷/교체 동안만 유지하고
/// 블로킹 transfer 호출 너머로는 절대 유지하지 않습니다.
struct Bindings {
    matchers: Vec<Arc<dyn Matcher>>,
    transfers: Vec<Arc<dyn Transfer>>,
}

/// 라우트 실행 단위
pub struct Filter {
    id: String,
    source_id: String,
    route_name: String,
    scope: Scope,
    tx: mpsc::Sender<Bytes>,
    bindings: Mutex<Bindings>,
    assembler: RecordAssembler,
    read_next_timeout: Duration,
}

impl Filter {
    /// 필터를 생성하고 메인 루프 태스크를 시작합니다.
    ///
    /// 필터의 스코프는 `parent`의 자식이므로 워커/서버 정지가 그대로
    /// 전파됩니다.
    pub fn spawn(
        worker_id: &str,
        source_id: &str,
        route: ResolvedRoute,
        parent: &Scope,
        format: Option<Arc<Format>>,
        settings: &PipelineSettings,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(settings.channel_capacity.max(1));

        let filter = Arc::new(Self {
            id: format!("{}-{}", worker_id, route.name),
            source_id: source_id.to_owned(),
            route_name: route.name,
            scope: parent.child(),
            tx,
            bindings: Mutex::new(Bindings {
                matchers: route.matchers,
                transfers: route.transfers,
            }),
            assembler: RecordAssembler::new(format),
            read_next_timeout: Duration::from_millis(settings.read_next_timeout_ms),
        });

        let runner = Arc::clone(&filter);
        tokio::spawn(async move {
            runner.run(rx).await;
        });

        filter
    }

    /// 필터 식별자 (`{worker}-{route}`)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 이 필터가 실행 중인 라우트 이름
    pub fn route_name(&self) -> &str {
        &self.route_name
    }

    /// 청크를 논블로킹으로 수신합니다. 큐가 가득 찼거나 정지 중이면
    /// 드롭합니다.
    pub fn receive(&self, chunk: Bytes) {
        if self.scope.is_stopped() {
            return;
        }

        if self.tx.try_send(chunk).is_err() {
            metrics::counter!(PIPELINE_CHUNKS_DROPPED_TOTAL, LABEL_ROUTE => self.route_name.clone())
                .increment(1);
            tracing::debug!(filter = %self.id, "inbound queue full, chunk dropped");
        }
    }

    /// 필터를 정지합니다. 동시에 여러 번 호출해도 안전하며 teardown
    /// 로그는 한 번만 남습니다.
    pub fn stop(&self) {
        self.scope.stop_with(|| {
            tracing::info!(filter = %self.id, "filter stopping");
        });
    }

    /// 필터가 정지되었는지 확인합니다.
    pub fn is_stopped(&self) -> bool {
        self.scope.is_stopped()
    }

    /// 매처 집합을 교체합니다. 다음에 꺼내는 청크부터 적용되며 레코드
    /// 중간에는 절대 적용되지 않습니다.
    pub fn set_matchers(&self, matchers: Vec<Arc<dyn Matcher>>) {
        self.lock_bindings().matchers = matchers;
    }

    /// 같은 이름의 transfer 참조를 새 인스턴스로 교체합니다.
    ///
    /// 진행 중인 전달은 이전 인스턴스로 완결되고, 다음 전달부터 새
    /// 인스턴스가 사용됩니다.
    pub fn replace_transfer(&self, transfer: &Arc<dyn Transfer>) {
        let mut bindings = self.lock_bindings();

        for slot in &mut bindings.transfers {
            if slot.name() == transfer.name() {
                *slot = Arc::clone(transfer);
            }
        }
    }

    /// 이 필터가 해당 이름의 transfer를 참조 중인지 확인합니다.
    pub fn uses_transfer(&self, name: &str) -> bool {
        self.lock_bindings().transfers.iter().any(|t| t.name() == name)
    }

    fn lock_bindings(&self) -> MutexGuard<'_, Bindings> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<Bytes>) {
        tracing::info!(filter = %self.id, "filter start");
        metrics::gauge!(PIPELINE_FILTERS_ACTIVE).increment(1.0);

        loop {
            let chunk = tokio::select! {
                _ = self.scope.cancelled() => break,
                chunk = rx.recv() => match chunk {
                    Some(chunk) => chunk,
                    None => break,
                },
            };

            if let Err(err) = self.process(chunk, &mut rx).await {
                tracing::warn!(filter = %self.id, error = %err, "route error, stopping filter");
                metrics::counter!(PIPELINE_FILTER_STOPS_TOTAL, LABEL_ROUTE => self.route_name.clone())
                    .increment(1);
                self.stop();
                break;
            }
        }

        metrics::gauge!(PIPELINE_FILTERS_ACTIVE).decrement(1.0);
        tracing::info!(filter = %self.id, "filter stopped");
    }

    /// 청크 하나를 조립/매칭/전달합니다.
    async fn process(
        &self,
        chunk: Bytes,
        rx: &mut mpsc::Receiver<Bytes>,
    ) -> Result<(), TransferError> {
        // 락은 스냅샷 복제 동안만 유지
        let (matchers, transfers) = {
            let bindings = self.lock_bindings();
            (bindings.matchers.clone(), bindings.transfers.clone())
        };

        if matchers.is_empty() {
            return self.deliver(&transfers, &[chunk]);
        }

        let mut fetch = QueueFetch {
            rx,
            scope: &self.scope,
            timeout: self.read_next_timeout,
        };

        let records = self.assembler.assemble(chunk, &matchers, &mut fetch).await;

        for record in records {
            metrics::counter!(PIPELINE_RECORDS_MATCHED_TOTAL, LABEL_ROUTE => self.route_name.clone())
                .increment(1);
            self.deliver(&transfers, &record)?;
        }

        Ok(())
    }

    /// 레코드 하나를 모든 transfer에 순서대로 전달합니다. 첫 에러가
    /// 나머지 전달을 중단시킵니다.
    fn deliver(
        &self,
        transfers: &[Arc<dyn Transfer>],
        record: &[Bytes],
    ) -> Result<(), TransferError> {
        for transfer in transfers {
            transfer.trans(&self.source_id, record)?;
        }

        Ok(())
    }
}

/// 필터 인바운드 큐에서 제한 시간 대기로 연속 청크를 공급합니다.
struct QueueFetch<'a> {
    rx: &'a mut mpsc::Receiver<Bytes>,
    scope: &'a Scope,
    timeout: Duration,
}

impl ChunkFetch for QueueFetch<'_> {
    async fn next_chunk(&mut self) -> Option<Bytes> {
        tokio::select! {
            _ = self.scope.cancelled() => None,
            _ = tokio::time::sleep(self.timeout) => None,
            chunk = self.rx.recv() => chunk,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use super::*;
    use crate::matcher::{ContainsMatcher, build_matchers};
    use tailpost_core::config::MatcherConfig;

    /// 전달된 레코드를 기록하는 테스트 싱크
    struct RecordingTransfer {
        name: String,
        seen: StdMutex<Vec<(String, Vec<u8>)>>,
        fail: bool,
    }

    impl RecordingTransfer {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_owned(),
                seen: StdMutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_owned(),
                seen: StdMutex::new(Vec::new()),
                fail: true,
            })
        }

        fn records(&self) -> Vec<(String, Vec<u8>)> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Transfer for RecordingTransfer {
        fn name(&self) -> &str {
            &self.name
        }

        fn trans(&self, source: &str, record: &[Bytes]) -> Result<(), TransferError> {
            if self.fail {
                return Err(TransferError::Deliver {
                    name: self.name.clone(),
                    reason: "test failure".to_owned(),
                });
            }

            let mut joined = Vec::new();
            for segment in record {
                joined.extend_from_slice(segment);
            }
            self.seen.lock().unwrap().push((source.to_owned(), joined));
            Ok(())
        }
    }

    fn fast_settings() -> PipelineSettings {
        PipelineSettings {
            channel_capacity: 16,
            read_next_timeout_ms: 5,
            retry_interval_secs: 10,
        }
    }

    fn error_matchers() -> Vec<Arc<dyn Matcher>> {
        build_matchers(&[MatcherConfig {
            contains: vec!["ERROR".to_owned()],
            not_contains: vec![],
        }])
        .unwrap()
    }

    fn spawn_filter(
        matchers: Vec<Arc<dyn Matcher>>,
        transfers: Vec<Arc<dyn Transfer>>,
        scope: &Scope,
    ) -> Arc<Filter> {
        Filter::spawn(
            "w1",
            "server1",
            ResolvedRoute {
                name: "route1".to_owned(),
                matchers,
                transfers,
            },
            scope,
            Some(Arc::new(Format::new("!!!!-!!-!!"))),
            &fast_settings(),
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn matched_record_reaches_transfer_with_source_id() {
        let scope = Scope::new();
        let sink = RecordingTransfer::new("sink");
        let filter = spawn_filter(error_matchers(), vec![sink.clone() as Arc<dyn Transfer>], &scope);

        filter.receive(Bytes::from_static(b"2020-11-11 ERROR test\n follow\n"));
        settle().await;

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, "server1");
        assert_eq!(records[0].1, b"2020-11-11 ERROR test\n follow");

        scope.stop();
    }

    #[tokio::test]
    async fn empty_matcher_set_forwards_whole_chunk() {
        let scope = Scope::new();
        let sink = RecordingTransfer::new("sink");
        let filter = spawn_filter(Vec::new(), vec![sink.clone() as Arc<dyn Transfer>], &scope);

        filter.receive(Bytes::from_static(b"anything at all"));
        settle().await;

        assert_eq!(sink.records()[0].1, b"anything at all");
        scope.stop();
    }

    #[tokio::test]
    async fn delivery_error_stops_filter_and_aborts_remaining_transfers() {
        let scope = Scope::new();
        let failing = RecordingTransfer::failing("bad");
        let after = RecordingTransfer::new("after");
        let filter = spawn_filter(
            error_matchers(),
            vec![
                failing.clone() as Arc<dyn Transfer>,
                after.clone() as Arc<dyn Transfer>,
            ],
            &scope,
        );

        filter.receive(Bytes::from_static(b"2020-11-11 ERROR x\n"));
        settle().await;

        assert!(filter.is_stopped());
        assert!(after.records().is_empty());

        // 정지 후 수신은 조용히 드롭됨
        filter.receive(Bytes::from_static(b"2020-11-11 ERROR y\n"));
        settle().await;
        assert!(after.records().is_empty());

        scope.stop();
    }

    #[tokio::test]
    async fn set_matchers_applies_to_next_chunk() {
        let scope = Scope::new();
        let sink = RecordingTransfer::new("sink");
        let filter = spawn_filter(error_matchers(), vec![sink.clone() as Arc<dyn Transfer>], &scope);

        filter.receive(Bytes::from_static(b"2020-11-11 WARN only\n"));
        settle().await;
        assert!(sink.records().is_empty());

        filter.set_matchers(vec![Arc::new(ContainsMatcher::new("WARN", true).unwrap())]);
        filter.receive(Bytes::from_static(b"2020-11-11 WARN only\n"));
        settle().await;

        assert_eq!(sink.records().len(), 1);
        scope.stop();
    }

    #[tokio::test]
    async fn replace_transfer_swaps_by_name() {
        let scope = Scope::new();
        let old = RecordingTransfer::new("sink");
        let filter = spawn_filter(Vec::new(), vec![old.clone() as Arc<dyn Transfer>], &scope);

        let new = RecordingTransfer::new("sink");
        let new_dyn: Arc<dyn Transfer> = new.clone();
        filter.replace_transfer(&new_dyn);

        filter.receive(Bytes::from_static(b"data"));
        settle().await;

        assert!(old.records().is_empty());
        assert_eq!(new.records().len(), 1);
        assert!(filter.uses_transfer("sink"));
        assert!(!filter.uses_transfer("other"));

        scope.stop();
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_concurrent_safe() {
        let scope = Scope::new();
        let filter = spawn_filter(Vec::new(), Vec::new(), &scope);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let filter = Arc::clone(&filter);
            handles.push(tokio::spawn(async move {
                filter.stop();
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert!(filter.is_stopped());
    }

    #[tokio::test]
    async fn parent_scope_stop_propagates() {
        let scope = Scope::new();
        let filter = spawn_filter(Vec::new(), Vec::new(), &scope);

        scope.stop();
        assert!(filter.is_stopped());
    }
}
