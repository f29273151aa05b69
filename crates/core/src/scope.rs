//! 취소 스코프 — 부모/자식 트리, 멱등 일회성 정지 신호
//!
//! 모든 장수명 컴포넌트(Tailer, Server, Worker, Filter)는 생성자의 스코프의
//! *자식* 스코프를 소유합니다. 부모를 정지하면 모든 하위 스코프가 트리 순회
//! 없이 함께 정지됩니다 (자식이 부모의 신호를 직접 관찰하므로).
//!
//! 정지는 단조적입니다: 한번 정지된 스코프는 재시작할 수 없으며,
//! 재시작하려면 새 스코프를 만들어야 합니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

/// 계층적 취소 스코프
///
/// [`CancellationToken`] 트리 위에 일회성 teardown 보장을 더한 래퍼입니다.
/// `Clone`은 동일 스코프에 대한 핸들을 복제합니다.
#[derive(Debug, Clone)]
pub struct Scope {
    token: CancellationToken,
    torn_down: Arc<AtomicBool>,
}

impl Scope {
    /// 루트 스코프를 생성합니다.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            torn_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 이 스코프의 자식 스코프를 생성합니다.
    ///
    /// 부모가 정지되면 자식도 즉시 정지 상태가 됩니다. 자식을 정지해도
    /// 부모에는 영향이 없습니다.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            torn_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 스코프를 정지합니다. 멱등이며, 하위 스코프 전체에 전파됩니다.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// 스코프를 정지하며, 첫 호출에 한해 teardown 클로저를 실행합니다.
    ///
    /// 동시에 여러 번 호출되어도 `teardown`은 정확히 한 번 실행됩니다.
    pub fn stop_with(&self, teardown: impl FnOnce()) {
        if !self.torn_down.swap(true, Ordering::SeqCst) {
            teardown();
        }

        self.token.cancel();
    }

    /// 스코프(또는 조상)가 정지될 때까지 대기합니다.
    ///
    /// 시스템의 모든 블로킹 대기 지점은 이 future를 `select!`로 함께
    /// 관찰해야 합니다.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// 스코프(또는 조상)가 이미 정지되었는지 확인합니다.
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn stop_propagates_to_descendants() {
        let root = Scope::new();
        let child = root.child();
        let grandchild = child.child();

        assert!(!grandchild.is_stopped());
        root.stop();
        assert!(child.is_stopped());
        assert!(grandchild.is_stopped());

        // cancelled()는 즉시 완료되어야 함
        tokio::time::timeout(Duration::from_secs(1), grandchild.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn child_stop_does_not_affect_parent() {
        let root = Scope::new();
        let child = root.child();

        child.stop();
        assert!(child.is_stopped());
        assert!(!root.is_stopped());
    }

    #[tokio::test]
    async fn stop_with_runs_teardown_exactly_once() {
        let scope = Arc::new(Scope::new());
        let count = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let scope = Arc::clone(&scope);
            let count = Arc::clone(&count);
            handles.push(tokio::spawn(async move {
                scope.stop_with(|| {
                    count.fetch_add(1, Ordering::SeqCst);
                });
            }));
        }

        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(scope.is_stopped());
    }

    #[tokio::test]
    async fn stop_is_monotonic() {
        let scope = Scope::new();
        scope.stop();
        scope.stop();
        assert!(scope.is_stopped());

        // 정지된 부모에서 만든 자식은 이미 정지 상태
        let child = scope.child();
        assert!(child.is_stopped());
    }
}
