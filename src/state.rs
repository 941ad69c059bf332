use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use knowhub_backend::config::AppConfig;
use knowhub_backend::search::SearchEngine;

/// Rebuild guard so only one rebuild runs at a time / 重建状态
#[derive(Default)]
pub struct RebuildState {
    running: AtomicBool,
}

/// Held while a rebuild runs; the slot is released on drop, including when
/// the request future is dropped mid-rebuild / 重建占用凭证
pub struct RebuildGuard<'a> {
    state: &'a RebuildState,
}

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        self.state.running.store(false, Ordering::SeqCst);
    }
}

impl RebuildState {
    /// Claim the rebuild slot; `None` when one is already running
    pub fn try_start(&self) -> Option<RebuildGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RebuildGuard { state: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

pub struct AppState {
    pub db: SqlitePool,
    pub search: Arc<SearchEngine>,
    pub config: AppConfig,
    pub rebuild: RebuildState,
}

impl AppState {
    pub fn new(db: SqlitePool, search: Arc<SearchEngine>, config: AppConfig) -> Self {
        Self {
            db,
            search,
            config,
            rebuild: RebuildState::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebuild_slot_is_exclusive() {
        let state = RebuildState::default();
        let guard = state.try_start();
        assert!(guard.is_some());
        assert!(state.is_running());
        assert!(state.try_start().is_none());
        drop(guard);
        assert!(!state.is_running());
        assert!(state.try_start().is_some());
    }

    #[tokio::test]
    async fn test_slot_released_when_task_aborted() {
        let state = Arc::new(RebuildState::default());
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();

        let task_state = state.clone();
        let task = tokio::spawn(async move {
            let _guard = task_state.try_start();
            let _ = started_tx.send(());
            std::future::pending::<()>().await;
        });

        started_rx.await.unwrap();
        assert!(state.is_running());

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(!state.is_running());
    }
}
