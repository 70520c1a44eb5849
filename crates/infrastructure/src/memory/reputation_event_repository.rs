use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use marketplace_core::MarketResult;
use marketplace_domain::{ReputationEvent, ReputationEventRepository};

/// 内存信誉审计日志，只追加
pub struct InMemoryReputationEventRepository {
    events: Arc<RwLock<Vec<ReputationEvent>>>,
    next_id: AtomicI64,
}

impl InMemoryReputationEventRepository {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryReputationEventRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReputationEventRepository for InMemoryReputationEventRepository {
    async fn append(&self, event: &ReputationEvent) -> MarketResult<ReputationEvent> {
        let mut created = event.clone();
        created.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.events.write().await.push(created.clone());
        Ok(created)
    }

    async fn list_by_worker(&self, worker_id: i64) -> MarketResult<Vec<ReputationEvent>> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.worker_id == worker_id)
            .cloned()
            .collect())
    }

    async fn list_by_task(&self, task_id: i64) -> MarketResult<Vec<ReputationEvent>> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect())
    }
}
