use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use marketplace_core::MarketResult;
use marketplace_domain::{Worker, WorkerRepository};

/// 内存工作者仓储，版本号乐观并发
pub struct InMemoryWorkerRepository {
    workers: Arc<RwLock<HashMap<i64, Worker>>>,
    next_id: AtomicI64,
}

impl InMemoryWorkerRepository {
    pub fn new() -> Self {
        Self {
            workers: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryWorkerRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerRepository for InMemoryWorkerRepository {
    async fn create(&self, worker: &Worker) -> MarketResult<Worker> {
        let mut created = worker.clone();
        created.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.workers.write().await.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> MarketResult<Option<Worker>> {
        Ok(self.workers.read().await.get(&id).cloned())
    }

    async fn list_by_ids(&self, ids: &[i64]) -> MarketResult<Vec<Worker>> {
        let workers = self.workers.read().await;
        let mut found: Vec<Worker> = ids.iter().filter_map(|id| workers.get(id).cloned()).collect();
        found.sort_by_key(|w| w.id);
        found.dedup_by_key(|w| w.id);
        Ok(found)
    }

    async fn update_reputation(
        &self,
        worker: &Worker,
        expected_version: i64,
    ) -> MarketResult<bool> {
        let mut workers = self.workers.write().await;
        match workers.get_mut(&worker.id) {
            Some(stored) if stored.version == expected_version => {
                stored.trust_score = worker.trust_score;
                stored.trust_tier = worker.trust_tier;
                stored.total_completed = worker.total_completed;
                stored.accuracy_rate = worker.accuracy_rate;
                stored.completion_rate = worker.completion_rate;
                stored.version = expected_version + 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_top_by_trust(&self, limit: i64) -> MarketResult<Vec<Worker>> {
        let mut all: Vec<Worker> = self.workers.read().await.values().cloned().collect();
        all.sort_by(|a, b| {
            b.trust_score
                .partial_cmp(&a.trust_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        all.truncate(limit.max(0) as usize);
        Ok(all)
    }
}
