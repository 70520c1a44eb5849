use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use marketplace_core::{MarketError, MarketResult};
use marketplace_domain::{Requester, RequesterRepository};

/// 内存请求方账户仓储。
/// 扣减在写锁内检查余额，并发请求不会把账户扣成负数。
pub struct InMemoryRequesterRepository {
    requesters: Arc<RwLock<HashMap<i64, Requester>>>,
    next_id: AtomicI64,
}

impl InMemoryRequesterRepository {
    pub fn new() -> Self {
        Self {
            requesters: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryRequesterRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RequesterRepository for InMemoryRequesterRepository {
    async fn create(&self, requester: &Requester) -> MarketResult<Requester> {
        let mut created = requester.clone();
        created.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.requesters
            .write()
            .await
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> MarketResult<Option<Requester>> {
        Ok(self.requesters.read().await.get(&id).cloned())
    }

    async fn try_debit(&self, id: i64, amount: f64) -> MarketResult<bool> {
        let mut requesters = self.requesters.write().await;
        let requester = requesters
            .get_mut(&id)
            .ok_or(MarketError::RequesterNotFound { id })?;
        if requester.balance >= amount {
            requester.balance -= amount;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn credit(&self, id: i64, amount: f64) -> MarketResult<()> {
        let mut requesters = self.requesters.write().await;
        let requester = requesters
            .get_mut(&id)
            .ok_or(MarketError::RequesterNotFound { id })?;
        requester.balance += amount;
        Ok(())
    }
}
