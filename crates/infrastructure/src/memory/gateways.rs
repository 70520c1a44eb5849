//! 外部协作方的嵌入式实现

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use marketplace_core::MarketResult;
use marketplace_domain::{PaymentGateway, Payout, TaskAuthoring, TaskBrief};

/// 记录式支付网关：不做真实结算，只记录每个任务的放款与退款。
/// 按任务幂等——同一任务的重复放款/退款请求被忽略。
pub struct RecordingPaymentGateway {
    released: Arc<RwLock<Vec<(i64, Vec<Payout>)>>>,
    refunded: Arc<RwLock<Vec<i64>>>,
    seen_releases: Arc<RwLock<HashSet<i64>>>,
    seen_refunds: Arc<RwLock<HashSet<i64>>>,
}

impl RecordingPaymentGateway {
    pub fn new() -> Self {
        Self {
            released: Arc::new(RwLock::new(Vec::new())),
            refunded: Arc::new(RwLock::new(Vec::new())),
            seen_releases: Arc::new(RwLock::new(HashSet::new())),
            seen_refunds: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub async fn released(&self) -> Vec<(i64, Vec<Payout>)> {
        self.released.read().await.clone()
    }

    pub async fn refunded(&self) -> Vec<i64> {
        self.refunded.read().await.clone()
    }
}

impl Default for RecordingPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for RecordingPaymentGateway {
    async fn release_payment(&self, task_id: i64, payouts: &[Payout]) -> MarketResult<()> {
        if !self.seen_releases.write().await.insert(task_id) {
            debug!("任务 {} 的放款已记录过，忽略重复请求", task_id);
            return Ok(());
        }
        let total: f64 = payouts.iter().map(|p| p.amount).sum();
        info!(
            "任务 {} 放款: {} 笔，共 {:.2}",
            task_id,
            payouts.len(),
            total
        );
        self.released.write().await.push((task_id, payouts.to_vec()));
        Ok(())
    }

    async fn refund(&self, task_id: i64) -> MarketResult<()> {
        if !self.seen_refunds.write().await.insert(task_id) {
            debug!("任务 {} 的退款已记录过，忽略重复请求", task_id);
            return Ok(());
        }
        self.refunded.write().await.push(task_id);
        Ok(())
    }
}

/// 静态任务撰写：不经过模型调用，直接产出固定格式的任务说明。
/// 嵌入式部署和测试用，生产部署替换为真实的撰写协作方。
pub struct StaticTaskAuthoring;

#[async_trait]
impl TaskAuthoring for StaticTaskAuthoring {
    async fn analyze(&self, input_payload: &serde_json::Value) -> MarketResult<TaskBrief> {
        Ok(TaskBrief {
            worker_instructions: format!(
                "Review the task payload and respond with a structured answer: {input_payload}"
            ),
            expected_response_type: "json".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn release_payment_is_idempotent_per_task() {
        let gateway = RecordingPaymentGateway::new();
        let payouts = vec![Payout {
            worker_id: 1,
            wallet_address: "0xw".to_string(),
            amount: 3.0,
        }];
        gateway.release_payment(7, &payouts).await.unwrap();
        gateway.release_payment(7, &payouts).await.unwrap();
        assert_eq!(gateway.released().await.len(), 1);
    }
}
