//! 外部协作方端口
//!
//! 支付结算与任务撰写都在引擎边界之外，这里只定义接口。

use async_trait::async_trait;

use crate::value_objects::{Payout, TaskBrief};
use marketplace_core::MarketResult;

/// 支付协作方。两个操作从控制器视角看都必须幂等，确认丢失后重试是安全的。
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn release_payment(&self, task_id: i64, payouts: &[Payout]) -> MarketResult<()>;
    async fn refund(&self, task_id: i64) -> MarketResult<()>;
}

/// 任务撰写协作方：把原始负载转换为人类可读指令和期望的响应形态。
#[async_trait]
pub trait TaskAuthoring: Send + Sync {
    async fn analyze(&self, input_payload: &serde_json::Value) -> MarketResult<TaskBrief>;
}
