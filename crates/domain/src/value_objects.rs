//! 领域值对象

use serde::{Deserialize, Serialize};

use crate::entities::TrustTier;

/// 路由计算结果，任务创建后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingPlan {
    /// 裁决前需要收齐的独立提交数
    pub required_workers: i32,
    /// 认领资格线（最低信任等级）
    pub min_trust_tier: TrustTier,
    /// 单个工作者报酬，截断到分
    pub price_per_worker: f64,
    /// 预估总价 = price_per_worker * required_workers，不超过预算
    pub est_price: f64,
    /// 平台定义的完成奖励，与报酬无关
    pub reward_on_completion: f64,
}

/// 任务撰写协作方产出的任务说明
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBrief {
    pub worker_instructions: String,
    pub expected_response_type: String,
}

/// 单笔工作者付款
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payout {
    pub worker_id: i64,
    pub wallet_address: String,
    pub amount: f64,
}
