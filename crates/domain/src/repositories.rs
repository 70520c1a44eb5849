//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口。存储协作方必须支持的条件更新
//! （状态CAS、容量受限插入、版本受限更新、余额受限扣减）都在这里声明。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::entities::{
    Assignment, AssignmentStatus, ReputationEvent, Requester, Task, TaskStatus, Worker,
};
use marketplace_core::MarketResult;

/// 任务仓储抽象
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &Task) -> MarketResult<Task>;
    async fn get_by_id(&self, id: i64) -> MarketResult<Option<Task>>;
    async fn list_by_status(&self, status: TaskStatus) -> MarketResult<Vec<Task>>;
    /// 可认领任务（open/assigned）
    async fn list_claimable(&self) -> MarketResult<Vec<Task>>;
    /// 条件状态迁移：仅当当前状态位于 `from` 中时改写为 `to`，返回是否生效
    async fn compare_and_set_status(
        &self,
        id: i64,
        from: &[TaskStatus],
        to: TaskStatus,
    ) -> MarketResult<bool>;
    /// 受保护的完成迁移（evaluating -> completed），同时写入裁决结果
    async fn complete(
        &self,
        id: i64,
        result: &serde_json::Value,
        completed_at: DateTime<Utc>,
    ) -> MarketResult<bool>;
    /// 在截止时刻之前创建、至今未达成共识的任务
    async fn list_stale_pending(&self, cutoff: DateTime<Utc>) -> MarketResult<Vec<Task>>;
}

/// 任务分配仓储抽象
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// 容量受限的原子插入：同任务分配数达到 capacity 时返回 SlotRaceLost，
    /// (task, worker) 重复时返回 AlreadyClaimed
    async fn insert_if_capacity(
        &self,
        assignment: &Assignment,
        capacity: i32,
    ) -> MarketResult<Assignment>;
    async fn get_by_task_and_worker(
        &self,
        task_id: i64,
        worker_id: i64,
    ) -> MarketResult<Option<Assignment>>;
    async fn list_by_task(&self, task_id: i64) -> MarketResult<Vec<Assignment>>;
    async fn count_by_task(&self, task_id: i64) -> MarketResult<i64>;
    async fn count_submitted(&self, task_id: i64) -> MarketResult<i64>;
    /// 受保护的 assigned -> submitted 迁移，重复提交返回 false
    async fn mark_submitted(
        &self,
        id: i64,
        response: &serde_json::Value,
        submitted_at: DateTime<Utc>,
    ) -> MarketResult<bool>;
    async fn set_statuses(&self, ids: &[i64], status: AssignmentStatus) -> MarketResult<()>;
}

/// 工作者仓储抽象
#[async_trait]
pub trait WorkerRepository: Send + Sync {
    async fn create(&self, worker: &Worker) -> MarketResult<Worker>;
    async fn get_by_id(&self, id: i64) -> MarketResult<Option<Worker>>;
    async fn list_by_ids(&self, ids: &[i64]) -> MarketResult<Vec<Worker>>;
    /// 乐观并发更新：存储版本与 expected_version 不符时返回 false，
    /// 成功时存储版本递增为 expected_version + 1
    async fn update_reputation(&self, worker: &Worker, expected_version: i64)
        -> MarketResult<bool>;
    async fn list_top_by_trust(&self, limit: i64) -> MarketResult<Vec<Worker>>;
}

/// 请求方账户仓储抽象
#[async_trait]
pub trait RequesterRepository: Send + Sync {
    async fn create(&self, requester: &Requester) -> MarketResult<Requester>;
    async fn get_by_id(&self, id: i64) -> MarketResult<Option<Requester>>;
    /// 余额受保护的原子扣减，余额不足返回 false
    async fn try_debit(&self, id: i64, amount: f64) -> MarketResult<bool>;
    async fn credit(&self, id: i64, amount: f64) -> MarketResult<()>;
}

/// 信誉审计日志仓储抽象（只追加）
#[async_trait]
pub trait ReputationEventRepository: Send + Sync {
    async fn append(&self, event: &ReputationEvent) -> MarketResult<ReputationEvent>;
    async fn list_by_worker(&self, worker_id: i64) -> MarketResult<Vec<ReputationEvent>>;
    async fn list_by_task(&self, task_id: i64) -> MarketResult<Vec<ReputationEvent>>;
}

/// 构建 worker_id -> trust_score 映射的便捷函数
pub fn trust_score_map(workers: &[Worker]) -> HashMap<i64, f64> {
    workers.iter().map(|w| (w.id, w.trust_score)).collect()
}
