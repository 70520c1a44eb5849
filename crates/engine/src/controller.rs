//! 任务生命周期控制器
//!
//! Task/Assignment 的状态迁移只发生在这里。控制器负责：创建时的
//! 扣款-插入-补偿 saga、资格校验下的原子认领、受保护的提交、
//! 恰好一次的裁决触发、信誉回写与工作者付款。
//!
//! 控制器由并发的请求处理器直接调用，不假设单线程事件循环；
//! 竞态安全全部依赖存储层的条件更新。

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use marketplace_core::{LifecycleConfig, MarketError, MarketResult, RoutingConfig};
use marketplace_domain::{
    trust_score_map, Assignment, AssignmentRepository, AssignmentStatus, PaymentGateway, Payout,
    RequesterRepository, Task, TaskAuthoring, TaskRepository, TaskStatus, WorkerRepository,
};

use crate::consensus::ConsensusEvaluator;
use crate::reputation::ReputationLedger;
use crate::routing::compute_routing;

/// 一次裁决的对外报告
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub reached: bool,
    pub result: Option<Value>,
}

impl EvaluationReport {
    fn pending() -> Self {
        Self {
            reached: false,
            result: None,
        }
    }
}

/// 提交响应的返回：提交记录 + （若本次触发了裁决）裁决报告
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub assignment: Assignment,
    pub consensus: Option<EvaluationReport>,
}

pub struct LifecycleController {
    tasks: Arc<dyn TaskRepository>,
    assignments: Arc<dyn AssignmentRepository>,
    workers: Arc<dyn WorkerRepository>,
    requesters: Arc<dyn RequesterRepository>,
    payments: Arc<dyn PaymentGateway>,
    authoring: Arc<dyn TaskAuthoring>,
    evaluator: ConsensusEvaluator,
    ledger: ReputationLedger,
    routing_config: RoutingConfig,
    lifecycle_config: LifecycleConfig,
}

impl LifecycleController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        assignments: Arc<dyn AssignmentRepository>,
        workers: Arc<dyn WorkerRepository>,
        requesters: Arc<dyn RequesterRepository>,
        payments: Arc<dyn PaymentGateway>,
        authoring: Arc<dyn TaskAuthoring>,
        evaluator: ConsensusEvaluator,
        ledger: ReputationLedger,
        routing_config: RoutingConfig,
        lifecycle_config: LifecycleConfig,
    ) -> Self {
        Self {
            tasks,
            assignments,
            workers,
            requesters,
            payments,
            authoring,
            evaluator,
            ledger,
            routing_config,
            lifecycle_config,
        }
    }

    /// 创建任务。
    ///
    /// 扣款发生在任务落库之前；插入失败时退还扣款。这是两个独立可见的
    /// 步骤加一条补偿路径（saga），不是单个事务——扣款方和任务存储
    /// 可能是不同的协作方。补偿也失败时返回 CompensationFailure，
    /// 该错误需要运维告警并人工对账。
    pub async fn create_task(
        &self,
        requester_id: i64,
        input_payload: Value,
        importance: i32,
        max_budget: f64,
    ) -> MarketResult<Task> {
        let requester = self
            .requesters
            .get_by_id(requester_id)
            .await?
            .ok_or(MarketError::RequesterNotFound { id: requester_id })?;

        let brief = self.authoring.analyze(&input_payload).await?;
        let plan = compute_routing(importance, max_budget, &self.routing_config)?;

        if !self.requesters.try_debit(requester_id, plan.est_price).await? {
            return Err(MarketError::InsufficientBalance {
                required: plan.est_price,
                available: requester.balance,
            });
        }

        let task = Task::new(
            requester_id,
            input_payload,
            brief,
            importance,
            max_budget,
            plan.clone(),
        );
        match self.tasks.create(&task).await {
            Ok(created) => {
                info!(
                    "创建{}，请求方 {} 已扣款 {:.2}",
                    created.entity_description(),
                    requester_id,
                    plan.est_price
                );
                Ok(created)
            }
            Err(create_err) => {
                warn!(
                    "任务落库失败，补偿退还请求方 {} 扣款 {:.2}: {create_err}",
                    requester_id, plan.est_price
                );
                if let Err(refund_err) = self.requesters.credit(requester_id, plan.est_price).await
                {
                    error!(
                        "补偿失败! 请求方 {} 的扣款 {:.2} 未能退还，需要人工对账: {refund_err}",
                        requester_id, plan.est_price
                    );
                    return Err(MarketError::CompensationFailure {
                        requester_id,
                        amount: plan.est_price,
                        reason: refund_err.to_string(),
                    });
                }
                Err(create_err)
            }
        }
    }

    /// 认领一个任务槽位。
    ///
    /// 资格线按信任等级序数比较；槽位插入是容量受限的原子操作，
    /// 两个并发认领最后一个槽位时只有一个会成功。
    pub async fn claim(&self, task_id: i64, worker_id: i64) -> MarketResult<Assignment> {
        let task = self
            .tasks
            .get_by_id(task_id)
            .await?
            .ok_or(MarketError::TaskNotFound { id: task_id })?;
        if !task.status.is_claimable() {
            return Err(MarketError::validation_error(format!(
                "任务 {task_id} 当前状态 {:?} 不可认领",
                task.status
            )));
        }

        let worker = self
            .workers
            .get_by_id(worker_id)
            .await?
            .ok_or(MarketError::WorkerNotFound { id: worker_id })?;
        if !worker.is_eligible_for(task.min_trust_tier) {
            return Err(MarketError::NotEligible {
                required: task.min_trust_tier.to_string(),
                actual: worker.trust_tier.to_string(),
            });
        }

        let assignment = Assignment::new(task_id, worker_id);
        let created = self
            .assignments
            .insert_if_capacity(&assignment, task.required_workers)
            .await?;

        // 首个认领把任务从 open 推到 assigned，失败无妨
        self.tasks
            .compare_and_set_status(task_id, &[TaskStatus::Open], TaskStatus::Assigned)
            .await?;

        debug!("工作者 {} 认领任务 {}", worker_id, task_id);
        Ok(created)
    }

    /// 提交响应。
    ///
    /// 当已提交数首次达到配额时，恰好一个调用方会赢得
    /// in_progress -> evaluating 的状态迁移并触发裁决；其余调用方
    /// 直接返回。配额之外不会有重复触发。
    pub async fn submit(
        &self,
        task_id: i64,
        worker_id: i64,
        response: Value,
    ) -> MarketResult<SubmissionOutcome> {
        let task = self
            .tasks
            .get_by_id(task_id)
            .await?
            .ok_or(MarketError::TaskNotFound { id: task_id })?;
        match task.status {
            TaskStatus::Completed => {
                return Err(MarketError::AlreadyAdjudicated { task_id });
            }
            TaskStatus::Expired | TaskStatus::Cancelled => {
                return Err(MarketError::validation_error(format!(
                    "任务 {task_id} 已终止，不再接受提交"
                )));
            }
            _ => {}
        }

        let assignment = self
            .assignments
            .get_by_task_and_worker(task_id, worker_id)
            .await?
            .ok_or(MarketError::AssignmentNotFound { task_id, worker_id })?;
        if assignment.status != AssignmentStatus::Assigned {
            return Err(MarketError::AlreadySubmitted { task_id, worker_id });
        }

        let submitted_at = Utc::now();
        if !self
            .assignments
            .mark_submitted(assignment.id, &response, submitted_at)
            .await?
        {
            // 并发提交抢先完成了迁移
            return Err(MarketError::AlreadySubmitted { task_id, worker_id });
        }

        // 首个提交把任务推进到 in_progress
        self.tasks
            .compare_and_set_status(
                task_id,
                &[TaskStatus::Open, TaskStatus::Assigned],
                TaskStatus::InProgress,
            )
            .await?;

        let mut updated = assignment;
        updated.status = AssignmentStatus::Submitted;
        updated.response = Some(response);
        updated.submitted_at = Some(submitted_at);

        let submitted_count = self.assignments.count_submitted(task_id).await?;
        let consensus = if submitted_count >= task.required_workers as i64 {
            self.try_evaluate(&task).await?
        } else {
            debug!(
                "任务 {} 已收到 {}/{} 份提交",
                task_id, submitted_count, task.required_workers
            );
            None
        };

        Ok(SubmissionOutcome {
            assignment: updated,
            consensus,
        })
    }

    /// 裁决一个任务（运维手动触发入口，也是高重要度任务提前裁决的通道）。
    ///
    /// 已完成的任务是幂等空操作，直接返回存储的结果；进行中的任务
    /// 走同一个 evaluating 状态闸门，与提交触发的裁决互斥。
    pub async fn evaluate(&self, task_id: i64) -> MarketResult<EvaluationReport> {
        let task = self
            .tasks
            .get_by_id(task_id)
            .await?
            .ok_or(MarketError::TaskNotFound { id: task_id })?;

        match task.status {
            TaskStatus::Completed => Ok(EvaluationReport {
                reached: true,
                result: task.result.clone(),
            }),
            TaskStatus::Expired | TaskStatus::Cancelled => Err(MarketError::validation_error(
                format!("任务 {task_id} 已终止，无法裁决"),
            )),
            // 尚无提交或裁决正在进行中，等待即可
            TaskStatus::Open | TaskStatus::Assigned | TaskStatus::Evaluating => {
                Ok(EvaluationReport::pending())
            }
            TaskStatus::InProgress => match self.try_evaluate(&task).await? {
                Some(report) => Ok(report),
                None => Ok(EvaluationReport::pending()),
            },
        }
    }

    /// 赢得 evaluating 闸门后才真正执行裁决；输掉闸门返回 None。
    async fn try_evaluate(&self, task: &Task) -> MarketResult<Option<EvaluationReport>> {
        if !self
            .tasks
            .compare_and_set_status(task.id, &[TaskStatus::InProgress], TaskStatus::Evaluating)
            .await?
        {
            debug!("任务 {} 的裁决已由并发调用触发，跳过", task.id);
            return Ok(None);
        }

        match self.run_evaluation(task).await {
            Ok(report) => Ok(Some(report)),
            Err(err) => {
                // 裁决中途失败时把任务放回 in_progress，避免卡死在闸门内
                let _ = self
                    .tasks
                    .compare_and_set_status(
                        task.id,
                        &[TaskStatus::Evaluating],
                        TaskStatus::InProgress,
                    )
                    .await;
                Err(err)
            }
        }
    }

    async fn run_evaluation(&self, task: &Task) -> MarketResult<EvaluationReport> {
        let assignments = self.assignments.list_by_task(task.id).await?;
        let participant_ids: Vec<i64> = assignments
            .iter()
            .filter(|a| a.is_submitted())
            .map(|a| a.worker_id)
            .collect();
        let participants = self.workers.list_by_ids(&participant_ids).await?;
        let trust = trust_score_map(&participants);

        let outcome = self
            .evaluator
            .evaluate(task.importance_tier(), &assignments, &trust);

        if !outcome.reached {
            self.tasks
                .compare_and_set_status(task.id, &[TaskStatus::Evaluating], TaskStatus::InProgress)
                .await?;
            info!("任务 {} 未达成共识，等待更多证据", task.id);
            return Ok(EvaluationReport::pending());
        }

        let result = outcome.result.clone().unwrap_or(Value::Null);

        self.assignments
            .set_statuses(&outcome.accepted_assignments, AssignmentStatus::Accepted)
            .await?;
        self.assignments
            .set_statuses(&outcome.rejected_assignments, AssignmentStatus::Rejected)
            .await?;
        self.tasks.complete(task.id, &result, Utc::now()).await?;

        // 每名参与者恰好一次信誉回写；至多一次由 evaluating 闸门保证
        let accepted_ids: HashSet<i64> = outcome.accepted_assignments.iter().copied().collect();
        for assignment in assignments.iter().filter(|a| a.is_submitted()) {
            let accepted = accepted_ids.contains(&assignment.id);
            self.ledger
                .apply(task.id, assignment.worker_id, accepted)
                .await?;
        }

        let payouts = self.build_payouts(task, &assignments, &accepted_ids, &participants);
        self.payments.release_payment(task.id, &payouts).await?;

        info!(
            "任务 {} 达成共识并完成，向 {} 名工作者各释放 {:.2}",
            task.id,
            payouts.len(),
            task.price_per_worker
        );
        Ok(EvaluationReport {
            reached: true,
            result: Some(result),
        })
    }

    fn build_payouts(
        &self,
        task: &Task,
        assignments: &[Assignment],
        accepted_ids: &HashSet<i64>,
        participants: &[marketplace_domain::Worker],
    ) -> Vec<Payout> {
        assignments
            .iter()
            .filter(|a| accepted_ids.contains(&a.id))
            .filter_map(|a| {
                let wallet = participants
                    .iter()
                    .find(|w| w.id == a.worker_id)
                    .map(|w| w.wallet_address.clone())?;
                Some(Payout {
                    worker_id: a.worker_id,
                    wallet_address: wallet,
                    amount: task.price_per_worker,
                })
            })
            .collect()
    }

    /// 过期回收：超过配置时限仍未达成共识的任务标记为 expired 并全额退款。
    /// 未配置时限时不做任何事，任务可以无限期等待。
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> MarketResult<Vec<i64>> {
        let Some(hours) = self.lifecycle_config.pending_deadline_hours else {
            return Ok(Vec::new());
        };
        let cutoff = now - Duration::hours(hours);
        let stale = self.tasks.list_stale_pending(cutoff).await?;

        let mut expired = Vec::new();
        for task in stale {
            let transitioned = self
                .tasks
                .compare_and_set_status(
                    task.id,
                    &[
                        TaskStatus::Open,
                        TaskStatus::Assigned,
                        TaskStatus::InProgress,
                    ],
                    TaskStatus::Expired,
                )
                .await?;
            if transitioned {
                self.requesters.credit(task.requester_id, task.est_price).await?;
                self.payments.refund(task.id).await?;
                warn!(
                    "任务 {} 超期未达成共识，已过期并退款 {:.2}",
                    task.id, task.est_price
                );
                expired.push(task.id);
            }
        }
        Ok(expired)
    }

    /// 取消一个尚无认领的任务并全额退款
    pub async fn cancel(&self, task_id: i64) -> MarketResult<()> {
        let task = self
            .tasks
            .get_by_id(task_id)
            .await?
            .ok_or(MarketError::TaskNotFound { id: task_id })?;

        if !self
            .tasks
            .compare_and_set_status(task_id, &[TaskStatus::Open], TaskStatus::Cancelled)
            .await?
        {
            return Err(MarketError::validation_error(format!(
                "任务 {task_id} 已有认领或已终止，无法取消"
            )));
        }
        self.requesters.credit(task.requester_id, task.est_price).await?;
        self.payments.refund(task_id).await?;
        info!("任务 {} 已取消并退款 {:.2}", task_id, task.est_price);
        Ok(())
    }

    /// 指定工作者可认领的任务：状态可认领、资格达标、未认领过、槽位未满
    pub async fn available_tasks(&self, worker_id: i64) -> MarketResult<Vec<Task>> {
        let worker = self
            .workers
            .get_by_id(worker_id)
            .await?
            .ok_or(MarketError::WorkerNotFound { id: worker_id })?;

        let mut available = Vec::new();
        for task in self.tasks.list_claimable().await? {
            if !worker.is_eligible_for(task.min_trust_tier) {
                continue;
            }
            if self
                .assignments
                .get_by_task_and_worker(task.id, worker_id)
                .await?
                .is_some()
            {
                continue;
            }
            if self.assignments.count_by_task(task.id).await? >= task.required_workers as i64 {
                continue;
            }
            available.push(task);
        }
        Ok(available)
    }

    /// 信任分排行榜
    pub async fn leaderboard(&self, limit: i64) -> MarketResult<Vec<marketplace_domain::Worker>> {
        self.workers.list_top_by_trust(limit).await
    }
}
