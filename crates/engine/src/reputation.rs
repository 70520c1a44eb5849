//! 信誉账本
//!
//! 裁决结果反馈到工作者信任分的唯一入口。Worker 的信任字段只经由这里修改，
//! 每次变更都会追加不可变的审计记录。单个工作者的读-改-写通过版本号
//! 乐观并发保护，冲突时有界重试。

use std::sync::Arc;

use tracing::{debug, info, warn};

use marketplace_core::{MarketError, MarketResult, ReputationConfig};
use marketplace_domain::{
    ReputationEvent, ReputationEventRepository, TrustTier, Worker, WorkerRepository,
};

pub struct ReputationLedger {
    workers: Arc<dyn WorkerRepository>,
    events: Arc<dyn ReputationEventRepository>,
    config: ReputationConfig,
}

impl ReputationLedger {
    pub fn new(
        workers: Arc<dyn WorkerRepository>,
        events: Arc<dyn ReputationEventRepository>,
        config: ReputationConfig,
    ) -> Self {
        Self {
            workers,
            events,
            config,
        }
    }

    /// 应用一次裁决结果。
    ///
    /// 采纳 +0.02、否决 -0.03（默认配置），信任分钳制在 [0, 1]；
    /// total_completed 无条件递增——到场但答错也是信号。调用方（生命周期
    /// 控制器）必须保证同一 (task, worker) 至多调用一次。
    pub async fn apply(&self, task_id: i64, worker_id: i64, accepted: bool) -> MarketResult<Worker> {
        let delta = if accepted {
            self.config.accepted_delta
        } else {
            self.config.rejected_delta
        };

        for _attempt in 0..self.config.max_update_retries {
            let current = self
                .workers
                .get_by_id(worker_id)
                .await?
                .ok_or(MarketError::WorkerNotFound { id: worker_id })?;

            let mut updated = current.clone();
            let old_total = current.total_completed as f64;
            updated.trust_score = (current.trust_score + delta).clamp(0.0, 1.0);
            updated.trust_tier = TrustTier::for_score(updated.trust_score);
            updated.total_completed = current.total_completed + 1;
            let new_total = updated.total_completed as f64;
            let hit = if accepted { 1.0 } else { 0.0 };
            updated.accuracy_rate = round3((current.accuracy_rate * old_total + hit) / new_total);
            updated.completion_rate =
                round3((current.completion_rate * old_total + 1.0) / new_total);

            if self
                .workers
                .update_reputation(&updated, current.version)
                .await?
            {
                updated.version = current.version + 1;

                self.events
                    .append(&ReputationEvent::task_outcome(
                        worker_id, task_id, accepted, delta,
                    ))
                    .await?;

                if updated.trust_tier != current.trust_tier {
                    info!(
                        "工作者 {} 信任等级变更: {} -> {}",
                        worker_id, current.trust_tier, updated.trust_tier
                    );
                    self.events
                        .append(&ReputationEvent::tier_change(
                            worker_id,
                            task_id,
                            current.trust_tier,
                            updated.trust_tier,
                        ))
                        .await?;
                }

                debug!(
                    "工作者 {} 信誉更新: {:.2} -> {:.2} (任务 {}, {})",
                    worker_id,
                    current.trust_score,
                    updated.trust_score,
                    task_id,
                    if accepted { "采纳" } else { "否决" }
                );
                return Ok(updated);
            }

            warn!("工作者 {} 信誉更新版本冲突，重试", worker_id);
        }

        Err(MarketError::database_error(format!(
            "工作者 {worker_id} 的信誉更新在 {} 次重试后仍然冲突",
            self.config.max_update_retries
        )))
    }
}

/// 保留3位小数的运行均值精度
fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketplace_infrastructure::memory::{
        InMemoryReputationEventRepository, InMemoryWorkerRepository,
    };

    async fn ledger_with_worker(trust_score: f64) -> (ReputationLedger, i64) {
        let workers = Arc::new(InMemoryWorkerRepository::new());
        let events = Arc::new(InMemoryReputationEventRepository::new());
        let mut worker = Worker::new("0xw1".to_string(), "worker".to_string());
        worker.trust_score = trust_score;
        worker.trust_tier = TrustTier::for_score(trust_score);
        let created = workers.create(&worker).await.unwrap();
        let ledger = ReputationLedger::new(workers, events, ReputationConfig::default());
        (ledger, created.id)
    }

    #[tokio::test]
    async fn accepted_adjudication_adds_exactly_two_hundredths() {
        let (ledger, worker_id) = ledger_with_worker(0.5).await;
        let updated = ledger.apply(1, worker_id, true).await.unwrap();
        assert_eq!(updated.trust_score, 0.52);
        assert_eq!(updated.total_completed, 1);
        assert_eq!(updated.accuracy_rate, 1.0);
    }

    #[tokio::test]
    async fn rejected_adjudication_costs_three_hundredths_but_still_counts() {
        let (ledger, worker_id) = ledger_with_worker(0.5).await;
        let updated = ledger.apply(1, worker_id, false).await.unwrap();
        assert_eq!(updated.trust_score, 0.47);
        // 被否决同样计入经验
        assert_eq!(updated.total_completed, 1);
        assert_eq!(updated.accuracy_rate, 0.0);
        assert_eq!(updated.completion_rate, 1.0);
    }

    #[tokio::test]
    async fn trust_score_is_clamped_to_unit_interval() {
        let (ledger, worker_id) = ledger_with_worker(0.99).await;
        let updated = ledger.apply(1, worker_id, true).await.unwrap();
        assert_eq!(updated.trust_score, 1.0);

        let (ledger, worker_id) = ledger_with_worker(0.02).await;
        let updated = ledger.apply(1, worker_id, false).await.unwrap();
        assert_eq!(updated.trust_score, 0.0);
    }

    #[tokio::test]
    async fn accuracy_rate_is_a_running_mean_with_three_decimals() {
        let (ledger, worker_id) = ledger_with_worker(0.5).await;
        ledger.apply(1, worker_id, true).await.unwrap();
        ledger.apply(2, worker_id, true).await.unwrap();
        let updated = ledger.apply(3, worker_id, false).await.unwrap();
        // 2/3 = 0.667
        assert_eq!(updated.accuracy_rate, 0.667);
        assert_eq!(updated.total_completed, 3);
    }

    #[tokio::test]
    async fn tier_change_appends_second_event() {
        let workers = Arc::new(InMemoryWorkerRepository::new());
        let events = Arc::new(InMemoryReputationEventRepository::new());
        let mut worker = Worker::new("0xw1".to_string(), "worker".to_string());
        worker.trust_score = 0.49;
        worker.trust_tier = TrustTier::for_score(worker.trust_score);
        let created = workers.create(&worker).await.unwrap();
        let ledger = ReputationLedger::new(
            workers,
            events.clone(),
            ReputationConfig::default(),
        );

        // 0.49 + 0.02 = 0.51 跨过 silver 门槛
        let updated = ledger.apply(9, created.id, true).await.unwrap();
        assert_eq!(updated.trust_tier, TrustTier::Silver);

        let log = events.list_by_worker(created.id).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].event_type, "task_accepted");
        assert_eq!(log[0].score_delta, 0.02);
        assert_eq!(log[1].event_type, "tier_change_bronze_to_silver");
    }

    #[tokio::test]
    async fn every_apply_appends_exactly_one_outcome_event() {
        let workers = Arc::new(InMemoryWorkerRepository::new());
        let events = Arc::new(InMemoryReputationEventRepository::new());
        let worker = workers
            .create(&Worker::new("0xw1".to_string(), "worker".to_string()))
            .await
            .unwrap();
        let ledger = ReputationLedger::new(
            workers,
            events.clone(),
            ReputationConfig::default(),
        );

        ledger.apply(1, worker.id, true).await.unwrap();
        ledger.apply(2, worker.id, false).await.unwrap();

        let outcome_events: Vec<_> = events
            .list_by_worker(worker.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.event_type.starts_with("task_"))
            .collect();
        assert_eq!(outcome_events.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_applies_for_one_worker_never_lose_updates() {
        let workers = Arc::new(InMemoryWorkerRepository::new());
        let events = Arc::new(InMemoryReputationEventRepository::new());
        let worker = workers
            .create(&Worker::new("0xw1".to_string(), "worker".to_string()))
            .await
            .unwrap();
        let ledger = Arc::new(ReputationLedger::new(
            workers.clone(),
            events,
            ReputationConfig::default(),
        ));

        let mut handles = Vec::new();
        for task_id in 1..=5 {
            let ledger = ledger.clone();
            let worker_id = worker.id;
            handles.push(tokio::spawn(async move {
                ledger.apply(task_id, worker_id, true).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = workers.get_by_id(worker.id).await.unwrap().unwrap();
        assert_eq!(stored.total_completed, 5);
        assert_eq!(stored.version, 5);
        // 0.5 + 5 * 0.02
        assert!((stored.trust_score - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn missing_worker_is_reported() {
        let workers = Arc::new(InMemoryWorkerRepository::new());
        let events = Arc::new(InMemoryReputationEventRepository::new());
        let ledger = ReputationLedger::new(workers, events, ReputationConfig::default());
        let result = ledger.apply(1, 404, true).await;
        assert!(matches!(result, Err(MarketError::WorkerNotFound { id: 404 })));
    }
}
