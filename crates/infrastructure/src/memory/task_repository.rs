use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use marketplace_core::{MarketError, MarketResult};
use marketplace_domain::{Task, TaskRepository, TaskStatus};

/// 内存任务仓储
pub struct InMemoryTaskRepository {
    tasks: Arc<RwLock<HashMap<i64, Task>>>,
    next_id: AtomicI64,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryTaskRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn create(&self, task: &Task) -> MarketResult<Task> {
        let mut created = task.clone();
        created.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.tasks.write().await.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> MarketResult<Option<Task>> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn list_by_status(&self, status: TaskStatus) -> MarketResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.id);
        Ok(tasks)
    }

    async fn list_claimable(&self) -> MarketResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.status.is_claimable())
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.id);
        Ok(tasks)
    }

    async fn compare_and_set_status(
        &self,
        id: i64,
        from: &[TaskStatus],
        to: TaskStatus,
    ) -> MarketResult<bool> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&id)
            .ok_or(MarketError::TaskNotFound { id })?;
        if from.contains(&task.status) {
            task.status = to;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn complete(
        &self,
        id: i64,
        result: &serde_json::Value,
        completed_at: DateTime<Utc>,
    ) -> MarketResult<bool> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&id)
            .ok_or(MarketError::TaskNotFound { id })?;
        if task.status != TaskStatus::Evaluating {
            return Ok(false);
        }
        task.status = TaskStatus::Completed;
        task.result = Some(result.clone());
        task.completed_at = Some(completed_at);
        Ok(true)
    }

    async fn list_stale_pending(&self, cutoff: DateTime<Utc>) -> MarketResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| {
                matches!(
                    t.status,
                    TaskStatus::Open | TaskStatus::Assigned | TaskStatus::InProgress
                ) && t.created_at < cutoff
            })
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.id);
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketplace_domain::{RoutingPlan, TaskBrief, TrustTier};
    use serde_json::json;

    fn sample_task() -> Task {
        Task::new(
            1,
            json!({"question": "?"}),
            TaskBrief {
                worker_instructions: "instructions".to_string(),
                expected_response_type: "json".to_string(),
            },
            50,
            30.0,
            RoutingPlan {
                required_workers: 3,
                min_trust_tier: TrustTier::Silver,
                price_per_worker: 10.0,
                est_price: 30.0,
                reward_on_completion: 15.0,
            },
        )
    }

    #[tokio::test]
    async fn compare_and_set_only_fires_from_listed_states() {
        let repo = InMemoryTaskRepository::new();
        let task = repo.create(&sample_task()).await.unwrap();

        assert!(repo
            .compare_and_set_status(task.id, &[TaskStatus::Open], TaskStatus::Assigned)
            .await
            .unwrap());
        // 第二次从 open 出发的迁移必须失败
        assert!(!repo
            .compare_and_set_status(task.id, &[TaskStatus::Open], TaskStatus::Assigned)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn complete_requires_evaluating_state() {
        let repo = InMemoryTaskRepository::new();
        let task = repo.create(&sample_task()).await.unwrap();

        assert!(!repo.complete(task.id, &json!("r"), Utc::now()).await.unwrap());

        repo.compare_and_set_status(task.id, &[TaskStatus::Open], TaskStatus::Evaluating)
            .await
            .unwrap();
        assert!(repo.complete(task.id, &json!("r"), Utc::now()).await.unwrap());

        let stored = repo.get_by_id(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
        assert_eq!(stored.result, Some(json!("r")));
        assert!(stored.completed_at.is_some());
    }
}
