use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use marketplace_core::{MarketError, MarketResult};
use marketplace_domain::{Assignment, AssignmentRepository, AssignmentStatus};

/// 内存任务分配仓储。
/// 容量检查和插入在同一个写锁临界区内完成，保证槽位认领的原子性。
pub struct InMemoryAssignmentRepository {
    assignments: Arc<RwLock<HashMap<i64, Assignment>>>,
    next_id: AtomicI64,
}

impl InMemoryAssignmentRepository {
    pub fn new() -> Self {
        Self {
            assignments: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryAssignmentRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryAssignmentRepository {
    async fn insert_if_capacity(
        &self,
        assignment: &Assignment,
        capacity: i32,
    ) -> MarketResult<Assignment> {
        let mut assignments = self.assignments.write().await;

        if assignments
            .values()
            .any(|a| a.task_id == assignment.task_id && a.worker_id == assignment.worker_id)
        {
            return Err(MarketError::AlreadyClaimed {
                task_id: assignment.task_id,
                worker_id: assignment.worker_id,
            });
        }

        let held = assignments
            .values()
            .filter(|a| a.task_id == assignment.task_id)
            .count() as i32;
        if held >= capacity {
            return Err(MarketError::SlotRaceLost {
                task_id: assignment.task_id,
            });
        }

        let mut created = assignment.clone();
        created.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        assignments.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_task_and_worker(
        &self,
        task_id: i64,
        worker_id: i64,
    ) -> MarketResult<Option<Assignment>> {
        Ok(self
            .assignments
            .read()
            .await
            .values()
            .find(|a| a.task_id == task_id && a.worker_id == worker_id)
            .cloned())
    }

    async fn list_by_task(&self, task_id: i64) -> MarketResult<Vec<Assignment>> {
        let mut list: Vec<Assignment> = self
            .assignments
            .read()
            .await
            .values()
            .filter(|a| a.task_id == task_id)
            .cloned()
            .collect();
        list.sort_by_key(|a| a.id);
        Ok(list)
    }

    async fn count_by_task(&self, task_id: i64) -> MarketResult<i64> {
        Ok(self
            .assignments
            .read()
            .await
            .values()
            .filter(|a| a.task_id == task_id)
            .count() as i64)
    }

    async fn count_submitted(&self, task_id: i64) -> MarketResult<i64> {
        Ok(self
            .assignments
            .read()
            .await
            .values()
            .filter(|a| a.task_id == task_id && a.status == AssignmentStatus::Submitted)
            .count() as i64)
    }

    async fn mark_submitted(
        &self,
        id: i64,
        response: &serde_json::Value,
        submitted_at: DateTime<Utc>,
    ) -> MarketResult<bool> {
        let mut assignments = self.assignments.write().await;
        let assignment = assignments
            .get_mut(&id)
            .ok_or_else(|| MarketError::database_error(format!("分配记录不存在: id={id}")))?;
        if assignment.status != AssignmentStatus::Assigned {
            return Ok(false);
        }
        assignment.status = AssignmentStatus::Submitted;
        assignment.response = Some(response.clone());
        assignment.submitted_at = Some(submitted_at);
        Ok(true)
    }

    async fn set_statuses(&self, ids: &[i64], status: AssignmentStatus) -> MarketResult<()> {
        let mut assignments = self.assignments.write().await;
        for id in ids {
            if let Some(assignment) = assignments.get_mut(id) {
                assignment.status = status;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn capacity_guard_rejects_overflow() {
        let repo = InMemoryAssignmentRepository::new();
        repo.insert_if_capacity(&Assignment::new(1, 10), 2).await.unwrap();
        repo.insert_if_capacity(&Assignment::new(1, 11), 2).await.unwrap();

        let result = repo.insert_if_capacity(&Assignment::new(1, 12), 2).await;
        assert!(matches!(result, Err(MarketError::SlotRaceLost { task_id: 1 })));
    }

    #[tokio::test]
    async fn duplicate_claim_is_detected() {
        let repo = InMemoryAssignmentRepository::new();
        repo.insert_if_capacity(&Assignment::new(1, 10), 3).await.unwrap();
        let result = repo.insert_if_capacity(&Assignment::new(1, 10), 3).await;
        assert!(matches!(
            result,
            Err(MarketError::AlreadyClaimed { task_id: 1, worker_id: 10 })
        ));
    }

    #[tokio::test]
    async fn concurrent_inserts_never_exceed_capacity() {
        let repo = Arc::new(InMemoryAssignmentRepository::new());
        let mut handles = Vec::new();
        for worker_id in 0..16 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.insert_if_capacity(&Assignment::new(1, worker_id), 5).await
            }));
        }

        let mut won = 0;
        let mut lost = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => won += 1,
                Err(MarketError::SlotRaceLost { .. }) => lost += 1,
                Err(other) => panic!("意外错误: {other}"),
            }
        }
        assert_eq!(won, 5);
        assert_eq!(lost, 11);
        assert_eq!(repo.count_by_task(1).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn mark_submitted_is_single_shot() {
        let repo = InMemoryAssignmentRepository::new();
        let created = repo
            .insert_if_capacity(&Assignment::new(1, 10), 1)
            .await
            .unwrap();

        let response = serde_json::json!({"ok": true});
        assert!(repo.mark_submitted(created.id, &response, Utc::now()).await.unwrap());
        assert!(!repo.mark_submitted(created.id, &response, Utc::now()).await.unwrap());
        assert_eq!(repo.count_submitted(1).await.unwrap(), 1);
    }
}
