use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use marketplace_core::{MarketError, MarketResult};
use marketplace_domain::{Task, TaskRepository, TaskStatus};

const TASK_COLUMNS: &str = "id, requester_id, input_payload, worker_instructions, \
     expected_response_type, importance, max_budget, required_workers, min_trust_tier, \
     price_per_worker, est_price, reward_on_completion, status, result, created_at, completed_at";

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> MarketResult<Task> {
        Ok(Task {
            id: row.try_get("id")?,
            requester_id: row.try_get("requester_id")?,
            input_payload: row.try_get("input_payload")?,
            worker_instructions: row.try_get("worker_instructions")?,
            expected_response_type: row.try_get("expected_response_type")?,
            importance: row.try_get("importance")?,
            max_budget: row.try_get("max_budget")?,
            required_workers: row.try_get("required_workers")?,
            min_trust_tier: row.try_get("min_trust_tier")?,
            price_per_worker: row.try_get("price_per_worker")?,
            est_price: row.try_get("est_price")?,
            reward_on_completion: row.try_get("reward_on_completion")?,
            status: row.try_get("status")?,
            result: row.try_get("result")?,
            created_at: row.try_get("created_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &Task) -> MarketResult<Task> {
        let sql = format!(
            r#"
            INSERT INTO tasks (requester_id, input_payload, worker_instructions,
                               expected_response_type, importance, max_budget, required_workers,
                               min_trust_tier, price_per_worker, est_price, reward_on_completion,
                               status, result, created_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {TASK_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(task.requester_id)
            .bind(&task.input_payload)
            .bind(&task.worker_instructions)
            .bind(&task.expected_response_type)
            .bind(task.importance)
            .bind(task.max_budget)
            .bind(task.required_workers)
            .bind(task.min_trust_tier)
            .bind(task.price_per_worker)
            .bind(task.est_price)
            .bind(task.reward_on_completion)
            .bind(task.status)
            .bind(&task.result)
            .bind(task.created_at)
            .bind(task.completed_at)
            .fetch_one(&self.pool)
            .await?;

        let created = Self::row_to_task(&row)?;
        debug!("创建{}", created.entity_description());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> MarketResult<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(Some(Self::row_to_task(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_by_status(&self, status: TaskStatus) -> MarketResult<Vec<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE status = $1 ORDER BY id");
        let rows = sqlx::query(&sql).bind(status).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_task).collect()
    }

    async fn list_claimable(&self) -> MarketResult<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status IN ('OPEN', 'ASSIGNED') ORDER BY id"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_task).collect()
    }

    async fn compare_and_set_status(
        &self,
        id: i64,
        from: &[TaskStatus],
        to: TaskStatus,
    ) -> MarketResult<bool> {
        if from.is_empty() {
            return Ok(false);
        }
        let placeholders = (0..from.len())
            .map(|i| format!("${}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql =
            format!("UPDATE tasks SET status = $1 WHERE id = $2 AND status IN ({placeholders})");

        let mut query = sqlx::query(&sql).bind(to).bind(id);
        for status in from {
            query = query.bind(*status);
        }
        let result = query.execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            // 可能是任务不存在，也可能只是状态不匹配；区分开来
            let exists = sqlx::query("SELECT 1 FROM tasks WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .is_some();
            if !exists {
                return Err(MarketError::TaskNotFound { id });
            }
            return Ok(false);
        }
        Ok(true)
    }

    async fn complete(
        &self,
        id: i64,
        result: &serde_json::Value,
        completed_at: DateTime<Utc>,
    ) -> MarketResult<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE tasks SET status = $1, result = $2, completed_at = $3
            WHERE id = $4 AND status = $5
            "#,
        )
        .bind(TaskStatus::Completed)
        .bind(result)
        .bind(completed_at)
        .bind(id)
        .bind(TaskStatus::Evaluating)
        .execute(&self.pool)
        .await?;

        Ok(updated.rows_affected() == 1)
    }

    async fn list_stale_pending(&self, cutoff: DateTime<Utc>) -> MarketResult<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE status IN ('OPEN', 'ASSIGNED', 'IN_PROGRESS') AND created_at < $1 \
             ORDER BY id"
        );
        let rows = sqlx::query(&sql).bind(cutoff).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_task).collect()
    }
}
