use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use marketplace_core::{MarketError, MarketResult};
use marketplace_domain::{Assignment, AssignmentRepository, AssignmentStatus};

const ASSIGNMENT_COLUMNS: &str =
    "id, task_id, worker_id, status, response, assigned_at, submitted_at";

pub struct SqliteAssignmentRepository {
    pool: SqlitePool,
}

impl SqliteAssignmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_assignment(row: &sqlx::sqlite::SqliteRow) -> MarketResult<Assignment> {
        Ok(Assignment {
            id: row.try_get("id")?,
            task_id: row.try_get("task_id")?,
            worker_id: row.try_get("worker_id")?,
            status: row.try_get("status")?,
            response: row.try_get("response")?,
            assigned_at: row.try_get("assigned_at")?,
            submitted_at: row.try_get("submitted_at")?,
        })
    }

    fn is_unique_violation(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db_err) => db_err.message().contains("UNIQUE"),
            _ => false,
        }
    }
}

#[async_trait]
impl AssignmentRepository for SqliteAssignmentRepository {
    async fn insert_if_capacity(
        &self,
        assignment: &Assignment,
        capacity: i32,
    ) -> MarketResult<Assignment> {
        // 先做可读性更好的重复检查；竞态下的重复由UNIQUE约束兜底
        let duplicate = sqlx::query(
            "SELECT 1 FROM task_assignments WHERE task_id = $1 AND worker_id = $2",
        )
        .bind(assignment.task_id)
        .bind(assignment.worker_id)
        .fetch_optional(&self.pool)
        .await?;
        if duplicate.is_some() {
            return Err(MarketError::AlreadyClaimed {
                task_id: assignment.task_id,
                worker_id: assignment.worker_id,
            });
        }

        // 容量检查和插入在同一条语句内，并发认领最后一个槽位只有一个会成功
        let sql = format!(
            r#"
            INSERT INTO task_assignments (task_id, worker_id, status, response, assigned_at, submitted_at)
            SELECT $1, $2, $3, $4, $5, $6
            WHERE (SELECT COUNT(*) FROM task_assignments WHERE task_id = $1) < $7
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(assignment.task_id)
            .bind(assignment.worker_id)
            .bind(assignment.status)
            .bind(&assignment.response)
            .bind(assignment.assigned_at)
            .bind(assignment.submitted_at)
            .bind(capacity)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                if Self::is_unique_violation(&e) {
                    MarketError::AlreadyClaimed {
                        task_id: assignment.task_id,
                        worker_id: assignment.worker_id,
                    }
                } else {
                    MarketError::Database(e)
                }
            })?;

        match row {
            Some(row) => {
                let created = Self::row_to_assignment(&row)?;
                debug!(
                    "工作者 {} 认领任务 {} (分配 {})",
                    created.worker_id, created.task_id, created.id
                );
                Ok(created)
            }
            None => Err(MarketError::SlotRaceLost {
                task_id: assignment.task_id,
            }),
        }
    }

    async fn get_by_task_and_worker(
        &self,
        task_id: i64,
        worker_id: i64,
    ) -> MarketResult<Option<Assignment>> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM task_assignments WHERE task_id = $1 AND worker_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(task_id)
            .bind(worker_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(Self::row_to_assignment(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_by_task(&self, task_id: i64) -> MarketResult<Vec<Assignment>> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM task_assignments WHERE task_id = $1 ORDER BY id"
        );
        let rows = sqlx::query(&sql).bind(task_id).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_assignment).collect()
    }

    async fn count_by_task(&self, task_id: i64) -> MarketResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM task_assignments WHERE task_id = $1")
            .bind(task_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    async fn count_submitted(&self, task_id: i64) -> MarketResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM task_assignments WHERE task_id = $1 AND status = $2",
        )
        .bind(task_id)
        .bind(AssignmentStatus::Submitted)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("n")?)
    }

    async fn mark_submitted(
        &self,
        id: i64,
        response: &serde_json::Value,
        submitted_at: DateTime<Utc>,
    ) -> MarketResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE task_assignments SET status = $1, response = $2, submitted_at = $3
            WHERE id = $4 AND status = $5
            "#,
        )
        .bind(AssignmentStatus::Submitted)
        .bind(response)
        .bind(submitted_at)
        .bind(id)
        .bind(AssignmentStatus::Assigned)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_statuses(&self, ids: &[i64], status: AssignmentStatus) -> MarketResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders = (0..ids.len())
            .map(|i| format!("${}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql =
            format!("UPDATE task_assignments SET status = $1 WHERE id IN ({placeholders})");

        let mut query = sqlx::query(&sql).bind(status);
        for id in ids {
            query = query.bind(*id);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }
}
