use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use marketplace_core::MarketResult;
use marketplace_domain::{ReputationEvent, ReputationEventRepository};

const EVENT_COLUMNS: &str = "id, worker_id, task_id, event_type, score_delta, occurred_at";

pub struct SqliteReputationEventRepository {
    pool: SqlitePool,
}

impl SqliteReputationEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> MarketResult<ReputationEvent> {
        Ok(ReputationEvent {
            id: row.try_get("id")?,
            worker_id: row.try_get("worker_id")?,
            task_id: row.try_get("task_id")?,
            event_type: row.try_get("event_type")?,
            score_delta: row.try_get("score_delta")?,
            occurred_at: row.try_get("occurred_at")?,
        })
    }
}

#[async_trait]
impl ReputationEventRepository for SqliteReputationEventRepository {
    async fn append(&self, event: &ReputationEvent) -> MarketResult<ReputationEvent> {
        let sql = format!(
            r#"
            INSERT INTO reputation_events (worker_id, task_id, event_type, score_delta, occurred_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {EVENT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(event.worker_id)
            .bind(event.task_id)
            .bind(&event.event_type)
            .bind(event.score_delta)
            .bind(event.occurred_at)
            .fetch_one(&self.pool)
            .await?;

        Self::row_to_event(&row)
    }

    async fn list_by_worker(&self, worker_id: i64) -> MarketResult<Vec<ReputationEvent>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM reputation_events WHERE worker_id = $1 ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(worker_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_event).collect()
    }

    async fn list_by_task(&self, task_id: i64) -> MarketResult<Vec<ReputationEvent>> {
        let sql =
            format!("SELECT {EVENT_COLUMNS} FROM reputation_events WHERE task_id = $1 ORDER BY id");
        let rows = sqlx::query(&sql).bind(task_id).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_event).collect()
    }
}
