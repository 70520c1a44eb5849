use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use marketplace_core::MarketResult;
use marketplace_domain::{Worker, WorkerRepository};

const WORKER_COLUMNS: &str = "id, wallet_address, display_name, trust_score, trust_tier, \
     total_completed, accuracy_rate, completion_rate, version, registered_at";

pub struct SqliteWorkerRepository {
    pool: SqlitePool,
}

impl SqliteWorkerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_worker(row: &sqlx::sqlite::SqliteRow) -> MarketResult<Worker> {
        Ok(Worker {
            id: row.try_get("id")?,
            wallet_address: row.try_get("wallet_address")?,
            display_name: row.try_get("display_name")?,
            trust_score: row.try_get("trust_score")?,
            trust_tier: row.try_get("trust_tier")?,
            total_completed: row.try_get("total_completed")?,
            accuracy_rate: row.try_get("accuracy_rate")?,
            completion_rate: row.try_get("completion_rate")?,
            version: row.try_get("version")?,
            registered_at: row.try_get("registered_at")?,
        })
    }
}

#[async_trait]
impl WorkerRepository for SqliteWorkerRepository {
    async fn create(&self, worker: &Worker) -> MarketResult<Worker> {
        let sql = format!(
            r#"
            INSERT INTO workers (wallet_address, display_name, trust_score, trust_tier,
                                 total_completed, accuracy_rate, completion_rate, version,
                                 registered_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {WORKER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(&worker.wallet_address)
            .bind(&worker.display_name)
            .bind(worker.trust_score)
            .bind(worker.trust_tier)
            .bind(worker.total_completed)
            .bind(worker.accuracy_rate)
            .bind(worker.completion_rate)
            .bind(worker.version)
            .bind(worker.registered_at)
            .fetch_one(&self.pool)
            .await?;

        Self::row_to_worker(&row)
    }

    async fn get_by_id(&self, id: i64) -> MarketResult<Option<Worker>> {
        let sql = format!("SELECT {WORKER_COLUMNS} FROM workers WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(Some(Self::row_to_worker(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_by_ids(&self, ids: &[i64]) -> MarketResult<Vec<Worker>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (0..ids.len())
            .map(|i| format!("${}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql =
            format!("SELECT {WORKER_COLUMNS} FROM workers WHERE id IN ({placeholders}) ORDER BY id");

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_worker).collect()
    }

    async fn update_reputation(
        &self,
        worker: &Worker,
        expected_version: i64,
    ) -> MarketResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE workers
            SET trust_score = $1, trust_tier = $2, total_completed = $3,
                accuracy_rate = $4, completion_rate = $5, version = version + 1
            WHERE id = $6 AND version = $7
            "#,
        )
        .bind(worker.trust_score)
        .bind(worker.trust_tier)
        .bind(worker.total_completed)
        .bind(worker.accuracy_rate)
        .bind(worker.completion_rate)
        .bind(worker.id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_top_by_trust(&self, limit: i64) -> MarketResult<Vec<Worker>> {
        let sql = format!(
            "SELECT {WORKER_COLUMNS} FROM workers ORDER BY trust_score DESC, id ASC LIMIT $1"
        );
        let rows = sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_worker).collect()
    }
}
