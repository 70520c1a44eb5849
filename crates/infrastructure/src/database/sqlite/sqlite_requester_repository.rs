use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use marketplace_core::{MarketError, MarketResult};
use marketplace_domain::{Requester, RequesterRepository};

const REQUESTER_COLUMNS: &str = "id, name, api_key, balance, created_at";

pub struct SqliteRequesterRepository {
    pool: SqlitePool,
}

impl SqliteRequesterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_requester(row: &sqlx::sqlite::SqliteRow) -> MarketResult<Requester> {
        Ok(Requester {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            api_key: row.try_get("api_key")?,
            balance: row.try_get("balance")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl RequesterRepository for SqliteRequesterRepository {
    async fn create(&self, requester: &Requester) -> MarketResult<Requester> {
        let sql = format!(
            r#"
            INSERT INTO requesters (name, api_key, balance, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {REQUESTER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(&requester.name)
            .bind(&requester.api_key)
            .bind(requester.balance)
            .bind(requester.created_at)
            .fetch_one(&self.pool)
            .await?;

        Self::row_to_requester(&row)
    }

    async fn get_by_id(&self, id: i64) -> MarketResult<Option<Requester>> {
        let sql = format!("SELECT {REQUESTER_COLUMNS} FROM requesters WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(Some(Self::row_to_requester(&row)?)),
            None => Ok(None),
        }
    }

    async fn try_debit(&self, id: i64, amount: f64) -> MarketResult<bool> {
        // 余额检查和扣减在同一条语句内，同一账户的并发扣款不会双花
        let result = sqlx::query(
            "UPDATE requesters SET balance = balance - $2 WHERE id = $1 AND balance >= $2",
        )
        .bind(id)
        .bind(amount)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn credit(&self, id: i64, amount: f64) -> MarketResult<()> {
        let result = sqlx::query("UPDATE requesters SET balance = balance + $2 WHERE id = $1")
            .bind(id)
            .bind(amount)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MarketError::RequesterNotFound { id });
        }
        Ok(())
    }
}
