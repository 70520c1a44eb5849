//! SQLite仓储实现
//!
//! 嵌入式部署的持久化后端。所有条件更新都落在单条SQL语句上，
//! 由数据库的写串行化保证原子性。

pub mod schema;

mod sqlite_assignment_repository;
mod sqlite_reputation_event_repository;
mod sqlite_requester_repository;
mod sqlite_task_repository;
mod sqlite_worker_repository;

pub use sqlite_assignment_repository::SqliteAssignmentRepository;
pub use sqlite_reputation_event_repository::SqliteReputationEventRepository;
pub use sqlite_requester_repository::SqliteRequesterRepository;
pub use sqlite_task_repository::SqliteTaskRepository;
pub use sqlite_worker_repository::SqliteWorkerRepository;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use marketplace_core::{MarketError, MarketResult};

/// 建立SQLite连接池并初始化表结构。
/// 纯内存库强制单连接，多个连接会各自拿到独立的空库。
pub async fn connect_sqlite(url: &str, max_connections: u32) -> MarketResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| MarketError::config_error(format!("无效的数据库URL '{url}': {e}")))?
        .create_if_missing(true);

    let max_connections = if url.contains(":memory:") {
        1
    } else {
        max_connections.max(1)
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    schema::initialize_schema(&pool).await?;
    info!("SQLite数据库就绪: {url}");
    Ok(pool)
}
