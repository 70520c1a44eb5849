//! 嵌入式表结构引导

use sqlx::SqlitePool;

use marketplace_core::MarketResult;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS requesters (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        api_key TEXT NOT NULL UNIQUE,
        balance REAL NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS workers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        wallet_address TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL,
        trust_score REAL NOT NULL,
        trust_tier TEXT NOT NULL,
        total_completed INTEGER NOT NULL DEFAULT 0,
        accuracy_rate REAL NOT NULL DEFAULT 0,
        completion_rate REAL NOT NULL DEFAULT 0,
        version INTEGER NOT NULL DEFAULT 0,
        registered_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        requester_id INTEGER NOT NULL REFERENCES requesters(id),
        input_payload TEXT NOT NULL,
        worker_instructions TEXT NOT NULL,
        expected_response_type TEXT NOT NULL,
        importance INTEGER NOT NULL,
        max_budget REAL NOT NULL,
        required_workers INTEGER NOT NULL,
        min_trust_tier TEXT NOT NULL,
        price_per_worker REAL NOT NULL,
        est_price REAL NOT NULL,
        reward_on_completion REAL NOT NULL,
        status TEXT NOT NULL,
        result TEXT,
        created_at TEXT NOT NULL,
        completed_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS task_assignments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id INTEGER NOT NULL REFERENCES tasks(id),
        worker_id INTEGER NOT NULL REFERENCES workers(id),
        status TEXT NOT NULL,
        response TEXT,
        assigned_at TEXT NOT NULL,
        submitted_at TEXT,
        UNIQUE(task_id, worker_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reputation_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        worker_id INTEGER NOT NULL REFERENCES workers(id),
        task_id INTEGER NOT NULL REFERENCES tasks(id),
        event_type TEXT NOT NULL,
        score_delta REAL NOT NULL,
        occurred_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
    "CREATE INDEX IF NOT EXISTS idx_assignments_task ON task_assignments(task_id)",
    "CREATE INDEX IF NOT EXISTS idx_events_worker ON reputation_events(worker_id)",
    "CREATE INDEX IF NOT EXISTS idx_events_task ON reputation_events(task_id)",
];

pub async fn initialize_schema(pool: &SqlitePool) -> MarketResult<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
