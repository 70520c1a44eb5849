//! 嵌入式应用装配
//!
//! 把仓储、裁决器、信誉账本和生命周期控制器接成一个可用的引擎。
//! 内存模式用于测试和演示，SQLite模式用于单机持久化部署；
//! 支付与任务撰写默认使用嵌入式实现，生产部署时注入真实协作方。

use std::sync::Arc;

use marketplace_core::{AppConfig, MarketResult};
use marketplace_domain::{
    AssignmentRepository, PaymentGateway, ReputationEventRepository, RequesterRepository,
    TaskAuthoring, TaskRepository, WorkerRepository,
};
use marketplace_engine::{ConsensusEvaluator, LifecycleController, ReputationLedger};
use marketplace_infrastructure::memory::{
    InMemoryAssignmentRepository, InMemoryReputationEventRepository, InMemoryRequesterRepository,
    InMemoryTaskRepository, InMemoryWorkerRepository, RecordingPaymentGateway, StaticTaskAuthoring,
};
use marketplace_infrastructure::{
    connect_sqlite, SqliteAssignmentRepository, SqliteReputationEventRepository,
    SqliteRequesterRepository, SqliteTaskRepository, SqliteWorkerRepository,
};

pub struct MarketplaceApp {
    pub controller: Arc<LifecycleController>,
    pub tasks: Arc<dyn TaskRepository>,
    pub assignments: Arc<dyn AssignmentRepository>,
    pub workers: Arc<dyn WorkerRepository>,
    pub requesters: Arc<dyn RequesterRepository>,
    pub events: Arc<dyn ReputationEventRepository>,
}

impl MarketplaceApp {
    /// 内存引擎，默认嵌入式协作方
    pub fn in_memory(config: &AppConfig) -> Self {
        Self::in_memory_with_gateways(
            config,
            Arc::new(RecordingPaymentGateway::new()),
            Arc::new(StaticTaskAuthoring),
        )
    }

    pub fn in_memory_with_gateways(
        config: &AppConfig,
        payments: Arc<dyn PaymentGateway>,
        authoring: Arc<dyn TaskAuthoring>,
    ) -> Self {
        let tasks: Arc<dyn TaskRepository> = Arc::new(InMemoryTaskRepository::new());
        let assignments: Arc<dyn AssignmentRepository> =
            Arc::new(InMemoryAssignmentRepository::new());
        let workers: Arc<dyn WorkerRepository> = Arc::new(InMemoryWorkerRepository::new());
        let requesters: Arc<dyn RequesterRepository> =
            Arc::new(InMemoryRequesterRepository::new());
        let events: Arc<dyn ReputationEventRepository> =
            Arc::new(InMemoryReputationEventRepository::new());

        Self::assemble(
            config, tasks, assignments, workers, requesters, events, payments, authoring,
        )
    }

    /// SQLite引擎，连接参数取自 config.database
    pub async fn with_sqlite(config: &AppConfig) -> MarketResult<Self> {
        Self::with_sqlite_gateways(
            config,
            Arc::new(RecordingPaymentGateway::new()),
            Arc::new(StaticTaskAuthoring),
        )
        .await
    }

    pub async fn with_sqlite_gateways(
        config: &AppConfig,
        payments: Arc<dyn PaymentGateway>,
        authoring: Arc<dyn TaskAuthoring>,
    ) -> MarketResult<Self> {
        let pool = connect_sqlite(&config.database.url, config.database.max_connections).await?;

        let tasks: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let assignments: Arc<dyn AssignmentRepository> =
            Arc::new(SqliteAssignmentRepository::new(pool.clone()));
        let workers: Arc<dyn WorkerRepository> =
            Arc::new(SqliteWorkerRepository::new(pool.clone()));
        let requesters: Arc<dyn RequesterRepository> =
            Arc::new(SqliteRequesterRepository::new(pool.clone()));
        let events: Arc<dyn ReputationEventRepository> =
            Arc::new(SqliteReputationEventRepository::new(pool));

        Ok(Self::assemble(
            config, tasks, assignments, workers, requesters, events, payments, authoring,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        config: &AppConfig,
        tasks: Arc<dyn TaskRepository>,
        assignments: Arc<dyn AssignmentRepository>,
        workers: Arc<dyn WorkerRepository>,
        requesters: Arc<dyn RequesterRepository>,
        events: Arc<dyn ReputationEventRepository>,
        payments: Arc<dyn PaymentGateway>,
        authoring: Arc<dyn TaskAuthoring>,
    ) -> Self {
        let controller = Arc::new(LifecycleController::new(
            tasks.clone(),
            assignments.clone(),
            workers.clone(),
            requesters.clone(),
            payments,
            authoring,
            ConsensusEvaluator::new(&config.consensus),
            ReputationLedger::new(workers.clone(), events.clone(), config.reputation.clone()),
            config.routing.clone(),
            config.lifecycle.clone(),
        ));

        Self {
            controller,
            tasks,
            assignments,
            workers,
            requesters,
            events,
        }
    }
}
