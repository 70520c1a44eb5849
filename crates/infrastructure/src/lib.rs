pub mod database;
pub mod memory;

pub use database::sqlite::{
    connect_sqlite, SqliteAssignmentRepository, SqliteReputationEventRepository,
    SqliteRequesterRepository, SqliteTaskRepository, SqliteWorkerRepository,
};
pub use memory::{
    InMemoryAssignmentRepository, InMemoryReputationEventRepository, InMemoryRequesterRepository,
    InMemoryTaskRepository, InMemoryWorkerRepository, RecordingPaymentGateway, StaticTaskAuthoring,
};
