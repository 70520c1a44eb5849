//! 内存仓储实现
//!
//! 基于 tokio RwLock + HashMap，适用于嵌入式部署和测试场景。
//! 条件更新（状态CAS、容量受限插入、版本受限更新、余额受限扣减）
//! 都在单个写锁临界区内完成，与SQL实现保持同样的原子语义。

mod assignment_repository;
mod gateways;
mod reputation_event_repository;
mod requester_repository;
mod task_repository;
mod worker_repository;

pub use assignment_repository::InMemoryAssignmentRepository;
pub use gateways::{RecordingPaymentGateway, StaticTaskAuthoring};
pub use reputation_event_repository::InMemoryReputationEventRepository;
pub use requester_repository::InMemoryRequesterRepository;
pub use task_repository::InMemoryTaskRepository;
pub use worker_repository::InMemoryWorkerRepository;
