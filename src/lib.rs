//! 人机协作任务市场的路由、共识裁决与信誉引擎
//!
//! 对外的门面crate：重导出各子crate，并提供嵌入式应用装配。

pub mod app;

pub use app::MarketplaceApp;
pub use marketplace_core;
pub use marketplace_domain;
pub use marketplace_engine;
pub use marketplace_infrastructure;
