//! 日志初始化
//!
//! 基于 tracing-subscriber 的统一日志出口，支持环境变量过滤和JSON格式输出。

use tracing_subscriber::EnvFilter;

use crate::config::ObservabilityConfig;
use crate::errors::{MarketError, MarketResult};

/// 初始化全局日志订阅者。重复初始化返回配置错误。
pub fn init_logging(config: &ObservabilityConfig) -> MarketResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| MarketError::config_error(format!("无效的日志级别 '{}': {e}", config.log_level)))?;

    let result = if config.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    result.map_err(|e| MarketError::config_error(format!("日志初始化失败: {e}")))
}
