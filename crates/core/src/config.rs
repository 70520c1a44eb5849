//! 应用配置
//!
//! 从TOML文件加载配置，支持 `MARKET__` 前缀的环境变量覆盖，
//! 所有调参项都提供默认值并在加载后统一校验。

use serde::{Deserialize, Serialize};

use crate::errors::{MarketError, MarketResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub routing: RoutingConfig,
    pub consensus: ConsensusConfig,
    pub reputation: ReputationConfig,
    pub lifecycle: LifecycleConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 10,
            connect_timeout_seconds: 5,
        }
    }
}

/// 路由计算参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// 低重要度任务完成奖励
    pub reward_low: f64,
    /// 中重要度任务完成奖励
    pub reward_medium: f64,
    /// 高重要度任务完成奖励
    pub reward_high: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            reward_low: 5.0,
            reward_medium: 15.0,
            reward_high: 40.0,
        }
    }
}

/// 共识裁决参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// 加权裁决的获胜权重占比下限
    pub weighted_quorum_ratio: f64,
    /// 查不到工作者记录时使用的默认信任权重
    pub default_trust_weight: f64,
    /// 加权裁决所需的最少提交数
    pub min_weighted_submissions: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            weighted_quorum_ratio: 0.6,
            default_trust_weight: 0.5,
            min_weighted_submissions: 3,
        }
    }
}

/// 信誉更新参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationConfig {
    /// 响应被采纳时的信誉增量
    pub accepted_delta: f64,
    /// 响应被否决时的信誉增量（负数，惩罚大于奖励）
    pub rejected_delta: f64,
    /// 乐观并发冲突时的最大重试次数
    pub max_update_retries: u32,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            accepted_delta: 0.02,
            rejected_delta: -0.03,
            max_update_retries: 8,
        }
    }
}

/// 任务生命周期参数
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LifecycleConfig {
    /// 未达成共识任务的过期时限（小时）。None 表示永不过期
    pub pending_deadline_hours: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl AppConfig {
    /// 加载配置：默认值 <- 可选TOML文件 <- MARKET__ 环境变量
    pub fn load(config_path: Option<&str>) -> MarketResult<Self> {
        let mut builder = config::Config::builder().add_source(
            config::Config::try_from(&AppConfig::default())
                .map_err(|e| MarketError::config_error(format!("默认配置构建失败: {e}")))?,
        );

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("MARKET")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .map_err(|e| MarketError::config_error(format!("配置加载失败: {e}")))?
            .try_deserialize()
            .map_err(|e| MarketError::config_error(format!("配置反序列化失败: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MarketResult<()> {
        if self.database.url.is_empty() {
            return Err(MarketError::config_error("database.url 不能为空"));
        }
        if self.database.max_connections == 0 {
            return Err(MarketError::config_error("database.max_connections 必须大于 0"));
        }
        let ratio = self.consensus.weighted_quorum_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(MarketError::config_error(
                "consensus.weighted_quorum_ratio 必须位于 (0, 1] 区间",
            ));
        }
        if !(0.0..=1.0).contains(&self.consensus.default_trust_weight) {
            return Err(MarketError::config_error(
                "consensus.default_trust_weight 必须位于 [0, 1] 区间",
            ));
        }
        if self.consensus.min_weighted_submissions == 0 {
            return Err(MarketError::config_error(
                "consensus.min_weighted_submissions 必须大于 0",
            ));
        }
        if self.reputation.accepted_delta <= 0.0 {
            return Err(MarketError::config_error("reputation.accepted_delta 必须为正数"));
        }
        if self.reputation.rejected_delta >= 0.0 {
            return Err(MarketError::config_error("reputation.rejected_delta 必须为负数"));
        }
        if self.reputation.max_update_retries == 0 {
            return Err(MarketError::config_error(
                "reputation.max_update_retries 必须大于 0",
            ));
        }
        if let Some(hours) = self.lifecycle.pending_deadline_hours {
            if hours <= 0 {
                return Err(MarketError::config_error(
                    "lifecycle.pending_deadline_hours 必须大于 0",
                ));
            }
        }
        if self.routing.reward_low < 0.0
            || self.routing.reward_medium < 0.0
            || self.routing.reward_high < 0.0
        {
            return Err(MarketError::config_error("routing 奖励不能为负数"));
        }
        Ok(())
    }
}
