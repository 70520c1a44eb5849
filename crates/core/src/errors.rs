use thiserror::Error;

/// 市场引擎统一错误类型
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作失败: {0}")]
    DatabaseOperation(String),

    #[error("任务不存在: id={id}")]
    TaskNotFound { id: i64 },

    #[error("工作者不存在: id={id}")]
    WorkerNotFound { id: i64 },

    #[error("请求方不存在: id={id}")]
    RequesterNotFound { id: i64 },

    #[error("任务分配不存在: task_id={task_id}, worker_id={worker_id}")]
    AssignmentNotFound { task_id: i64, worker_id: i64 },

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    #[error("信任等级不足: 需要 {required}, 当前 {actual}")]
    NotEligible { required: String, actual: String },

    #[error("任务槽位竞争失败: task_id={task_id}")]
    SlotRaceLost { task_id: i64 },

    #[error("工作者已认领该任务: task_id={task_id}, worker_id={worker_id}")]
    AlreadyClaimed { task_id: i64, worker_id: i64 },

    #[error("响应已提交: task_id={task_id}, worker_id={worker_id}")]
    AlreadySubmitted { task_id: i64, worker_id: i64 },

    #[error("余额不足: 需要 {required:.2}, 可用 {available:.2}")]
    InsufficientBalance { required: f64, available: f64 },

    #[error("任务已完成裁决: task_id={task_id}")]
    AlreadyAdjudicated { task_id: i64 },

    #[error("余额补偿失败: requester_id={requester_id}, 金额 {amount:.2}: {reason}")]
    CompensationFailure {
        requester_id: i64,
        amount: f64,
        reason: String,
    },

    #[error("支付网关错误: {0}")]
    Payment(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type MarketResult<T> = std::result::Result<T, MarketError>;

impl MarketError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn task_not_found(id: i64) -> Self {
        Self::TaskNotFound { id }
    }
    pub fn worker_not_found(id: i64) -> Self {
        Self::WorkerNotFound { id }
    }
    pub fn requester_not_found(id: i64) -> Self {
        Self::RequesterNotFound { id }
    }
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::ValidationError(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// 不可自愈、需要运维介入的错误
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MarketError::CompensationFailure { .. }
                | MarketError::Configuration(_)
                | MarketError::Internal(_)
        )
    }

    /// 调用方可以安全重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MarketError::Database(_)
                | MarketError::DatabaseOperation(_)
                | MarketError::SlotRaceLost { .. }
                | MarketError::Payment(_)
        )
    }

    pub fn user_message(&self) -> &str {
        match self {
            MarketError::TaskNotFound { .. } => "请求的任务不存在",
            MarketError::WorkerNotFound { .. } => "请求的工作者不存在",
            MarketError::RequesterNotFound { .. } => "请求方账户不存在",
            MarketError::AssignmentNotFound { .. } => "该任务下没有您的认领记录",
            MarketError::ValidationError(_) => "输入数据验证失败",
            MarketError::NotEligible { .. } => "信任等级不足，无法认领该任务",
            MarketError::SlotRaceLost { .. } => "任务槽位已被抢占，请尝试其他任务",
            MarketError::AlreadyClaimed { .. } => "您已认领过该任务",
            MarketError::AlreadySubmitted { .. } => "该任务的响应已提交",
            MarketError::InsufficientBalance { .. } => "余额不足，无法创建任务",
            MarketError::AlreadyAdjudicated { .. } => "任务已完成裁决",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(err: serde_json::Error) -> Self {
        MarketError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for MarketError {
    fn from(err: anyhow::Error) -> Self {
        MarketError::Internal(err.to_string())
    }
}
