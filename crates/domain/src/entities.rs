use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value_objects::{RoutingPlan, TaskBrief};

/// 需要人工判断的任务单元
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub requester_id: i64,
    /// 请求方提交的原始负载
    pub input_payload: serde_json::Value,
    /// 任务撰写协作方生成的人类可读指令
    pub worker_instructions: String,
    pub expected_response_type: String,
    /// 重要度，1-100
    pub importance: i32,
    pub max_budget: f64,
    // 以下路由字段在创建时计算，此后不可变
    pub required_workers: i32,
    pub min_trust_tier: TrustTier,
    pub price_per_worker: f64,
    pub est_price: f64,
    pub reward_on_completion: f64,
    pub status: TaskStatus,
    /// 裁决通过后的最终结果
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskStatus {
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "ASSIGNED")]
    Assigned,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    /// 裁决进行中，作为 exactly-once 触发的状态闸门
    #[serde(rename = "EVALUATING")]
    Evaluating,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "EXPIRED")]
    Expired,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "OPEN",
            TaskStatus::Assigned => "ASSIGNED",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Evaluating => "EVALUATING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Expired => "EXPIRED",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }
    pub fn is_claimable(&self) -> bool {
        matches!(self, TaskStatus::Open | TaskStatus::Assigned)
    }
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Expired | TaskStatus::Cancelled
        )
    }
}

impl sqlx::Type<sqlx::Sqlite> for TaskStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        match s {
            "OPEN" => Ok(TaskStatus::Open),
            "ASSIGNED" => Ok(TaskStatus::Assigned),
            "IN_PROGRESS" => Ok(TaskStatus::InProgress),
            "EVALUATING" => Ok(TaskStatus::Evaluating),
            "COMPLETED" => Ok(TaskStatus::Completed),
            "EXPIRED" => Ok(TaskStatus::Expired),
            "CANCELLED" => Ok(TaskStatus::Cancelled),
            _ => Err(format!("Invalid task status: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 按重要度粗分的档位，决定裁决算法
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImportanceTier {
    Low,
    Medium,
    High,
}

impl ImportanceTier {
    pub fn from_level(level: i32) -> Self {
        if level < 33 {
            ImportanceTier::Low
        } else if level < 66 {
            ImportanceTier::Medium
        } else {
            ImportanceTier::High
        }
    }
}

impl Task {
    pub fn new(
        requester_id: i64,
        input_payload: serde_json::Value,
        brief: TaskBrief,
        importance: i32,
        max_budget: f64,
        plan: RoutingPlan,
    ) -> Self {
        Self {
            id: 0, // 将由数据库生成
            requester_id,
            input_payload,
            worker_instructions: brief.worker_instructions,
            expected_response_type: brief.expected_response_type,
            importance,
            max_budget,
            required_workers: plan.required_workers,
            min_trust_tier: plan.min_trust_tier,
            price_per_worker: plan.price_per_worker,
            est_price: plan.est_price,
            reward_on_completion: plan.reward_on_completion,
            status: TaskStatus::Open,
            result: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
    pub fn importance_tier(&self) -> ImportanceTier {
        ImportanceTier::from_level(self.importance)
    }
    pub fn entity_description(&self) -> String {
        format!(
            "任务 (ID: {}, 重要度: {}, 需要工作者: {})",
            self.id, self.importance, self.required_workers
        )
    }
}

/// 工作者信任等级，完全由 trust_score 推导
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TrustTier {
    #[serde(rename = "bronze")]
    Bronze,
    #[serde(rename = "silver")]
    Silver,
    #[serde(rename = "gold")]
    Gold,
    #[serde(rename = "expert")]
    Expert,
}

impl TrustTier {
    /// 等级序数，用于资格比较
    pub fn rank(&self) -> u8 {
        match self {
            TrustTier::Bronze => 0,
            TrustTier::Silver => 1,
            TrustTier::Gold => 2,
            TrustTier::Expert => 3,
        }
    }

    /// 阈值表自上而下匹配：>=0.90 expert, >=0.75 gold, >=0.50 silver, 其余 bronze
    pub fn for_score(score: f64) -> Self {
        if score >= 0.90 {
            TrustTier::Expert
        } else if score >= 0.75 {
            TrustTier::Gold
        } else if score >= 0.50 {
            TrustTier::Silver
        } else {
            TrustTier::Bronze
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrustTier::Bronze => "bronze",
            TrustTier::Silver => "silver",
            TrustTier::Gold => "gold",
            TrustTier::Expert => "expert",
        }
    }
}

impl fmt::Display for TrustTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl sqlx::Type<sqlx::Sqlite> for TrustTier {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TrustTier {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        match s {
            "bronze" => Ok(TrustTier::Bronze),
            "silver" => Ok(TrustTier::Silver),
            "gold" => Ok(TrustTier::Gold),
            "expert" => Ok(TrustTier::Expert),
            _ => Err(format!("Invalid trust tier: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TrustTier {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 人类工作者
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: i64,
    pub wallet_address: String,
    pub display_name: String,
    /// 信任分，钳制在 [0, 1]
    pub trust_score: f64,
    pub trust_tier: TrustTier,
    /// 已裁决的分配总数，无论采纳与否都会递增
    pub total_completed: i64,
    pub accuracy_rate: f64,
    pub completion_rate: f64,
    /// 乐观并发版本号
    pub version: i64,
    pub registered_at: DateTime<Utc>,
}

impl Worker {
    pub fn new(wallet_address: String, display_name: String) -> Self {
        let trust_score = 0.5;
        Self {
            id: 0, // 将由数据库生成
            wallet_address,
            display_name,
            trust_score,
            trust_tier: TrustTier::for_score(trust_score),
            total_completed: 0,
            accuracy_rate: 0.0,
            completion_rate: 0.0,
            version: 0,
            registered_at: Utc::now(),
        }
    }
    pub fn is_eligible_for(&self, bar: TrustTier) -> bool {
        self.trust_tier.rank() >= bar.rank()
    }
}

/// 任务请求方（AI代理），持有用于任务计费的余额
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requester {
    pub id: i64,
    pub name: String,
    pub api_key: String,
    pub balance: f64,
    pub created_at: DateTime<Utc>,
}

impl Requester {
    pub fn new(name: String, api_key: String, balance: f64) -> Self {
        Self {
            id: 0, // 将由数据库生成
            name,
            api_key,
            balance,
            created_at: Utc::now(),
        }
    }
}

/// 一名工作者与一个任务的绑定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub task_id: i64,
    pub worker_id: i64,
    pub status: AssignmentStatus,
    pub response: Option<serde_json::Value>,
    pub assigned_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AssignmentStatus {
    #[serde(rename = "ASSIGNED")]
    Assigned,
    #[serde(rename = "SUBMITTED")]
    Submitted,
    #[serde(rename = "ACCEPTED")]
    Accepted,
    #[serde(rename = "REJECTED")]
    Rejected,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Assigned => "ASSIGNED",
            AssignmentStatus::Submitted => "SUBMITTED",
            AssignmentStatus::Accepted => "ACCEPTED",
            AssignmentStatus::Rejected => "REJECTED",
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for AssignmentStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for AssignmentStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        match s {
            "ASSIGNED" => Ok(AssignmentStatus::Assigned),
            "SUBMITTED" => Ok(AssignmentStatus::Submitted),
            "ACCEPTED" => Ok(AssignmentStatus::Accepted),
            "REJECTED" => Ok(AssignmentStatus::Rejected),
            _ => Err(format!("Invalid assignment status: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for AssignmentStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

impl Assignment {
    pub fn new(task_id: i64, worker_id: i64) -> Self {
        Self {
            id: 0, // 将由数据库生成
            task_id,
            worker_id,
            status: AssignmentStatus::Assigned,
            response: None,
            assigned_at: Utc::now(),
            submitted_at: None,
        }
    }
    pub fn is_submitted(&self) -> bool {
        matches!(self.status, AssignmentStatus::Submitted)
    }
}

/// 信誉变更审计记录，只追加，永不修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationEvent {
    pub id: i64,
    pub worker_id: i64,
    pub task_id: i64,
    pub event_type: String,
    pub score_delta: f64,
    pub occurred_at: DateTime<Utc>,
}

impl ReputationEvent {
    pub fn task_outcome(worker_id: i64, task_id: i64, accepted: bool, score_delta: f64) -> Self {
        let event_type = if accepted {
            "task_accepted"
        } else {
            "task_rejected"
        };
        Self {
            id: 0, // 将由数据库生成
            worker_id,
            task_id,
            event_type: event_type.to_string(),
            score_delta,
            occurred_at: Utc::now(),
        }
    }

    pub fn tier_change(worker_id: i64, task_id: i64, from: TrustTier, to: TrustTier) -> Self {
        Self {
            id: 0, // 将由数据库生成
            worker_id,
            task_id,
            event_type: format!("tier_change_{from}_to_{to}"),
            score_delta: 0.0,
            occurred_at: Utc::now(),
        }
    }
}
