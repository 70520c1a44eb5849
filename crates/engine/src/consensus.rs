//! 共识裁决
//!
//! 按重要度档位选择裁决算法：低档首个提交直接采纳，中档结构化多数投票，
//! 高档按工作者信任分加权投票。纯CPU计算，所有I/O由生命周期控制器承担。

use std::collections::HashMap;

use serde_json::Value;

use marketplace_core::ConsensusConfig;
use marketplace_domain::{Assignment, ImportanceTier};

/// 一次裁决的输出
#[derive(Debug, Clone)]
pub struct ConsensusOutcome {
    pub reached: bool,
    pub result: Option<Value>,
    pub accepted_assignments: Vec<i64>,
    pub rejected_assignments: Vec<i64>,
}

impl ConsensusOutcome {
    fn not_reached() -> Self {
        Self {
            reached: false,
            result: None,
            accepted_assignments: Vec::new(),
            rejected_assignments: Vec::new(),
        }
    }

    fn reached(result: Value, accepted: Vec<i64>, rejected: Vec<i64>) -> Self {
        Self {
            reached: true,
            result: Some(result),
            accepted_assignments: accepted,
            rejected_assignments: rejected,
        }
    }
}

pub struct ConsensusEvaluator {
    /// 加权裁决获胜组权重占比下限
    quorum_ratio: f64,
    /// 查不到工作者记录时的默认权重
    default_weight: f64,
    /// 加权裁决所需的最少提交数
    min_weighted_submissions: usize,
}

impl ConsensusEvaluator {
    pub fn new(config: &ConsensusConfig) -> Self {
        Self {
            quorum_ratio: config.weighted_quorum_ratio,
            default_weight: config.default_trust_weight,
            min_weighted_submissions: config.min_weighted_submissions,
        }
    }

    /// 对已提交的分配做裁决。零提交是正常的"未达成"，不是错误。
    ///
    /// 提交先按 (submitted_at, id) 排序，使分组遍历顺序和权重并列时的
    /// 取舍都由最早提交决定，结果完全确定。
    pub fn evaluate(
        &self,
        tier: ImportanceTier,
        assignments: &[Assignment],
        trust_scores: &HashMap<i64, f64>,
    ) -> ConsensusOutcome {
        let mut submitted: Vec<&Assignment> = assignments
            .iter()
            .filter(|a| a.is_submitted() && a.response.is_some())
            .collect();
        submitted.sort_by_key(|a| (a.submitted_at, a.id));

        match tier {
            ImportanceTier::Low => Self::evaluate_first_wins(&submitted),
            ImportanceTier::Medium => Self::evaluate_majority(&submitted),
            ImportanceTier::High => self.evaluate_weighted(&submitted, trust_scores),
        }
    }

    /// 低档：采纳首个提交
    fn evaluate_first_wins(submitted: &[&Assignment]) -> ConsensusOutcome {
        match submitted.first() {
            None => ConsensusOutcome::not_reached(),
            Some(first) => ConsensusOutcome::reached(
                first.response.clone().unwrap_or(Value::Null),
                vec![first.id],
                Vec::new(),
            ),
        }
    }

    /// 中档：结构化分组后的严格多数（> n/2），并列即未达成
    fn evaluate_majority(submitted: &[&Assignment]) -> ConsensusOutcome {
        if submitted.len() < 2 {
            return ConsensusOutcome::not_reached();
        }

        let groups = group_by_response(submitted);
        let mut best: Option<&ResponseGroup> = None;
        for group in &groups {
            if best.map_or(true, |b| group.members.len() > b.members.len()) {
                best = Some(group);
            }
        }
        let top = best.expect("至少存在一个分组");

        if top.members.len() * 2 > submitted.len() {
            let accepted: Vec<i64> = top.members.iter().map(|a| a.id).collect();
            let rejected = ids_not_in(submitted, &accepted);
            ConsensusOutcome::reached(top.representative(), accepted, rejected)
        } else {
            ConsensusOutcome::not_reached()
        }
    }

    /// 高档：按信任分加权，获胜组权重占比达到配额线才算达成。
    /// 权重并列时保留提交顺序中先出现的组。
    fn evaluate_weighted(
        &self,
        submitted: &[&Assignment],
        trust_scores: &HashMap<i64, f64>,
    ) -> ConsensusOutcome {
        if submitted.len() < self.min_weighted_submissions {
            return ConsensusOutcome::not_reached();
        }

        let weight_of = |a: &Assignment| {
            trust_scores
                .get(&a.worker_id)
                .copied()
                .unwrap_or(self.default_weight)
        };

        let total_weight: f64 = submitted.iter().map(|a| weight_of(a)).sum();
        if total_weight <= 0.0 {
            return ConsensusOutcome::not_reached();
        }

        let groups = group_by_response(submitted);
        let mut best: Option<(&ResponseGroup, f64)> = None;
        for group in &groups {
            let weight: f64 = group.members.iter().map(|a| weight_of(a)).sum();
            if best.map_or(true, |(_, bw)| weight > bw) {
                best = Some((group, weight));
            }
        }
        let (winner, winner_weight) = best.expect("至少存在一个分组");

        if winner_weight / total_weight >= self.quorum_ratio {
            let accepted: Vec<i64> = winner.members.iter().map(|a| a.id).collect();
            let rejected = ids_not_in(submitted, &accepted);
            ConsensusOutcome::reached(winner.representative(), accepted, rejected)
        } else {
            ConsensusOutcome::not_reached()
        }
    }
}

struct ResponseGroup<'a> {
    members: Vec<&'a Assignment>,
}

impl ResponseGroup<'_> {
    fn representative(&self) -> Value {
        self.members[0].response.clone().unwrap_or(Value::Null)
    }
}

/// 按响应的规范化序列化分组，保持首次出现顺序。
/// 键序无关：字段顺序不同但内容相同的响应会落入同一组。
fn group_by_response<'a>(submitted: &[&'a Assignment]) -> Vec<ResponseGroup<'a>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<ResponseGroup<'a>> = Vec::new();

    for assignment in submitted {
        let key = canonical_key(assignment.response.as_ref().unwrap_or(&Value::Null));
        match index.get(&key) {
            Some(&i) => groups[i].members.push(assignment),
            None => {
                index.insert(key, groups.len());
                groups.push(ResponseGroup {
                    members: vec![assignment],
                });
            }
        }
    }
    groups
}

fn ids_not_in(submitted: &[&Assignment], accepted: &[i64]) -> Vec<i64> {
    submitted
        .iter()
        .map(|a| a.id)
        .filter(|id| !accepted.contains(id))
        .collect()
}

/// 响应值的规范化序列化：对象键递归排序，数组保持原序。
pub fn canonical_key(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use marketplace_domain::AssignmentStatus;
    use serde_json::json;

    fn evaluator() -> ConsensusEvaluator {
        ConsensusEvaluator::new(&ConsensusConfig::default())
    }

    fn submitted(id: i64, worker_id: i64, response: Value, order: i64) -> Assignment {
        let mut a = Assignment::new(1, worker_id);
        a.id = id;
        a.status = AssignmentStatus::Submitted;
        a.response = Some(response);
        a.submitted_at = Some(Utc::now() + Duration::seconds(order));
        a
    }

    #[test]
    fn zero_submissions_is_benign_not_reached() {
        let outcome = evaluator().evaluate(ImportanceTier::Medium, &[], &HashMap::new());
        assert!(!outcome.reached);
        assert!(outcome.result.is_none());
    }

    #[test]
    fn low_tier_accepts_first_submission_verbatim() {
        let assignments = vec![submitted(1, 10, json!({"answer": "yes"}), 0)];
        let outcome = evaluator().evaluate(ImportanceTier::Low, &assignments, &HashMap::new());
        assert!(outcome.reached);
        assert_eq!(outcome.result, Some(json!({"answer": "yes"})));
        assert_eq!(outcome.accepted_assignments, vec![1]);
        assert!(outcome.rejected_assignments.is_empty());
    }

    #[test]
    fn unsubmitted_assignments_are_ignored() {
        let mut pending = Assignment::new(1, 10);
        pending.id = 1;
        pending.response = Some(json!({"answer": "draft"}));
        let outcome = evaluator().evaluate(ImportanceTier::Low, &[pending], &HashMap::new());
        assert!(!outcome.reached);
    }

    #[test]
    fn medium_tier_two_against_one_reaches_majority() {
        let assignments = vec![
            submitted(1, 10, json!({"label": "cat"}), 0),
            submitted(2, 11, json!({"label": "dog"}), 1),
            submitted(3, 12, json!({"label": "cat"}), 2),
        ];
        let outcome = evaluator().evaluate(ImportanceTier::Medium, &assignments, &HashMap::new());
        assert!(outcome.reached);
        assert_eq!(outcome.result, Some(json!({"label": "cat"})));
        assert_eq!(outcome.accepted_assignments, vec![1, 3]);
        assert_eq!(outcome.rejected_assignments, vec![2]);
    }

    #[test]
    fn medium_tier_three_way_split_is_not_reached() {
        let assignments = vec![
            submitted(1, 10, json!({"label": "cat"}), 0),
            submitted(2, 11, json!({"label": "dog"}), 1),
            submitted(3, 12, json!({"label": "bird"}), 2),
        ];
        let outcome = evaluator().evaluate(ImportanceTier::Medium, &assignments, &HashMap::new());
        assert!(!outcome.reached);
        assert!(outcome.accepted_assignments.is_empty());
    }

    #[test]
    fn medium_tier_exact_half_split_is_not_reached() {
        let assignments = vec![
            submitted(1, 10, json!("a"), 0),
            submitted(2, 11, json!("b"), 1),
        ];
        let outcome = evaluator().evaluate(ImportanceTier::Medium, &assignments, &HashMap::new());
        assert!(!outcome.reached);
    }

    #[test]
    fn medium_tier_requires_two_submissions() {
        let assignments = vec![submitted(1, 10, json!("a"), 0)];
        let outcome = evaluator().evaluate(ImportanceTier::Medium, &assignments, &HashMap::new());
        assert!(!outcome.reached);
    }

    #[test]
    fn high_tier_weighted_minority_beats_plain_majority() {
        // 按票数 2 比 3，但高信任的少数组持有 1.8/2.7 = 66.7% 的权重
        let assignments = vec![
            submitted(1, 10, json!({"verdict": "fraud"}), 0),
            submitted(2, 11, json!({"verdict": "fraud"}), 1),
            submitted(3, 12, json!({"verdict": "ok"}), 2),
            submitted(4, 13, json!({"verdict": "ok"}), 3),
            submitted(5, 14, json!({"verdict": "ok"}), 4),
        ];
        let trust = HashMap::from([(10, 0.9), (11, 0.9), (12, 0.3), (13, 0.3), (14, 0.3)]);
        let outcome = evaluator().evaluate(ImportanceTier::High, &assignments, &trust);
        assert!(outcome.reached);
        assert_eq!(outcome.result, Some(json!({"verdict": "fraud"})));
        assert_eq!(outcome.accepted_assignments, vec![1, 2]);
        assert_eq!(outcome.rejected_assignments, vec![3, 4, 5]);
    }

    #[test]
    fn high_tier_below_quorum_ratio_is_not_reached() {
        let assignments = vec![
            submitted(1, 10, json!("a"), 0),
            submitted(2, 11, json!("b"), 1),
            submitted(3, 12, json!("c"), 2),
        ];
        let trust = HashMap::from([(10, 0.5), (11, 0.5), (12, 0.5)]);
        let outcome = evaluator().evaluate(ImportanceTier::High, &assignments, &trust);
        assert!(!outcome.reached);
    }

    #[test]
    fn high_tier_missing_worker_uses_default_weight() {
        // 只有 worker 10 有记录（0.9），另外两名按默认 0.5 计
        let assignments = vec![
            submitted(1, 10, json!("a"), 0),
            submitted(2, 11, json!("a"), 1),
            submitted(3, 12, json!("b"), 2),
        ];
        let trust = HashMap::from([(10, 0.9)]);
        let outcome = evaluator().evaluate(ImportanceTier::High, &assignments, &trust);
        // a 组权重 1.4 / 1.9 = 73.7% >= 60%
        assert!(outcome.reached);
        assert_eq!(outcome.result, Some(json!("a")));
    }

    #[test]
    fn high_tier_requires_minimum_submissions() {
        let assignments = vec![
            submitted(1, 10, json!("a"), 0),
            submitted(2, 11, json!("a"), 1),
        ];
        let trust = HashMap::from([(10, 0.9), (11, 0.9)]);
        let outcome = evaluator().evaluate(ImportanceTier::High, &assignments, &trust);
        assert!(!outcome.reached);
    }

    #[test]
    fn high_tier_equal_weight_tie_keeps_earliest_group() {
        // 配额线降到 0.5 时，两组权重各占一半，先出现的组获胜
        let mut config = ConsensusConfig::default();
        config.weighted_quorum_ratio = 0.5;
        let evaluator = ConsensusEvaluator::new(&config);

        let assignments = vec![
            submitted(2, 11, json!("late"), 5),
            submitted(1, 10, json!("early"), 0),
            submitted(3, 12, json!("late"), 6),
            submitted(4, 13, json!("early"), 1),
        ];
        let trust = HashMap::from([(10, 0.5), (11, 0.5), (12, 0.5), (13, 0.5)]);
        let outcome = evaluator.evaluate(ImportanceTier::High, &assignments, &trust);
        assert!(outcome.reached);
        assert_eq!(outcome.result, Some(json!("early")));
    }

    #[test]
    fn canonical_key_ignores_field_order() {
        let a = serde_json::from_str::<Value>(r#"{"x": 1, "y": {"b": 2, "a": [1, 2]}}"#).unwrap();
        let b = serde_json::from_str::<Value>(r#"{"y": {"a": [1, 2], "b": 2}, "x": 1}"#).unwrap();
        assert_eq!(canonical_key(&a), canonical_key(&b));
        // 数组顺序有语义，不参与排序
        let c = serde_json::from_str::<Value>(r#"{"x": 1, "y": {"b": 2, "a": [2, 1]}}"#).unwrap();
        assert_ne!(canonical_key(&a), canonical_key(&c));
    }

    #[test]
    fn responses_with_different_key_order_group_together() {
        let first = serde_json::from_str::<Value>(r#"{"label": "cat", "score": 1}"#).unwrap();
        let second = serde_json::from_str::<Value>(r#"{"score": 1, "label": "cat"}"#).unwrap();
        let assignments = vec![
            submitted(1, 10, first, 0),
            submitted(2, 11, second, 1),
            submitted(3, 12, json!({"label": "dog"}), 2),
        ];
        let outcome = evaluator().evaluate(ImportanceTier::Medium, &assignments, &HashMap::new());
        assert!(outcome.reached);
        assert_eq!(outcome.accepted_assignments, vec![1, 2]);
    }
}
