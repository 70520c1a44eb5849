//! 路由计算
//!
//! 纯函数：重要度 + 预算 -> 工作者配额、认领资格线、单人报酬、完成奖励。
//! 除输入校验外没有任何副作用和错误分支。

use marketplace_core::{MarketError, MarketResult, RoutingConfig};
use marketplace_domain::{ImportanceTier, RoutingPlan, TrustTier};

/// 根据重要度和预算计算路由结果。
///
/// 工作者数量随重要度阶梯上升：1（低）、3（中）、5（高），
/// 只有多人任务才能进行多数/加权裁决。单人报酬向下截断到分，
/// 保证总支出永远不超过预算，余数留在请求方账上不收取。
pub fn compute_routing(
    importance: i32,
    max_budget: f64,
    config: &RoutingConfig,
) -> MarketResult<RoutingPlan> {
    if !(1..=100).contains(&importance) {
        return Err(MarketError::validation_error(format!(
            "importance 必须在 1..=100 范围内，收到 {importance}"
        )));
    }
    if !max_budget.is_finite() || max_budget < 0.0 {
        return Err(MarketError::validation_error(format!(
            "max_budget 必须是非负数，收到 {max_budget}"
        )));
    }

    let required_workers: i32 = if importance < 33 {
        1
    } else if importance < 66 {
        3
    } else {
        5
    };

    let min_trust_tier = eligibility_bar(importance);

    let price_per_worker = floor_to_cents(max_budget / required_workers as f64);
    let est_price = price_per_worker * required_workers as f64;

    let reward_on_completion = match ImportanceTier::from_level(importance) {
        ImportanceTier::Low => config.reward_low,
        ImportanceTier::Medium => config.reward_medium,
        ImportanceTier::High => config.reward_high,
    };

    Ok(RoutingPlan {
        required_workers,
        min_trust_tier,
        price_per_worker,
        est_price,
        reward_on_completion,
    })
}

/// 认领资格线：随重要度单调不降的最低信任等级。
/// 最高档（>=90）只有 expert 可以认领。
fn eligibility_bar(importance: i32) -> TrustTier {
    if importance < 33 {
        TrustTier::Bronze
    } else if importance < 66 {
        TrustTier::Silver
    } else if importance < 90 {
        TrustTier::Gold
    } else {
        TrustTier::Expert
    }
}

/// 向下截断到分，绝不向上取整
fn floor_to_cents(value: f64) -> f64 {
    (value * 100.0).floor() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RoutingConfig {
        RoutingConfig::default()
    }

    #[test]
    fn worker_quota_steps_at_33_and_66() {
        let cases = [(1, 1), (32, 1), (33, 3), (65, 3), (66, 5), (100, 5)];
        for (importance, expected) in cases {
            let plan = compute_routing(importance, 100.0, &config()).unwrap();
            assert_eq!(
                plan.required_workers, expected,
                "importance {importance} 应需要 {expected} 名工作者"
            );
        }
    }

    #[test]
    fn never_overspends_budget() {
        let budgets = [0.0, 0.05, 7.77, 10.0, 100.0, 1234.56];
        for importance in 1..=100 {
            for budget in budgets {
                let plan = compute_routing(importance, budget, &config()).unwrap();
                assert!(
                    plan.est_price <= budget,
                    "importance {importance}, budget {budget}: est {} 超出预算",
                    plan.est_price
                );
                assert!(plan.required_workers >= 1);
            }
        }
    }

    #[test]
    fn eligibility_bar_is_monotonic() {
        let mut last_rank = 0u8;
        for importance in 1..=100 {
            let plan = compute_routing(importance, 50.0, &config()).unwrap();
            let rank = plan.min_trust_tier.rank();
            assert!(
                rank >= last_rank,
                "importance {importance} 处资格线下降了"
            );
            last_rank = rank;
        }
    }

    #[test]
    fn eligibility_bar_boundaries() {
        let tier = |level| compute_routing(level, 10.0, &config()).unwrap().min_trust_tier;
        assert_eq!(tier(32), TrustTier::Bronze);
        assert_eq!(tier(33), TrustTier::Silver);
        assert_eq!(tier(65), TrustTier::Silver);
        assert_eq!(tier(66), TrustTier::Gold);
        assert_eq!(tier(89), TrustTier::Gold);
        assert_eq!(tier(90), TrustTier::Expert);
    }

    #[test]
    fn price_is_truncated_to_cents() {
        // 100 / 3 = 33.333... 截断为 33.33，余数 0.01 不收取
        let plan = compute_routing(50, 100.0, &config()).unwrap();
        assert_eq!(plan.required_workers, 3);
        assert_eq!(plan.price_per_worker, 33.33);
        assert_eq!(plan.est_price, 99.99);
    }

    #[test]
    fn reward_scales_with_importance_tier() {
        let cfg = config();
        assert_eq!(compute_routing(10, 10.0, &cfg).unwrap().reward_on_completion, cfg.reward_low);
        assert_eq!(compute_routing(50, 10.0, &cfg).unwrap().reward_on_completion, cfg.reward_medium);
        assert_eq!(compute_routing(90, 10.0, &cfg).unwrap().reward_on_completion, cfg.reward_high);
    }

    #[test]
    fn rejects_out_of_range_importance() {
        assert!(matches!(
            compute_routing(0, 10.0, &config()),
            Err(MarketError::ValidationError(_))
        ));
        assert!(matches!(
            compute_routing(101, 10.0, &config()),
            Err(MarketError::ValidationError(_))
        ));
    }

    #[test]
    fn rejects_invalid_budget() {
        assert!(compute_routing(50, -1.0, &config()).is_err());
        assert!(compute_routing(50, f64::NAN, &config()).is_err());
        assert!(compute_routing(50, f64::INFINITY, &config()).is_err());
    }
}
