// ==========================================
// 营收保障系统 - 年度目标月度分解引擎
// ==========================================
// 职责: 年度金额 + 累计权重曲线 → 12 个月度增量
// 公式: delta[i] = annual * (w[i] - w[i-1]) / 100, w[-1] = 0
// 红线: 纯函数，同输入同输出；不拼 SQL
// ==========================================

use crate::domain::revenue::{checked_sum, WeightCurve};
use crate::domain::types::RoundingPolicy;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

/// 月度金额保留小数位
pub const AMOUNT_SCALE: u32 = 2;

/// 金额统一取整（两位小数，四舍五入远离零）
pub fn round_amount(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

// ==========================================
// DistributionEngine - 月度分解引擎
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct DistributionEngine {
    policy: RoundingPolicy,
}

impl DistributionEngine {
    pub fn new(policy: RoundingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RoundingPolicy {
        self.policy
    }

    /// 将年度金额分解为 12 个月度增量
    ///
    /// # 参数
    /// - annual: 年度金额
    /// - curve: 已校验的累计权重曲线
    ///
    /// # 返回
    /// - None: 中间计算溢出 Decimal 范围（调用方按行错误处理）
    ///
    /// # 取整
    /// - Independent: 每月独立取整，合计与年度值的偏差 ≤ 12 × 0.005
    /// - FinalMonthCorrection: 残差并入 12 月，合计严格等于年度值（取整后）
    pub fn distribute(&self, annual: Decimal, curve: &WeightCurve) -> Option<[Decimal; 12]> {
        let mut deltas = [Decimal::ZERO; 12];
        let mut previous = Decimal::ZERO;

        for (idx, slot) in deltas.iter_mut().enumerate() {
            let current = curve.points[idx];
            let raw = annual
                .checked_mul(current.checked_sub(previous)?)?
                .checked_div(Decimal::ONE_HUNDRED)?;
            *slot = round_amount(raw);
            previous = current;
        }

        if self.policy == RoundingPolicy::FinalMonthCorrection {
            let distributed = checked_sum(deltas)?;
            let residual = round_amount(annual).checked_sub(distributed)?;
            if !residual.is_zero() {
                debug!(%residual, "残差并入 12 月");
                deltas[11] = deltas[11].checked_add(residual)?;
            }
        }

        Some(deltas)
    }

    /// 某月的年初至今（YTD）累计目标
    pub fn ytd(&self, annual: Decimal, curve: &WeightCurve, month: u32) -> Option<Decimal> {
        let upto = month.clamp(0, 12) as usize;
        checked_sum(self.distribute(annual, curve)?[..upto].iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn curve(points: [i64; 12]) -> WeightCurve {
        let values: Vec<Decimal> = points.iter().map(|p| Decimal::from(*p)).collect();
        WeightCurve::try_new(2025, &values).unwrap()
    }

    fn sample_curve() -> WeightCurve {
        curve([5, 10, 15, 20, 25, 40, 45, 55, 65, 80, 90, 100])
    }

    #[test]
    fn test_distribute_example_figures() {
        let engine = DistributionEngine::default();
        let deltas = engine.distribute(dec!(1200), &sample_curve()).unwrap();

        assert_eq!(deltas[0], dec!(60));
        assert_eq!(deltas[5], dec!(180));
        assert_eq!(deltas[11], dec!(120));
        assert_eq!(deltas.iter().copied().sum::<Decimal>(), dec!(1200));
    }

    #[test]
    fn test_distribute_is_idempotent() {
        let engine = DistributionEngine::default();
        let first = engine.distribute(dec!(987654.32), &sample_curve()).unwrap();
        let second = engine.distribute(dec!(987654.32), &sample_curve()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_distribute_zero_amount() {
        let engine = DistributionEngine::default();
        let deltas = engine.distribute(Decimal::ZERO, &sample_curve()).unwrap();
        assert!(deltas.iter().all(|d| d.is_zero()));
    }

    #[test]
    fn test_independent_rounding_drift_within_tolerance() {
        // 1/3 分摊会产生取整残差
        let engine = DistributionEngine::new(RoundingPolicy::Independent);
        let thirds = curve([8, 17, 25, 33, 42, 50, 58, 67, 75, 83, 92, 100]);
        let annual = dec!(1000.01);

        let total: Decimal = engine.distribute(annual, &thirds).unwrap().iter().copied().sum();
        let drift = (total - annual).abs();
        assert!(drift <= dec!(0.06), "drift {} exceeds tolerance", drift);
    }

    #[test]
    fn test_final_month_correction_sums_exactly() {
        let engine = DistributionEngine::new(RoundingPolicy::FinalMonthCorrection);
        let uneven = curve([7, 13, 21, 33, 41, 47, 59, 67, 71, 83, 97, 100]);

        for annual in [dec!(0.07), dec!(333.33), dec!(1000.01), dec!(98765.43)] {
            let total: Decimal = engine.distribute(annual, &uneven).unwrap().iter().copied().sum();
            assert_eq!(total, annual);
        }
    }

    #[test]
    fn test_sum_property_over_amount_grid() {
        let engine = DistributionEngine::default();
        let curve = sample_curve();
        // 整数金额在 5% 步长曲线上无取整误差
        for annual in (0..50).map(|i| Decimal::from(i * 137)) {
            let total: Decimal = engine.distribute(annual, &curve).unwrap().iter().copied().sum();
            assert!((total - annual).abs() <= dec!(0.06));
        }
    }

    #[test]
    fn test_flat_months_yield_zero_delta() {
        let engine = DistributionEngine::default();
        let stepped = curve([0, 0, 0, 50, 50, 50, 50, 50, 50, 50, 50, 100]);
        let deltas = engine.distribute(dec!(400), &stepped).unwrap();

        assert_eq!(deltas[0], Decimal::ZERO);
        assert_eq!(deltas[3], dec!(200));
        assert_eq!(deltas[11], dec!(200));
    }

    #[test]
    fn test_ytd_accumulates_months() {
        let engine = DistributionEngine::default();
        assert_eq!(engine.ytd(dec!(1200), &sample_curve(), 6), Some(dec!(480)));
        assert_eq!(engine.ytd(dec!(1200), &sample_curve(), 12), Some(dec!(1200)));
        assert_eq!(engine.ytd(dec!(1200), &sample_curve(), 0), Some(Decimal::ZERO));
    }

    #[test]
    fn test_oversized_amount_overflow_is_reported() {
        let engine = DistributionEngine::default();
        let huge = Decimal::from_scientific("1e28").unwrap();

        assert!(engine.distribute(huge, &sample_curve()).is_none());
        assert!(engine.ytd(huge, &sample_curve(), 3).is_none());
        // 边界以内仍可正常分解
        let large = Decimal::from_scientific("1e24").unwrap();
        let deltas = engine.distribute(large, &sample_curve()).unwrap();
        assert_eq!(deltas[0], large / dec!(20));
    }
}
