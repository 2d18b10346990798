// ==========================================
// 营收保障系统 - 营收领域模型
// ==========================================
// 职责: 组织单元 / 客户 / 权重曲线 / 年度目标 / 月度目标 / 实际完成 / 销售管道
// 红线: 月度目标只能由年度目标 + 权重曲线派生，不允许手工编辑
// ==========================================

use crate::domain::types::{ConfidenceTier, TargetCategory};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 默认 12 点累计权重（百分比）
pub const DEFAULT_WEIGHT_CURVE: [u32; 12] = [5, 10, 15, 20, 25, 40, 45, 55, 65, 80, 90, 100];

/// 金额求和（溢出返回 None）
///
/// Decimal 的 `+` 溢出会 panic，金额合计一律走此函数
pub fn checked_sum<I>(amounts: I) -> Option<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, amount| acc.checked_add(amount))
}

// ==========================================
// Period - 导入期间
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32, // 1..=12
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }
}

// ==========================================
// OrganizationalUnit - 组织单元（主数据，引擎只读）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationalUnit {
    pub unit_id: i64,
    pub code: String, // 规范化后的单元代码
    pub name: String,
    pub parent_id: Option<i64>,
    pub is_active: bool,
}

// ==========================================
// Customer - 客户参照表
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: i64,
    pub code: String, // 规范化后的客户名
    pub name: String,
}

// ==========================================
// WeightCurve - 年度累计权重曲线
// ==========================================
// 不变量: 12 点, 单调不减, 每点 ∈ [0, 100], 末点 == 100
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightCurve {
    pub year: i32,
    pub points: [Decimal; 12],
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WeightCurveError {
    #[error("权重曲线点数错误: 期望 12 个，实际 {0} 个")]
    WrongLength(usize),

    #[error("权重曲线第 {month} 月取值 {value} 超出 [0, 100]")]
    OutOfRange { month: usize, value: Decimal },

    #[error("权重曲线第 {month} 月递减: {previous} → {value}")]
    Decreasing {
        month: usize,
        previous: Decimal,
        value: Decimal,
    },

    #[error("权重曲线末点必须为 100，实际 {0}")]
    FinalNotHundred(Decimal),
}

impl WeightCurve {
    /// 校验后构造权重曲线
    pub fn try_new(year: i32, points: &[Decimal]) -> Result<Self, WeightCurveError> {
        if points.len() != 12 {
            return Err(WeightCurveError::WrongLength(points.len()));
        }

        let mut previous = Decimal::ZERO;
        for (idx, value) in points.iter().enumerate() {
            if *value < Decimal::ZERO || *value > Decimal::ONE_HUNDRED {
                return Err(WeightCurveError::OutOfRange {
                    month: idx + 1,
                    value: *value,
                });
            }
            if *value < previous {
                return Err(WeightCurveError::Decreasing {
                    month: idx + 1,
                    previous,
                    value: *value,
                });
            }
            previous = *value;
        }

        if points[11] != Decimal::ONE_HUNDRED {
            return Err(WeightCurveError::FinalNotHundred(points[11]));
        }

        let mut fixed = [Decimal::ZERO; 12];
        fixed.copy_from_slice(points);
        Ok(Self { year, points: fixed })
    }

    /// 系统默认曲线
    pub fn default_for_year(year: i32) -> Self {
        let mut points = [Decimal::ZERO; 12];
        for (slot, pct) in points.iter_mut().zip(DEFAULT_WEIGHT_CURVE.iter()) {
            *slot = Decimal::from(*pct);
        }
        Self { year, points }
    }

    /// 第 month 月（1..=12）的累计百分比
    pub fn cumulative(&self, month: u32) -> Decimal {
        match month {
            1..=12 => self.points[(month - 1) as usize],
            _ => Decimal::ZERO,
        }
    }
}

// ==========================================
// AnnualTarget - 年度目标
// ==========================================
// 自然键: (year, unit_id, category)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualTarget {
    pub year: i32,
    pub unit_id: i64,
    pub category: TargetCategory,
    pub amount: Decimal,
    pub updated_at: DateTime<Utc>,
}

// ==========================================
// MonthlyTarget - 月度目标（派生）
// ==========================================
// 自然键: (year, month, unit_id, category)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTarget {
    pub year: i32,
    pub month: u32,
    pub unit_id: i64,
    pub category: TargetCategory,
    pub amount: Decimal,
    pub updated_at: DateTime<Utc>,
}

// ==========================================
// ActualRealization - 实际完成
// ==========================================
// 自然键: (year, month, unit_id, revenue_type)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActualRealization {
    pub year: i32,
    pub month: u32,
    pub unit_id: i64,
    pub revenue_type: String,
    pub amount: Decimal,
    pub source_ref: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// ==========================================
// PipelineOpportunity - 销售管道商机（下游只读）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOpportunity {
    pub opportunity_id: i64,
    pub year: i32,
    pub unit_id: i64,
    pub customer_name: Option<String>,
    pub est_revenue: Decimal,
    pub status_color: String,
}

impl PipelineOpportunity {
    pub fn confidence(&self) -> Option<ConfidenceTier> {
        ConfidenceTier::parse(&self.status_color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(values: &[i64]) -> Vec<Decimal> {
        values.iter().map(|v| Decimal::from(*v)).collect()
    }

    #[test]
    fn test_weight_curve_accepts_valid_points() {
        let curve = WeightCurve::try_new(2025, &pts(&[5, 10, 15, 20, 25, 40, 45, 55, 65, 80, 90, 100]))
            .unwrap();
        assert_eq!(curve.cumulative(6), Decimal::from(40));
        assert_eq!(curve.cumulative(13), Decimal::ZERO);
    }

    #[test]
    fn test_weight_curve_rejects_decreasing() {
        let err = WeightCurve::try_new(2025, &pts(&[5, 10, 8, 20, 25, 40, 45, 55, 65, 80, 90, 100]))
            .unwrap_err();
        assert!(matches!(err, WeightCurveError::Decreasing { month: 3, .. }));
    }

    #[test]
    fn test_weight_curve_rejects_final_not_hundred() {
        let err = WeightCurve::try_new(2025, &pts(&[5, 10, 15, 20, 25, 40, 45, 55, 65, 80, 90, 95]))
            .unwrap_err();
        assert_eq!(err, WeightCurveError::FinalNotHundred(Decimal::from(95)));
    }

    #[test]
    fn test_weight_curve_rejects_wrong_length() {
        let err = WeightCurve::try_new(2025, &pts(&[50, 100])).unwrap_err();
        assert_eq!(err, WeightCurveError::WrongLength(2));
    }

    #[test]
    fn test_default_curve_is_valid() {
        let curve = WeightCurve::default_for_year(2025);
        assert!(WeightCurve::try_new(2025, &curve.points).is_ok());
    }

    #[test]
    fn test_period_rejects_month_out_of_range() {
        assert!(Period::new(2025, 0).is_none());
        assert!(Period::new(2025, 13).is_none());
        assert_eq!(Period::new(2025, 3).map(|p| p.month), Some(3));
    }

    #[test]
    fn test_checked_sum_reports_overflow() {
        let amounts = [Decimal::from(1200), Decimal::new(5, 1)];
        assert_eq!(checked_sum(amounts), Some(Decimal::new(12005, 1)));
        assert_eq!(checked_sum(Vec::new()), Some(Decimal::ZERO));
        assert_eq!(checked_sum([Decimal::MAX, Decimal::ONE]), None);
    }
}
