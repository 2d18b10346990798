// ==========================================
// 营收保障系统 - 达成率 / KPI 计算
// ==========================================
// 职责: 达成率、差额、状态分级、管道加权价值
// 输入: 已落库的年度/月度目标与实际完成
// 红线: 目标为 0 时达成率为 0，禁止除零；阈值来自配置
// ==========================================

use crate::domain::revenue::PipelineOpportunity;
use crate::domain::types::{ConfidenceTier, KpiStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// 达成状态阈值（百分比）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KpiThresholds {
    pub on_track_pct: Decimal,
    pub watch_pct: Decimal,
}

impl Default for KpiThresholds {
    fn default() -> Self {
        Self {
            on_track_pct: Decimal::ONE_HUNDRED,
            watch_pct: Decimal::from(90),
        }
    }
}

/// 商机信心等级 → 成交概率
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    pub high: Decimal,
    pub medium: Decimal,
    pub low: Decimal,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            high: Decimal::new(9, 1),
            medium: Decimal::new(5, 1),
            low: Decimal::new(1, 1),
        }
    }
}

impl ConfidenceWeights {
    pub fn probability(&self, tier: ConfidenceTier) -> Decimal {
        match tier {
            ConfidenceTier::High => self.high,
            ConfidenceTier::Medium => self.medium,
            ConfidenceTier::Low => self.low,
        }
    }
}

/// 单元 KPI 快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSnapshot {
    pub target: Decimal,
    pub actual: Decimal,
    pub achievement_pct: Decimal,
    pub gap: Decimal,
    pub status: KpiStatus,
}

// ==========================================
// KpiCalculator
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct KpiCalculator {
    thresholds: KpiThresholds,
    weights: ConfidenceWeights,
}

impl KpiCalculator {
    pub fn new(thresholds: KpiThresholds, weights: ConfidenceWeights) -> Self {
        Self { thresholds, weights }
    }

    /// 达成率 = actual / target * 100（两位小数），target ≤ 0 时为 0
    ///
    /// 溢出 Decimal 范围时返回 None
    pub fn achievement_pct(&self, actual: Decimal, target: Decimal) -> Option<Decimal> {
        if target > Decimal::ZERO {
            actual
                .checked_div(target)?
                .checked_mul(Decimal::ONE_HUNDRED)
                .map(|pct| pct.round_dp(2))
        } else {
            Some(Decimal::ZERO)
        }
    }

    /// 差额 = actual - target
    pub fn gap(&self, actual: Decimal, target: Decimal) -> Option<Decimal> {
        actual.checked_sub(target)
    }

    /// 达成状态分级
    pub fn status(&self, achievement_pct: Decimal) -> KpiStatus {
        if achievement_pct >= self.thresholds.on_track_pct {
            KpiStatus::OnTrack
        } else if achievement_pct >= self.thresholds.watch_pct {
            KpiStatus::Watch
        } else {
            KpiStatus::AtRisk
        }
    }

    /// 计算快照；任一指标溢出时返回 None
    pub fn snapshot(&self, actual: Decimal, target: Decimal) -> Option<KpiSnapshot> {
        let achievement_pct = self.achievement_pct(actual, target)?;
        Some(KpiSnapshot {
            target,
            actual,
            achievement_pct,
            gap: self.gap(actual, target)?,
            status: self.status(achievement_pct),
        })
    }

    /// 管道加权价值 = Σ est_revenue × probability(颜色)
    ///
    /// 无法识别颜色的商机不计入（记录告警）；合计溢出时返回 None
    pub fn weighted_pipeline_value(&self, opportunities: &[PipelineOpportunity]) -> Option<Decimal> {
        let mut total = Decimal::ZERO;
        for opp in opportunities {
            match opp.confidence() {
                Some(tier) => {
                    let weighted = opp.est_revenue.checked_mul(self.weights.probability(tier))?;
                    total = total.checked_add(weighted)?;
                }
                None => {
                    warn!(
                        opportunity_id = opp.opportunity_id,
                        status_color = %opp.status_color,
                        "无法识别商机状态颜色，跳过"
                    );
                }
            }
        }
        Some(total)
    }
}
