// ==========================================
// 营收保障系统 - 引擎层
// ==========================================
// 职责: 月度分解 / 月度目标重算 / 达成率计算
// 红线: Engine 不拼 SQL（数据访问全部经由 repository）
// ==========================================

pub mod distribution;
pub mod kpi;
pub mod regeneration;

// 重导出核心引擎
pub use distribution::{round_amount, DistributionEngine};
pub use kpi::{ConfidenceWeights, KpiCalculator, KpiSnapshot, KpiThresholds};
pub use regeneration::{RegenerationReport, RegenerationService};
