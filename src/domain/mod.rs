// ==========================================
// 营收保障系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod import_job;
pub mod revenue;
pub mod types;

// 重导出核心类型
pub use import_job::{ImportJob, ImportSummary, RowErrorReport, RowOutcome};
pub use revenue::{
    checked_sum, ActualRealization, AnnualTarget, Customer, MonthlyTarget, OrganizationalUnit, Period,
    PipelineOpportunity, WeightCurve, WeightCurveError, DEFAULT_WEIGHT_CURVE,
};
pub use types::{ConfidenceTier, ImportKind, ImportStatus, KpiStatus, RoundingPolicy, TargetCategory};
