// ==========================================
// 营收保障系统 - 驾驶舱API
// ==========================================
// 职责: 目标 / 实际完成 / 导入任务查询，单元 KPI 快照
// 约定: 只读，不触发任何写入
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::ImportConfigReader;
use crate::domain::import_job::ImportJob;
use crate::domain::revenue::{
    checked_sum, ActualRealization, AnnualTarget, MonthlyTarget, OrganizationalUnit, Period,
};
use crate::domain::types::TargetCategory;
use crate::engine::kpi::{ConfidenceWeights, KpiCalculator, KpiSnapshot};
use crate::repository::{
    ImportJobRepository, PipelineRepository, RealizationRepository, ReferenceRepository,
    TargetRepository,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// 最近任务查询上限
const MAX_JOB_LIMIT: usize = 500;

/// 单元 KPI 快照响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitKpiResponse {
    pub unit_id: i64,
    pub unit_code: String,
    pub year: i32,
    pub month: u32,
    /// 当月: RKAP 月度目标 vs 当月实际完成
    pub month_kpi: KpiSnapshot,
    /// 年累计: 1..=month 的 RKAP 月度目标 vs 实际完成
    pub ytd_kpi: KpiSnapshot,
    /// 销售管道加权价值（按信心等级概率折算）
    pub weighted_pipeline: Decimal,
    /// YTD 未完成额扣除管道加权后的剩余缺口（不小于 0）
    pub uncovered_gap: Decimal,
}

/// 驾驶舱API
pub struct DashboardApi {
    target_repo: Arc<TargetRepository>,
    realization_repo: Arc<RealizationRepository>,
    reference_repo: Arc<ReferenceRepository>,
    pipeline_repo: Arc<PipelineRepository>,
    job_repo: Arc<ImportJobRepository>,
    config: Arc<dyn ImportConfigReader>,
}

impl DashboardApi {
    pub fn new(
        target_repo: Arc<TargetRepository>,
        realization_repo: Arc<RealizationRepository>,
        reference_repo: Arc<ReferenceRepository>,
        pipeline_repo: Arc<PipelineRepository>,
        job_repo: Arc<ImportJobRepository>,
        config: Arc<dyn ImportConfigReader>,
    ) -> Self {
        Self {
            target_repo,
            realization_repo,
            reference_repo,
            pipeline_repo,
            job_repo,
            config,
        }
    }

    fn resolve_unit(&self, unit_code: &str) -> ApiResult<OrganizationalUnit> {
        if unit_code.trim().is_empty() {
            return Err(ApiError::InvalidInput("单元代码不能为空".to_string()));
        }
        self.reference_repo
            .find_unit_by_code(unit_code)?
            .ok_or_else(|| ApiError::NotFound(format!("组织单元 {} 不存在", unit_code)))
    }

    fn check_period(year: i32, month: u32) -> ApiResult<Period> {
        Period::new(year, month).ok_or_else(|| ApiError::InvalidInput(format!("月份无效: {}", month)))
    }

    // ==========================================
    // 主数据
    // ==========================================

    pub fn list_units(&self) -> ApiResult<Vec<OrganizationalUnit>> {
        Ok(self.reference_repo.list_units()?)
    }

    // ==========================================
    // 目标查询
    // ==========================================

    /// 年度目标（可选按单元过滤）
    pub fn annual_targets(&self, year: i32, unit_code: Option<&str>) -> ApiResult<Vec<AnnualTarget>> {
        match unit_code {
            Some(code) => {
                let unit = self.resolve_unit(code)?;
                Ok(self.target_repo.annual_by_year_unit(year, unit.unit_id)?)
            }
            None => Ok(self.target_repo.annual_by_year(year)?),
        }
    }

    /// 某月全部单元的月度目标
    pub fn monthly_targets_by_month(&self, year: i32, month: u32) -> ApiResult<Vec<MonthlyTarget>> {
        let period = Self::check_period(year, month)?;
        Ok(self.target_repo.monthly_by_year_month(period.year, period.month)?)
    }

    /// 某单元全年月度目标
    pub fn monthly_targets_by_unit(&self, year: i32, unit_code: &str) -> ApiResult<Vec<MonthlyTarget>> {
        let unit = self.resolve_unit(unit_code)?;
        Ok(self.target_repo.monthly_by_year_unit(year, unit.unit_id)?)
    }

    // ==========================================
    // 实际完成查询
    // ==========================================

    pub fn realizations_by_month(&self, year: i32, month: u32) -> ApiResult<Vec<ActualRealization>> {
        let period = Self::check_period(year, month)?;
        Ok(self.realization_repo.by_year_month(period.year, period.month)?)
    }

    pub fn realizations_by_unit(&self, year: i32, unit_code: &str) -> ApiResult<Vec<ActualRealization>> {
        let unit = self.resolve_unit(unit_code)?;
        Ok(self.realization_repo.by_year_unit(year, unit.unit_id)?)
    }

    // ==========================================
    // 导入任务
    // ==========================================

    /// 最近的导入任务
    ///
    /// # 参数
    /// - limit: 1..=500
    pub fn recent_jobs(&self, limit: usize) -> ApiResult<Vec<ImportJob>> {
        if limit == 0 || limit > MAX_JOB_LIMIT {
            return Err(ApiError::InvalidInput(format!(
                "limit 必须在 1..={} 之间，实际 {}",
                MAX_JOB_LIMIT, limit
            )));
        }
        Ok(self.job_repo.list_recent(limit)?)
    }

    pub fn get_job(&self, job_id: &str) -> ApiResult<ImportJob> {
        self.job_repo
            .find_by_id(job_id)?
            .ok_or_else(|| ApiError::NotFound(format!("导入任务 {} 不存在", job_id)))
    }

    // ==========================================
    // KPI
    // ==========================================

    /// 单元 KPI 快照
    ///
    /// # 说明
    /// - 目标口径为 RKAP 月度目标（月度目标未生成时视为 0）
    /// - 阈值读取配置，管道加权使用默认信心概率
    pub async fn unit_kpi(&self, year: i32, month: u32, unit_code: &str) -> ApiResult<UnitKpiResponse> {
        let period = Self::check_period(year, month)?;
        let thresholds = self
            .config
            .get_kpi_thresholds()
            .await
            .map_err(|e| ApiError::ConfigError(e.to_string()))?;
        let calculator = KpiCalculator::new(thresholds, ConfidenceWeights::default());

        let unit = self.resolve_unit(unit_code)?;

        let month_target = self
            .target_repo
            .monthly_by_year_unit(period.year, unit.unit_id)?
            .into_iter()
            .filter(|t| t.month == period.month && t.category == TargetCategory::Rkap)
            .map(|t| t.amount);
        let month_target = checked_sum(month_target).ok_or_else(|| amount_overflow("当月目标"))?;
        let month_actual = self
            .realization_repo
            .by_year_unit(period.year, unit.unit_id)?
            .into_iter()
            .filter(|r| r.month == period.month)
            .map(|r| r.amount);
        let month_actual = checked_sum(month_actual).ok_or_else(|| amount_overflow("当月实际完成"))?;

        let ytd_target = self.target_repo.ytd_monthly_sum(
            period.year,
            unit.unit_id,
            TargetCategory::Rkap,
            period.month,
        )?;
        let ytd_actual = self
            .realization_repo
            .ytd_sum(period.year, unit.unit_id, period.month)?;

        let opportunities = self.pipeline_repo.by_year_unit(period.year, unit.unit_id)?;
        let weighted_pipeline = calculator
            .weighted_pipeline_value(&opportunities)
            .ok_or_else(|| amount_overflow("管道加权价值"))?;

        let month_kpi = calculator
            .snapshot(month_actual, month_target)
            .ok_or_else(|| amount_overflow("当月达成率"))?;
        let ytd_kpi = calculator
            .snapshot(ytd_actual, ytd_target)
            .ok_or_else(|| amount_overflow("年累计达成率"))?;
        // gap 为 actual - target，负数表示缺口
        let shortfall = (-ytd_kpi.gap).max(Decimal::ZERO);
        let uncovered_gap = shortfall
            .checked_sub(weighted_pipeline)
            .ok_or_else(|| amount_overflow("未覆盖缺口"))?
            .max(Decimal::ZERO);

        debug!(
            unit = %unit.code,
            year,
            month,
            opportunities = opportunities.len(),
            "单元 KPI 快照已计算"
        );
        Ok(UnitKpiResponse {
            unit_id: unit.unit_id,
            unit_code: unit.code,
            year: period.year,
            month: period.month,
            month_kpi,
            ytd_kpi,
            weighted_pipeline,
            uncovered_gap,
        })
    }
}

fn amount_overflow(metric: &str) -> ApiError {
    ApiError::ValidationError(format!("{}计算溢出，请检查金额数据", metric))
}
