// ==========================================
// 营收保障系统 - 目标维护API
// ==========================================
// 职责: 权重曲线维护 + 月度目标重算
// 流程: 读取配置（取整策略 / 默认曲线）→ 获取连接锁 → 单事务重算
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigError, ImportConfigReader};
use crate::domain::revenue::WeightCurve;
use crate::engine::distribution::DistributionEngine;
use crate::engine::regeneration::{RegenerationReport, RegenerationService};
use crate::repository::{ReferenceRepository, WeightCurveRepository};
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use tracing::info;

fn config_error(e: ConfigError) -> ApiError {
    ApiError::ConfigError(e.to_string())
}

/// 目标维护API
pub struct TargetApi {
    conn: Arc<Mutex<Connection>>,
    reference_repo: Arc<ReferenceRepository>,
    curve_repo: Arc<WeightCurveRepository>,
    config: Arc<dyn ImportConfigReader>,
}

impl TargetApi {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        reference_repo: Arc<ReferenceRepository>,
        curve_repo: Arc<WeightCurveRepository>,
        config: Arc<dyn ImportConfigReader>,
    ) -> Self {
        Self {
            conn,
            reference_repo,
            curve_repo,
            config,
        }
    }

    async fn regeneration_service(&self) -> ApiResult<RegenerationService> {
        let policy = self.config.get_rounding_policy().await.map_err(config_error)?;
        Ok(RegenerationService::new(
            self.conn.clone(),
            DistributionEngine::new(policy),
        ))
    }

    /// 当前生效的权重曲线（年度曲线，未配置时为默认曲线）
    pub async fn effective_weight_curve(&self, year: i32) -> ApiResult<WeightCurve> {
        match self.curve_repo.find(year)? {
            Some(curve) => Ok(curve),
            None => self
                .config
                .get_default_weight_curve(year)
                .await
                .map_err(config_error),
        }
    }

    /// 已配置年度曲线的年份
    pub fn weight_curve_years(&self) -> ApiResult<Vec<i32>> {
        Ok(self.curve_repo.list_years()?)
    }

    /// 保存年度权重曲线并重算该年度月度目标
    ///
    /// # 错误
    /// - ValidationError: 曲线不满足 12 点 / 单调不减 / [0,100] / 末点 100
    pub async fn set_weight_curve(&self, year: i32, points: &[Decimal]) -> ApiResult<RegenerationReport> {
        let curve = WeightCurve::try_new(year, points)
            .map_err(|e| ApiError::ValidationError(e.to_string()))?;
        let service = self.regeneration_service().await?;
        let report = service.set_weight_curve(&curve)?;
        info!(year, monthly_rows = report.monthly_rows, "权重曲线已更新");
        Ok(report)
    }

    /// 重算月度目标
    ///
    /// # 参数
    /// - unit_code: None 表示整个年度
    pub async fn regenerate(&self, year: i32, unit_code: Option<&str>) -> ApiResult<RegenerationReport> {
        let default_curve = self
            .config
            .get_default_weight_curve(year)
            .await
            .map_err(config_error)?;
        let service = self.regeneration_service().await?;

        let report = match unit_code {
            Some(code) => {
                let unit = self
                    .reference_repo
                    .find_unit_by_code(code)?
                    .ok_or_else(|| ApiError::NotFound(format!("组织单元 {} 不存在", code)))?;
                service.regenerate_unit(year, unit.unit_id, &default_curve)?
            }
            None => service.regenerate_year(year, &default_curve)?,
        };
        Ok(report)
    }
}
