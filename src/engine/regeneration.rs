// ==========================================
// 营收保障系统 - 月度目标重算服务
// ==========================================
// 触发: 权重曲线变更 / 年度目标修正
// 范围: 整个年度，或单个 (年度, 单元)
// 方式: 按 (year, unit, category) 删除后重建，全部在一个事务内完成
// 红线: 月度目标只由年度目标 + 曲线派生
// ==========================================

use crate::domain::revenue::WeightCurve;
use crate::engine::distribution::DistributionEngine;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::target_repo::TargetRepository;
use crate::repository::weight_curve_repo::WeightCurveRepository;
use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

/// 重算结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegenerationReport {
    pub year: i32,
    pub unit_id: Option<i64>,
    /// 重算的 (单元, 类别) 序列数
    pub series: usize,
    pub monthly_rows: usize,
    /// 是否使用年度曲线（否则为默认曲线）
    pub used_year_curve: bool,
}

pub struct RegenerationService {
    conn: Arc<Mutex<Connection>>,
    engine: DistributionEngine,
}

impl RegenerationService {
    pub fn new(conn: Arc<Mutex<Connection>>, engine: DistributionEngine) -> Self {
        Self { conn, engine }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 重算整个年度
    ///
    /// # 参数
    /// - default_curve: 年度未配置曲线时使用
    #[instrument(skip(self, default_curve))]
    pub fn regenerate_year(
        &self,
        year: i32,
        default_curve: &WeightCurve,
    ) -> RepositoryResult<RegenerationReport> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let report = self.regenerate_tx(&tx, year, None, default_curve)?;
        tx.commit()?;
        Ok(report)
    }

    /// 重算单个 (年度, 单元)
    #[instrument(skip(self, default_curve))]
    pub fn regenerate_unit(
        &self,
        year: i32,
        unit_id: i64,
        default_curve: &WeightCurve,
    ) -> RepositoryResult<RegenerationReport> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let report = self.regenerate_tx(&tx, year, Some(unit_id), default_curve)?;
        tx.commit()?;
        Ok(report)
    }

    /// 保存年度权重曲线并重算该年度全部月度目标（同一事务）
    ///
    /// # 错误
    /// - InvalidWeightCurve: 曲线不满足 12 点 / 单调 / [0,100] / 末点 100
    #[instrument(skip(self, curve), fields(year = curve.year))]
    pub fn set_weight_curve(&self, curve: &WeightCurve) -> RepositoryResult<RegenerationReport> {
        let validated = WeightCurve::try_new(curve.year, &curve.points)?;

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        WeightCurveRepository::save_tx(&tx, &validated)?;
        let report = self.regenerate_tx(&tx, validated.year, None, &validated)?;
        tx.commit()?;

        info!(
            year = validated.year,
            series = report.series,
            monthly_rows = report.monthly_rows,
            "权重曲线已保存，月度目标已重算"
        );
        Ok(report)
    }

    /// 事务内重算（调用方负责提交）
    pub fn regenerate_tx(
        &self,
        conn: &Connection,
        year: i32,
        unit_id: Option<i64>,
        default_curve: &WeightCurve,
    ) -> RepositoryResult<RegenerationReport> {
        let stored = WeightCurveRepository::find_tx(conn, year)?;
        let used_year_curve = stored.is_some();
        let curve = stored.unwrap_or_else(|| WeightCurve {
            year,
            points: default_curve.points,
        });

        let targets = match unit_id {
            Some(unit_id) => TargetRepository::list_annual_for_unit_tx(conn, year, unit_id)?,
            None => TargetRepository::list_annual_tx(conn, year)?,
        };

        let now = Utc::now();
        let mut monthly_rows = 0;
        for target in &targets {
            let monthly = self
                .engine
                .distribute(target.amount, &curve)
                .ok_or_else(|| RepositoryError::FieldValueError {
                    field: "annual_target.amount".to_string(),
                    message: format!(
                        "单元 {} {} 年度金额 {} 分解溢出",
                        target.unit_id, target.category, target.amount
                    ),
                })?;
            monthly_rows += TargetRepository::replace_monthly_tx(
                conn,
                year,
                target.unit_id,
                target.category,
                &monthly,
                now,
            )?;
        }

        info!(
            year,
            unit_id = ?unit_id,
            series = targets.len(),
            monthly_rows,
            used_year_curve,
            policy = %self.engine.policy(),
            "月度目标重算完成"
        );
        Ok(RegenerationReport {
            year,
            unit_id,
            series: targets.len(),
            monthly_rows,
            used_year_curve,
        })
    }
}
