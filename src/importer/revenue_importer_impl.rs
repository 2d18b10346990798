// ==========================================
// 营收保障系统 - 营收导入器实现
// ==========================================
// 职责: 读取配置 → 解析上传文件 → 交由 ReconciliationPersister 落库 → 生成结果文件
// 流程: 配置读取在获取连接锁之前完成，导入期间不再访问配置
// ==========================================

use crate::config::{config_keys, ConfigError, ImportConfigReader};
use crate::domain::revenue::Period;
use crate::domain::types::ImportKind;
use crate::engine::distribution::DistributionEngine;
use crate::engine::kpi::{ConfidenceWeights, KpiCalculator};
use crate::importer::artifact_writer::write_realization_artifact;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::persister::{ImportRequest, ReconciliationPersister};
use crate::importer::planning_importer::{extract_planning_rows, PlanningApplier, PlanningSettings};
use crate::importer::realization_importer::{
    extract_realization_rows, RealizationApplier, RealizationSettings, SummaryLayout,
};
use crate::importer::revenue_importer_trait::{
    PlanningImportResult, RealizationImportResult, RevenueImporter, Upload,
};
use crate::importer::workbook::WorkbookData;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, instrument, warn};

/// 允许导入的年度范围
const MIN_YEAR: i32 = 2000;
const MAX_YEAR: i32 = 2100;

fn config_error(key: &str) -> impl FnOnce(ConfigError) -> ImportError + '_ {
    move |e| ImportError::ConfigReadError {
        key: key.to_string(),
        message: e.to_string(),
    }
}

fn check_year(year: i32) -> ImportResult<()> {
    if (MIN_YEAR..=MAX_YEAR).contains(&year) {
        Ok(())
    } else {
        Err(ImportError::InvalidPeriod(format!(
            "年度 {} 超出 [{}, {}]",
            year, MIN_YEAR, MAX_YEAR
        )))
    }
}

// ==========================================
// RevenueImporterImpl
// ==========================================
pub struct RevenueImporterImpl<C>
where
    C: ImportConfigReader,
{
    conn: Arc<Mutex<Connection>>,
    config: C,
}

impl<C> RevenueImporterImpl<C>
where
    C: ImportConfigReader,
{
    pub fn new(conn: Arc<Mutex<Connection>>, config: C) -> Self {
        Self { conn, config }
    }

    async fn persister(&self) -> ImportResult<ReconciliationPersister> {
        let max_errors = self
            .config
            .get_max_reported_errors()
            .await
            .map_err(config_error(config_keys::MAX_REPORTED_ERRORS))?;
        Ok(ReconciliationPersister::new(self.conn.clone(), max_errors))
    }
}

#[async_trait::async_trait]
impl<C> RevenueImporter for RevenueImporterImpl<C>
where
    C: ImportConfigReader + Send + Sync,
{
    #[instrument(skip(self, upload), fields(file_name = %upload.file_name))]
    async fn import_planning(
        &self,
        upload: Upload,
        year: i32,
    ) -> ImportResult<PlanningImportResult> {
        let start = Instant::now();
        check_year(year)?;

        // ===== 配置 =====
        let policy = self
            .config
            .get_rounding_policy()
            .await
            .map_err(config_error(config_keys::DISTRIBUTION_ROUNDING))?;
        let default_curve = self
            .config
            .get_default_weight_curve(year)
            .await
            .map_err(config_error(config_keys::DEFAULT_WEIGHT_CURVE))?;
        let settings = PlanningSettings {
            sheet_name: self
                .config
                .get_planning_sheet()
                .await
                .map_err(config_error(config_keys::PLANNING_SHEET))?,
            scan_rows: self
                .config
                .get_header_scan_rows()
                .await
                .map_err(config_error(config_keys::HEADER_SCAN_ROWS))?,
        };
        let persister = self.persister().await?;

        // ===== 导入 =====
        let request = ImportRequest {
            kind: ImportKind::Planning,
            file_name: upload.file_name.clone(),
            period_year: year,
            period_month: None,
            uploaded_by: upload.uploaded_by.clone(),
        };
        let applier = PlanningApplier::new(year, DistributionEngine::new(policy), default_curve);
        let report = persister.run(
            &request,
            || {
                let workbook = WorkbookData::from_bytes(&upload.bytes, &upload.file_name)?;
                extract_planning_rows(&workbook, &settings)
            },
            applier,
        )?;

        info!(
            job_id = %report.job_id,
            annual_rows = report.output.annual_rows,
            monthly_rows = report.output.monthly_rows,
            "计划导入完成"
        );
        Ok(PlanningImportResult {
            job_id: report.job_id,
            summary: report.summary,
            output: report.output,
            elapsed: start.elapsed(),
        })
    }

    #[instrument(skip(self, upload), fields(file_name = %upload.file_name))]
    async fn import_realization(
        &self,
        upload: Upload,
        period: Period,
    ) -> ImportResult<RealizationImportResult> {
        let start = Instant::now();
        check_year(period.year)?;

        // ===== 配置 =====
        let thresholds = self
            .config
            .get_kpi_thresholds()
            .await
            .map_err(config_error(config_keys::KPI_ON_TRACK_PCT))?;
        let settings = RealizationSettings {
            detail_sheet: self
                .config
                .get_realization_detail_sheet()
                .await
                .map_err(config_error(config_keys::REALIZATION_DETAIL_SHEET))?,
            summary_sheet: self
                .config
                .get_realization_summary_sheet()
                .await
                .map_err(config_error(config_keys::REALIZATION_SUMMARY_SHEET))?,
            scan_rows: self
                .config
                .get_header_scan_rows()
                .await
                .map_err(config_error(config_keys::HEADER_SCAN_ROWS))?,
        };
        let persister = self.persister().await?;

        // ===== 导入 =====
        let request = ImportRequest {
            kind: ImportKind::Realization,
            file_name: upload.file_name.clone(),
            period_year: period.year,
            period_month: Some(period.month),
            uploaded_by: upload.uploaded_by.clone(),
        };
        let applier = RealizationApplier::new(
            period,
            &upload.file_name,
            KpiCalculator::new(thresholds, ConfidenceWeights::default()),
        );

        let mut workbook: Option<WorkbookData> = None;
        let mut layout: Option<SummaryLayout> = None;
        let report = persister.run(
            &request,
            || {
                let wb = WorkbookData::from_bytes(&upload.bytes, &upload.file_name)?;
                let parsed = extract_realization_rows(&wb, period, &settings)?;
                layout = Some(parsed.layout);
                workbook = Some(wb);
                Ok(parsed.rows)
            },
            applier,
        )?;

        // ===== 结果文件（数据已提交，失败不影响任务状态）=====
        let (artifact, artifact_error) = match (&workbook, &layout) {
            (Some(wb), Some(layout)) => {
                match write_realization_artifact(
                    wb,
                    layout,
                    &report.output.summary_lines,
                    period.month,
                ) {
                    Ok(bytes) => (Some(bytes), None),
                    Err(e) => {
                        warn!(job_id = %report.job_id, error = %e, "结果文件生成失败");
                        (None, Some(e.to_string()))
                    }
                }
            }
            _ => (None, None),
        };

        info!(
            job_id = %report.job_id,
            realization_rows = report.output.realization_rows,
            summary_lines = report.output.summary_lines.len(),
            artifact = artifact.is_some(),
            "实际完成导入完成"
        );
        Ok(RealizationImportResult {
            job_id: report.job_id,
            summary: report.summary,
            output: report.output,
            artifact,
            artifact_error,
            elapsed: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_range_is_checked() {
        assert!(check_year(2025).is_ok());
        assert!(matches!(check_year(1999), Err(ImportError::InvalidPeriod(_))));
        assert!(matches!(check_year(2101), Err(ImportError::InvalidPeriod(_))));
    }
}
