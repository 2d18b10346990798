// ==========================================
// 营收保障系统 - 营收导入 Trait
// ==========================================
// 职责: 定义计划 / 实际完成导入接口（不包含实现）
// ==========================================

use crate::domain::import_job::ImportSummary;
use crate::domain::revenue::Period;
use crate::importer::error::ImportResult;
use crate::importer::planning_importer::PlanningOutput;
use crate::importer::realization_importer::RealizationOutput;
use async_trait::async_trait;
use std::time::Duration;

/// 上传文件
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub uploaded_by: String,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>, uploaded_by: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
            uploaded_by: uploaded_by.into(),
        }
    }
}

/// 计划导入结果
#[derive(Debug, Clone)]
pub struct PlanningImportResult {
    pub job_id: String,
    pub summary: ImportSummary,
    pub output: PlanningOutput,
    pub elapsed: Duration,
}

/// 实际完成导入结果
#[derive(Debug, Clone)]
pub struct RealizationImportResult {
    pub job_id: String,
    pub summary: ImportSummary,
    pub output: RealizationOutput,
    /// 回写后的工作簿（xlsx）
    pub artifact: Option<Vec<u8>>,
    /// 数据已提交但结果文件生成失败时的原因
    pub artifact_error: Option<String>,
    pub elapsed: Duration,
}

// ==========================================
// RevenueImporter Trait
// ==========================================
// 实现者: RevenueImporterImpl
#[async_trait]
pub trait RevenueImporter: Send + Sync {
    /// 导入年度计划目标表
    ///
    /// # 返回
    /// - Ok: 任务 SUCCESS（可能含行级错误）
    /// - Err(ImportError::JobFailed): 任务 FAILED，携带 job_id
    async fn import_planning(&self, upload: Upload, year: i32)
        -> ImportResult<PlanningImportResult>;

    /// 导入月度实际完成表（DETAIL + SUMMARY）
    async fn import_realization(
        &self,
        upload: Upload,
        period: Period,
    ) -> ImportResult<RealizationImportResult>;
}
