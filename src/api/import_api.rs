// ==========================================
// 营收保障系统 - 导入API
// ==========================================
// 职责: 封装计划 / 实际完成上传操作，输入校验 + 结果整形
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::import_job::{ImportSummary, RowErrorReport};
use crate::domain::revenue::Period;
use crate::domain::types::ImportKind;
use crate::importer::{PlanningOutput, RealizationOutput, RevenueImporter, SummaryLine, Upload};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// 导入API响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportApiResponse {
    /// 导入任务ID（审计追溯）
    pub job_id: String,
    pub kind: ImportKind,
    /// 成功处理的行数
    pub succeeded: usize,
    /// 跳过的行数（无主键 / 合计行）
    pub skipped: usize,
    /// 行级错误数
    pub errored: usize,
    /// 错误总数（明细最多返回配置的上限条）
    pub total_errors: usize,
    pub errors: Vec<RowErrorReport>,
    /// 计划导入: 年度 / 月度目标写入行数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planning: Option<PlanningOutput>,
    /// 实际完成导入: 明细写入数 + SUMMARY 逐行核对结果
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realization: Option<RealizationOutput>,
    /// 回写后的结果工作簿（xlsx）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_file_name: Option<String>,
    /// 数据已提交但结果文件生成失败的原因
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_error: Option<String>,
    /// 导入耗时（毫秒）
    pub elapsed_ms: i64,
}

impl ImportApiResponse {
    fn from_summary(job_id: String, kind: ImportKind, summary: ImportSummary, elapsed: Duration) -> Self {
        Self {
            job_id,
            kind,
            succeeded: summary.succeeded,
            skipped: summary.skipped,
            errored: summary.errored,
            total_errors: summary.total_errors,
            errors: summary.errors,
            planning: None,
            realization: None,
            artifact: None,
            artifact_file_name: None,
            artifact_error: None,
            elapsed_ms: elapsed.as_millis() as i64,
        }
    }

    /// SUMMARY 核对行（计划导入为空）
    pub fn summary_lines(&self) -> &[SummaryLine] {
        self.realization
            .as_ref()
            .map(|r| r.summary_lines.as_slice())
            .unwrap_or(&[])
    }
}

/// 结果文件名: `<原文件名主干>_result.xlsx`
pub fn artifact_file_name(source_file_name: &str) -> String {
    let stem = match source_file_name.rfind('.') {
        Some(idx) if idx > 0 => &source_file_name[..idx],
        _ => source_file_name,
    };
    format!("{}_result.xlsx", stem)
}

/// 导入API
pub struct ImportApi {
    importer: Arc<dyn RevenueImporter>,
}

impl ImportApi {
    pub fn new(importer: Arc<dyn RevenueImporter>) -> Self {
        Self { importer }
    }

    /// 导入年度计划目标
    ///
    /// # 参数
    /// - bytes: 上传文件内容（.xlsx/.xls/.ods/.csv）
    /// - file_name: 原始文件名（决定解析格式）
    /// - year: 计划年度
    /// - uploader: 上传人
    ///
    /// # 返回
    /// - Ok(ImportApiResponse): 任务 SUCCESS（可能含行级错误）
    /// - Err(ApiError::ImportFailed): 任务 FAILED，携带 job_id
    pub async fn import_planning(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        year: i32,
        uploader: &str,
    ) -> ApiResult<ImportApiResponse> {
        let upload = validate_upload(bytes, file_name, uploader)?;

        let result = self.importer.import_planning(upload, year).await?;

        let mut response = ImportApiResponse::from_summary(
            result.job_id,
            ImportKind::Planning,
            result.summary,
            result.elapsed,
        );
        response.planning = Some(result.output);
        Ok(response)
    }

    /// 导入月度实际完成（DETAIL + SUMMARY）
    ///
    /// # 返回
    /// - Ok(ImportApiResponse): 含回写后的结果工作簿
    /// - Err(ApiError::ImportFailed): 任务 FAILED，携带 job_id
    pub async fn import_realization(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        year: i32,
        month: u32,
        uploader: &str,
    ) -> ApiResult<ImportApiResponse> {
        let period = Period::new(year, month)
            .ok_or_else(|| ApiError::InvalidInput(format!("月份无效: {}", month)))?;
        let upload = validate_upload(bytes, file_name, uploader)?;

        let result = self.importer.import_realization(upload, period).await?;

        let mut response = ImportApiResponse::from_summary(
            result.job_id,
            ImportKind::Realization,
            result.summary,
            result.elapsed,
        );
        response.artifact_file_name = result.artifact.as_ref().map(|_| artifact_file_name(file_name));
        response.artifact = result.artifact;
        response.artifact_error = result.artifact_error;
        response.realization = Some(result.output);
        Ok(response)
    }
}

fn validate_upload(bytes: Vec<u8>, file_name: &str, uploader: &str) -> ApiResult<Upload> {
    let file_name = file_name.trim();
    if file_name.is_empty() {
        return Err(ApiError::InvalidInput("文件名不能为空".to_string()));
    }
    if bytes.is_empty() {
        return Err(ApiError::InvalidInput(format!("文件为空: {}", file_name)));
    }
    let uploader = uploader.trim();
    if uploader.is_empty() {
        return Err(ApiError::InvalidInput("上传人不能为空".to_string()));
    }
    Ok(Upload::new(file_name, bytes, uploader))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_file_name() {
        assert_eq!(artifact_file_name("realisasi_maret.xlsx"), "realisasi_maret_result.xlsx");
        assert_eq!(artifact_file_name("report"), "report_result.xlsx");
        assert_eq!(artifact_file_name(".xlsx"), ".xlsx_result.xlsx");
    }

    #[test]
    fn test_validate_upload_rejects_empty_input() {
        assert!(matches!(
            validate_upload(vec![], "a.xlsx", "ana"),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_upload(vec![1], "  ", "ana"),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_upload(vec![1], "a.xlsx", ""),
            Err(ApiError::InvalidInput(_))
        ));
        let upload = validate_upload(vec![1], " a.xlsx ", "ana").unwrap();
        assert_eq!(upload.file_name, "a.xlsx");
    }
}
