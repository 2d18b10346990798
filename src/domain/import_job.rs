// ==========================================
// 营收保障系统 - 导入任务领域模型
// ==========================================
// 职责: 导入审计记录 (ImportJob) + 行级处理结果 (RowOutcome) + 汇总
// 红线: ImportJob 只追加，终态仅写一次；失败也必须留痕
// ==========================================

use crate::domain::types::{ImportKind, ImportStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// ImportJob - 导入任务（审计）
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub job_id: String,             // UUID
    pub kind: ImportKind,           // PLANNING / REALIZATION
    pub file_name: String,          // 源文件名
    pub period_year: i32,           // 目标年度
    pub period_month: Option<u32>,  // 实际完成导入的月份
    pub uploaded_by: String,        // 上传人
    pub status: ImportStatus,       // PENDING / SUCCESS / FAILED
    pub error_message: Option<String>,
    pub summary_json: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

// ==========================================
// RowOutcome - 单行处理结果
// ==========================================
// Skipped: 无主键行（静默）
// Failed: 查找失败 / 约束违反（需上报）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowOutcome {
    Succeeded {
        sheet: String,
        row_number: usize,
    },
    Skipped {
        sheet: String,
        row_number: usize,
        reason: String,
    },
    Failed {
        sheet: String,
        row_number: usize,
        reason: String,
    },
}

impl RowOutcome {
    pub fn row_number(&self) -> usize {
        match self {
            RowOutcome::Succeeded { row_number, .. }
            | RowOutcome::Skipped { row_number, .. }
            | RowOutcome::Failed { row_number, .. } => *row_number,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RowOutcome::Failed { .. })
    }
}

/// 行级错误（对外返回）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowErrorReport {
    pub sheet: String,
    pub row_number: usize, // 原始文件行号（1 起）
    pub message: String,
}

// ==========================================
// ImportSummary - 导入汇总
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub errored: usize,
    /// 仅保留前 N 条错误明细
    pub errors: Vec<RowErrorReport>,
    /// 错误总数（不受截断影响）
    pub total_errors: usize,
}

impl ImportSummary {
    /// 由行结果列表汇总
    ///
    /// # 参数
    /// - outcomes: 行结果（按处理顺序）
    /// - max_reported_errors: 返回的错误明细上限
    pub fn from_outcomes(outcomes: &[RowOutcome], max_reported_errors: usize) -> Self {
        let mut summary = ImportSummary::default();
        for outcome in outcomes {
            match outcome {
                RowOutcome::Succeeded { .. } => summary.succeeded += 1,
                RowOutcome::Skipped { .. } => summary.skipped += 1,
                RowOutcome::Failed {
                    sheet,
                    row_number,
                    reason,
                } => {
                    summary.errored += 1;
                    if summary.errors.len() < max_reported_errors {
                        summary.errors.push(RowErrorReport {
                            sheet: sheet.clone(),
                            row_number: *row_number,
                            message: reason.clone(),
                        });
                    }
                }
            }
        }
        summary.total_errors = summary.errored;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(row: usize) -> RowOutcome {
        RowOutcome::Failed {
            sheet: "DETAIL".to_string(),
            row_number: row,
            reason: format!("unit not found at {}", row),
        }
    }

    #[test]
    fn test_summary_counts_each_outcome() {
        let outcomes = vec![
            RowOutcome::Succeeded {
                sheet: "DETAIL".to_string(),
                row_number: 2,
            },
            RowOutcome::Skipped {
                sheet: "DETAIL".to_string(),
                row_number: 3,
                reason: "empty".to_string(),
            },
            failed(4),
        ];

        let summary = ImportSummary::from_outcomes(&outcomes, 100);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.errors[0].row_number, 4);
    }

    #[test]
    fn test_summary_truncates_error_details() {
        let outcomes: Vec<RowOutcome> = (1..=150).map(failed).collect();
        let summary = ImportSummary::from_outcomes(&outcomes, 100);

        assert_eq!(summary.errors.len(), 100);
        assert_eq!(summary.total_errors, 150);
        assert_eq!(summary.errors.last().map(|e| e.row_number), Some(100));
    }
}
