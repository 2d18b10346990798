// ==========================================
// 营收保障系统 - 导入模块错误类型
// ==========================================
// 分类:
// - 结构错误: 缺工作表 / 缺表头 / 缺必需列 → 任务失败，零写入
// - 行错误: 查找失败 / 约束违反 → 跳过该行，任务继续
// - 事务错误: 提交失败 → 全部回滚，任务失败
// 工具: thiserror 派生宏
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误（结构错误）=====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xls/.ods/.csv）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    // ===== 工作表结构错误 =====
    #[error("缺少必需工作表: {sheet}")]
    MissingSheet { sheet: String },

    #[error("工作表 {sheet} 前 {scanned_rows} 行内未找到表头")]
    HeaderNotFound { sheet: String, scanned_rows: usize },

    #[error("工作表 {sheet} 缺少必需列: {column}")]
    MissingColumn { sheet: String, column: String },

    #[error("导入期间无效: {0}")]
    InvalidPeriod(String),

    // ===== 行级错误 =====
    #[error("单元代码未找到 (行 {row}): {code}")]
    UnitNotFound { row: usize, code: String },

    #[error("数据行无效 (行 {row}): {message}")]
    InvalidRow { row: usize, message: String },

    #[error("约束违反 (行 {row}): {message}")]
    ConstraintViolation { row: usize, message: String },

    // ===== 数据库错误 =====
    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    // ===== 配置错误 =====
    #[error("配置读取失败 (key: {key}): {message}")]
    ConfigReadError { key: String, message: String },

    #[error("配置值格式错误 (key: {key}, value: {value}): {message}")]
    ConfigValueError {
        key: String,
        value: String,
        message: String,
    },

    // ===== 任务级错误 =====
    #[error("导入任务失败 (job_id: {job_id}): {source}")]
    JobFailed {
        job_id: String,
        source: Box<ImportError>,
    },

    // ===== 结果文件 =====
    #[error("结果文件生成失败: {0}")]
    ArtifactWriteError(String),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 是否为结构错误（任务在任何写入前中止）
    pub fn is_structural(&self) -> bool {
        if let ImportError::JobFailed { source, .. } = self {
            return source.is_structural();
        }
        matches!(
            self,
            ImportError::FileNotFound(_)
                | ImportError::UnsupportedFormat(_)
                | ImportError::FileReadError(_)
                | ImportError::ExcelParseError(_)
                | ImportError::CsvParseError(_)
                | ImportError::MissingSheet { .. }
                | ImportError::HeaderNotFound { .. }
                | ImportError::MissingColumn { .. }
                | ImportError::InvalidPeriod(_)
        )
    }

    /// 为行级错误补齐源文件行号
    pub fn with_row(self, row_number: usize) -> Self {
        match self {
            ImportError::UnitNotFound { code, .. } => ImportError::UnitNotFound {
                row: row_number,
                code,
            },
            ImportError::InvalidRow { message, .. } => ImportError::InvalidRow {
                row: row_number,
                message,
            },
            ImportError::ConstraintViolation { message, .. } => ImportError::ConstraintViolation {
                row: row_number,
                message,
            },
            other => other,
        }
    }

    /// 关联的导入任务（仅 JobFailed 携带）
    pub fn job_id(&self) -> Option<&str> {
        match self {
            ImportError::JobFailed { job_id, .. } => Some(job_id),
            _ => None,
        }
    }

    /// 剥离任务包装，返回根因
    pub fn root(&self) -> &ImportError {
        match self {
            ImportError::JobFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// 是否为行级错误（记录后继续）
    pub fn is_row_level(&self) -> bool {
        matches!(
            self,
            ImportError::UnitNotFound { .. }
                | ImportError::InvalidRow { .. }
                | ImportError::ConstraintViolation { .. }
        )
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(_, Some(msg))
                if msg.contains("UNIQUE")
                    || msg.contains("FOREIGN KEY")
                    || msg.contains("CHECK")
                    || msg.contains("NOT NULL") =>
            {
                ImportError::ConstraintViolation {
                    row: 0, // 具体行号需在调用处指定
                    message: msg,
                }
            }
            _ => ImportError::DatabaseQueryError(err.to_string()),
        }
    }
}

// 实现 From<RepositoryError>
impl From<RepositoryError> for ImportError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::UniqueConstraintViolation(msg)
            | RepositoryError::ForeignKeyViolation(msg)
            | RepositoryError::ConstraintViolation(msg) => {
                ImportError::ConstraintViolation { row: 0, message: msg }
            }
            RepositoryError::LockError(msg) => ImportError::LockError(msg),
            RepositoryError::DatabaseTransactionError(msg) => {
                ImportError::DatabaseTransactionError(msg)
            }
            other => ImportError::DatabaseQueryError(other.to_string()),
        }
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

// 实现 From<rust_xlsxwriter::XlsxError>
impl From<rust_xlsxwriter::XlsxError> for ImportError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        ImportError::ArtifactWriteError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let missing = ImportError::MissingSheet {
            sheet: "DETAIL".to_string(),
        };
        assert!(missing.is_structural());
        assert!(!missing.is_row_level());
        assert!(missing.to_string().contains("DETAIL"));

        let row = ImportError::UnitNotFound {
            row: 7,
            code: "X1".to_string(),
        };
        assert!(row.is_row_level());
        assert!(!row.is_structural());
    }

    #[test]
    fn test_job_failed_keeps_root_cause() {
        let err = ImportError::JobFailed {
            job_id: "job-9".to_string(),
            source: Box::new(ImportError::MissingSheet {
                sheet: "DETAIL".to_string(),
            }),
        };
        assert_eq!(err.job_id(), Some("job-9"));
        assert!(err.is_structural());
        assert!(matches!(err.root(), ImportError::MissingSheet { .. }));
        assert!(err.to_string().contains("DETAIL"));
    }

    #[test]
    fn test_unique_violation_maps_to_constraint() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("UNIQUE constraint failed: customer.code".to_string()),
        );
        assert!(matches!(
            ImportError::from(err),
            ImportError::ConstraintViolation { .. }
        ));
    }
}
