// ==========================================
// 营收保障系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，转换 Repository / Importer 错误为用户友好的错误消息
// 约定: 导入失败时必须携带 job_id（审计可追溯）
// ==========================================

use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 导入失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportFailureKind {
    /// 缺工作表 / 缺表头 / 缺必需列 / 文件不可读（零写入）
    Structural,
    /// 提交失败或数据库异常（全部回滚）
    Transaction,
}

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 导入错误
    // ==========================================
    /// 导入任务失败（job_id 为空表示任务未创建）
    #[error("文件导入失败: {message}")]
    ImportFailed {
        job_id: Option<String>,
        kind: ImportFailureKind,
        message: String,
    },

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 错误码（前端/CLI 按码分支）
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BusinessRuleViolation(_) => "BUSINESS_RULE_VIOLATION",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
            ApiError::DatabaseConnectionError(_) => "DATABASE_CONNECTION_ERROR",
            ApiError::DatabaseTransactionError(_) => "DATABASE_TRANSACTION_ERROR",
            ApiError::ImportFailed {
                kind: ImportFailureKind::Structural,
                ..
            } => "IMPORT_STRUCTURAL_ERROR",
            ApiError::ImportFailed {
                kind: ImportFailureKind::Transaction,
                ..
            } => "IMPORT_TRANSACTION_ERROR",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::ConfigError(_) => "CONFIG_ERROR",
            ApiError::InternalError(_) | ApiError::Other(_) => "INTERNAL_ERROR",
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            ApiError::ImportFailed { job_id, .. } => job_id.as_deref(),
            _ => None,
        }
    }

    /// 结构化错误载荷
    pub fn payload(&self) -> ApiErrorPayload {
        ApiErrorPayload {
            code: self.code().to_string(),
            message: self.to_string(),
            job_id: self.job_id().map(str::to_string),
        }
    }
}

/// 对外返回的错误载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::ConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("约束违反: {}", msg))
            }

            // 数据质量错误
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::InvalidWeightCurve(e) => ApiError::ValidationError(e.to_string()),
            RepositoryError::JobAlreadyFinalized { job_id, status } => {
                ApiError::BusinessRuleViolation(format!(
                    "导入任务 {} 已结束（状态 {}）",
                    job_id, status
                ))
            }

            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 ImportError 转换
// ==========================================
// 任务已创建: ImportFailed 携带 job_id，消息取根因
// 任务未创建: 期间无效 → InvalidInput；配置错误 → ConfigError
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        let job_id = err.job_id().map(str::to_string);
        let structural = err.is_structural();
        let root = err.root();

        if job_id.is_none() {
            match root {
                ImportError::InvalidPeriod(msg) => return ApiError::InvalidInput(msg.clone()),
                ImportError::ConfigReadError { .. } | ImportError::ConfigValueError { .. } => {
                    return ApiError::ConfigError(root.to_string())
                }
                ImportError::LockError(msg) => {
                    return ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
                }
                _ => {}
            }
        }

        ApiError::ImportFailed {
            job_id,
            kind: if structural {
                ImportFailureKind::Structural
            } else {
                ImportFailureKind::Transaction
            },
            message: root.to_string(),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
