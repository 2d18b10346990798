// ==========================================
// 营收保障系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口，供 CLI / 上层服务调用
// ==========================================

pub mod dashboard_api;
pub mod error;
pub mod import_api;
pub mod target_api;

// 重导出核心类型
pub use dashboard_api::{DashboardApi, UnitKpiResponse};
pub use error::{ApiError, ApiErrorPayload, ApiResult, ImportFailureKind};
pub use import_api::{ImportApi, ImportApiResponse};
pub use target_api::TargetApi;
