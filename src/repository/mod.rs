// ==========================================
// 营收保障系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约定: `*_tx` 关联函数接收 &Connection，可在事务 / SAVEPOINT 内调用
// ==========================================

pub mod error;
pub mod import_job_repo;
pub mod pipeline_repo;
pub mod realization_repo;
pub mod reference_repo;
pub mod sql_utils;
pub mod target_repo;
pub mod weight_curve_repo;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use import_job_repo::ImportJobRepository;
pub use pipeline_repo::PipelineRepository;
pub use realization_repo::RealizationRepository;
pub use reference_repo::ReferenceRepository;
pub use target_repo::TargetRepository;
pub use weight_curve_repo::WeightCurveRepository;
