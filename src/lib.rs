// ==========================================
// 营收保障系统 - 核心库
// ==========================================
// 职责: 计划 / 实际完成数据导入，年度目标月度分解，达成率计算
// 技术栈: Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 月度分解 / KPI
pub mod engine;

// 导入层 - 工作簿解析与落库
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 共享状态组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    ConfidenceTier, ImportKind, ImportStatus, KpiStatus, RoundingPolicy, TargetCategory,
};

// 领域实体
pub use domain::{
    ActualRealization, AnnualTarget, ImportJob, ImportSummary, MonthlyTarget, OrganizationalUnit,
    Period, WeightCurve,
};

// 引擎
pub use engine::{DistributionEngine, KpiCalculator, RegenerationService};

// API
pub use api::{ApiError, DashboardApi, ImportApi, TargetApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "营收保障系统";

// 数据库版本
pub const DB_VERSION: &str = "v0.1";
