// ==========================================
// 营收保障系统 - 导入层
// ==========================================
// 职责: 计划 / 实际完成工作簿导入
// 流程: 读取工作簿 → 表头定位 → 行提取 → 代码规范化 → 单事务落库
// 支持: Excel (.xlsx/.xls/.ods), CSV
// ==========================================

// 模块声明
pub mod artifact_writer;
pub mod code_normalizer;
pub mod error;
pub mod header_locator;
pub mod persister;
pub mod planning_importer;
pub mod realization_importer;
pub mod reference_cache;
pub mod revenue_importer_impl;
pub mod revenue_importer_trait;
pub mod row_extractor;
pub mod workbook;

// 重导出核心类型
pub use code_normalizer::normalize_code;
pub use error::{ImportError, ImportResult};
pub use header_locator::{HeaderLocator, HeaderMatch, HeaderRule};
pub use persister::{BatchApplier, ImportRequest, ReconciliationPersister, RowDisposition, RowInput};
pub use planning_importer::{PlanningApplier, PlanningOutput, PlanningSettings};
pub use realization_importer::{RealizationApplier, RealizationOutput, RealizationSettings, SummaryLine};
pub use reference_cache::ReferenceCache;
pub use revenue_importer_impl::RevenueImporterImpl;
pub use workbook::{CellValue, SheetGrid, WorkbookData};

// 重导出 Trait 接口
pub use revenue_importer_trait::{
    PlanningImportResult, RealizationImportResult, RevenueImporter, Upload,
};
