// ==========================================
// 营收保障系统 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入 / 分解 / KPI 所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::revenue::WeightCurve;
use crate::domain::types::RoundingPolicy;
use crate::engine::kpi::KpiThresholds;
use async_trait::async_trait;
use std::error::Error;

/// 配置读取错误（跨 await 传递，需 Send + Sync）
pub type ConfigError = Box<dyn Error + Send + Sync>;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
// 约定: 键不存在 → 默认值；键存在但格式错误 → Err
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    // ===== KPI =====

    /// 达成状态阈值
    ///
    /// # 默认值
    /// - on_track 100 / watch 90
    async fn get_kpi_thresholds(&self) -> Result<KpiThresholds, ConfigError>;

    // ===== 月度分解 =====

    /// 取整策略
    ///
    /// # 默认值
    /// - INDEPENDENT
    async fn get_rounding_policy(&self) -> Result<RoundingPolicy, ConfigError>;

    /// 默认权重曲线（年度未配置曲线时使用）
    ///
    /// # 默认值
    /// - [5, 10, 15, 20, 25, 40, 45, 55, 65, 80, 90, 100]
    async fn get_default_weight_curve(&self, year: i32) -> Result<WeightCurve, ConfigError>;

    // ===== 导入 =====

    /// 表头扫描行数
    ///
    /// # 默认值
    /// - 20
    async fn get_header_scan_rows(&self) -> Result<usize, ConfigError>;

    /// 响应中返回的错误明细上限
    ///
    /// # 默认值
    /// - 100
    async fn get_max_reported_errors(&self) -> Result<usize, ConfigError>;

    /// 实际完成明细工作表名称（默认 DETAIL）
    async fn get_realization_detail_sheet(&self) -> Result<String, ConfigError>;

    /// 实际完成汇总工作表名称（默认 SUMMARY）
    async fn get_realization_summary_sheet(&self) -> Result<String, ConfigError>;

    /// 计划表工作表名称；None 表示取第一个工作表
    async fn get_planning_sheet(&self) -> Result<Option<String>, ConfigError>;
}
