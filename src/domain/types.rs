// ==========================================
// 营收保障系统 - 领域类型定义
// ==========================================
// 职责: 目标类别 / 导入状态 / KPI 状态 / 商机信心等级等闭集枚举
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 目标类别 (Target Category)
// ==========================================
// 闭集, 不允许用户扩展
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetCategory {
    Rkap,       // 年度预算目标
    Beyond,     // 超额挑战目标
    Commitment, // 已承诺订单
    Nr,         // 新增营收
}

impl TargetCategory {
    pub const ALL: [TargetCategory; 4] = [
        TargetCategory::Rkap,
        TargetCategory::Beyond,
        TargetCategory::Commitment,
        TargetCategory::Nr,
    ];

    /// 数据库存储值
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetCategory::Rkap => "RKAP",
            TargetCategory::Beyond => "BEYOND",
            TargetCategory::Commitment => "COMMITMENT",
            TargetCategory::Nr => "NR",
        }
    }

    /// 从文本解析（大小写/空白不敏感，`CO` 视为 COMMITMENT）
    pub fn parse(s: &str) -> Option<Self> {
        let cleaned: String = s.split_whitespace().collect::<String>().to_uppercase();
        match cleaned.as_str() {
            "RKAP" => Some(TargetCategory::Rkap),
            "BEYOND" => Some(TargetCategory::Beyond),
            "COMMITMENT" | "CO" => Some(TargetCategory::Commitment),
            "NR" => Some(TargetCategory::Nr),
            _ => None,
        }
    }
}

impl fmt::Display for TargetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 导入任务状态 (Import Job Status)
// ==========================================
// 状态迁移: PENDING → SUCCESS | FAILED (仅一次)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStatus {
    Pending,
    Success,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Pending => "PENDING",
            ImportStatus::Success => "SUCCESS",
            ImportStatus::Failed => "FAILED",
        }
    }

    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "SUCCESS" => ImportStatus::Success,
            "FAILED" => ImportStatus::Failed,
            _ => ImportStatus::Pending,
        }
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 导入类型 (Import Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportKind {
    Planning,    // 年度计划目标表
    Realization, // 月度实际完成表
}

impl ImportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportKind::Planning => "PLANNING",
            ImportKind::Realization => "REALIZATION",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "PLANNING" => ImportKind::Planning,
            _ => ImportKind::Realization,
        }
    }
}

impl fmt::Display for ImportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 达成状态 (KPI Status)
// ==========================================
// 顺序: AtRisk < Watch < OnTrack
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KpiStatus {
    AtRisk,  // 风险
    Watch,   // 关注
    OnTrack, // 正常
}

impl fmt::Display for KpiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KpiStatus::AtRisk => write!(f, "AT_RISK"),
            KpiStatus::Watch => write!(f, "WATCH"),
            KpiStatus::OnTrack => write!(f, "ON_TRACK"),
        }
    }
}

// ==========================================
// 商机信心等级 (Pipeline Confidence Tier)
// ==========================================
// 销售管道中以颜色标记: GREEN / YELLOW / RED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    /// 从状态颜色或等级名解析，无法识别返回 None
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "HIGH" | "GREEN" | "HIJAU" => Some(ConfidenceTier::High),
            "MEDIUM" | "YELLOW" | "KUNING" => Some(ConfidenceTier::Medium),
            "LOW" | "RED" | "MERAH" => Some(ConfidenceTier::Low),
            _ => None,
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceTier::High => write!(f, "HIGH"),
            ConfidenceTier::Medium => write!(f, "MEDIUM"),
            ConfidenceTier::Low => write!(f, "LOW"),
        }
    }
}

// ==========================================
// 月度分解取整策略 (Rounding Policy)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundingPolicy {
    /// 每月独立取整，接受残差
    Independent,
    /// 残差并入 12 月，保证合计等于年度值
    FinalMonthCorrection,
}

impl RoundingPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "INDEPENDENT" => Some(RoundingPolicy::Independent),
            "FINAL_MONTH_CORRECTION" => Some(RoundingPolicy::FinalMonthCorrection),
            _ => None,
        }
    }
}

impl Default for RoundingPolicy {
    fn default() -> Self {
        RoundingPolicy::Independent
    }
}

impl fmt::Display for RoundingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundingPolicy::Independent => write!(f, "INDEPENDENT"),
            RoundingPolicy::FinalMonthCorrection => write!(f, "FINAL_MONTH_CORRECTION"),
        }
    }
}
