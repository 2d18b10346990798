// ==========================================
// 营收保障系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、写入
// 存储: config_kv 表 (scope_id = 'global')
// ==========================================

use crate::config::import_config_trait::{ConfigError, ImportConfigReader};
use crate::db::open_sqlite_connection;
use crate::domain::revenue::{WeightCurve, DEFAULT_WEIGHT_CURVE};
use crate::domain::types::RoundingPolicy;
use crate::engine::kpi::KpiThresholds;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, ConfigError> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, ConfigError> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, ConfigError> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES ('global', ?1, ?2, datetime('now'))
            ON CONFLICT(scope_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, value],
        )?;
        tracing::info!(config_key = key, value, "配置已更新");
        Ok(())
    }

    /// 读取并解析；键不存在返回 None，空白值视为不存在
    fn get_parsed<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = self.get_config_value(key)? else {
            return Ok(None);
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed
            .parse::<T>()
            .map(Some)
            .map_err(|e| malformed(key, &raw, &e.to_string()))
    }

    fn get_text_or_default(&self, key: &str, default: &str) -> Result<String, ConfigError> {
        Ok(self
            .get_config_value(key)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string()))
    }
}

fn malformed(key: &str, raw: &str, message: &str) -> ConfigError {
    format!("配置值格式错误 (key: {}, value: {}): {}", key, raw, message).into()
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_kpi_thresholds(&self) -> Result<KpiThresholds, ConfigError> {
        let defaults = KpiThresholds::default();
        let on_track_pct = self
            .get_parsed::<Decimal>(config_keys::KPI_ON_TRACK_PCT)?
            .unwrap_or(defaults.on_track_pct);
        let watch_pct = self
            .get_parsed::<Decimal>(config_keys::KPI_WATCH_PCT)?
            .unwrap_or(defaults.watch_pct);

        if watch_pct > on_track_pct {
            return Err(malformed(
                config_keys::KPI_WATCH_PCT,
                &watch_pct.to_string(),
                "关注阈值不能高于正常阈值",
            ));
        }
        Ok(KpiThresholds {
            on_track_pct,
            watch_pct,
        })
    }

    async fn get_rounding_policy(&self) -> Result<RoundingPolicy, ConfigError> {
        match self.get_config_value(config_keys::DISTRIBUTION_ROUNDING)? {
            None => Ok(RoundingPolicy::default()),
            Some(raw) if raw.trim().is_empty() => Ok(RoundingPolicy::default()),
            Some(raw) => RoundingPolicy::parse(&raw).ok_or_else(|| {
                malformed(
                    config_keys::DISTRIBUTION_ROUNDING,
                    &raw,
                    "仅支持 INDEPENDENT / FINAL_MONTH_CORRECTION",
                )
            }),
        }
    }

    async fn get_default_weight_curve(&self, year: i32) -> Result<WeightCurve, ConfigError> {
        let Some(raw) = self.get_config_value(config_keys::DEFAULT_WEIGHT_CURVE)? else {
            return Ok(WeightCurve::default_for_year(year));
        };
        if raw.trim().is_empty() {
            return Ok(WeightCurve::default_for_year(year));
        }

        // JSON 数组，元素可为数字或数字字符串
        let points: Vec<Decimal> = serde_json::from_str(&raw)
            .map_err(|e| malformed(config_keys::DEFAULT_WEIGHT_CURVE, &raw, &e.to_string()))?;
        WeightCurve::try_new(year, &points)
            .map_err(|e| malformed(config_keys::DEFAULT_WEIGHT_CURVE, &raw, &e.to_string()))
    }

    async fn get_header_scan_rows(&self) -> Result<usize, ConfigError> {
        let rows = self
            .get_parsed::<usize>(config_keys::HEADER_SCAN_ROWS)?
            .unwrap_or(defaults::HEADER_SCAN_ROWS);
        if rows == 0 {
            return Err(malformed(config_keys::HEADER_SCAN_ROWS, "0", "必须大于 0"));
        }
        Ok(rows)
    }

    async fn get_max_reported_errors(&self) -> Result<usize, ConfigError> {
        Ok(self
            .get_parsed::<usize>(config_keys::MAX_REPORTED_ERRORS)?
            .unwrap_or(defaults::MAX_REPORTED_ERRORS))
    }

    async fn get_realization_detail_sheet(&self) -> Result<String, ConfigError> {
        self.get_text_or_default(config_keys::REALIZATION_DETAIL_SHEET, defaults::DETAIL_SHEET)
    }

    async fn get_realization_summary_sheet(&self) -> Result<String, ConfigError> {
        self.get_text_or_default(config_keys::REALIZATION_SUMMARY_SHEET, defaults::SUMMARY_SHEET)
    }

    async fn get_planning_sheet(&self) -> Result<Option<String>, ConfigError> {
        Ok(self
            .get_config_value(config_keys::PLANNING_SHEET)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()))
    }
}

// ==========================================
// 默认值
// ==========================================
pub mod defaults {
    pub const HEADER_SCAN_ROWS: usize = 20;
    pub const MAX_REPORTED_ERRORS: usize = 100;
    pub const DETAIL_SHEET: &str = "DETAIL";
    pub const SUMMARY_SHEET: &str = "SUMMARY";
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // KPI
    pub const KPI_ON_TRACK_PCT: &str = "kpi_on_track_pct";
    pub const KPI_WATCH_PCT: &str = "kpi_watch_pct";

    // 月度分解
    pub const DISTRIBUTION_ROUNDING: &str = "distribution_rounding";
    pub const DEFAULT_WEIGHT_CURVE: &str = "default_weight_curve"; // JSON 数组 (12)

    // 导入
    pub const HEADER_SCAN_ROWS: &str = "header_scan_rows";
    pub const MAX_REPORTED_ERRORS: &str = "max_reported_errors";
    pub const REALIZATION_DETAIL_SHEET: &str = "realization_detail_sheet";
    pub const REALIZATION_SUMMARY_SHEET: &str = "realization_summary_sheet";
    pub const PLANNING_SHEET: &str = "planning_sheet";
}

/// 默认曲线的 JSON 表示（写入配置时使用）
pub fn default_weight_curve_json() -> String {
    serde_json::to_string(&DEFAULT_WEIGHT_CURVE).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use rust_decimal_macros::dec;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[tokio::test]
    async fn test_missing_keys_fall_back_to_defaults() {
        let config = manager();
        assert_eq!(config.get_kpi_thresholds().await.unwrap(), KpiThresholds::default());
        assert_eq!(
            config.get_rounding_policy().await.unwrap(),
            RoundingPolicy::Independent
        );
        assert_eq!(config.get_header_scan_rows().await.unwrap(), 20);
        assert_eq!(config.get_max_reported_errors().await.unwrap(), 100);
        assert_eq!(config.get_realization_detail_sheet().await.unwrap(), "DETAIL");
        assert_eq!(config.get_planning_sheet().await.unwrap(), None);
        assert_eq!(
            config.get_default_weight_curve(2025).await.unwrap(),
            WeightCurve::default_for_year(2025)
        );
    }

    #[tokio::test]
    async fn test_stored_values_override_defaults() {
        let config = manager();
        config.set_global_config_value(config_keys::KPI_WATCH_PCT, "85").unwrap();
        config
            .set_global_config_value(config_keys::DISTRIBUTION_ROUNDING, "final_month_correction")
            .unwrap();
        config
            .set_global_config_value(
                config_keys::DEFAULT_WEIGHT_CURVE,
                "[10, 20, 30, 40, 50, 60, 70, 80, 90, 95, 98, 100]",
            )
            .unwrap();
        config.set_global_config_value(config_keys::PLANNING_SHEET, " RKAP ").unwrap();

        assert_eq!(config.get_kpi_thresholds().await.unwrap().watch_pct, dec!(85));
        assert_eq!(
            config.get_rounding_policy().await.unwrap(),
            RoundingPolicy::FinalMonthCorrection
        );
        assert_eq!(
            config.get_default_weight_curve(2026).await.unwrap().cumulative(1),
            dec!(10)
        );
        assert_eq!(config.get_planning_sheet().await.unwrap(), Some("RKAP".to_string()));
    }

    #[tokio::test]
    async fn test_malformed_values_are_errors() {
        let config = manager();
        config.set_global_config_value(config_keys::HEADER_SCAN_ROWS, "abc").unwrap();
        config.set_global_config_value(config_keys::DISTRIBUTION_ROUNDING, "BANKERS").unwrap();
        config
            .set_global_config_value(config_keys::DEFAULT_WEIGHT_CURVE, "[50, 40, 100]")
            .unwrap();

        let err = config.get_header_scan_rows().await.unwrap_err();
        assert!(err.to_string().contains(config_keys::HEADER_SCAN_ROWS));
        assert!(config.get_rounding_policy().await.is_err());
        assert!(config.get_default_weight_curve(2025).await.is_err());
    }

    #[test]
    fn test_default_curve_json_is_parseable() {
        let points: Vec<Decimal> = serde_json::from_str(&default_weight_curve_json()).unwrap();
        assert!(WeightCurve::try_new(2025, &points).is_ok());
    }
}
