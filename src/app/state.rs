// ==========================================
// 营收保障系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// 约定: 全部仓储 / 导入器共享同一个 SQLite 连接
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{DashboardApi, ImportApi, TargetApi};
use crate::config::{ConfigManager, ImportConfigReader};
use crate::db::{init_schema, open_sqlite_connection};
use crate::importer::{RevenueImporter, RevenueImporterImpl};
use crate::repository::{
    ImportJobRepository, PipelineRepository, RealizationRepository, ReferenceRepository,
    TargetRepository, WeightCurveRepository,
};

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "REVENUE_ASSURANCE_DB_PATH";

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 上传导入API
    pub import_api: Arc<ImportApi>,

    /// 驾驶舱查询API
    pub dashboard_api: Arc<DashboardApi>,

    /// 目标维护API（权重曲线 / 重算）
    pub target_api: Arc<TargetApi>,

    /// 主数据仓储（单元维护）
    pub reference_repo: Arc<ReferenceRepository>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径（不存在时自动创建并建表）
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        // 创建数据库连接（共享连接）
        let conn = open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        init_schema(&conn).map_err(|e| format!("数据库 schema 初始化失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let target_repo = Arc::new(TargetRepository::from_connection(conn.clone()));
        let realization_repo = Arc::new(RealizationRepository::from_connection(conn.clone()));
        let reference_repo = Arc::new(ReferenceRepository::from_connection(conn.clone()));
        let pipeline_repo = Arc::new(PipelineRepository::from_connection(conn.clone()));
        let job_repo = Arc::new(ImportJobRepository::from_connection(conn.clone()));
        let curve_repo = Arc::new(WeightCurveRepository::from_connection(conn.clone()));

        // 配置管理器
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let config_reader: Arc<dyn ImportConfigReader> = config_manager.clone();

        // ==========================================
        // 初始化API层
        // ==========================================
        let importer_config = ConfigManager::from_connection(conn.clone())
            .map_err(|e| format!("无法创建ConfigManager: {}", e))?;
        let importer: Arc<dyn RevenueImporter> =
            Arc::new(RevenueImporterImpl::new(conn.clone(), importer_config));
        let import_api = Arc::new(ImportApi::new(importer));

        let dashboard_api = Arc::new(DashboardApi::new(
            target_repo,
            realization_repo,
            reference_repo.clone(),
            pipeline_repo,
            job_repo,
            config_reader.clone(),
        ));

        let target_api = Arc::new(TargetApi::new(
            conn,
            reference_repo.clone(),
            curve_repo,
            config_reader,
        ));

        tracing::info!("AppState初始化完成");
        Ok(Self {
            db_path,
            config_manager,
            import_api,
            dashboard_api,
            target_api,
            reference_repo,
        })
    }
}

// ==========================================
// 数据库路径
// ==========================================

/// 获取默认数据库路径
///
/// # 返回
/// - 环境变量 REVENUE_ASSURANCE_DB_PATH（非空时）
/// - 开发环境: 用户数据目录/revenue-assurance-dev/revenue_assurance.db
/// - 生产环境: 用户数据目录/revenue-assurance/revenue_assurance.db
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./revenue_assurance.db");

    if let Some(data_dir) = dirs::data_dir() {
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("revenue-assurance-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("revenue-assurance");
        }

        // 目录创建失败时退回当前目录
        if std::fs::create_dir_all(&path).is_ok() {
            path = path.join("revenue_assurance.db");
        } else {
            path = PathBuf::from("./revenue_assurance.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
        assert!(path.ends_with(".db"));
    }

    #[test]
    fn test_app_state_bootstraps_schema() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state.db").to_string_lossy().to_string();

        let state = AppState::new(db_path.clone()).unwrap();
        assert_eq!(state.db_path, db_path);
        assert!(state.dashboard_api.list_units().unwrap().is_empty());

        // 再次打开同一文件（schema 幂等）
        assert!(AppState::new(db_path).is_ok());
    }
}
