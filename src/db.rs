// ==========================================
// 营收保障系统 - SQLite 连接初始化与建库
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键 + busy_timeout）
// - 幂等建表，所有记录按自然键建立主键（重复导入覆盖而非累加）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 建库脚本（全部 IF NOT EXISTS，可重复执行）
///
/// 金额列以 TEXT 存储十进制字符串，避免浮点误差
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_scope (
    scope_id TEXT PRIMARY KEY,
    scope_type TEXT NOT NULL,
    scope_key TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(scope_type, scope_key)
);

INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
VALUES ('global', 'GLOBAL', 'global');

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS org_unit (
    unit_id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    parent_id INTEGER REFERENCES org_unit(unit_id),
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS customer (
    customer_id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS weight_curve (
    year INTEGER NOT NULL,
    month INTEGER NOT NULL CHECK (month BETWEEN 1 AND 12),
    cumulative_pct TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (year, month)
);

CREATE TABLE IF NOT EXISTS annual_target (
    year INTEGER NOT NULL,
    unit_id INTEGER NOT NULL REFERENCES org_unit(unit_id),
    category TEXT NOT NULL CHECK (category IN ('RKAP', 'BEYOND', 'COMMITMENT', 'NR')),
    amount TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (year, unit_id, category)
);

CREATE TABLE IF NOT EXISTS monthly_target (
    year INTEGER NOT NULL,
    month INTEGER NOT NULL CHECK (month BETWEEN 1 AND 12),
    unit_id INTEGER NOT NULL REFERENCES org_unit(unit_id),
    category TEXT NOT NULL CHECK (category IN ('RKAP', 'BEYOND', 'COMMITMENT', 'NR')),
    amount TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (year, month, unit_id, category)
);

CREATE INDEX IF NOT EXISTS idx_monthly_target_year_unit
    ON monthly_target(year, unit_id);

CREATE TABLE IF NOT EXISTS actual_realization (
    year INTEGER NOT NULL,
    month INTEGER NOT NULL CHECK (month BETWEEN 1 AND 12),
    unit_id INTEGER NOT NULL REFERENCES org_unit(unit_id),
    revenue_type TEXT NOT NULL,
    amount TEXT NOT NULL,
    source_ref TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (year, month, unit_id, revenue_type)
);

CREATE INDEX IF NOT EXISTS idx_actual_realization_year_unit
    ON actual_realization(year, unit_id);

CREATE TABLE IF NOT EXISTS import_job (
    job_id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    file_name TEXT NOT NULL,
    period_year INTEGER NOT NULL,
    period_month INTEGER,
    uploaded_by TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('PENDING', 'SUCCESS', 'FAILED')),
    error_message TEXT,
    summary_json TEXT,
    created_at TEXT NOT NULL,
    finished_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_import_job_created_at
    ON import_job(created_at);

CREATE TABLE IF NOT EXISTS sales_pipeline (
    opportunity_id INTEGER PRIMARY KEY AUTOINCREMENT,
    year INTEGER NOT NULL,
    unit_id INTEGER NOT NULL REFERENCES org_unit(unit_id),
    customer_name TEXT,
    est_revenue TEXT NOT NULL,
    status_color TEXT NOT NULL
);
"#;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置（同键并发导入依赖 SQLite 写锁排队）
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 初始化数据库 schema（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();

        assert_eq!(read_schema_version(&conn).unwrap(), None);
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_monthly_target_natural_key_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute("INSERT INTO org_unit (code, name) VALUES ('SBU01', 'Unit 1')", [])
            .unwrap();

        let insert = "INSERT INTO monthly_target (year, month, unit_id, category, amount, updated_at)
                      VALUES (2025, 1, 1, 'RKAP', '10', '2025-01-01T00:00:00Z')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
