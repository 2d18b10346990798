// ==========================================
// 营收保障系统 - 参照数据仓储（组织单元 / 客户）
// ==========================================
// 职责:
// - 导入任务开始时一次性加载参照表（供 ReferenceCache 使用）
// - 导入过程中登记新客户
// - 组织单元主数据维护（主数据管理界面 / 测试种子）
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::domain::revenue::{Customer, OrganizationalUnit};
use crate::importer::code_normalizer::normalize_code;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

fn map_unit(row: &rusqlite::Row<'_>) -> rusqlite::Result<OrganizationalUnit> {
    Ok(OrganizationalUnit {
        unit_id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        parent_id: row.get(3)?,
        is_active: row.get::<_, i32>(4)? != 0,
    })
}

pub struct ReferenceRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ReferenceRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ===== 事务内操作（由导入器在同一连接/事务中调用）=====

    /// 加载全部启用的组织单元
    pub fn load_active_units_tx(conn: &Connection) -> RepositoryResult<Vec<OrganizationalUnit>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT unit_id, code, name, parent_id, is_active
            FROM org_unit
            WHERE is_active = 1
            ORDER BY unit_id
            "#,
        )?;
        let units = stmt
            .query_map([], map_unit)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(units)
    }

    /// 加载全部客户
    pub fn load_customers_tx(conn: &Connection) -> RepositoryResult<Vec<Customer>> {
        let mut stmt = conn.prepare("SELECT customer_id, code, name FROM customer ORDER BY customer_id")?;
        let customers = stmt
            .query_map([], |row| {
                Ok(Customer {
                    customer_id: row.get(0)?,
                    code: row.get(1)?,
                    name: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(customers)
    }

    /// 登记新客户，返回 customer_id
    ///
    /// # 参数
    /// - code: 已规范化的客户键
    /// - name: 原始客户名（展示用）
    pub fn insert_customer_tx(conn: &Connection, code: &str, name: &str) -> RepositoryResult<i64> {
        conn.execute(
            "INSERT INTO customer (code, name, created_at) VALUES (?1, ?2, ?3)",
            params![code, name.trim(), Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    // ===== 主数据维护 =====

    /// 新增或更新组织单元（按规范化代码），返回 unit_id
    pub fn upsert_unit(
        &self,
        code: &str,
        name: &str,
        parent_id: Option<i64>,
    ) -> RepositoryResult<i64> {
        let normalized = normalize_code(code);
        if normalized.is_empty() {
            return Err(RepositoryError::FieldValueError {
                field: "code".to_string(),
                message: "单元代码不能为空".to_string(),
            });
        }

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO org_unit (code, name, parent_id, is_active)
            VALUES (?1, ?2, ?3, 1)
            ON CONFLICT(code) DO UPDATE SET name = excluded.name, parent_id = excluded.parent_id
            "#,
            params![normalized, name, parent_id],
        )?;
        let unit_id = conn.query_row(
            "SELECT unit_id FROM org_unit WHERE code = ?1",
            params![normalized],
            |row| row.get(0),
        )?;
        Ok(unit_id)
    }

    /// 启用 / 停用组织单元
    pub fn set_unit_active(&self, unit_id: i64, active: bool) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE org_unit SET is_active = ?1 WHERE unit_id = ?2",
            params![active as i32, unit_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "OrganizationalUnit".to_string(),
                id: unit_id.to_string(),
            });
        }
        Ok(())
    }

    /// 按代码查询组织单元（代码自动规范化）
    pub fn find_unit_by_code(&self, code: &str) -> RepositoryResult<Option<OrganizationalUnit>> {
        let conn = self.get_conn()?;
        let unit = conn
            .query_row(
                "SELECT unit_id, code, name, parent_id, is_active FROM org_unit WHERE code = ?1",
                params![normalize_code(code)],
                map_unit,
            )
            .optional()?;
        Ok(unit)
    }

    pub fn list_units(&self) -> RepositoryResult<Vec<OrganizationalUnit>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT unit_id, code, name, parent_id, is_active FROM org_unit ORDER BY code",
        )?;
        let units = stmt
            .query_map([], map_unit)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(units)
    }

    pub fn list_customers(&self) -> RepositoryResult<Vec<Customer>> {
        let conn = self.get_conn()?;
        Self::load_customers_tx(&conn)
    }
}
