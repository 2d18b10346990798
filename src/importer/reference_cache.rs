// ==========================================
// 营收保障系统 - 参照数据缓存（每个导入任务一份）
// ==========================================
// 职责:
// - 任务开始时一次性加载单元 / 客户参照表
// - 本任务新发现的客户写库后立即加入缓存，后续行直接命中
// - 行级 SAVEPOINT 回滚时同步撤销本行新增的缓存项
// 红线: 不做进程级共享，任务结束即丢弃
// ==========================================

use crate::domain::revenue::{Customer, OrganizationalUnit};
use crate::importer::code_normalizer::normalize_code;
use crate::importer::error::ImportResult;
use crate::repository::reference_repo::ReferenceRepository;
use rusqlite::Connection;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ReferenceCache {
    units_by_code: HashMap<String, OrganizationalUnit>,
    unit_code_by_name: HashMap<String, String>,
    customers: HashMap<String, i64>,
    staged_customers: Vec<String>,
}

impl ReferenceCache {
    /// 从数据库加载
    pub fn load(conn: &Connection) -> ImportResult<Self> {
        let units = ReferenceRepository::load_active_units_tx(conn)?;
        let customers = ReferenceRepository::load_customers_tx(conn)?;
        let cache = Self::from_parts(units, customers);
        debug!(
            units = cache.units_by_code.len(),
            customers = cache.customers.len(),
            "参照数据已加载"
        );
        Ok(cache)
    }

    pub fn from_parts(units: Vec<OrganizationalUnit>, customers: Vec<Customer>) -> Self {
        let mut cache = Self::default();
        for unit in units {
            let code = normalize_code(&unit.code);
            cache
                .unit_code_by_name
                .entry(normalize_code(&unit.name))
                .or_insert_with(|| code.clone());
            cache.units_by_code.insert(code, unit);
        }
        for customer in customers {
            cache
                .customers
                .insert(normalize_code(&customer.code), customer.customer_id);
        }
        cache
    }

    /// 按代码查找单元（空代码视为未命中）
    pub fn resolve_unit(&self, raw_code: &str) -> Option<&OrganizationalUnit> {
        let code = normalize_code(raw_code);
        if code.is_empty() {
            return None;
        }
        self.units_by_code.get(&code)
    }

    /// 先按代码、再按名称查找单元（汇总表首列可能填单元名称）
    pub fn resolve_unit_by_code_or_name(&self, raw: &str) -> Option<&OrganizationalUnit> {
        self.resolve_unit(raw).or_else(|| {
            let key = normalize_code(raw);
            self.unit_code_by_name
                .get(&key)
                .and_then(|code| self.units_by_code.get(code))
        })
    }

    pub fn resolve_customer(&self, raw_name: &str) -> Option<i64> {
        self.customers.get(&normalize_code(raw_name)).copied()
    }

    /// 查找客户，不存在则写库并加入缓存
    ///
    /// # 返回
    /// - None: 客户名为空
    pub fn ensure_customer(
        &mut self,
        conn: &Connection,
        raw_name: &str,
    ) -> ImportResult<Option<i64>> {
        let key = normalize_code(raw_name);
        if key.is_empty() {
            return Ok(None);
        }
        if let Some(id) = self.customers.get(&key) {
            return Ok(Some(*id));
        }

        let id = ReferenceRepository::insert_customer_tx(conn, &key, raw_name)?;
        debug!(customer = %key, customer_id = id, "新增客户");
        self.customers.insert(key.clone(), id);
        self.staged_customers.push(key);
        Ok(Some(id))
    }

    /// 行成功：确认本行新增的缓存项
    pub fn commit_row(&mut self) {
        self.staged_customers.clear();
    }

    /// 行回滚：撤销本行新增的缓存项
    pub fn rollback_row(&mut self) {
        for key in self.staged_customers.drain(..) {
            self.customers.remove(&key);
        }
    }

    pub fn unit_count(&self) -> usize {
        self.units_by_code.len()
    }

    pub fn customer_count(&self) -> usize {
        self.customers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn unit(id: i64, code: &str, name: &str) -> OrganizationalUnit {
        OrganizationalUnit {
            unit_id: id,
            code: code.to_string(),
            name: name.to_string(),
            parent_id: None,
            is_active: true,
        }
    }

    #[test]
    fn test_unit_lookup_uses_normalized_code() {
        let cache = ReferenceCache::from_parts(vec![unit(1, "SBU01", "Sales Unit Satu")], vec![]);
        assert_eq!(cache.resolve_unit("sbu 01").map(|u| u.unit_id), Some(1));
        assert_eq!(cache.resolve_unit(" SBU01 ").map(|u| u.unit_id), Some(1));
        assert!(cache.resolve_unit("").is_none());
        assert!(cache.resolve_unit("SBU02").is_none());
        assert_eq!(
            cache
                .resolve_unit_by_code_or_name("Sales unit satu")
                .map(|u| u.unit_id),
            Some(1)
        );
    }

    #[test]
    fn test_new_customer_visible_to_later_rows_and_undone_on_rollback() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let mut cache = ReferenceCache::load(&conn).unwrap();

        let id = cache.ensure_customer(&conn, "PT Maju Jaya").unwrap().unwrap();
        cache.commit_row();
        assert_eq!(cache.resolve_customer("pt maju jaya"), Some(id));
        assert_eq!(cache.ensure_customer(&conn, "PTMAJUJAYA").unwrap(), Some(id));

        cache.ensure_customer(&conn, "CV Baru").unwrap();
        cache.rollback_row();
        assert!(cache.resolve_customer("CV Baru").is_none());
        assert_eq!(cache.customer_count(), 1);

        assert_eq!(cache.ensure_customer(&conn, "  ").unwrap(), None);
    }
}
