// ==========================================
// 营收保障系统 - 销售管道仓储（只读为主）
// ==========================================
// 管道数据由销售模块维护，本系统仅在 KPI 计算时读取
// insert 仅供主数据同步与测试种子
// ==========================================

use crate::domain::revenue::PipelineOpportunity;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_utils::{decimal_column, decimal_to_sql};
use rust_decimal::Decimal;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub struct PipelineRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PipelineRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn insert(
        &self,
        year: i32,
        unit_id: i64,
        customer_name: Option<&str>,
        est_revenue: Decimal,
        status_color: &str,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO sales_pipeline (year, unit_id, customer_name, est_revenue, status_color)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                year,
                unit_id,
                customer_name,
                decimal_to_sql(&est_revenue),
                status_color.trim().to_uppercase()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn by_year_unit(&self, year: i32, unit_id: i64) -> RepositoryResult<Vec<PipelineOpportunity>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT opportunity_id, year, unit_id, customer_name, est_revenue, status_color
            FROM sales_pipeline
            WHERE year = ?1 AND unit_id = ?2
            ORDER BY opportunity_id
            "#,
        )?;
        let rows = stmt
            .query_map(params![year, unit_id], |row| {
                Ok(PipelineOpportunity {
                    opportunity_id: row.get(0)?,
                    year: row.get(1)?,
                    unit_id: row.get(2)?,
                    customer_name: row.get(3)?,
                    est_revenue: decimal_column(row, 4)?,
                    status_color: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
