// ==========================================
// 营收保障系统 - 目标仓储（年度目标 / 月度目标）
// ==========================================
// 职责:
// - 年度目标按自然键 upsert
// - 月度目标按 (year, unit, category) 删除后重建（派生数据）
// - 看板查询: 按年度 / 年度×单元 / 年度×月份
// 红线: 月度目标不提供单条修改接口
// ==========================================

use crate::domain::revenue::{checked_sum, AnnualTarget, MonthlyTarget};
use crate::domain::types::TargetCategory;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_utils::{datetime_column, decimal_column, decimal_to_sql};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

fn category_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<TargetCategory> {
    let raw: String = row.get(idx)?;
    TargetCategory::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("未知目标类别: {}", raw).into(),
        )
    })
}

fn map_annual(row: &rusqlite::Row<'_>) -> rusqlite::Result<AnnualTarget> {
    Ok(AnnualTarget {
        year: row.get(0)?,
        unit_id: row.get(1)?,
        category: category_column(row, 2)?,
        amount: decimal_column(row, 3)?,
        updated_at: datetime_column(row, 4)?,
    })
}

fn map_monthly(row: &rusqlite::Row<'_>) -> rusqlite::Result<MonthlyTarget> {
    Ok(MonthlyTarget {
        year: row.get(0)?,
        month: row.get(1)?,
        unit_id: row.get(2)?,
        category: category_column(row, 3)?,
        amount: decimal_column(row, 4)?,
        updated_at: datetime_column(row, 5)?,
    })
}

const ANNUAL_COLUMNS: &str = "year, unit_id, category, amount, updated_at";
const MONTHLY_COLUMNS: &str = "year, month, unit_id, category, amount, updated_at";

pub struct TargetRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TargetRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ===== 事务内写入 =====

    /// 年度目标 upsert（自然键覆盖）
    pub fn upsert_annual_tx(
        conn: &Connection,
        year: i32,
        unit_id: i64,
        category: TargetCategory,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO annual_target (year, unit_id, category, amount, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(year, unit_id, category) DO UPDATE SET
                amount = excluded.amount,
                updated_at = excluded.updated_at
            "#,
            params![
                year,
                unit_id,
                category.as_str(),
                decimal_to_sql(&amount),
                now.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// 月度目标删除后重建（12 行）
    ///
    /// # 返回
    /// - 写入行数（恒为 12）
    pub fn replace_monthly_tx(
        conn: &Connection,
        year: i32,
        unit_id: i64,
        category: TargetCategory,
        amounts: &[Decimal; 12],
        now: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        conn.execute(
            "DELETE FROM monthly_target WHERE year = ?1 AND unit_id = ?2 AND category = ?3",
            params![year, unit_id, category.as_str()],
        )?;

        let mut stmt = conn.prepare_cached(
            r#"
            INSERT INTO monthly_target (year, month, unit_id, category, amount, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )?;
        let updated_at = now.to_rfc3339();
        for (idx, amount) in amounts.iter().enumerate() {
            stmt.execute(params![
                year,
                (idx + 1) as u32,
                unit_id,
                category.as_str(),
                decimal_to_sql(amount),
                updated_at
            ])?;
        }
        Ok(amounts.len())
    }

    /// 读取某年度全部年度目标（重算用）
    pub fn list_annual_tx(conn: &Connection, year: i32) -> RepositoryResult<Vec<AnnualTarget>> {
        let sql = format!(
            "SELECT {} FROM annual_target WHERE year = ?1 ORDER BY unit_id, category",
            ANNUAL_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![year], map_annual)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 读取某年度×单元的年度目标（重算用）
    pub fn list_annual_for_unit_tx(
        conn: &Connection,
        year: i32,
        unit_id: i64,
    ) -> RepositoryResult<Vec<AnnualTarget>> {
        let sql = format!(
            "SELECT {} FROM annual_target WHERE year = ?1 AND unit_id = ?2 ORDER BY category",
            ANNUAL_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![year, unit_id], map_annual)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 某单元某类别 1..=month 的月度目标合计
    pub fn sum_monthly_to_month_tx(
        conn: &Connection,
        year: i32,
        unit_id: i64,
        category: TargetCategory,
        month: u32,
    ) -> RepositoryResult<Decimal> {
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT amount FROM monthly_target
            WHERE year = ?1 AND unit_id = ?2 AND category = ?3 AND month <= ?4
            "#,
        )?;
        let amounts = stmt
            .query_map(params![year, unit_id, category.as_str(), month], |row| {
                decimal_column(row, 0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        checked_sum(amounts).ok_or_else(|| RepositoryError::FieldValueError {
            field: "amount".to_string(),
            message: "累计金额溢出".to_string(),
        })
    }

    /// 某单元某类别单月目标（未生成时为 None）
    pub fn find_monthly_amount_tx(
        conn: &Connection,
        year: i32,
        month: u32,
        unit_id: i64,
        category: TargetCategory,
    ) -> RepositoryResult<Option<Decimal>> {
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT amount FROM monthly_target
            WHERE year = ?1 AND month = ?2 AND unit_id = ?3 AND category = ?4
            "#,
        )?;
        let amount = stmt
            .query_row(params![year, month, unit_id, category.as_str()], |row| {
                decimal_column(row, 0)
            })
            .optional()?;
        Ok(amount)
    }

    // ===== 查询 =====

    pub fn annual_by_year(&self, year: i32) -> RepositoryResult<Vec<AnnualTarget>> {
        let conn = self.get_conn()?;
        Self::list_annual_tx(&conn, year)
    }

    pub fn annual_by_year_unit(
        &self,
        year: i32,
        unit_id: i64,
    ) -> RepositoryResult<Vec<AnnualTarget>> {
        let conn = self.get_conn()?;
        Self::list_annual_for_unit_tx(&conn, year, unit_id)
    }

    pub fn monthly_by_year_month(
        &self,
        year: i32,
        month: u32,
    ) -> RepositoryResult<Vec<MonthlyTarget>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM monthly_target WHERE year = ?1 AND month = ?2 ORDER BY unit_id, category",
            MONTHLY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![year, month], map_monthly)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn monthly_by_year_unit(
        &self,
        year: i32,
        unit_id: i64,
    ) -> RepositoryResult<Vec<MonthlyTarget>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM monthly_target WHERE year = ?1 AND unit_id = ?2 ORDER BY category, month",
            MONTHLY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![year, unit_id], map_monthly)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 某单元某类别截至 month 的累计月度目标
    pub fn ytd_monthly_sum(
        &self,
        year: i32,
        unit_id: i64,
        category: TargetCategory,
        month: u32,
    ) -> RepositoryResult<Decimal> {
        let conn = self.get_conn()?;
        Self::sum_monthly_to_month_tx(&conn, year, unit_id, category, month)
    }
}
