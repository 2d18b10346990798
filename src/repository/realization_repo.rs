// ==========================================
// 营收保障系统 - 实际完成仓储
// ==========================================
// 自然键: (year, month, unit_id, revenue_type)
// 重复导入同一期间 → 原地覆盖
// ==========================================

use crate::domain::revenue::{checked_sum, ActualRealization};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_utils::{datetime_column, decimal_column, decimal_to_sql};
use rust_decimal::Decimal;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

fn map_realization(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActualRealization> {
    Ok(ActualRealization {
        year: row.get(0)?,
        month: row.get(1)?,
        unit_id: row.get(2)?,
        revenue_type: row.get(3)?,
        amount: decimal_column(row, 4)?,
        source_ref: row.get(5)?,
        updated_at: datetime_column(row, 6)?,
    })
}

const REALIZATION_COLUMNS: &str =
    "year, month, unit_id, revenue_type, amount, source_ref, updated_at";

pub struct RealizationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RealizationRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 按自然键 upsert 一条实际完成
    pub fn upsert_tx(conn: &Connection, record: &ActualRealization) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO actual_realization
                (year, month, unit_id, revenue_type, amount, source_ref, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(year, month, unit_id, revenue_type) DO UPDATE SET
                amount = excluded.amount,
                source_ref = excluded.source_ref,
                updated_at = excluded.updated_at
            "#,
            params![
                record.year,
                record.month,
                record.unit_id,
                record.revenue_type,
                decimal_to_sql(&record.amount),
                record.source_ref,
                record.updated_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// 单元截至 month 的累计实际完成（全部收入类型）
    pub fn sum_to_month_tx(
        conn: &Connection,
        year: i32,
        unit_id: i64,
        month: u32,
    ) -> RepositoryResult<Decimal> {
        let mut stmt = conn.prepare_cached(
            "SELECT amount FROM actual_realization WHERE year = ?1 AND unit_id = ?2 AND month <= ?3",
        )?;
        let amounts = stmt
            .query_map(params![year, unit_id, month], |row| decimal_column(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        checked_sum(amounts).ok_or_else(|| RepositoryError::FieldValueError {
            field: "amount".to_string(),
            message: "累计金额溢出".to_string(),
        })
    }

    pub fn by_year_month(&self, year: i32, month: u32) -> RepositoryResult<Vec<ActualRealization>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM actual_realization WHERE year = ?1 AND month = ?2 ORDER BY unit_id, revenue_type",
            REALIZATION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![year, month], map_realization)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn by_year_unit(&self, year: i32, unit_id: i64) -> RepositoryResult<Vec<ActualRealization>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM actual_realization WHERE year = ?1 AND unit_id = ?2 ORDER BY month, revenue_type",
            REALIZATION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![year, unit_id], map_realization)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn ytd_sum(&self, year: i32, unit_id: i64, month: u32) -> RepositoryResult<Decimal> {
        let conn = self.get_conn()?;
        Self::sum_to_month_tx(&conn, year, unit_id, month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use chrono::Utc;

    fn record(month: u32, revenue_type: &str, amount: i64) -> ActualRealization {
        ActualRealization {
            year: 2025,
            month,
            unit_id: 1,
            revenue_type: revenue_type.to_string(),
            amount: Decimal::from(amount),
            source_ref: Some("realisasi.xlsx".to_string()),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_upsert_overwrites_same_natural_key() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute("INSERT INTO org_unit (code, name) VALUES ('SBU01', 'Unit 1')", [])
            .unwrap();

        RealizationRepository::upsert_tx(&conn, &record(3, "TOTAL", 10)).unwrap();
        RealizationRepository::upsert_tx(&conn, &record(3, "TOTAL", 25)).unwrap();
        RealizationRepository::upsert_tx(&conn, &record(2, "TOTAL", 5)).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM actual_realization", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            RealizationRepository::sum_to_month_tx(&conn, 2025, 1, 3).unwrap(),
            Decimal::from(30)
        );
    }
}
