// ==========================================
// 营收保障系统 - 权重曲线仓储
// ==========================================
// 每年度 12 行 (year, month, cumulative_pct)
// 读取时重新校验，坏数据不会流入分解引擎
// ==========================================

use crate::domain::revenue::WeightCurve;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_utils::{decimal_column, decimal_to_sql};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub struct WeightCurveRepository {
    conn: Arc<Mutex<Connection>>,
}

impl WeightCurveRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取某年度曲线；未配置返回 None
    pub fn find_tx(conn: &Connection, year: i32) -> RepositoryResult<Option<WeightCurve>> {
        let mut stmt = conn.prepare_cached(
            "SELECT cumulative_pct FROM weight_curve WHERE year = ?1 ORDER BY month",
        )?;
        let points = stmt
            .query_map(params![year], |row| decimal_column(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;

        if points.is_empty() {
            return Ok(None);
        }
        Ok(Some(WeightCurve::try_new(year, &points)?))
    }

    /// 保存曲线（整年覆盖）
    pub fn save_tx(conn: &Connection, curve: &WeightCurve) -> RepositoryResult<()> {
        conn.execute("DELETE FROM weight_curve WHERE year = ?1", params![curve.year])?;
        let mut stmt = conn.prepare_cached(
            "INSERT INTO weight_curve (year, month, cumulative_pct, updated_at) VALUES (?1, ?2, ?3, ?4)",
        )?;
        let now = Utc::now().to_rfc3339();
        for (idx, pct) in curve.points.iter().enumerate() {
            stmt.execute(params![curve.year, (idx + 1) as u32, decimal_to_sql(pct), now])?;
        }
        Ok(())
    }

    pub fn find(&self, year: i32) -> RepositoryResult<Option<WeightCurve>> {
        let conn = self.get_conn()?;
        Self::find_tx(&conn, year)
    }

    /// 列出已配置曲线的年度
    pub fn list_years(&self) -> RepositoryResult<Vec<i32>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT year FROM weight_curve ORDER BY year")?;
        let years = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(years)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use rust_decimal::Decimal;

    #[test]
    fn test_save_then_find_curve() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        assert!(WeightCurveRepository::find_tx(&conn, 2025).unwrap().is_none());

        let curve = WeightCurve::default_for_year(2025);
        WeightCurveRepository::save_tx(&conn, &curve).unwrap();
        WeightCurveRepository::save_tx(&conn, &curve).unwrap();

        let loaded = WeightCurveRepository::find_tx(&conn, 2025).unwrap().unwrap();
        assert_eq!(loaded.cumulative(12), Decimal::ONE_HUNDRED);
        assert_eq!(loaded.points, curve.points);
    }

    #[test]
    fn test_partial_curve_is_rejected_on_read() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO weight_curve (year, month, cumulative_pct, updated_at) VALUES (2025, 1, '50', 'x')",
            [],
        )
        .unwrap();

        let err = WeightCurveRepository::find_tx(&conn, 2025).unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidWeightCurve(_)));
    }
}
