// ==========================================
// 营收保障系统 - 导入任务仓储
// ==========================================
// 职责: ImportJob 审计记录的创建 / 终态写入 / 查询
// 红线:
// - 创建在任何数据变更之前（自动提交）
// - 终态写入只允许 PENDING → SUCCESS | FAILED 一次
// - 终态写入在数据事务之外执行，回滚不影响审计记录
// ==========================================

use crate::domain::import_job::ImportJob;
use crate::domain::types::{ImportKind, ImportStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_utils::{datetime_column, optional_datetime_column};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const JOB_COLUMNS: &str = "job_id, kind, file_name, period_year, period_month, uploaded_by, \
                           status, error_message, summary_json, created_at, finished_at";

fn map_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<ImportJob> {
    Ok(ImportJob {
        job_id: row.get(0)?,
        kind: ImportKind::from_str(&row.get::<_, String>(1)?),
        file_name: row.get(2)?,
        period_year: row.get(3)?,
        period_month: row.get(4)?,
        uploaded_by: row.get(5)?,
        status: ImportStatus::from_str(&row.get::<_, String>(6)?),
        error_message: row.get(7)?,
        summary_json: row.get(8)?,
        created_at: datetime_column(row, 9)?,
        finished_at: optional_datetime_column(row, 10)?,
    })
}

pub struct ImportJobRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ImportJobRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入 PENDING 任务
    pub fn create_pending_tx(conn: &Connection, job: &ImportJob) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO import_job
                (job_id, kind, file_name, period_year, period_month, uploaded_by,
                 status, error_message, summary_json, created_at, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'PENDING', NULL, NULL, ?7, NULL)
            "#,
            params![
                job.job_id,
                job.kind.as_str(),
                job.file_name,
                job.period_year,
                job.period_month,
                job.uploaded_by,
                job.created_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// 写入终态 SUCCESS
    pub fn mark_success_tx(
        conn: &Connection,
        job_id: &str,
        summary_json: &str,
    ) -> RepositoryResult<()> {
        Self::finalize_tx(conn, job_id, ImportStatus::Success, None, Some(summary_json))
    }

    /// 写入终态 FAILED
    pub fn mark_failed_tx(
        conn: &Connection,
        job_id: &str,
        error_message: &str,
        summary_json: Option<&str>,
    ) -> RepositoryResult<()> {
        Self::finalize_tx(
            conn,
            job_id,
            ImportStatus::Failed,
            Some(error_message),
            summary_json,
        )
    }

    fn finalize_tx(
        conn: &Connection,
        job_id: &str,
        status: ImportStatus,
        error_message: Option<&str>,
        summary_json: Option<&str>,
    ) -> RepositoryResult<()> {
        let affected = conn.execute(
            r#"
            UPDATE import_job
            SET status = ?1, error_message = ?2, summary_json = ?3, finished_at = ?4
            WHERE job_id = ?5 AND status = 'PENDING'
            "#,
            params![
                status.as_str(),
                error_message,
                summary_json,
                Utc::now().to_rfc3339(),
                job_id
            ],
        )?;

        if affected == 0 {
            let current: Option<String> = conn
                .query_row(
                    "SELECT status FROM import_job WHERE job_id = ?1",
                    params![job_id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match current {
                Some(status) => RepositoryError::JobAlreadyFinalized {
                    job_id: job_id.to_string(),
                    status,
                },
                None => RepositoryError::NotFound {
                    entity: "ImportJob".to_string(),
                    id: job_id.to_string(),
                },
            });
        }
        Ok(())
    }

    pub fn find_by_id(&self, job_id: &str) -> RepositoryResult<Option<ImportJob>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM import_job WHERE job_id = ?1", JOB_COLUMNS);
        let job = conn.query_row(&sql, params![job_id], map_job).optional()?;
        Ok(job)
    }

    /// 最近的导入任务（按创建时间倒序）
    pub fn list_recent(&self, limit: usize) -> RepositoryResult<Vec<ImportJob>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM import_job ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            JOB_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params![limit as i64], map_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn pending_job(job_id: &str) -> ImportJob {
        ImportJob {
            job_id: job_id.to_string(),
            kind: ImportKind::Realization,
            file_name: "realisasi_maret.xlsx".to_string(),
            period_year: 2025,
            period_month: Some(3),
            uploaded_by: "analyst".to_string(),
            status: ImportStatus::Pending,
            error_message: None,
            summary_json: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    #[test]
    fn test_job_is_finalized_exactly_once() {
        let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        init_schema(&conn.lock().unwrap()).unwrap();
        let repo = ImportJobRepository::from_connection(conn.clone());

        {
            let guard = conn.lock().unwrap();
            ImportJobRepository::create_pending_tx(&guard, &pending_job("job-1")).unwrap();
            ImportJobRepository::mark_success_tx(&guard, "job-1", "{}").unwrap();
            let err = ImportJobRepository::mark_failed_tx(&guard, "job-1", "late", None)
                .unwrap_err();
            assert!(matches!(err, RepositoryError::JobAlreadyFinalized { .. }));
        }

        let job = repo.find_by_id("job-1").unwrap().unwrap();
        assert_eq!(job.status, ImportStatus::Success);
        assert_eq!(job.period_month, Some(3));
        assert!(job.finished_at.is_some());
        assert_eq!(repo.list_recent(10).unwrap().len(), 1);
    }

    #[test]
    fn test_finalize_unknown_job_is_not_found() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let err = ImportJobRepository::mark_failed_tx(&conn, "missing", "x", None).unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }
}
