// ==========================================
// 营收保障系统 - 对账落库器（Reconciliation Persister）
// ==========================================
// 流程:
// 1. 写入 ImportJob(PENDING)，自动提交，先于任何数据变更
// 2. 解析整个文件到内存；结构错误 → 任务 FAILED，零写入
// 3. 开启单一 IMMEDIATE 事务，在事务内加载 ReferenceCache
// 4. 逐行处理，每行一个 SAVEPOINT：行级错误只回滚本行并记录，继续下一行
// 5. 提交事务 → ImportJob SUCCESS（含汇总 JSON）
// 6. 提交失败 / 非行级错误 → 整体回滚，ImportJob FAILED（事务外单独写入）
// 并发: 连接锁在整个任务期间持有；跨连接的同键导入由 SQLite 写锁串行化（busy_timeout 排队）
// ==========================================

use crate::domain::import_job::{ImportJob, ImportSummary, RowOutcome};
use crate::domain::types::{ImportKind, ImportStatus};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::reference_cache::ReferenceCache;
use crate::repository::import_job_repo::ImportJobRepository;
use chrono::Utc;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

/// 默认错误明细上限
pub const DEFAULT_MAX_REPORTED_ERRORS: usize = 100;

/// 导入请求元信息
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub kind: ImportKind,
    pub file_name: String,
    pub period_year: i32,
    pub period_month: Option<u32>,
    pub uploaded_by: String,
}

/// 解析后的一行
#[derive(Debug, Clone)]
pub enum RowInput<R> {
    Data {
        sheet: String,
        row_number: usize,
        record: R,
    },
    /// 主键（单元代码）为空，静默跳过
    Blank { sheet: String, row_number: usize },
}

/// 单行处理结果（成功路径）
#[derive(Debug, Clone, PartialEq)]
pub enum RowDisposition {
    Applied,
    Skipped(String),
}

// ==========================================
// BatchApplier - 各类导入的行级写入逻辑
// ==========================================
pub trait BatchApplier {
    type Record;
    type Output;

    /// 事务开始前的准备（读取曲线等）
    fn prepare(&mut self, _conn: &Connection) -> ImportResult<()> {
        Ok(())
    }

    /// 处理单行（已处于该行的 SAVEPOINT 内）
    ///
    /// 返回行级错误时本行写入被回滚；其他错误终止整个任务
    fn apply_row(
        &mut self,
        conn: &Connection,
        cache: &mut ReferenceCache,
        row_number: usize,
        record: &Self::Record,
    ) -> ImportResult<RowDisposition>;

    /// 全部行处理完毕、提交之前调用
    fn finish(self, conn: &Connection) -> ImportResult<Self::Output>;
}

/// 落库结果
#[derive(Debug, Clone)]
pub struct PersistReport<O> {
    pub job_id: String,
    pub summary: ImportSummary,
    pub outcomes: Vec<RowOutcome>,
    pub output: O,
}

pub struct ReconciliationPersister {
    conn: Arc<Mutex<Connection>>,
    max_reported_errors: usize,
}

impl ReconciliationPersister {
    pub fn new(conn: Arc<Mutex<Connection>>, max_reported_errors: usize) -> Self {
        Self {
            conn,
            max_reported_errors,
        }
    }

    /// 执行一次导入任务
    ///
    /// # 参数
    /// - request: 导入请求元信息
    /// - parse: 内存解析（在 ImportJob 创建之后、任何数据写入之前执行）
    /// - applier: 行级写入逻辑
    ///
    /// # 返回
    /// - Ok(PersistReport): 任务 SUCCESS（可能含行级错误）
    /// - Err(ImportError::JobFailed): 任务 FAILED，携带 job_id
    /// - Err(其他): 任务未能创建
    pub fn run<A, P>(
        &self,
        request: &ImportRequest,
        parse: P,
        applier: A,
    ) -> ImportResult<PersistReport<A::Output>>
    where
        A: BatchApplier,
        P: FnOnce() -> ImportResult<Vec<RowInput<A::Record>>>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| ImportError::LockError(e.to_string()))?;

        let job = ImportJob {
            job_id: Uuid::new_v4().to_string(),
            kind: request.kind,
            file_name: request.file_name.clone(),
            period_year: request.period_year,
            period_month: request.period_month,
            uploaded_by: request.uploaded_by.clone(),
            status: ImportStatus::Pending,
            error_message: None,
            summary_json: None,
            created_at: Utc::now(),
            finished_at: None,
        };
        ImportJobRepository::create_pending_tx(&conn, &job)?;
        let job_id = job.job_id;
        info!(
            job_id = %job_id,
            kind = %request.kind,
            file_name = %request.file_name,
            "导入任务已创建"
        );

        match Self::execute(&mut conn, parse, applier) {
            Ok((outcomes, output)) => {
                let summary = ImportSummary::from_outcomes(&outcomes, self.max_reported_errors);
                let finalize = serde_json::to_string(&summary)
                    .map_err(|e| ImportError::InternalError(e.to_string()))
                    .and_then(|json| {
                        ImportJobRepository::mark_success_tx(&conn, &job_id, &json)
                            .map_err(ImportError::from)
                    });
                if let Err(e) = finalize {
                    error!(job_id = %job_id, error = %e, "任务终态写入失败");
                    // 数据已提交，审计记录仍须落到终态
                    let message = format!("数据已提交，但成功状态写入失败: {}", e);
                    if let Err(mark_err) =
                        ImportJobRepository::mark_failed_tx(&conn, &job_id, &message, None)
                    {
                        error!(job_id = %job_id, error = %mark_err, "任务失败状态写入失败");
                    }
                    return Err(ImportError::JobFailed {
                        job_id,
                        source: Box::new(e),
                    });
                }

                info!(
                    job_id = %job_id,
                    succeeded = summary.succeeded,
                    skipped = summary.skipped,
                    errored = summary.errored,
                    "导入任务完成"
                );
                Ok(PersistReport {
                    job_id,
                    summary,
                    outcomes,
                    output,
                })
            }
            Err(err) => {
                error!(job_id = %job_id, error = %err, "导入任务失败，已整体回滚");
                // 事务已回滚，审计记录单独写入
                if let Err(mark_err) =
                    ImportJobRepository::mark_failed_tx(&conn, &job_id, &err.to_string(), None)
                {
                    error!(job_id = %job_id, error = %mark_err, "任务失败状态写入失败");
                }
                Err(ImportError::JobFailed {
                    job_id,
                    source: Box::new(err),
                })
            }
        }
    }

    fn execute<A, P>(
        conn: &mut Connection,
        parse: P,
        mut applier: A,
    ) -> ImportResult<(Vec<RowOutcome>, A::Output)>
    where
        A: BatchApplier,
        P: FnOnce() -> ImportResult<Vec<RowInput<A::Record>>>,
    {
        // 结构错误在此返回，尚未写入任何数据
        let rows = parse()?;
        info!(rows = rows.len(), "文件解析完成");

        // IMMEDIATE: 开始即持有写锁，同库并发任务在 busy_timeout 内排队
        let mut tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| ImportError::DatabaseTransactionError(e.to_string()))?;

        let mut cache = ReferenceCache::load(&tx)?;
        applier.prepare(&tx)?;

        let mut outcomes = Vec::with_capacity(rows.len());
        for row in rows {
            let outcome = match row {
                RowInput::Blank { sheet, row_number } => RowOutcome::Skipped {
                    sheet,
                    row_number,
                    reason: "单元代码为空".to_string(),
                },
                RowInput::Data {
                    sheet,
                    row_number,
                    record,
                } => Self::apply_in_savepoint(
                    &mut tx,
                    &mut cache,
                    &mut applier,
                    sheet,
                    row_number,
                    &record,
                )?,
            };
            outcomes.push(outcome);
        }

        let output = applier.finish(&tx)?;
        tx.commit()
            .map_err(|e| ImportError::DatabaseTransactionError(e.to_string()))?;
        Ok((outcomes, output))
    }

    fn apply_in_savepoint<A: BatchApplier>(
        tx: &mut Transaction<'_>,
        cache: &mut ReferenceCache,
        applier: &mut A,
        sheet: String,
        row_number: usize,
        record: &A::Record,
    ) -> ImportResult<RowOutcome> {
        let mut sp = tx.savepoint()?;

        match applier.apply_row(&sp, cache, row_number, record) {
            Ok(disposition) => {
                sp.commit()?;
                cache.commit_row();
                Ok(match disposition {
                    RowDisposition::Applied => RowOutcome::Succeeded { sheet, row_number },
                    RowDisposition::Skipped(reason) => RowOutcome::Skipped {
                        sheet,
                        row_number,
                        reason,
                    },
                })
            }
            Err(e) if e.is_row_level() => {
                sp.rollback()?;
                sp.finish()?;
                cache.rollback_row();
                let e = e.with_row(row_number);
                warn!(sheet = %sheet, row_number, error = %e, "行处理失败，已回滚本行");
                Ok(RowOutcome::Failed {
                    sheet,
                    row_number,
                    reason: e.to_string(),
                })
            }
            Err(e) => {
                cache.rollback_row();
                Err(e)
            }
        }
    }
}
