// ==========================================
// 营收保障系统 - 命令行入口
// ==========================================
// 子命令: import-plan / import-realization / regenerate / set-curve / kpi / jobs / job / add-unit
// 输出: stdout 为 JSON 结果；失败时 stderr 输出结构化错误载荷，退出码 1
// ==========================================

use anyhow::Context;
use clap::{Parser, Subcommand};
use revenue_assurance::api::{ApiError, ApiResult};
use revenue_assurance::app::{get_default_db_path, AppState};
use revenue_assurance::logging;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(
    name = "revenue-assurance",
    version,
    about = "营收保障: 计划/实际完成导入、月度目标分解与达成率查询"
)]
struct Cli {
    /// SQLite 数据库路径（默认: REVENUE_ASSURANCE_DB_PATH 或用户数据目录）
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 导入年度计划目标表（.xlsx/.xls/.ods/.csv）
    ImportPlan {
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        year: i32,
        #[arg(long, default_value = "cli")]
        uploader: String,
    },

    /// 导入月度实际完成表（DETAIL + SUMMARY）
    ImportRealization {
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: u32,
        #[arg(long, default_value = "cli")]
        uploader: String,
        /// 结果工作簿输出目录（默认与源文件同目录）
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,
    },

    /// 重算月度目标（整个年度或单个单元）
    Regenerate {
        #[arg(long)]
        year: i32,
        #[arg(long, value_name = "CODE")]
        unit: Option<String>,
    },

    /// 保存年度权重曲线（12 个累计百分比，逗号分隔）并重算
    SetCurve {
        #[arg(long)]
        year: i32,
        #[arg(long, value_delimiter = ',', value_name = "P1,P2,...,P12")]
        points: Vec<String>,
    },

    /// 单元 KPI 快照
    Kpi {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: u32,
        #[arg(long, value_name = "CODE")]
        unit: String,
    },

    /// 最近的导入任务
    Jobs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// 查看单个导入任务
    Job {
        #[arg(long)]
        id: String,
    },

    /// 新增或更新组织单元
    AddUnit {
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();

    let db_path = match &cli.db {
        Some(path) => path.to_string_lossy().to_string(),
        None => get_default_db_path(),
    };
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path).map_err(anyhow::Error::msg)?;

    match run(cli.command, &state).await {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(err) => {
            tracing::error!(code = err.code(), job_id = ?err.job_id(), "{}", err);
            eprintln!("{}", serde_json::to_string_pretty(&err.payload())?);
            std::process::exit(1);
        }
    }
}

fn read_file(path: &PathBuf) -> ApiResult<(Vec<u8>, String)> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("无法读取文件 {}", path.display()))
        .map_err(ApiError::Other)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| ApiError::InvalidInput(format!("无效文件路径: {}", path.display())))?;
    Ok((bytes, file_name))
}

fn to_value<T: serde::Serialize>(value: &T) -> ApiResult<Value> {
    serde_json::to_value(value).map_err(|e| ApiError::InternalError(e.to_string()))
}

async fn run(command: Command, state: &AppState) -> ApiResult<Value> {
    match command {
        Command::ImportPlan {
            file,
            year,
            uploader,
        } => {
            let (bytes, file_name) = read_file(&file)?;
            let response = state
                .import_api
                .import_planning(bytes, &file_name, year, &uploader)
                .await?;
            to_value(&response)
        }

        Command::ImportRealization {
            file,
            year,
            month,
            uploader,
            out_dir,
        } => {
            let (bytes, file_name) = read_file(&file)?;
            let mut response = state
                .import_api
                .import_realization(bytes, &file_name, year, month, &uploader)
                .await?;

            // 结果工作簿落盘，JSON 中只保留路径
            let mut artifact_path = None;
            if let (Some(artifact), Some(name)) =
                (response.artifact.take(), response.artifact_file_name.as_ref())
            {
                let dir = out_dir
                    .or_else(|| file.parent().map(PathBuf::from))
                    .unwrap_or_else(|| PathBuf::from("."));
                let path = dir.join(name);
                std::fs::write(&path, artifact)
                    .with_context(|| format!("无法写入结果文件 {}", path.display()))
                    .map_err(ApiError::Other)?;
                artifact_path = Some(path.to_string_lossy().to_string());
            }

            let mut value = to_value(&response)?;
            if let Some(path) = artifact_path {
                value["artifact_path"] = json!(path);
            }
            Ok(value)
        }

        Command::Regenerate { year, unit } => {
            let report = state.target_api.regenerate(year, unit.as_deref()).await?;
            to_value(&report)
        }

        Command::SetCurve { year, points } => {
            let points = points
                .iter()
                .map(|p| {
                    Decimal::from_str(p.trim())
                        .map_err(|e| ApiError::InvalidInput(format!("曲线点 {} 无效: {}", p, e)))
                })
                .collect::<ApiResult<Vec<_>>>()?;
            let report = state.target_api.set_weight_curve(year, &points).await?;
            to_value(&report)
        }

        Command::Kpi { year, month, unit } => {
            let response = state.dashboard_api.unit_kpi(year, month, &unit).await?;
            to_value(&response)
        }

        Command::Jobs { limit } => to_value(&state.dashboard_api.recent_jobs(limit)?),

        Command::Job { id } => to_value(&state.dashboard_api.get_job(&id)?),

        Command::AddUnit { code, name } => {
            let unit_id = state.reference_repo.upsert_unit(&code, &name, None)?;
            Ok(json!({ "unit_id": unit_id, "code": code, "name": name }))
        }
    }
}
