// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库 + AppState 组装、主数据种子、测试工作簿生成
// ==========================================
#![allow(dead_code)]

use revenue_assurance::app::AppState;
use rust_xlsxwriter::Workbook;
use std::error::Error;
use tempfile::TempDir;

/// 测试单元格
#[derive(Debug, Clone)]
pub enum Cell {
    Text(&'static str),
    Number(f64),
    Empty,
}

pub use Cell::{Empty as E, Number as N, Text as T};

/// 测试环境（TempDir 需要保持存活）
pub struct TestEnv {
    pub _dir: TempDir,
    pub db_path: String,
    pub state: AppState,
}

/// 创建临时数据库并组装 AppState
pub fn create_test_env() -> Result<TestEnv, Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("revenue_test.db").to_string_lossy().to_string();
    let state = AppState::new(db_path.clone())?;
    Ok(TestEnv {
        _dir: dir,
        db_path,
        state,
    })
}

/// 创建测试环境并写入默认单元 SBU01 / SBU02
pub fn create_seeded_env() -> Result<TestEnv, Box<dyn Error>> {
    let env = create_test_env()?;
    env.state.reference_repo.upsert_unit("SBU01", "Unit Satu", None)?;
    env.state.reference_repo.upsert_unit("SBU02", "Unit Dua", None)?;
    Ok(env)
}

/// 生成 xlsx 字节流（每个工作表自 A1 起逐行写入）
pub fn build_xlsx(sheets: &[(&str, Vec<Vec<Cell>>)]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    for (name, rows) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name).expect("工作表名称无效");
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                match cell {
                    Cell::Text(s) => {
                        worksheet
                            .write_string(r as u32, c as u16, *s)
                            .expect("写入文本失败");
                    }
                    Cell::Number(n) => {
                        worksheet
                            .write_number(r as u32, c as u16, *n)
                            .expect("写入数值失败");
                    }
                    Cell::Empty => {}
                }
            }
        }
    }
    workbook.save_to_buffer().expect("生成 xlsx 失败")
}

/// 计划表：KODE UNIT / NAMA UNIT / RKAP
pub fn planning_workbook(rows: &[(&'static str, f64)]) -> Vec<u8> {
    let mut grid = vec![
        vec![T("RENCANA KERJA ANGGARAN 2025")],
        vec![T("Kode Unit"), T("Nama Unit"), T("RKAP")],
    ];
    for (code, amount) in rows {
        grid.push(vec![T(*code), E, N(*amount)]);
    }
    build_xlsx(&[("TARGET", grid)])
}

/// 实际完成表：DETAIL（明细）+ SUMMARY（3 月汇总）
///
/// detail: (单元代码, 客户, 收入类型, 金额)
/// summary: (单元标签, 填报值)
pub fn realization_workbook(
    detail: &[(&'static str, &'static str, &'static str, f64)],
    summary: &[(&'static str, f64)],
) -> Vec<u8> {
    let mut detail_grid = vec![
        vec![T("DETAIL REALISASI MARET 2025")],
        vec![
            T("Kode Unit"),
            T("Customer"),
            T("Jenis Pendapatan"),
            T("Grand Total"),
        ],
    ];
    for (code, customer, revenue_type, amount) in detail {
        detail_grid.push(vec![T(*code), T(*customer), T(*revenue_type), N(*amount)]);
    }

    let mut summary_grid = vec![vec![T("Uraian"), T("Realisasi Februari"), T("Realisasi Maret")]];
    for (label, reported) in summary {
        summary_grid.push(vec![T(*label), E, N(*reported)]);
    }

    build_xlsx(&[("DETAIL", detail_grid), ("SUMMARY", summary_grid)])
}
