// ==========================================
// 实际完成导入端到端测试
// ==========================================
// 覆盖: DETAIL 累计写入、SUMMARY 复核、结果工作簿、缺表失败、重导幂等

use revenue_assurance::api::{ApiError, ImportFailureKind};
use revenue_assurance::importer::{CellValue, WorkbookData};
use revenue_assurance::{ImportStatus, KpiStatus};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

mod test_helpers;
use test_helpers::{
    build_xlsx, create_seeded_env, planning_workbook, realization_workbook, TestEnv, N, T,
};

/// SBU01 年度 RKAP 12000 → 3 月目标 600（默认曲线 15% - 10%）
async fn seed_plan(env: &TestEnv) {
    env.state
        .import_api
        .import_planning(planning_workbook(&[("SBU01", 12000.0)]), "rkap.xlsx", 2025, "ana")
        .await
        .expect("计划导入失败");
}

fn march_workbook() -> Vec<u8> {
    realization_workbook(
        &[
            ("SBU01", "PT Maju", "JASA", 300.0),
            ("sbu 01", "PT Baru", "JASA", 150.0),
            ("SBU02", "PT Maju", "JASA", 200.0),
            ("SBX99", "PT Maju", "JASA", 10.0),
        ],
        &[("SBU01", 999.0), ("Unit Dua", 200.0), ("TOTAL", 1199.0)],
    )
}

#[tokio::test]
async fn test_realization_import_accumulates_detail_and_reviews_summary() {
    let env = create_seeded_env().expect("创建测试环境失败");
    seed_plan(&env).await;

    let response = env
        .state
        .import_api
        .import_realization(march_workbook(), "realisasi_maret.xlsx", 2025, 3, "budi")
        .await
        .expect("实际完成导入失败");

    // DETAIL 3 行成功 + 1 行单元未找到；SUMMARY 2 行成功 + 合计行跳过
    assert_eq!(response.succeeded, 5);
    assert_eq!(response.errored, 1);
    assert_eq!(response.skipped, 1);
    assert_eq!(response.errors[0].sheet, "DETAIL");
    assert_eq!(response.errors[0].row_number, 6);

    let realization = response.realization.as_ref().unwrap();
    assert_eq!(realization.realization_rows, 2);

    let lines = response.summary_lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].unit_code, "SBU01");
    assert_eq!(lines[0].reported, Some(dec!(999)));
    assert_eq!(lines[0].derived, dec!(450));
    assert_eq!(lines[0].kpi.target, dec!(600));
    assert_eq!(lines[0].kpi.achievement_pct, dec!(75));
    assert_eq!(lines[0].kpi.status, KpiStatus::AtRisk);
    assert_eq!(lines[1].unit_code, "SBU02");
    assert_eq!(lines[1].derived, dec!(200));
    assert_eq!(lines[1].kpi.target, Decimal::ZERO);

    let stored = env.state.dashboard_api.realizations_by_month(2025, 3).unwrap();
    assert_eq!(stored.len(), 2);
    let sbu01 = stored.iter().find(|r| r.unit_id == lines[0].unit_id).unwrap();
    assert_eq!(sbu01.amount, dec!(450));
    assert_eq!(sbu01.revenue_type, "JASA");
    assert_eq!(sbu01.source_ref.as_deref(), Some("realisasi_maret.xlsx"));

    let job = env.state.dashboard_api.get_job(&response.job_id).unwrap();
    assert_eq!(job.status, ImportStatus::Success);
    assert_eq!(job.period_month, Some(3));
}

#[tokio::test]
async fn test_realization_artifact_overwrites_summary_with_derived_values() {
    let env = create_seeded_env().expect("创建测试环境失败");
    seed_plan(&env).await;

    let response = env
        .state
        .import_api
        .import_realization(march_workbook(), "realisasi_maret.xlsx", 2025, 3, "budi")
        .await
        .unwrap();

    assert!(response.artifact_error.is_none());
    assert_eq!(
        response.artifact_file_name.as_deref(),
        Some("realisasi_maret_result.xlsx")
    );
    let bytes = response.artifact.as_ref().expect("应生成结果文件");

    let reread = WorkbookData::from_bytes(bytes, "result.xlsx").unwrap();
    let summary = reread.sheet("SUMMARY").unwrap();
    assert_eq!(summary.cell(0, 3), &CellValue::Text("TARGET MARET".to_string()));
    assert_eq!(summary.cell(1, 2), &CellValue::Number(450.0));
    assert_eq!(summary.cell(1, 3), &CellValue::Number(600.0));
    assert_eq!(summary.cell(1, 4), &CellValue::Number(75.0));
    assert_eq!(summary.cell(1, 5), &CellValue::Number(-150.0));
    assert_eq!(summary.cell(1, 6), &CellValue::Text("AT_RISK".to_string()));
    // 合计行不回写
    assert_eq!(summary.cell(3, 2), &CellValue::Number(1199.0));
}

#[tokio::test]
async fn test_reimport_same_month_is_idempotent() {
    let env = create_seeded_env().expect("创建测试环境失败");

    for _ in 0..2 {
        env.state
            .import_api
            .import_realization(march_workbook(), "realisasi_maret.xlsx", 2025, 3, "budi")
            .await
            .unwrap();
    }

    let stored = env.state.dashboard_api.realizations_by_unit(2025, "SBU01").unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].amount, dec!(450));
}

#[tokio::test]
async fn test_missing_detail_sheet_fails_job_with_zero_writes() {
    let env = create_seeded_env().expect("创建测试环境失败");
    let bytes = build_xlsx(&[(
        "SUMMARY",
        vec![
            vec![T("Uraian"), T("Realisasi Maret")],
            vec![T("SBU01"), N(100.0)],
        ],
    )]);

    let err = env
        .state
        .import_api
        .import_realization(bytes, "realisasi.xlsx", 2025, 3, "budi")
        .await
        .unwrap_err();

    let payload = err.payload();
    assert_eq!(payload.code, "IMPORT_STRUCTURAL_ERROR");
    assert!(payload.message.contains("DETAIL"));
    let job_id = payload.job_id.expect("失败任务必须携带 job_id");
    assert!(matches!(
        err,
        ApiError::ImportFailed {
            kind: ImportFailureKind::Structural,
            ..
        }
    ));

    let job = env.state.dashboard_api.get_job(&job_id).unwrap();
    assert_eq!(job.status, ImportStatus::Failed);
    assert!(job.error_message.unwrap().contains("DETAIL"));
    assert!(env
        .state
        .dashboard_api
        .realizations_by_month(2025, 3)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_invalid_month_is_rejected() {
    let env = create_seeded_env().expect("创建测试环境失败");

    let err = env
        .state
        .import_api
        .import_realization(march_workbook(), "realisasi.xlsx", 2025, 13, "budi")
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::InvalidInput(_)));
    assert!(env.state.dashboard_api.recent_jobs(5).unwrap().is_empty());
}

#[tokio::test]
async fn test_detail_accumulation_overflow_rolls_back_only_that_row() {
    let env = create_seeded_env().expect("创建测试环境失败");
    let bytes = realization_workbook(
        &[
            ("SBU01", "PT Maju", "JASA", 5e28),
            ("SBU01", "PT Baru", "JASA", 5e28),
            ("SBU02", "PT Maju", "JASA", 200.0),
        ],
        &[("Unit Dua", 200.0)],
    );

    let response = env
        .state
        .import_api
        .import_realization(bytes, "realisasi_maret.xlsx", 2025, 3, "budi")
        .await
        .expect("累计溢出应作为行级错误处理");

    assert_eq!(response.errored, 1);
    assert_eq!(response.errors[0].sheet, "DETAIL");
    assert_eq!(response.errors[0].row_number, 4);
    assert!(response.errors[0].message.contains("溢出"));
    assert_eq!(response.succeeded, 3);

    let job = env.state.dashboard_api.get_job(&response.job_id).unwrap();
    assert_eq!(job.status, ImportStatus::Success);

    // 溢出行之后的明细照常写入
    let sbu02 = env.state.dashboard_api.realizations_by_unit(2025, "SBU02").unwrap();
    assert_eq!(sbu02[0].amount, dec!(200));
    assert_eq!(env.state.dashboard_api.recent_jobs(5).unwrap().len(), 1);
}
