// ==========================================
// 营收保障系统 - 实际完成结果文件生成
// ==========================================
// 职责: 将上传工作簿原样复制为新的 xlsx，并在汇总表上回写复核结果
// - 当月实际完成列覆盖为明细累计值
// - 表头行追加 TARGET <月> / ACH % / GAP / STATUS 四列
// 工具: rust_xlsxwriter
// ==========================================

use crate::importer::error::ImportResult;
use crate::importer::realization_importer::{month_label, SummaryLayout, SummaryLine};
use crate::importer::workbook::{CellValue, SheetGrid, WorkbookData};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use tracing::debug;

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn copy_sheet(worksheet: &mut Worksheet, sheet: &SheetGrid, date_format: &Format) -> ImportResult<()> {
    for row in 0..sheet.height() {
        for (col, cell) in sheet.row(row).iter().enumerate() {
            let (r, c) = (row as u32, col as u16);
            match cell {
                CellValue::Empty => {}
                CellValue::Text(s) => {
                    worksheet.write_string(r, c, s)?;
                }
                CellValue::Number(n) => {
                    worksheet.write_number(r, c, *n)?;
                }
                CellValue::Bool(b) => {
                    worksheet.write_boolean(r, c, *b)?;
                }
                CellValue::DateTime(serial) => {
                    worksheet.write_number_with_format(r, c, *serial, date_format)?;
                }
                CellValue::Error(e) => {
                    worksheet.write_string(r, c, e)?;
                }
            }
        }
    }
    Ok(())
}

fn write_review_columns(
    worksheet: &mut Worksheet,
    layout: &SummaryLayout,
    lines: &[SummaryLine],
    month: u32,
) -> ImportResult<()> {
    let header_format = Format::new().set_bold();
    let amount_format = Format::new().set_num_format("#,##0.00");
    let pct_format = Format::new().set_num_format("0.00");

    let base = layout.width as u16;
    let header_row = layout.header_row as u32;
    let headers = [
        format!("TARGET {}", month_label(month)),
        "ACH %".to_string(),
        "GAP".to_string(),
        "STATUS".to_string(),
    ];
    for (offset, title) in headers.iter().enumerate() {
        worksheet.write_string_with_format(header_row, base + offset as u16, title, &header_format)?;
    }

    for line in lines {
        let r = (line.row_number - 1) as u32;
        worksheet.write_number_with_format(
            r,
            layout.realization_col as u16,
            to_f64(line.derived),
            &amount_format,
        )?;
        worksheet.write_number_with_format(r, base, to_f64(line.kpi.target), &amount_format)?;
        worksheet.write_number_with_format(
            r,
            base + 1,
            to_f64(line.kpi.achievement_pct),
            &pct_format,
        )?;
        worksheet.write_number_with_format(r, base + 2, to_f64(line.kpi.gap), &amount_format)?;
        worksheet.write_string(r, base + 3, line.kpi.status.to_string())?;
    }
    Ok(())
}

/// 生成实际完成结果文件（xlsx 字节流）
pub fn write_realization_artifact(
    source: &WorkbookData,
    layout: &SummaryLayout,
    lines: &[SummaryLine],
    month: u32,
) -> ImportResult<Vec<u8>> {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");

    for sheet in source.sheets() {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet.name())?;
        copy_sheet(worksheet, sheet, &date_format)?;

        if sheet.name() == layout.sheet_name {
            write_review_columns(worksheet, layout, lines, month)?;
        }
    }

    let bytes = workbook.save_to_buffer()?;
    debug!(
        sheets = source.sheets().len(),
        summary_lines = lines.len(),
        bytes = bytes.len(),
        "结果文件已生成"
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::kpi::KpiCalculator;
    use rust_decimal_macros::dec;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_summary_sheet_gets_derived_values_and_review_columns() {
        let source = WorkbookData::new(vec![
            SheetGrid::new(
                "DETAIL",
                vec![
                    vec![text("KODE UNIT"), text("CUSTOMER"), text("GRAND TOTAL")],
                    vec![text("SBU01"), text("PT Maju"), CellValue::Number(80.0)],
                ],
            ),
            SheetGrid::new(
                "SUMMARY",
                vec![
                    vec![text("UNIT"), text("REAL MAR")],
                    vec![text("SBU01"), CellValue::Number(75.0)],
                ],
            ),
        ]);
        let layout = SummaryLayout {
            sheet_name: "SUMMARY".to_string(),
            header_row: 0,
            realization_col: 1,
            width: 2,
        };
        let lines = vec![SummaryLine {
            row_number: 2,
            unit_id: 1,
            unit_code: "SBU01".to_string(),
            reported: Some(dec!(75)),
            derived: dec!(80),
            kpi: KpiCalculator::default().snapshot(dec!(80), dec!(100)).unwrap(),
        }];

        let bytes = write_realization_artifact(&source, &layout, &lines, 3).unwrap();
        let reread = WorkbookData::from_bytes(&bytes, "result.xlsx").unwrap();

        assert_eq!(reread.sheets().len(), 2);
        let summary = reread.sheet("SUMMARY").unwrap();
        assert_eq!(summary.cell(0, 2), &text("TARGET MARET"));
        assert_eq!(summary.cell(0, 5), &text("STATUS"));
        assert_eq!(summary.cell(1, 1), &CellValue::Number(80.0));
        assert_eq!(summary.cell(1, 2), &CellValue::Number(100.0));
        assert_eq!(summary.cell(1, 3), &CellValue::Number(80.0));
        assert_eq!(summary.cell(1, 4), &CellValue::Number(-20.0));
        assert_eq!(summary.cell(1, 5), &text("AT_RISK"));

        let detail = reread.sheet("DETAIL").unwrap();
        assert_eq!(detail.cell(1, 0), &text("SBU01"));
    }
}
