// ==========================================
// 营收保障系统 - 月度实际完成导入
// ==========================================
// 工作表:
// - DETAIL: 明细行（单元代码 / 客户 / 收入类型 / GRAND TOTAL）
// - SUMMARY: 单元汇总行（UNIT 或 URAIAN + 当月 REAL/REALISASI 列）
// 处理顺序: 先全部明细行，再全部汇总行（汇总行依赖明细累计值）
// 写入:
// - 明细行按 (year, month, unit, revenue_type) upsert，金额为本任务内累计值
// - 汇总行不写库，只计算明细累计 / 当月 RKAP 目标 / 达成率，供结果文件使用
// ==========================================

use crate::domain::revenue::{ActualRealization, Period};
use crate::domain::types::TargetCategory;
use crate::engine::kpi::{KpiCalculator, KpiSnapshot};
use crate::importer::code_normalizer::normalize_code;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::header_locator::{
    clean_header, month_variants, HeaderLocator, HeaderRule, DEFAULT_SCAN_ROWS,
};
use crate::importer::persister::{BatchApplier, RowDisposition, RowInput};
use crate::importer::reference_cache::ReferenceCache;
use crate::importer::row_extractor::data_rows;
use crate::importer::workbook::{SheetGrid, WorkbookData};
use crate::repository::realization_repo::RealizationRepository;
use crate::repository::target_repo::TargetRepository;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// 明细行未给出收入类型时使用
pub const DEFAULT_REVENUE_TYPE: &str = "TOTAL";

/// 汇总表中的合计行标签（规范化后比较）
const TOTAL_ROW_LABELS: [&str; 5] = ["TOTAL", "GRANDTOTAL", "SUBTOTAL", "JUMLAH", "JUMLAHTOTAL"];

/// 工作表别名（配置名称之后依次尝试）
const DETAIL_SHEET_ALIASES: [&str; 3] = ["DETAIL", "RINCIAN", "DETAIL REALISASI"];
const SUMMARY_SHEET_ALIASES: [&str; 3] = ["SUMMARY", "REKAP", "RINGKASAN"];

// ==========================================
// 表头规则
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetailField {
    UnitCode,
    Customer,
    RevenueType,
    TransactionDate,
    GrandTotal,
}

pub fn detail_rules() -> Vec<HeaderRule<DetailField>> {
    vec![
        HeaderRule::contains(DetailField::UnitCode, "KODE UNIT"),
        HeaderRule::contains(DetailField::UnitCode, "UNIT CODE"),
        HeaderRule::contains(DetailField::UnitCode, "KD UNIT"),
        HeaderRule::contains(DetailField::Customer, "CUSTOMER"),
        HeaderRule::contains(DetailField::Customer, "PELANGGAN"),
        HeaderRule::contains(DetailField::RevenueType, "JENIS PENDAPATAN"),
        HeaderRule::contains(DetailField::RevenueType, "REVENUE TYPE"),
        HeaderRule::contains(DetailField::RevenueType, "TIPE PENDAPATAN"),
        HeaderRule::exact(DetailField::RevenueType, "TIPE"),
        HeaderRule::contains(DetailField::TransactionDate, "TANGGAL"),
        HeaderRule::exact(DetailField::TransactionDate, "TGL"),
        HeaderRule::exact(DetailField::TransactionDate, "DATE"),
        HeaderRule::contains(DetailField::GrandTotal, "GRAND TOTAL"),
        HeaderRule::exact(DetailField::GrandTotal, "TOTAL"),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SummaryField {
    Unit,
    Realization,
}

/// 汇总表规则：当月实际完成列必须先于 UNIT 通用规则
pub fn summary_rules(month: u32) -> Vec<HeaderRule<SummaryField>> {
    let mut rules = Vec::new();
    for prefix in ["REALISASI", "REAL"] {
        for variant in month_variants(month) {
            rules.push(HeaderRule::contains(
                SummaryField::Realization,
                &format!("{} {}", prefix, variant),
            ));
        }
    }
    rules.extend([
        HeaderRule::contains(SummaryField::Unit, "KODE UNIT"),
        HeaderRule::contains(SummaryField::Unit, "URAIAN"),
        HeaderRule::contains(SummaryField::Unit, "UNIT"),
    ]);
    rules
}

/// 月份的展示名（结果文件表头）
pub fn month_label(month: u32) -> &'static str {
    month_variants(month).first().copied().unwrap_or("")
}

// ==========================================
// 解析结果
// ==========================================

#[derive(Debug, Clone, PartialEq)]
pub struct DetailRecord {
    pub unit_code: String,
    pub customer: Option<String>,
    pub revenue_type: String,
    pub amount: Decimal,
    pub transaction_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRecord {
    pub unit_label: String,
    /// 表格中填报的当月实际完成
    pub reported: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RealizationRecord {
    Detail(DetailRecord),
    Summary(SummaryRecord),
}

/// 汇总表位置信息（结果文件回写用）
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryLayout {
    pub sheet_name: String,
    /// 表头所在行（0 起）
    pub header_row: usize,
    pub realization_col: usize,
    /// 原表列数，追加列从此处开始
    pub width: usize,
}

#[derive(Debug, Clone)]
pub struct RealizationParse {
    pub rows: Vec<RowInput<RealizationRecord>>,
    pub layout: SummaryLayout,
}

#[derive(Debug, Clone)]
pub struct RealizationSettings {
    pub detail_sheet: String,
    pub summary_sheet: String,
    pub scan_rows: usize,
}

impl Default for RealizationSettings {
    fn default() -> Self {
        Self {
            detail_sheet: "DETAIL".to_string(),
            summary_sheet: "SUMMARY".to_string(),
            scan_rows: DEFAULT_SCAN_ROWS,
        }
    }
}

fn select_sheet<'a>(
    workbook: &'a WorkbookData,
    configured: &str,
    aliases: &[&str],
) -> ImportResult<&'a SheetGrid> {
    let mut candidates = vec![configured];
    candidates.extend(aliases.iter().copied());
    workbook
        .find_sheet(&candidates)
        .ok_or_else(|| ImportError::MissingSheet {
            sheet: configured.to_string(),
        })
}

/// 解析实际完成表（纯内存，不访问数据库）
///
/// 两张工作表与表头均在返回前校验完毕，任何结构错误都不会产生部分结果
pub fn extract_realization_rows(
    workbook: &WorkbookData,
    period: Period,
    settings: &RealizationSettings,
) -> ImportResult<RealizationParse> {
    let detail = select_sheet(workbook, &settings.detail_sheet, &DETAIL_SHEET_ALIASES)?;
    let summary = select_sheet(workbook, &settings.summary_sheet, &SUMMARY_SHEET_ALIASES)?;

    let detail_header = HeaderLocator::new(detail_rules())
        .with_anchors(vec![DetailField::UnitCode, DetailField::GrandTotal])
        .with_required(vec![
            (DetailField::UnitCode, "KODE UNIT"),
            (DetailField::Customer, "CUSTOMER"),
            (DetailField::GrandTotal, "GRAND TOTAL"),
        ])
        .with_scan_rows(settings.scan_rows)
        .locate(detail)?;

    let realization_label = format!("REALISASI {}", month_label(period.month));
    let summary_header = HeaderLocator::new(summary_rules(period.month))
        .with_anchors(vec![SummaryField::Unit])
        .with_required(vec![
            (SummaryField::Unit, "UNIT / URAIAN"),
            (SummaryField::Realization, realization_label.as_str()),
        ])
        .with_scan_rows(settings.scan_rows)
        .locate(summary)?;

    let mut rows = Vec::new();

    for row in data_rows(detail, &detail_header) {
        let Some(unit_code) = row.text(DetailField::UnitCode) else {
            rows.push(RowInput::Blank {
                sheet: detail.name().to_string(),
                row_number: row.row_number(),
            });
            continue;
        };
        let revenue_type = row
            .text(DetailField::RevenueType)
            .map(|t| clean_header(&t))
            .unwrap_or_else(|| DEFAULT_REVENUE_TYPE.to_string());

        rows.push(RowInput::Data {
            sheet: detail.name().to_string(),
            row_number: row.row_number(),
            record: RealizationRecord::Detail(DetailRecord {
                unit_code,
                customer: row.text(DetailField::Customer),
                revenue_type,
                amount: row.number(DetailField::GrandTotal),
                transaction_date: row.date(DetailField::TransactionDate),
            }),
        });
    }

    for row in data_rows(summary, &summary_header) {
        let Some(unit_label) = row.text(SummaryField::Unit) else {
            rows.push(RowInput::Blank {
                sheet: summary.name().to_string(),
                row_number: row.row_number(),
            });
            continue;
        };
        rows.push(RowInput::Data {
            sheet: summary.name().to_string(),
            row_number: row.row_number(),
            record: RealizationRecord::Summary(SummaryRecord {
                unit_label,
                reported: row.optional_number(SummaryField::Realization),
            }),
        });
    }

    let layout = SummaryLayout {
        sheet_name: summary.name().to_string(),
        header_row: summary_header.header_row,
        realization_col: summary_header
            .column(SummaryField::Realization)
            .unwrap_or_default(),
        width: summary.width(),
    };

    debug!(
        detail_sheet = detail.name(),
        summary_sheet = summary.name(),
        rows = rows.len(),
        "实际完成表解析完成"
    );
    Ok(RealizationParse { rows, layout })
}

// ==========================================
// RealizationApplier - 行级写入
// ==========================================

/// 汇总表一行的复核结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryLine {
    pub row_number: usize,
    pub unit_id: i64,
    pub unit_code: String,
    pub reported: Option<Decimal>,
    /// 由明细累计得到的当月实际完成
    pub derived: Decimal,
    pub kpi: KpiSnapshot,
}

/// 实际完成导入输出
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealizationOutput {
    pub realization_rows: usize,
    pub summary_lines: Vec<SummaryLine>,
    /// 交易日期不在导入期间的明细行数（仍计入当月）
    pub out_of_period_rows: usize,
}

pub struct RealizationApplier {
    period: Period,
    source_ref: String,
    calculator: KpiCalculator,
    now: DateTime<Utc>,
    /// (unit_id, revenue_type) → 本任务内累计
    running: HashMap<(i64, String), Decimal>,
    /// unit_id → 本任务内全部收入类型累计
    unit_totals: HashMap<i64, Decimal>,
    output: RealizationOutput,
}

impl RealizationApplier {
    pub fn new(period: Period, source_ref: &str, calculator: KpiCalculator) -> Self {
        Self {
            period,
            source_ref: source_ref.to_string(),
            calculator,
            now: Utc::now(),
            running: HashMap::new(),
            unit_totals: HashMap::new(),
            output: RealizationOutput::default(),
        }
    }

    fn apply_detail(
        &mut self,
        conn: &Connection,
        cache: &mut ReferenceCache,
        row_number: usize,
        record: &DetailRecord,
    ) -> ImportResult<RowDisposition> {
        let unit_id = cache
            .resolve_unit(&record.unit_code)
            .map(|u| u.unit_id)
            .ok_or_else(|| ImportError::UnitNotFound {
                row: row_number,
                code: record.unit_code.clone(),
            })?;

        if let Some(customer) = &record.customer {
            cache.ensure_customer(conn, customer)?;
        }

        let key = (unit_id, record.revenue_type.clone());
        let overflow = || ImportError::InvalidRow {
            row: row_number,
            message: format!("金额 {} 累计后溢出", record.amount),
        };
        let total = self
            .running
            .get(&key)
            .copied()
            .unwrap_or(Decimal::ZERO)
            .checked_add(record.amount)
            .ok_or_else(overflow)?;
        let unit_total = self
            .unit_totals
            .get(&unit_id)
            .copied()
            .unwrap_or(Decimal::ZERO)
            .checked_add(record.amount)
            .ok_or_else(overflow)?;

        RealizationRepository::upsert_tx(
            conn,
            &ActualRealization {
                year: self.period.year,
                month: self.period.month,
                unit_id,
                revenue_type: record.revenue_type.clone(),
                amount: total,
                source_ref: Some(self.source_ref.clone()),
                updated_at: self.now,
            },
        )?;

        // 仅在写入成功后推进内存累计，行回滚不影响后续行
        if self.running.insert(key, total).is_none() {
            self.output.realization_rows += 1;
        }
        self.unit_totals.insert(unit_id, unit_total);

        if let Some(date) = record.transaction_date {
            if date.year() != self.period.year || date.month() != self.period.month {
                warn!(
                    row_number,
                    date = %date,
                    year = self.period.year,
                    month = self.period.month,
                    "明细交易日期不在导入期间"
                );
                self.output.out_of_period_rows += 1;
            }
        }
        Ok(RowDisposition::Applied)
    }

    fn apply_summary(
        &mut self,
        conn: &Connection,
        cache: &ReferenceCache,
        row_number: usize,
        record: &SummaryRecord,
    ) -> ImportResult<RowDisposition> {
        let label = normalize_code(&record.unit_label);
        if TOTAL_ROW_LABELS.contains(&label.as_str()) {
            return Ok(RowDisposition::Skipped("合计行".to_string()));
        }

        let unit = cache
            .resolve_unit_by_code_or_name(&record.unit_label)
            .ok_or_else(|| ImportError::UnitNotFound {
                row: row_number,
                code: record.unit_label.clone(),
            })?;

        let derived = self
            .unit_totals
            .get(&unit.unit_id)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let target = TargetRepository::find_monthly_amount_tx(
            conn,
            self.period.year,
            self.period.month,
            unit.unit_id,
            TargetCategory::Rkap,
        )?
        .unwrap_or(Decimal::ZERO);

        if let Some(reported) = record.reported {
            if reported != derived {
                debug!(
                    row_number,
                    unit = %unit.code,
                    reported = %reported,
                    derived = %derived,
                    "汇总表填报值与明细累计不一致，以明细为准"
                );
            }
        }

        let kpi = self
            .calculator
            .snapshot(derived, target)
            .ok_or_else(|| ImportError::InvalidRow {
                row: row_number,
                message: format!(
                    "单元 {} 达成率计算溢出 (实际 {}, 目标 {})",
                    unit.code, derived, target
                ),
            })?;

        self.output.summary_lines.push(SummaryLine {
            row_number,
            unit_id: unit.unit_id,
            unit_code: unit.code.clone(),
            reported: record.reported,
            derived,
            kpi,
        });
        Ok(RowDisposition::Applied)
    }
}

impl BatchApplier for RealizationApplier {
    type Record = RealizationRecord;
    type Output = RealizationOutput;

    fn apply_row(
        &mut self,
        conn: &Connection,
        cache: &mut ReferenceCache,
        row_number: usize,
        record: &RealizationRecord,
    ) -> ImportResult<RowDisposition> {
        match record {
            RealizationRecord::Detail(detail) => self.apply_detail(conn, cache, row_number, detail),
            RealizationRecord::Summary(summary) => {
                self.apply_summary(conn, cache, row_number, summary)
            }
        }
    }

    fn finish(self, _conn: &Connection) -> ImportResult<RealizationOutput> {
        info!(
            year = self.period.year,
            month = self.period.month,
            realization_rows = self.output.realization_rows,
            summary_lines = self.output.summary_lines.len(),
            "实际完成写入完成"
        );
        Ok(self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::workbook::CellValue;
    use rust_decimal_macros::dec;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn period() -> Period {
        Period::new(2025, 3).unwrap()
    }

    fn detail_sheet() -> SheetGrid {
        SheetGrid::new(
            "Detail",
            vec![
                vec![text("DETAIL REALISASI MARET 2025")],
                vec![
                    text("Kode\nUnit"),
                    text("Customer"),
                    text("Jenis Pendapatan"),
                    text("Grand Total"),
                ],
                vec![text("sbu01"), text("PT Maju"), text("jasa"), CellValue::Number(100.0)],
                vec![],
                vec![text(""), text("PT Lain"), text("jasa"), CellValue::Number(5.0)],
                vec![text("SBU01"), text("PT Maju"), text(""), text("1,500")],
            ],
        )
    }

    fn summary_sheet() -> SheetGrid {
        SheetGrid::new(
            "SUMMARY",
            vec![
                vec![text("Uraian"), text("Real Feb"), text("Realisasi\nMaret")],
                vec![text("SBU01"), CellValue::Number(1.0), CellValue::Number(1600.0)],
                vec![text("Jumlah"), CellValue::Empty, CellValue::Number(1600.0)],
            ],
        )
    }

    #[test]
    fn test_detail_rows_precede_summary_rows() {
        let wb = WorkbookData::new(vec![summary_sheet(), detail_sheet()]);
        let parsed =
            extract_realization_rows(&wb, period(), &RealizationSettings::default()).unwrap();

        let sheets: Vec<&str> = parsed
            .rows
            .iter()
            .map(|r| match r {
                RowInput::Data { sheet, .. } | RowInput::Blank { sheet, .. } => sheet.as_str(),
            })
            .collect();
        assert_eq!(sheets, vec!["Detail", "Detail", "Detail", "SUMMARY", "SUMMARY"]);

        match &parsed.rows[0] {
            RowInput::Data {
                row_number,
                record: RealizationRecord::Detail(d),
                ..
            } => {
                assert_eq!(*row_number, 3);
                assert_eq!(d.revenue_type, "JASA");
                assert_eq!(d.amount, dec!(100));
            }
            other => panic!("unexpected row: {:?}", other),
        }
        assert!(matches!(parsed.rows[1], RowInput::Blank { row_number: 5, .. }));
        match &parsed.rows[2] {
            RowInput::Data {
                record: RealizationRecord::Detail(d),
                ..
            } => {
                assert_eq!(d.revenue_type, DEFAULT_REVENUE_TYPE);
                assert_eq!(d.amount, dec!(1500));
            }
            other => panic!("unexpected row: {:?}", other),
        }

        assert_eq!(parsed.layout.header_row, 0);
        assert_eq!(parsed.layout.realization_col, 2);
        assert_eq!(parsed.layout.width, 3);
    }

    #[test]
    fn test_missing_detail_sheet_names_the_sheet() {
        let wb = WorkbookData::new(vec![summary_sheet()]);
        let err =
            extract_realization_rows(&wb, period(), &RealizationSettings::default()).unwrap_err();
        assert!(err.is_structural());
        assert!(err.to_string().contains("DETAIL"));
    }

    #[test]
    fn test_summary_requires_requested_month_column() {
        let wb = WorkbookData::new(vec![detail_sheet(), summary_sheet()]);
        let april = Period::new(2025, 4).unwrap();
        let err =
            extract_realization_rows(&wb, april, &RealizationSettings::default()).unwrap_err();
        match err {
            ImportError::MissingColumn { sheet, column } => {
                assert_eq!(sheet, "SUMMARY");
                assert!(column.contains("APRIL"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_summary_rules_prefer_month_column_over_unit() {
        let locator = HeaderLocator::new(summary_rules(8));
        assert_eq!(locator.classify("REAL AGT"), Some(SummaryField::Realization));
        assert_eq!(locator.classify("Realisasi Agustus"), Some(SummaryField::Realization));
        assert_eq!(locator.classify("REAL JUL"), None);
        assert_eq!(locator.classify("Unit Kerja"), Some(SummaryField::Unit));
    }
}
