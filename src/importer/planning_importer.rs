// ==========================================
// 营收保障系统 - 年度计划目标导入
// ==========================================
// 工作表: 单一工作表（配置名称，默认第一个），支持 .csv
// 表头: 单元代码列 + 类别列 RKAP / BEYOND / COMMITMENT(CO) / NR
//       可选月度列 "TARGET <月> <类别>"（"TARGET <月>" 视为 RKAP）
// 写入: 年度目标 upsert + 月度目标删除后重建
//   - 某类别 12 个月度列齐全 → 月度按表格原值写入，年度为空时取月度合计
//   - 否则按权重曲线分解
// ==========================================

use crate::domain::revenue::{checked_sum, WeightCurve};
use crate::domain::types::TargetCategory;
use crate::engine::distribution::DistributionEngine;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::header_locator::{
    HeaderLocator, HeaderMatch, HeaderRule, DEFAULT_SCAN_ROWS, MONTH_VARIANTS,
};
use crate::importer::persister::{BatchApplier, RowDisposition, RowInput};
use crate::importer::reference_cache::ReferenceCache;
use crate::importer::row_extractor::{data_rows, RowView};
use crate::importer::workbook::{SheetGrid, WorkbookData};
use crate::repository::target_repo::TargetRepository;
use crate::repository::weight_curve_repo::WeightCurveRepository;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// 计划表语义字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanningField {
    UnitCode,
    UnitName,
    Annual(TargetCategory),
    /// (月份 1..=12, 类别)
    Monthly(u32, TargetCategory),
}

/// 月度列中的类别关键字（具体在前）
const MONTHLY_CATEGORY_LABELS: [(&str, TargetCategory); 5] = [
    ("BEYOND", TargetCategory::Beyond),
    ("COMMITMENT", TargetCategory::Commitment),
    ("CO", TargetCategory::Commitment),
    ("NR", TargetCategory::Nr),
    ("RKAP", TargetCategory::Rkap),
];

/// 计划表表头规则（顺序即优先级）
pub fn planning_rules() -> Vec<HeaderRule<PlanningField>> {
    let mut rules = vec![
        HeaderRule::contains(PlanningField::UnitCode, "KODE UNIT"),
        HeaderRule::contains(PlanningField::UnitCode, "UNIT CODE"),
        HeaderRule::contains(PlanningField::UnitCode, "KD UNIT"),
        HeaderRule::exact(PlanningField::UnitCode, "KODE"),
        HeaderRule::contains(PlanningField::UnitName, "NAMA UNIT"),
        HeaderRule::contains(PlanningField::UnitName, "UNIT NAME"),
    ];

    // 月度 + 类别（具体）
    for (idx, variants) in MONTH_VARIANTS.iter().enumerate() {
        let month = (idx + 1) as u32;
        for variant in variants.iter() {
            for (label, category) in MONTHLY_CATEGORY_LABELS {
                rules.push(HeaderRule::contains(
                    PlanningField::Monthly(month, category),
                    &format!("TARGET {} {}", variant, label),
                ));
            }
        }
    }

    // 月度（通用，视为 RKAP）
    for (idx, variants) in MONTH_VARIANTS.iter().enumerate() {
        let month = (idx + 1) as u32;
        for variant in variants.iter() {
            rules.push(HeaderRule::contains(
                PlanningField::Monthly(month, TargetCategory::Rkap),
                &format!("TARGET {}", variant),
            ));
        }
    }

    // 年度类别列
    rules.extend([
        HeaderRule::contains(PlanningField::Annual(TargetCategory::Beyond), "BEYOND"),
        HeaderRule::contains(PlanningField::Annual(TargetCategory::Commitment), "COMMITMENT"),
        HeaderRule::exact(PlanningField::Annual(TargetCategory::Commitment), "CO"),
        HeaderRule::contains(PlanningField::Annual(TargetCategory::Nr), "NEW REVENUE"),
        HeaderRule::exact(PlanningField::Annual(TargetCategory::Nr), "NR"),
        HeaderRule::contains(PlanningField::Annual(TargetCategory::Rkap), "RKAP"),
    ]);
    rules
}

// ==========================================
// 解析结果
// ==========================================

/// 单元某类别的计划
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryPlan {
    pub category: TargetCategory,
    /// 年度列原值（为空时取月度合计）
    pub annual: Option<Decimal>,
    /// 表格中显式给出的 12 个月度值
    pub monthly: Option<[Decimal; 12]>,
}

impl CategoryPlan {
    /// 实际写入的年度金额；月度合计溢出时返回 None
    pub fn annual_amount(&self) -> Option<Decimal> {
        match (self.annual, &self.monthly) {
            (Some(annual), _) => Some(annual),
            (None, Some(monthly)) => checked_sum(monthly.iter().copied()),
            (None, None) => Some(Decimal::ZERO),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanningRecord {
    pub unit_code: String,
    pub plans: Vec<CategoryPlan>,
}

#[derive(Debug, Clone)]
pub struct PlanningSettings {
    /// 工作表名称；为空取第一个工作表
    pub sheet_name: Option<String>,
    pub scan_rows: usize,
}

impl Default for PlanningSettings {
    fn default() -> Self {
        Self {
            sheet_name: None,
            scan_rows: DEFAULT_SCAN_ROWS,
        }
    }
}

fn select_sheet<'a>(
    workbook: &'a WorkbookData,
    settings: &PlanningSettings,
) -> ImportResult<&'a SheetGrid> {
    match settings.sheet_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => {
            workbook.sheet(name).ok_or_else(|| ImportError::MissingSheet {
                sheet: name.to_string(),
            })
        }
        _ => workbook.first_sheet().ok_or_else(|| ImportError::MissingSheet {
            sheet: "(第一个工作表)".to_string(),
        }),
    }
}

fn explicit_monthly(
    row: &RowView<'_, PlanningField>,
    header: &HeaderMatch<PlanningField>,
    category: TargetCategory,
) -> Option<[Decimal; 12]> {
    if !(1..=12).all(|m| header.has(PlanningField::Monthly(m, category))) {
        return None;
    }
    let mut values = [Decimal::ZERO; 12];
    let mut any_value = false;
    for (idx, slot) in values.iter_mut().enumerate() {
        if let Some(v) = row.optional_number(PlanningField::Monthly((idx + 1) as u32, category)) {
            *slot = v;
            any_value = true;
        }
    }
    any_value.then_some(values)
}

/// 解析计划表（纯内存，不访问数据库）
pub fn extract_planning_rows(
    workbook: &WorkbookData,
    settings: &PlanningSettings,
) -> ImportResult<Vec<RowInput<PlanningRecord>>> {
    let sheet = select_sheet(workbook, settings)?;
    let header = HeaderLocator::new(planning_rules())
        .with_anchors(vec![PlanningField::UnitCode])
        .with_required(vec![(PlanningField::UnitCode, "KODE UNIT")])
        .with_scan_rows(settings.scan_rows)
        .locate(sheet)?;

    let has_category = TargetCategory::ALL.iter().any(|cat| {
        header.has(PlanningField::Annual(*cat))
            || (1..=12).any(|m| header.has(PlanningField::Monthly(m, *cat)))
    });
    if !has_category {
        return Err(ImportError::MissingColumn {
            sheet: sheet.name().to_string(),
            column: "RKAP / BEYOND / COMMITMENT / NR".to_string(),
        });
    }

    let mut rows = Vec::new();
    for row in data_rows(sheet, &header) {
        let Some(unit_code) = row.text(PlanningField::UnitCode) else {
            rows.push(RowInput::Blank {
                sheet: sheet.name().to_string(),
                row_number: row.row_number(),
            });
            continue;
        };

        let mut plans = Vec::new();
        for category in TargetCategory::ALL {
            let annual_cell = if header.has(PlanningField::Annual(category)) {
                row.optional_number(PlanningField::Annual(category))
            } else {
                None
            };
            let monthly = explicit_monthly(&row, &header, category);

            if annual_cell.is_none() && monthly.is_none() {
                continue;
            }
            if let (Some(a), Some(m)) = (annual_cell, &monthly) {
                let sum = checked_sum(m.iter().copied());
                if sum != Some(a) {
                    warn!(
                        row_number = row.row_number(),
                        category = %category,
                        annual = %a,
                        monthly_sum = ?sum,
                        "年度值与月度合计不一致，按原值分别写入"
                    );
                }
            }

            plans.push(CategoryPlan {
                category,
                annual: annual_cell,
                monthly,
            });
        }

        rows.push(RowInput::Data {
            sheet: sheet.name().to_string(),
            row_number: row.row_number(),
            record: PlanningRecord { unit_code, plans },
        });
    }

    debug!(sheet = sheet.name(), rows = rows.len(), "计划表解析完成");
    Ok(rows)
}

// ==========================================
// PlanningApplier - 行级写入
// ==========================================

/// 计划导入输出
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanningOutput {
    pub annual_rows: usize,
    pub monthly_rows: usize,
    /// 是否使用了年度曲线（否则为默认曲线）
    pub used_year_curve: bool,
}

pub struct PlanningApplier {
    year: i32,
    engine: DistributionEngine,
    default_curve: WeightCurve,
    curve: Option<WeightCurve>,
    now: DateTime<Utc>,
    output: PlanningOutput,
}

impl PlanningApplier {
    pub fn new(year: i32, engine: DistributionEngine, default_curve: WeightCurve) -> Self {
        Self {
            year,
            engine,
            default_curve,
            curve: None,
            now: Utc::now(),
            output: PlanningOutput::default(),
        }
    }

    fn curve(&self) -> &WeightCurve {
        self.curve.as_ref().unwrap_or(&self.default_curve)
    }
}

impl BatchApplier for PlanningApplier {
    type Record = PlanningRecord;
    type Output = PlanningOutput;

    fn prepare(&mut self, conn: &Connection) -> ImportResult<()> {
        self.curve = WeightCurveRepository::find_tx(conn, self.year)?;
        self.output.used_year_curve = self.curve.is_some();
        info!(
            year = self.year,
            year_curve = self.output.used_year_curve,
            policy = %self.engine.policy(),
            "权重曲线已确定"
        );
        Ok(())
    }

    fn apply_row(
        &mut self,
        conn: &Connection,
        cache: &mut ReferenceCache,
        row_number: usize,
        record: &PlanningRecord,
    ) -> ImportResult<RowDisposition> {
        let unit_id = cache
            .resolve_unit(&record.unit_code)
            .map(|u| u.unit_id)
            .ok_or_else(|| ImportError::UnitNotFound {
                row: row_number,
                code: record.unit_code.clone(),
            })?;

        if record.plans.is_empty() {
            return Ok(RowDisposition::Skipped("无目标金额".to_string()));
        }

        let mut annual_rows = 0;
        let mut monthly_rows = 0;
        for plan in &record.plans {
            let annual = plan.annual_amount().ok_or_else(|| ImportError::InvalidRow {
                row: row_number,
                message: format!("{} 月度目标合计溢出", plan.category),
            })?;
            if annual < Decimal::ZERO {
                return Err(ImportError::InvalidRow {
                    row: row_number,
                    message: format!("{} 目标金额为负: {}", plan.category, annual),
                });
            }

            TargetRepository::upsert_annual_tx(
                conn,
                self.year,
                unit_id,
                plan.category,
                annual,
                self.now,
            )?;
            annual_rows += 1;

            let monthly = match plan.monthly {
                Some(explicit) => explicit,
                None => self.engine.distribute(annual, self.curve()).ok_or_else(|| {
                    ImportError::InvalidRow {
                        row: row_number,
                        message: format!("{} 目标金额 {} 超出可分解范围", plan.category, annual),
                    }
                })?,
            };
            monthly_rows += TargetRepository::replace_monthly_tx(
                conn,
                self.year,
                unit_id,
                plan.category,
                &monthly,
                self.now,
            )?;
        }

        self.output.annual_rows += annual_rows;
        self.output.monthly_rows += monthly_rows;
        Ok(RowDisposition::Applied)
    }

    fn finish(self, _conn: &Connection) -> ImportResult<PlanningOutput> {
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

    fn workbook(rows: Vec<Vec<CellValue>>) -> WorkbookData {
        WorkbookData::new(vec![SheetGrid::new("TARGET 2025", rows)])
    }

    #[test]
    fn test_annual_columns_and_blank_unit_rows() {
        let wb = workbook(vec![
            vec![text("RENCANA KERJA 2025")],
            vec![text("Kode Unit"), text("Nama Unit"), text("RKAP"), text("CO"), text("NR")],
            vec![text("sbu 01"), text("Unit 1"), CellValue::Number(1000.0), text("-"), text("50")],
            vec![text(""), text("Subtotal"), CellValue::Number(1000.0)],
        ]);

        let rows = extract_planning_rows(&wb, &PlanningSettings::default()).unwrap();
        assert_eq!(rows.len(), 2);

        match &rows[0] {
            RowInput::Data {
                row_number, record, ..
            } => {
                assert_eq!(*row_number, 3);
                assert_eq!(record.unit_code, "sbu 01");
                assert_eq!(
                    record.plans,
                    vec![
                        CategoryPlan {
                            category: TargetCategory::Rkap,
                            annual: Some(dec!(1000)),
                            monthly: None
                        },
                        CategoryPlan {
                            category: TargetCategory::Nr,
                            annual: Some(dec!(50)),
                            monthly: None
                        },
                    ]
                );
            }
            other => panic!("unexpected row: {:?}", other),
        }
        assert!(matches!(rows[1], RowInput::Blank { row_number: 4, .. }));
    }

    #[test]
    fn test_explicit_monthly_columns_sum_to_annual() {
        let mut header = vec![text("KODE UNIT")];
        let mut values = vec![text("SBU01")];
        for month in ["Jan", "Feb", "Mar", "Apr", "Mei", "Jun", "Jul", "Agu", "Sep", "Okt", "Nov", "Des"] {
            header.push(text(&format!("Target {}\nBeyond", month)));
            values.push(CellValue::Number(10.0));
        }
        let wb = workbook(vec![header, values]);

        let rows = extract_planning_rows(&wb, &PlanningSettings::default()).unwrap();
        let RowInput::Data { record, .. } = &rows[0] else {
            panic!("expected data row");
        };
        assert_eq!(record.plans.len(), 1);
        assert_eq!(record.plans[0].category, TargetCategory::Beyond);
        assert_eq!(record.plans[0].annual, None);
        assert_eq!(record.plans[0].annual_amount(), Some(dec!(120)));
        assert_eq!(record.plans[0].monthly, Some([dec!(10); 12]));
    }

    #[test]
    fn test_generic_monthly_header_is_rkap() {
        let locator = HeaderLocator::new(planning_rules());
        assert_eq!(
            locator.classify("TARGET JAN RKAP"),
            Some(PlanningField::Monthly(1, TargetCategory::Rkap))
        );
        assert_eq!(
            locator.classify("Target Jan\nRKAP"),
            Some(PlanningField::Monthly(1, TargetCategory::Rkap))
        );
        assert_eq!(
            locator.classify("TARGET JANUARI"),
            Some(PlanningField::Monthly(1, TargetCategory::Rkap))
        );
        assert_eq!(
            locator.classify("TARGET MEI COMMITMENT"),
            Some(PlanningField::Monthly(5, TargetCategory::Commitment))
        );
        assert_eq!(
            locator.classify("RKAP 2025"),
            Some(PlanningField::Annual(TargetCategory::Rkap))
        );
    }

    #[test]
    fn test_missing_category_columns_is_structural() {
        let wb = workbook(vec![vec![text("KODE UNIT"), text("KETERANGAN")]]);
        let err = extract_planning_rows(&wb, &PlanningSettings::default()).unwrap_err();
        assert!(matches!(err, ImportError::MissingColumn { .. }));
    }

    #[test]
    fn test_configured_sheet_must_exist() {
        let wb = workbook(vec![]);
        let settings = PlanningSettings {
            sheet_name: Some("RKAP".to_string()),
            ..PlanningSettings::default()
        };
        let err = extract_planning_rows(&wb, &settings).unwrap_err();
        assert!(matches!(err, ImportError::MissingSheet { sheet } if sheet == "RKAP"));
    }
}
