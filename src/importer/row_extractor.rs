// ==========================================
// 营收保障系统 - 行数据提取器
// ==========================================
// 数值: 公式单元格取计算结果，否则取原值；无法解析 / 占位符 / 错误单元格 → 0
// 日期: 原生日期 → 序列日期 (1899-12-30 + 天数) → 文本，按此优先级
// 文本: 去首尾空白，占位符视为空
// ==========================================

use crate::importer::header_locator::HeaderMatch;
use crate::importer::workbook::{CellValue, SheetGrid};
use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::hash::Hash;
use std::str::FromStr;

/// 视为空值的占位文本
const PLACEHOLDERS: [&str; 5] = ["-", "N/A", "#N/A", "NA", "--"];

/// 文本日期格式（按顺序尝试）
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y%m%d"];

/// Excel 序列日期上限（9999-12-31）
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

fn is_placeholder(s: &str) -> bool {
    let trimmed = s.trim();
    trimmed.is_empty() || PLACEHOLDERS.iter().any(|p| trimmed.eq_ignore_ascii_case(p))
}

/// 单元格 → 数值；任何失败返回 None
pub fn parse_number(cell: &CellValue) -> Option<Decimal> {
    match cell {
        CellValue::Number(n) => Decimal::from_f64(*n).map(|d| d.normalize()),
        CellValue::Text(s) => parse_number_text(s),
        CellValue::Bool(_) | CellValue::DateTime(_) | CellValue::Error(_) | CellValue::Empty => None,
    }
}

/// 单元格 → 数值，失败默认 0
pub fn number_or_zero(cell: &CellValue) -> Decimal {
    parse_number(cell).unwrap_or(Decimal::ZERO)
}

/// 文本数值解析
///
/// 支持: 千分位（`1,234,567.89` / `1.234.567,89`）、`Rp` 前缀、括号负数 `(1.000)`
fn parse_number_text(raw: &str) -> Option<Decimal> {
    if is_placeholder(raw) {
        return None;
    }

    let mut s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("rp")) {
        s = s[2..].to_string();
    }

    let negative = s.starts_with('(') && s.ends_with(')');
    if negative {
        s = s[1..s.len() - 1].to_string();
    }

    let normalized = normalize_separators(&s);
    let value = Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .ok()?;

    Some(if negative { -value } else { value })
}

/// 统一小数分隔符为 '.' 并去除千分位
fn normalize_separators(s: &str) -> String {
    let last_comma = s.rfind(',');
    let last_dot = s.rfind('.');

    match (last_comma, last_dot) {
        // 两者都有：靠后的是小数点
        (Some(c), Some(d)) if c > d => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(c), None) => {
            let commas = s.matches(',').count();
            let decimals = s.len() - c - 1;
            if commas > 1 || decimals == 3 {
                s.replace(',', "")
            } else {
                s.replace(',', ".")
            }
        }
        (None, Some(_)) if s.matches('.').count() > 1 => s.replace('.', ""),
        _ => s.to_string(),
    }
}

/// Excel 序列日期 → 日历日期
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > MAX_EXCEL_SERIAL {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

/// 单元格 → 日期
pub fn parse_date(cell: &CellValue) -> Option<NaiveDate> {
    match cell {
        CellValue::DateTime(serial) => serial_to_date(*serial),
        CellValue::Number(n) => serial_to_date(*n),
        CellValue::Text(s) => parse_date_text(s),
        _ => None,
    }
}

fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    if is_placeholder(raw) {
        return None;
    }
    let trimmed = raw.trim();
    // ISO 日期时间（如 "2025-03-01T00:00:00"）只取日期部分
    let date_part = trimmed.split(['T', ' ']).next().unwrap_or(trimmed);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// 单元格 → 文本
pub fn parse_text(cell: &CellValue) -> Option<String> {
    let text = cell.as_text()?;
    if is_placeholder(&text) {
        None
    } else {
        Some(text.trim().to_string())
    }
}

// ==========================================
// RowView - 表头下的一条物理行
// ==========================================
pub struct RowView<'a, F: Eq + Hash> {
    sheet: &'a SheetGrid,
    header: &'a HeaderMatch<F>,
    row: usize,
}

impl<'a, F: Copy + Eq + Hash> RowView<'a, F> {
    pub fn new(sheet: &'a SheetGrid, header: &'a HeaderMatch<F>, row: usize) -> Self {
        Self { sheet, header, row }
    }

    /// 原始文件行号（1 起）
    pub fn row_number(&self) -> usize {
        self.row + 1
    }

    pub fn is_blank(&self) -> bool {
        self.sheet.is_blank_row(self.row)
    }

    pub fn cell(&self, field: F) -> &'a CellValue {
        match self.header.column(field) {
            Some(col) => self.sheet.cell(self.row, col),
            None => self.sheet.cell(usize::MAX, usize::MAX),
        }
    }

    /// 数值（缺失/无法解析 → 0）
    pub fn number(&self, field: F) -> Decimal {
        number_or_zero(self.cell(field))
    }

    /// 数值（区分"空"与"0"）
    pub fn optional_number(&self, field: F) -> Option<Decimal> {
        parse_number(self.cell(field))
    }

    pub fn text(&self, field: F) -> Option<String> {
        parse_text(self.cell(field))
    }

    pub fn date(&self, field: F) -> Option<NaiveDate> {
        parse_date(self.cell(field))
    }
}

/// 表头下方的全部数据行（跳过完全空白的行）
pub fn data_rows<'a, F: Copy + Eq + Hash>(
    sheet: &'a SheetGrid,
    header: &'a HeaderMatch<F>,
) -> impl Iterator<Item = RowView<'a, F>> + 'a {
    (header.first_data_row()..sheet.height())
        .map(move |row| RowView::new(sheet, header, row))
        .filter(|view| !view.is_blank())
}
