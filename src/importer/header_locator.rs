// ==========================================
// 营收保障系统 - 表头定位器
// ==========================================
// 职责: 在工作表顶部有限行内定位表头行，并确定每个语义字段的列号
// 规则:
// - 规则表为有序列表，按优先级逐条匹配；具体模式必须排在通用模式之前
//   （如 "TARGET JAN BEYOND" 先于 "TARGET JAN"）
// - 单元格文本先清洗：大写 + 换行/制表/连续空格折叠为单个空格 + 去首尾空白
// - 自上而下扫描，第一个锚点匹配数 >= 阈值的行即为表头行
// - 同一字段在表头行出现多次时取第一列，其余记 warn
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use crate::importer::workbook::SheetGrid;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use tracing::{debug, warn};

/// 默认扫描行数
pub const DEFAULT_SCAN_ROWS: usize = 20;

/// 月份名称变体（印尼语 / 英语），下标 0 = 一月
///
/// 同一月份内按长度降序排列，便于生成从具体到通用的规则
pub const MONTH_VARIANTS: [&[&str]; 12] = [
    &["JANUARI", "JANUARY", "JAN"],
    &["FEBRUARI", "FEBRUARY", "FEB"],
    &["MARET", "MARCH", "MAR"],
    &["APRIL", "APR"],
    &["MEI", "MAY"],
    &["JUNI", "JUNE", "JUN"],
    &["JULI", "JULY", "JUL"],
    &["AGUSTUS", "AUGUST", "AGU", "AGT", "AUG"],
    &["SEPTEMBER", "SEPT", "SEP"],
    &["OKTOBER", "OCTOBER", "OKT", "OCT"],
    &["NOVEMBER", "NOV"],
    &["DESEMBER", "DECEMBER", "DES", "DEC"],
];

/// 月份（1..=12）的名称变体
pub fn month_variants(month: u32) -> &'static [&'static str] {
    match month {
        1..=12 => MONTH_VARIANTS[(month - 1) as usize],
        _ => &[],
    }
}

/// 清洗表头文本
pub fn clean_header(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// 清洗后的单元格包含模式
    Contains,
    /// 清洗后的单元格等于模式（用于 "CO"/"NR" 等短标签）
    Exact,
}

// ==========================================
// HeaderRule - (模式, 语义字段)
// ==========================================
#[derive(Debug, Clone)]
pub struct HeaderRule<F> {
    pub field: F,
    pub pattern: String,
    pub mode: MatchMode,
}

impl<F> HeaderRule<F> {
    pub fn contains(field: F, pattern: &str) -> Self {
        Self {
            field,
            pattern: clean_header(pattern),
            mode: MatchMode::Contains,
        }
    }

    pub fn exact(field: F, pattern: &str) -> Self {
        Self {
            field,
            pattern: clean_header(pattern),
            mode: MatchMode::Exact,
        }
    }

    fn matches(&self, cleaned: &str) -> bool {
        match self.mode {
            MatchMode::Contains => cleaned.contains(&self.pattern),
            MatchMode::Exact => cleaned == self.pattern,
        }
    }
}

// ==========================================
// HeaderMatch - 定位结果
// ==========================================
#[derive(Debug, Clone)]
pub struct HeaderMatch<F: Eq + Hash> {
    /// 表头所在行（0 起）
    pub header_row: usize,
    columns: HashMap<F, usize>,
}

impl<F: Copy + Eq + Hash> HeaderMatch<F> {
    pub fn column(&self, field: F) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn has(&self, field: F) -> bool {
        self.columns.contains_key(&field)
    }

    /// 第一条数据行（0 起）
    pub fn first_data_row(&self) -> usize {
        self.header_row + 1
    }

    pub fn fields(&self) -> impl Iterator<Item = (&F, &usize)> {
        self.columns.iter()
    }
}

// ==========================================
// HeaderLocator
// ==========================================
#[derive(Debug, Clone)]
pub struct HeaderLocator<F> {
    rules: Vec<HeaderRule<F>>,
    anchors: Vec<F>,
    required: Vec<(F, String)>,
    min_anchor_matches: usize,
    scan_rows: usize,
}

impl<F: Copy + Eq + Hash + Debug> HeaderLocator<F> {
    pub fn new(rules: Vec<HeaderRule<F>>) -> Self {
        Self {
            rules,
            anchors: Vec::new(),
            required: Vec::new(),
            min_anchor_matches: 1,
            scan_rows: DEFAULT_SCAN_ROWS,
        }
    }

    /// 锚点字段（用于判定表头行）
    pub fn with_anchors(mut self, anchors: Vec<F>) -> Self {
        self.anchors = anchors;
        self
    }

    /// 必需字段及其在错误信息中的列名
    pub fn with_required(mut self, required: Vec<(F, &str)>) -> Self {
        self.required = required
            .into_iter()
            .map(|(f, label)| (f, label.to_string()))
            .collect();
        self
    }

    pub fn with_min_anchor_matches(mut self, n: usize) -> Self {
        self.min_anchor_matches = n.max(1);
        self
    }

    pub fn with_scan_rows(mut self, n: usize) -> Self {
        self.scan_rows = n.max(1);
        self
    }

    /// 单元格归类：返回第一条命中的规则对应字段
    pub fn classify(&self, raw: &str) -> Option<F> {
        let cleaned = clean_header(raw);
        if cleaned.is_empty() {
            return None;
        }
        self.rules
            .iter()
            .find(|rule| rule.matches(&cleaned))
            .map(|rule| rule.field)
    }

    fn classify_row(&self, sheet: &SheetGrid, row: usize) -> HashMap<F, usize> {
        let mut columns: HashMap<F, usize> = HashMap::new();
        for (col, cell) in sheet.row(row).iter().enumerate() {
            let Some(text) = cell.as_text() else {
                continue;
            };
            let Some(field) = self.classify(&text) else {
                continue;
            };
            if let Some(existing) = columns.get(&field) {
                warn!(
                    sheet = sheet.name(),
                    row = row + 1,
                    field = ?field,
                    kept_column = existing + 1,
                    ignored_column = col + 1,
                    "表头字段重复，保留第一列"
                );
                continue;
            }
            columns.insert(field, col);
        }
        columns
    }

    fn anchor_hits(&self, columns: &HashMap<F, usize>) -> usize {
        if self.anchors.is_empty() {
            return columns.len();
        }
        self.anchors
            .iter()
            .filter(|a| columns.contains_key(a))
            .count()
    }

    /// 定位表头
    ///
    /// # 错误
    /// - HeaderNotFound: 扫描窗口内没有满足锚点阈值的行
    /// - MissingColumn: 表头行缺少必需字段
    pub fn locate(&self, sheet: &SheetGrid) -> ImportResult<HeaderMatch<F>> {
        let window = self.scan_rows.min(sheet.height());

        for row in 0..window {
            let columns = self.classify_row(sheet, row);
            if self.anchor_hits(&columns) < self.min_anchor_matches {
                continue;
            }

            debug!(
                sheet = sheet.name(),
                header_row = row + 1,
                matched = columns.len(),
                "表头行已定位"
            );

            for (field, label) in &self.required {
                if !columns.contains_key(field) {
                    return Err(ImportError::MissingColumn {
                        sheet: sheet.name().to_string(),
                        column: label.clone(),
                    });
                }
            }

            return Ok(HeaderMatch {
                header_row: row,
                columns,
            });
        }

        Err(ImportError::HeaderNotFound {
            sheet: sheet.name().to_string(),
            scanned_rows: window,
        })
    }
}
