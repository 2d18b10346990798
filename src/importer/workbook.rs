// ==========================================
// 营收保障系统 - 工作簿读取
// ==========================================
// 支持: Excel (.xlsx/.xlsm/.xlsb/.xls/.ods) / CSV (.csv)
// 整个文件在任何数据库操作之前一次性读入内存
// 单元格按绝对坐标保存（row 0 = 文件第 1 行），行号可直接用于错误上报
// ==========================================

use crate::importer::code_normalizer::normalize_code;
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use csv::ReaderBuilder;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// 单元格值（公式单元格保存其计算结果）
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Excel 序列日期（1899-12-30 起的天数）
    DateTime(f64),
    Error(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// 以文本形式读取（用于表头匹配）
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Number(n) => Some(format_number(*n)),
            CellValue::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl From<&Data> for CellValue {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Float(f) => CellValue::Number(*f),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) => CellValue::DateTime(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
            Data::Error(e) => CellValue::Error(e.to_string()),
        }
    }
}

// ==========================================
// SheetGrid - 单个工作表
// ==========================================
#[derive(Debug, Clone)]
pub struct SheetGrid {
    name: String,
    rows: Vec<Vec<CellValue>>,
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl SheetGrid {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 行数（含空行）
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// 最大列数
    pub fn width(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    /// 读取单元格，越界视为空
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn row(&self, row: usize) -> &[CellValue] {
        self.rows.get(row).map(|r| r.as_slice()).unwrap_or(&[])
    }

    pub fn is_blank_row(&self, row: usize) -> bool {
        self.row(row).iter().all(|c| c.is_empty())
    }
}

// ==========================================
// WorkbookData - 内存工作簿
// ==========================================
#[derive(Debug, Clone)]
pub struct WorkbookData {
    sheets: Vec<SheetGrid>,
}

impl WorkbookData {
    pub fn new(sheets: Vec<SheetGrid>) -> Self {
        Self { sheets }
    }

    /// 从文件路径读取
    pub fn from_path(path: &Path) -> ImportResult<Self> {
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self::from_bytes(&bytes, &file_name)
    }

    /// 从上传的字节流读取（按文件扩展名选择解析器）
    pub fn from_bytes(bytes: &[u8], file_name: &str) -> ImportResult<Self> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "csv" => Self::parse_csv(bytes, file_name),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Self::parse_spreadsheet(bytes),
            _ => Err(ImportError::UnsupportedFormat(file_name.to_string())),
        }
    }

    fn parse_spreadsheet(bytes: &[u8]) -> ImportResult<Self> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;

        let sheet_names = workbook.sheet_names();
        if sheet_names.is_empty() {
            return Err(ImportError::ExcelParseError("Excel 文件无工作表".to_string()));
        }

        let mut sheets = Vec::with_capacity(sheet_names.len());
        for name in sheet_names {
            let range = workbook.worksheet_range(&name)?;
            let (row_offset, col_offset) = range
                .start()
                .map(|(r, c)| (r as usize, c as usize))
                .unwrap_or((0, 0));

            let mut rows: Vec<Vec<CellValue>> = vec![Vec::new(); row_offset];
            for data_row in range.rows() {
                let mut cells = vec![CellValue::Empty; col_offset];
                cells.extend(data_row.iter().map(CellValue::from));
                rows.push(cells);
            }

            debug!(sheet = %name, rows = rows.len(), "工作表读取完成");
            sheets.push(SheetGrid::new(name, rows));
        }

        Ok(Self { sheets })
    }

    fn parse_csv(bytes: &[u8], file_name: &str) -> ImportResult<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false) // 表头位置由 HeaderLocator 决定
            .flexible(true) // 允许行长度不一致
            .from_reader(bytes);

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let cells = record
                .iter()
                .map(|value| {
                    let trimmed = value.trim();
                    if trimmed.is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::Text(trimmed.to_string())
                    }
                })
                .collect();
            rows.push(cells);
        }

        let sheet_name = Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "CSV".to_string());
        Ok(Self {
            sheets: vec![SheetGrid::new(sheet_name, rows)],
        })
    }

    pub fn sheets(&self) -> &[SheetGrid] {
        &self.sheets
    }

    pub fn first_sheet(&self) -> Option<&SheetGrid> {
        self.sheets.first()
    }

    /// 按名称查找工作表（大小写/空白不敏感）
    pub fn sheet(&self, name: &str) -> Option<&SheetGrid> {
        let wanted = normalize_code(name);
        if wanted.is_empty() {
            return None;
        }
        self.sheets
            .iter()
            .find(|s| normalize_code(&s.name) == wanted)
    }

    /// 依次尝试候选名称，返回第一个存在的工作表
    pub fn find_sheet(&self, candidates: &[&str]) -> Option<&SheetGrid> {
        candidates.iter().find_map(|name| self.sheet(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_keeps_absolute_rows() {
        let csv = "Laporan Target 2025,,\n,,\nKODE UNIT,RKAP,NR\nsbu 01,\"1,000\",50\n";
        let wb = WorkbookData::from_bytes(csv.as_bytes(), "plan_2025.csv").unwrap();

        let sheet = wb.first_sheet().unwrap();
        assert_eq!(sheet.name(), "plan_2025");
        assert_eq!(sheet.height(), 4);
        assert!(sheet.is_blank_row(1));
        assert_eq!(sheet.cell(2, 0), &CellValue::Text("KODE UNIT".to_string()));
        assert_eq!(sheet.cell(3, 1), &CellValue::Text("1,000".to_string()));
        assert_eq!(sheet.cell(10, 10), &CellValue::Empty);
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        let err = WorkbookData::from_bytes(b"abc", "target.txt").unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFormat(_)));
        assert!(err.is_structural());
    }

    #[test]
    fn test_sheet_lookup_is_case_and_space_insensitive() {
        let wb = WorkbookData::new(vec![
            SheetGrid::new("Summary ", vec![]),
            SheetGrid::new("detail", vec![]),
        ]);
        assert_eq!(wb.sheet("DETAIL").map(|s| s.name()), Some("detail"));
        assert_eq!(wb.find_sheet(&["RINGKASAN", "SUMMARY"]).map(|s| s.name()), Some("Summary "));
        assert!(wb.sheet("").is_none());
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = WorkbookData::from_path(Path::new("/definitely/not/here.xlsx")).unwrap_err();
        assert!(matches!(err, ImportError::FileNotFound(_)));
    }
}
