// ==========================================
// 营收保障系统 - 代码规范化
// ==========================================
// 职责: 单元代码 / 客户名的统一匹配键
// 规则: TRIM + UPPER + 去除所有内部空白
// ==========================================

/// 规范化代码：大小写、空白差异不影响匹配
///
/// 空输入返回空串，上游视为"无匹配"
pub fn normalize_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_uppercase())
        .collect()
}

/// 规范化后为空（行无主键）
pub fn is_blank_code(raw: &str) -> bool {
    normalize_code(raw).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_case_and_spacing() {
        assert_eq!(normalize_code("sbu 01"), "SBU01");
        assert_eq!(normalize_code(" SBU01 "), "SBU01");
        assert_eq!(normalize_code("SBU01"), "SBU01");
        assert_eq!(normalize_code("sbu 01"), normalize_code(" SBU01 "));
    }

    #[test]
    fn test_normalize_strips_newlines_and_nbsp() {
        assert_eq!(normalize_code("PT Maju\nJaya"), "PTMAJUJAYA");
        assert_eq!(normalize_code("unit\u{00A0}7"), "UNIT7");
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize_code(""), "");
        assert!(is_blank_code("   "));
        assert!(!is_blank_code(" a "));
    }
}
