use crate::error::{CounselError, CounselResult};

/// Trimmed display name; blank names are rejected.
pub fn clean_name(name: &str, label: &str) -> CounselResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CounselError::validation(format!("{}을(를) 입력해주세요.", label)));
    }
    Ok(trimmed.to_string())
}

/// Branch filters arrive as an id or the literal `all`.
pub fn parse_branch_filter(raw: Option<&str>) -> CounselResult<Option<i32>> {
    match raw.map(str::trim) {
        None | Some("") | Some("all") => Ok(None),
        Some(v) => v
            .parse::<i32>()
            .map(Some)
            .map_err(|_| CounselError::validation(format!("잘못된 지점 값입니다: {}", v))),
    }
}
