//! Pull a SQL candidate out of free-form generator output

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SQL_FENCE_RE: Regex =
        Regex::new(r"(?is)```sql\s*(.*?)\s*```").expect("static fence pattern");
    static ref FINAL_ANSWER_RE: Regex =
        Regex::new(r#"final_answer\s*\(\s*["']([^"']*)["']"#).expect("static final_answer pattern");
}

const SQL_LINE_KEYWORDS: &[&str] = &["SELECT", "FROM", "WHERE", "JOIN", "GROUP", "ORDER"];

/// First ```sql fenced block, else the argument of `final_answer("...")`,
/// else every line mentioning a SQL keyword. `None` when nothing looks like SQL.
pub fn extract_sql(response: &str) -> Option<String> {
    if let Some(caps) = SQL_FENCE_RE.captures(response) {
        let sql = caps[1].trim();
        if !sql.is_empty() {
            return Some(sql.to_string());
        }
    }

    if let Some(caps) = FINAL_ANSWER_RE.captures(response) {
        let sql = caps[1].trim();
        if !sql.is_empty() {
            return Some(sql.to_string());
        }
    }

    let lines: Vec<&str> = response
        .lines()
        .map(str::trim)
        .filter(|line| {
            let upper = line.to_uppercase();
            SQL_LINE_KEYWORDS.iter().any(|k| upper.contains(k))
        })
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
