//! Table and column identifier synthesis.
//!
//! Derives valid, collision-free SQL Server identifiers from file and
//! header names. The sanitizer is stateless between files: callers pass
//! in the set of names already accepted within their scope.

use chrono::Utc;
use std::collections::HashSet;
use std::path::Path;

/// Maximum identifier length accepted by the target DBMS.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Prefix applied to every destination table name.
pub const TABLE_PREFIX: &str = "TB_";

/// Normalize a raw name to `[A-Za-z0-9_]` characters.
///
/// Non-word characters become underscores, anything still outside the
/// ASCII identifier set is dropped, underscore runs collapse, and
/// leading/trailing underscores are trimmed.
fn clean_identifier(raw: &str) -> String {
    let replaced = raw
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' });

    let mut out = String::with_capacity(raw.len());
    let mut prev_underscore = false;
    for c in replaced {
        if !(c.is_ascii_alphanumeric() || c == '_') {
            continue;
        }
        if c == '_' {
            if prev_underscore {
                continue;
            }
            prev_underscore = true;
        } else {
            prev_underscore = false;
        }
        out.push(c);
    }

    out.trim_matches('_').to_string()
}

fn timestamp() -> String {
    Utc::now().format("%Y%m%d%H%M%S").to_string()
}

/// Derive a destination table name from a source file path.
///
/// `existing` holds table names already chosen in the caller's scope
/// (plus any pre-existing destination tables); collisions are resolved
/// with `01_`..`99_` prefixes and finally a timestamp prefix.
pub fn table_name_for_file(path: &Path, existing: &HashSet<String>) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut name = clean_identifier(&stem);
    if name.is_empty() {
        name = format!("TABLE_{}", timestamp());
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, "T_");
    }
    name.truncate(MAX_IDENTIFIER_LEN);

    let base = format!("{}{}", TABLE_PREFIX, name);
    if !existing.contains(&base) {
        return base;
    }

    for n in 1..=99u32 {
        let candidate = format!("{:02}_{}", n, base);
        if !existing.contains(&candidate) {
            return candidate;
        }
    }

    format!("{}_{}", timestamp(), base)
}

/// Derive a column name from a header field.
///
/// `accepted` holds the names already assigned for this table, in
/// header order; it drives both the `COL<NNN>` numbering for nameless
/// columns and duplicate resolution via `_2`, `_3`, … suffixes.
pub fn column_name_for_header(raw: &str, accepted: &[String]) -> String {
    let mut name = clean_identifier(raw);
    if name.is_empty() {
        name = format!("COL{:03}", accepted.len() + 1);
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, "C_");
    }
    name.truncate(MAX_IDENTIFIER_LEN);

    if !accepted.contains(&name) {
        return name;
    }

    let mut n = 2u32;
    loop {
        let suffix = format!("_{}", n);
        let mut base = name.clone();
        base.truncate(MAX_IDENTIFIER_LEN - suffix.len());
        let candidate = format!("{}{}", base, suffix);
        if !accepted.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, existing: &[&str]) -> String {
        let set: HashSet<String> = existing.iter().map(|s| s.to_string()).collect();
        table_name_for_file(Path::new(name), &set)
    }

    #[test]
    fn test_table_name_from_plain_file() {
        assert_eq!(table("sales.csv", &[]), "TB_sales");
        assert_eq!(table("/data/in/sales.csv", &[]), "TB_sales");
    }

    #[test]
    fn test_table_name_cleans_punctuation() {
        assert_eq!(table("My Report-2024.csv", &[]), "TB_My_Report_2024");
        assert_eq!(table("a...b.csv", &[]), "TB_a_b");
    }

    #[test]
    fn test_table_name_digit_prefix() {
        assert_eq!(table("2024_dump.csv", &[]), "TB_T_2024_dump");
    }

    #[test]
    fn test_table_name_collision_suffixes() {
        assert_eq!(table("sales.csv", &["TB_sales"]), "01_TB_sales");
        assert_eq!(table("sales.csv", &["TB_sales", "01_TB_sales"]), "02_TB_sales");
    }

    #[test]
    fn test_table_name_exhausted_collisions_use_timestamp() {
        let mut existing: Vec<String> = vec!["TB_sales".to_string()];
        for n in 1..=99 {
            existing.push(format!("{:02}_TB_sales", n));
        }
        let refs: Vec<&str> = existing.iter().map(String::as_str).collect();
        let name = table("sales.csv", &refs);
        assert!(name.ends_with("_TB_sales"));
        // 14-digit timestamp prefix.
        assert_eq!(name.len(), "TB_sales".len() + 15);
    }

    #[test]
    fn test_table_name_from_unusable_stem() {
        let name = table("!!!.csv", &[]);
        assert!(name.starts_with("TB_TABLE_"), "{name}");
    }

    #[test]
    fn test_non_ascii_letters_are_dropped_not_replaced() {
        assert_eq!(table("café.csv", &[]), "TB_caf");
    }

    #[test]
    fn test_column_name_basic() {
        assert_eq!(column_name_for_header("name", &[]), "name");
        assert_eq!(column_name_for_header(" unit price ", &[]), "unit_price");
    }

    #[test]
    fn test_column_name_is_idempotent() {
        let once = column_name_for_header("unit price ($)", &[]);
        let twice = column_name_for_header(&once, &[]);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_column_name_empty_gets_numbered() {
        assert_eq!(column_name_for_header("", &[]), "COL001");
        let accepted = vec!["a".to_string(), "COL002".to_string(), "b".to_string()];
        assert_eq!(column_name_for_header("???", &accepted), "COL004");
    }

    #[test]
    fn test_column_name_digit_prefix() {
        assert_eq!(column_name_for_header("2020", &[]), "C_2020");
    }

    #[test]
    fn test_column_name_duplicates_get_suffixes() {
        let mut accepted = vec!["name".to_string()];
        let second = column_name_for_header("name", &accepted);
        assert_eq!(second, "name_2");
        accepted.push(second);
        assert_eq!(column_name_for_header("name", &accepted), "name_3");
    }

    #[test]
    fn test_column_name_caps_at_limit() {
        let long = "c".repeat(200);
        let name = column_name_for_header(&long, &[]);
        assert_eq!(name.len(), MAX_IDENTIFIER_LEN);

        let duplicate = column_name_for_header(&long, &[name.clone()]);
        assert_eq!(duplicate.len(), MAX_IDENTIFIER_LEN);
        assert!(duplicate.ends_with("_2"));
    }

    #[test]
    fn test_identifier_shape_invariants() {
        for raw in ["weird!@#", "  spaced out  ", "a--b", "_x_", "ção"] {
            let name = column_name_for_header(raw, &[]);
            assert!(name.len() <= MAX_IDENTIFIER_LEN);
            assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
            assert!(!name.starts_with(|c: char| c.is_ascii_digit()));
        }
    }
}
