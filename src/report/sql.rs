//! BigQuery `INSERT` rendering for spreadsheet-driven transformations.

use std::path::{Path, PathBuf};

use crate::review::traits::ReviewResult;

/// One mapping row of a transformation workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformationRow {
    pub source_table: String,
    pub source_column: String,
    pub transformation_logic: String,
    pub target_column: String,
    pub target_table: String,
}

/// A row together with what the model produced for it.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedColumn {
    pub row: TransformationRow,
    pub result: ReviewResult,
}

/// Responses that already start with `SELECT` are kept verbatim; anything
/// else loses its markdown code fences.
pub fn normalize_expression(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("select"))
    {
        return trimmed.to_string();
    }
    trimmed.replace("```sql", "").replace("```", "").trim().to_string()
}

fn column_expression(column: &GeneratedColumn) -> String {
    let target = &column.row.target_column;
    if column.result.is_success() {
        format!("{} AS {target}", normalize_expression(&column.result.text))
    } else {
        let reason = column.result.text.replace(['\r', '\n'], " ");
        format!("-- {}: {}\n    NULL AS {target}", column.result.outcome, reason.trim())
    }
}

fn render_insert(source_table: &str, target_table: &str, columns: &[&GeneratedColumn]) -> String {
    let targets: Vec<&str> = columns.iter().map(|c| c.row.target_column.as_str()).collect();
    let assignments: Vec<String> = columns.iter().map(|c| column_expression(c)).collect();
    format!(
        "INSERT INTO {target_table} ({})\nSELECT\n    {}\nFROM `{source_table}`;\n",
        targets.join(", "),
        assignments.join(",\n    ")
    )
}

/// One statement per `(source_table, target_table)` pair, groups ordered by
/// their first row and rows kept in workbook order.
pub fn render_inserts(columns: &[GeneratedColumn]) -> String {
    let mut groups: Vec<((&str, &str), Vec<&GeneratedColumn>)> = Vec::new();
    for column in columns {
        let key = (column.row.source_table.as_str(), column.row.target_table.as_str());
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(column),
            None => groups.push((key, vec![column])),
        }
    }

    groups
        .iter()
        .map(|((source, target), members)| render_insert(source, target, members))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `<out_dir>/<workbook stem>_<suffix>`.
pub fn output_path(out_dir: &Path, workbook: &Path, suffix: &str) -> PathBuf {
    let stem = workbook
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workbook".to_string());
    out_dir.join(format!("{stem}_{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn row(source: &str, target_table: &str, column: &str) -> TransformationRow {
        TransformationRow {
            source_table: source.into(),
            source_column: column.into(),
            transformation_logic: format!("copy {column}"),
            target_column: format!("{column}_t"),
            target_table: target_table.into(),
        }
    }

    fn ok(row: TransformationRow, text: &str) -> GeneratedColumn {
        GeneratedColumn {
            row,
            result: ReviewResult::succeeded("map.xlsx", text, Duration::ZERO),
        }
    }

    #[test]
    fn fences_are_stripped_unless_select() {
        assert_eq!(normalize_expression("```sql\nUPPER(name)\n```"), "UPPER(name)");
        assert_eq!(
            normalize_expression("  SELECT x FROM t ```"),
            "SELECT x FROM t ```"
        );
        assert_eq!(normalize_expression("CAST(a AS INT64)"), "CAST(a AS INT64)");
    }

    #[test]
    fn single_group_statement() {
        let sql = render_inserts(&[
            ok(row("raw.users", "mart.users", "name"), "```sql\nUPPER(name)\n```"),
            ok(row("raw.users", "mart.users", "age"), "CAST(age AS INT64)"),
        ]);
        assert_eq!(
            sql,
            "INSERT INTO mart.users (name_t, age_t)\nSELECT\n    UPPER(name) AS name_t,\n    CAST(age AS INT64) AS age_t\nFROM `raw.users`;\n"
        );
    }

    #[test]
    fn rows_group_by_table_pair_in_first_seen_order() {
        let sql = render_inserts(&[
            ok(row("raw.b", "mart.b", "x"), "x"),
            ok(row("raw.a", "mart.a", "y"), "y"),
            ok(row("raw.b", "mart.b", "z"), "z"),
        ]);
        assert_eq!(sql.matches("INSERT INTO").count(), 2);
        let b = sql.find("INSERT INTO mart.b (x_t, z_t)").unwrap();
        let a = sql.find("INSERT INTO mart.a (y_t)").unwrap();
        assert!(b < a);
    }

    #[test]
    fn failed_rows_become_null_with_reason() {
        let failed = GeneratedColumn {
            row: row("raw.t", "mart.t", "bad"),
            result: ReviewResult::failed("map.xlsx", "service error:\n503", Duration::ZERO),
        };
        let sql = render_inserts(&[ok(row("raw.t", "mart.t", "good"), "good"), failed]);
        assert!(sql.contains("-- failed: service error: 503\n    NULL AS bad_t"));
        assert!(sql.contains("(good_t, bad_t)"));
    }

    #[test]
    fn output_path_uses_workbook_stem() {
        assert_eq!(
            output_path(Path::new("out"), Path::new("xl/orders.xlsx"), "bigquery_inserts.sql"),
            Path::new("out").join("orders_bigquery_inserts.sql")
        );
    }
}
