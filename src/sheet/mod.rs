//! Minimal `.xlsx` reader for transformation workbooks.
//!
//! An `.xlsx` file is a zip archive of SpreadsheetML parts. Only what the SQL
//! generator needs is decoded: the shared string table and the cell values of
//! the first worksheet (`xl/worksheets/sheet1.xml`, or the first worksheet
//! part by name when that one is absent). Formulas are not evaluated; their
//! cached `<v>` values are used.

use std::collections::HashMap;
use std::io::{Read, Seek};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Result, ReviewError};
use crate::report::sql::TransformationRow;

const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const FIRST_SHEET_PART: &str = "xl/worksheets/sheet1.xml";

/// Column count of an Excel worksheet (`A` through `XFD`).
const MAX_COLUMNS: usize = 16_384;

const REQUIRED_HEADERS: [&str; 5] = [
    "source_table",
    "source_column",
    "transformation_logic",
    "target_column",
    "target_table",
];

/// Rows of the first worksheet as strings. Missing cells are empty strings;
/// trailing empty cells are dropped.
pub fn read_first_sheet(path: &Path) -> Result<Vec<Vec<String>>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    if ext.as_deref() == Some("xls") {
        return Err(ReviewError::read(
            path,
            "legacy .xls workbooks are not supported, save as .xlsx",
        ));
    }

    let file = std::fs::File::open(path).map_err(|e| ReviewError::read(path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| ReviewError::read(path, e))?;

    let shared = match read_part(&mut archive, SHARED_STRINGS_PART) {
        Ok(Some(xml)) => parse_shared_strings(&xml).map_err(|e| ReviewError::read(path, e))?,
        Ok(None) => Vec::new(),
        Err(e) => return Err(ReviewError::read(path, e)),
    };

    let sheet_part = first_sheet_part(&archive)
        .ok_or_else(|| ReviewError::read(path, "workbook has no worksheets"))?;
    let sheet_xml = read_part(&mut archive, &sheet_part)
        .map_err(|e| ReviewError::read(path, e))?
        .ok_or_else(|| ReviewError::read(path, format!("missing part {sheet_part}")))?;

    parse_sheet(&sheet_xml, &shared).map_err(|e| ReviewError::read(path, e))
}

/// Transformation rows from a workbook whose first row names the columns.
pub fn read_transformations(path: &Path) -> Result<Vec<TransformationRow>> {
    let rows = read_first_sheet(path)?;
    let mut rows = rows
        .into_iter()
        .skip_while(|row| row.iter().all(|cell| cell.trim().is_empty()));

    let header = rows
        .next()
        .ok_or_else(|| ReviewError::read(path, "worksheet is empty"))?;
    let index: HashMap<String, usize> = header
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_ascii_lowercase(), i))
        .collect();

    let mut columns = [0usize; 5];
    let mut missing = Vec::new();
    for (slot, name) in columns.iter_mut().zip(REQUIRED_HEADERS) {
        match index.get(name) {
            Some(&i) => *slot = i,
            None => missing.push(name),
        }
    }
    if !missing.is_empty() {
        return Err(ReviewError::read(
            path,
            format!("missing column(s): {}", missing.join(", ")),
        ));
    }

    fn cell(row: &[String], i: usize) -> String {
        row.get(i).map(|s| s.trim().to_string()).unwrap_or_default()
    }

    Ok(rows
        .filter(|row| columns.iter().any(|&i| !cell(row, i).is_empty()))
        .map(|row| TransformationRow {
            source_table: cell(&row, columns[0]),
            source_column: cell(&row, columns[1]),
            transformation_logic: cell(&row, columns[2]),
            target_column: cell(&row, columns[3]),
            target_table: cell(&row, columns[4]),
        })
        .collect())
}

// ── Archive access ───────────────────────────────────────────────

fn read_part<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> std::result::Result<Option<String>, String> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.to_string()),
    };
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| format!("{name}: {e}"))?;
    Ok(Some(xml))
}

fn first_sheet_part<R: Read + Seek>(archive: &zip::ZipArchive<R>) -> Option<String> {
    let mut sheets: Vec<&str> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/") && n.ends_with(".xml"))
        .filter(|n| !n.contains("/_rels/"))
        .collect();
    if sheets.contains(&FIRST_SHEET_PART) {
        return Some(FIRST_SHEET_PART.to_string());
    }
    sheets.sort_unstable();
    sheets.first().map(|s| s.to_string())
}

// ── SpreadsheetML parsing ────────────────────────────────────────

type ParseResult<T> = std::result::Result<T, String>;

fn parse_shared_strings(xml: &str) -> ParseResult<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    // Phonetic runs (<rPh>) repeat the text for furigana; skip them.
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => phonetic_depth += 1,
                b"t" if phonetic_depth == 0 => in_text = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(t) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&t.unescape().map_err(|e| e.to_string())?);
                }
            }
            Event::CData(t) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(strings)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellType {
    Shared,
    Inline,
    Other,
}

struct CellState {
    column: usize,
    kind: CellType,
    value: String,
}

fn parse_sheet(xml: &str, shared: &[String]) -> ParseResult<Vec<Vec<String>>> {
    let mut reader = Reader::from_str(xml);
    let mut rows = Vec::new();
    let mut row: Option<Vec<String>> = None;
    let mut cell: Option<CellState> = None;
    let mut capture = false;

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => row = Some(Vec::new()),
                b"c" => cell = Some(start_cell(&e, row.as_ref().map_or(0, Vec::len))?),
                b"v" => capture = cell.is_some(),
                b"t" => capture = cell.as_ref().is_some_and(|c| c.kind == CellType::Inline),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"row" => rows.push(Vec::new()),
                b"c" => {
                    // Styled but empty cell; it still occupies its column.
                    let state = start_cell(&e, row.as_ref().map_or(0, Vec::len))?;
                    if let Some(r) = row.as_mut() {
                        place(r, state.column, String::new());
                    }
                }
                _ => {}
            },
            Event::Text(t) if capture => {
                if let Some(c) = cell.as_mut() {
                    c.value.push_str(&t.unescape().map_err(|e| e.to_string())?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"c" => {
                    if let (Some(state), Some(r)) = (cell.take(), row.as_mut()) {
                        let value = resolve_value(state.kind, state.value, shared)?;
                        place(r, state.column, value);
                    }
                }
                b"row" => {
                    let mut finished = row.take().unwrap_or_default();
                    while finished.last().is_some_and(String::is_empty) {
                        finished.pop();
                    }
                    rows.push(finished);
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rows)
}

fn start_cell(e: &BytesStart<'_>, next_column: usize) -> ParseResult<CellState> {
    let mut column = next_column;
    let mut kind = CellType::Other;
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let value = attr.unescape_value().map_err(|e| e.to_string())?;
        match attr.key.local_name().as_ref() {
            b"r" => {
                if let Some(index) = column_index(&value)? {
                    column = index;
                }
            }
            b"t" => {
                kind = match value.as_ref() {
                    "s" => CellType::Shared,
                    "inlineStr" => CellType::Inline,
                    _ => CellType::Other,
                }
            }
            _ => {}
        }
    }
    if column >= MAX_COLUMNS {
        return Err(format!("cell column {} is beyond the last worksheet column", column + 1));
    }
    Ok(CellState {
        column,
        kind,
        value: String::new(),
    })
}

fn resolve_value(kind: CellType, raw: String, shared: &[String]) -> ParseResult<String> {
    match kind {
        CellType::Shared => {
            let index: usize = raw
                .trim()
                .parse()
                .map_err(|_| format!("bad shared string index {raw:?}"))?;
            shared
                .get(index)
                .cloned()
                .ok_or_else(|| format!("shared string {index} out of range"))
        }
        CellType::Inline | CellType::Other => Ok(raw),
    }
}

fn place(row: &mut Vec<String>, column: usize, value: String) {
    if row.len() <= column {
        row.resize(column + 1, String::new());
    }
    row[column] = value;
}

/// Zero-based column of an `A1`-style reference (`"C7"` → 2). References
/// without letters carry no column; columns past `XFD` are rejected.
fn column_index(reference: &str) -> ParseResult<Option<usize>> {
    let letters = reference
        .bytes()
        .take_while(u8::is_ascii_alphabetic)
        .map(|b| b.to_ascii_uppercase());

    let mut number = 0usize;
    let mut seen = false;
    for b in letters {
        seen = true;
        number = number
            .checked_mul(26)
            .and_then(|n| n.checked_add(usize::from(b - b'A' + 1)))
            .filter(|&n| n <= MAX_COLUMNS)
            .ok_or_else(|| format!("cell reference {reference:?} is beyond column XFD"))?;
    }
    Ok(seen.then(|| number - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    const SHARED: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="8" uniqueCount="8">
<si><t>Source_Table</t></si>
<si><t>source_column</t></si>
<si><t> transformation_logic </t></si>
<si><t>target_column</t></si>
<si><t>target_table</t></si>
<si><t>raw.users</t></si>
<si><r><t>upper</t></r><r><t>case &amp; trim</t></r><rPh><t>x</t></rPh></si>
<si><t>mart.users</t></si>
</sst>"#;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c><c r="C1" t="s"><v>2</v></c><c r="D1" t="s"><v>3</v></c><c r="E1" t="s"><v>4</v></c></row>
<row r="2"><c r="A2" t="s"><v>5</v></c><c r="B2" t="inlineStr"><is><t>name</t></is></c><c r="C2" t="s"><v>6</v></c><c r="D2" t="inlineStr"><is><t>name_clean</t></is></c><c r="E2" t="s"><v>7</v></c></row>
<row r="3"><c r="A3" s="1"/></row>
<row r="4"><c r="A4" t="s"><v>5</v></c><c r="B4"><v>42</v></c><c r="C4" t="str"><v>cast to int</v></c><c r="D4" t="inlineStr"><is><t>answer</t></is></c><c r="E4" t="s"><v>7</v></c></row>
</sheetData>
</worksheet>"#;

    fn workbook(dir: &Path, name: &str, sheet_part: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let file = std::fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file(SHARED_STRINGS_PART, options).unwrap();
        zip.write_all(SHARED.as_bytes()).unwrap();
        zip.start_file(sheet_part, options).unwrap();
        zip.write_all(SHEET.as_bytes()).unwrap();
        zip.finish().unwrap();
        path
    }

    #[test]
    fn column_references() {
        assert_eq!(column_index("A1"), Ok(Some(0)));
        assert_eq!(column_index("E12"), Ok(Some(4)));
        assert_eq!(column_index("AA3"), Ok(Some(26)));
        assert_eq!(column_index("XFD1"), Ok(Some(MAX_COLUMNS - 1)));
        assert_eq!(column_index("12"), Ok(None));
    }

    #[test]
    fn oversized_column_references_are_rejected() {
        assert!(column_index("XFE1").is_err());
        assert!(column_index("ZZZZZZ1").is_err());
        assert!(column_index("ZZZZZZZZZZZZZZZZ1").is_err());

        let xml = r#"<worksheet><sheetData><row r="1"><c r="ZZZZZZ1"><v>1</v></c></row></sheetData></worksheet>"#;
        assert!(parse_sheet(xml, &[]).is_err());
    }

    #[test]
    fn hostile_cell_reference_is_a_read_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("hostile.xlsx");
        let file = std::fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file(FIRST_SHEET_PART, options).unwrap();
        zip.write_all(
            br#"<worksheet><sheetData><row><c r="ZZZZZZZZZZZZZZZZ1"><v>1</v></c></row></sheetData></worksheet>"#,
        )
        .unwrap();
        zip.finish().unwrap();

        let err = read_first_sheet(&path).unwrap_err();
        assert!(matches!(err, ReviewError::Read { .. }));
        assert!(err.to_string().contains("XFD"));
    }

    #[test]
    fn shared_strings_join_rich_runs_and_skip_phonetics() {
        let strings = parse_shared_strings(SHARED).unwrap();
        assert_eq!(strings.len(), 8);
        assert_eq!(strings[6], "uppercase & trim");
    }

    #[test]
    fn sheet_cells_land_in_their_columns() {
        let xml = r#"<worksheet><sheetData><row r="1"><c r="C1"><v>3</v></c></row></sheetData></worksheet>"#;
        let rows = parse_sheet(xml, &[]).unwrap();
        assert_eq!(rows, vec![vec!["".to_string(), "".into(), "3".into()]]);
    }

    #[test]
    fn reads_transformation_rows() {
        let tmp = TempDir::new().unwrap();
        let path = workbook(tmp.path(), "map.xlsx", FIRST_SHEET_PART);
        let rows = read_transformations(&path).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            TransformationRow {
                source_table: "raw.users".into(),
                source_column: "name".into(),
                transformation_logic: "uppercase & trim".into(),
                target_column: "name_clean".into(),
                target_table: "mart.users".into(),
            }
        );
        assert_eq!(rows[1].source_column, "42");
        assert_eq!(rows[1].transformation_logic, "cast to int");
    }

    #[test]
    fn falls_back_to_first_named_worksheet() {
        let tmp = TempDir::new().unwrap();
        let path = workbook(tmp.path(), "map.xlsx", "xl/worksheets/data.xml");
        assert_eq!(read_transformations(&path).unwrap().len(), 2);
    }

    #[test]
    fn missing_header_is_a_read_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.xlsx");
        let file = std::fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file(FIRST_SHEET_PART, options).unwrap();
        zip.write_all(
            br#"<worksheet><sheetData><row><c t="inlineStr"><is><t>source_table</t></is></c></row></sheetData></worksheet>"#,
        )
        .unwrap();
        zip.finish().unwrap();

        let err = read_transformations(&path).unwrap_err();
        assert!(matches!(err, ReviewError::Read { .. }));
        assert!(err.to_string().contains("target_table"));
    }

    #[test]
    fn legacy_xls_and_garbage_are_read_errors() {
        let tmp = TempDir::new().unwrap();
        let xls = tmp.path().join("old.xls");
        std::fs::write(&xls, b"\xD0\xCF\x11\xE0").unwrap();
        assert!(matches!(read_first_sheet(&xls), Err(ReviewError::Read { .. })));

        let junk = tmp.path().join("junk.xlsx");
        std::fs::write(&junk, "not a zip").unwrap();
        assert!(matches!(read_first_sheet(&junk), Err(ReviewError::Read { .. })));
    }
}
