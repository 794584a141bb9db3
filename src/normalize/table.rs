//! Generic parser for column-oriented tool output.
//!
//! Each prediction method prints a header line followed by one whitespace-delimited
//! row per candidate. The differences between methods are captured by a
//! [`TableLayout`], so a new method needs a new layout, not a new parser.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::error::AnalyzerError;

/// How a column's text is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
    /// Present in the output for compatibility but never decoded.
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn text(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Text }
    }

    pub const fn integer(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Integer }
    }

    pub const fn float(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Float }
    }

    pub const fn ignore(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Ignore }
    }
}

/// Ordered column layout emitted by one method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLayout {
    pub name: &'static str,
    pub columns: &'static [Column],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("line {line}: expected {expected} fields for layout '{layout}', found {found}")]
    FieldCount {
        line: usize,
        layout: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: column '{column}' is not a valid {kind}: '{value}'")]
    InvalidNumber {
        line: usize,
        column: &'static str,
        kind: &'static str,
        value: String,
    },

    #[error("line {line}: column '{column}' is missing or has the wrong type")]
    MissingColumn { line: usize, column: &'static str },
}

impl From<TableError> for AnalyzerError {
    fn from(err: TableError) -> Self {
        AnalyzerError::parse(err.to_string())
    }
}

/// One decoded data line. `line` is the 1-based line number in the input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub line: usize,
    pub fields: BTreeMap<&'static str, FieldValue>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }

    pub fn text(&self, column: &'static str) -> Result<&str, TableError> {
        match self.fields.get(column) {
            Some(FieldValue::Text(v)) => Ok(v),
            _ => Err(self.missing(column)),
        }
    }

    pub fn integer(&self, column: &'static str) -> Result<i64, TableError> {
        match self.fields.get(column) {
            Some(FieldValue::Integer(v)) => Ok(*v),
            _ => Err(self.missing(column)),
        }
    }

    /// Integers are accepted where a float is asked for.
    pub fn float(&self, column: &'static str) -> Result<f64, TableError> {
        match self.fields.get(column) {
            Some(FieldValue::Float(v)) => Ok(*v),
            Some(FieldValue::Integer(v)) => Ok(*v as f64),
            _ => Err(self.missing(column)),
        }
    }

    fn missing(&self, column: &'static str) -> TableError {
        TableError::MissingColumn { line: self.line, column }
    }
}

/// Parse `raw` (an optional header line plus data lines) with `layout`.
///
/// The first line is taken as a header only when it does not decode under the
/// layout, so tool output with its header already stripped keeps its first row.
/// Blank input or a header alone yields no rows. Blank lines between rows are skipped.
/// A data row whose field count differs from the layout, or a numeric column holding
/// non-numeric text, fails the whole table.
pub fn parse_table(raw: &str, layout: &TableLayout) -> Result<Vec<Row>, TableError> {
    let mut lines = raw
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty());

    let mut rows = Vec::new();
    match lines.next() {
        None => return Ok(rows),
        Some((line, text)) => match parse_row(line, text, layout) {
            Ok(row) => rows.push(row),
            Err(_) => debug!(layout = layout.name, line, "skipping header"),
        },
    }

    for (line, text) in lines {
        rows.push(parse_row(line, text, layout)?);
    }

    debug!(layout = layout.name, rows = rows.len(), "parsed table");
    crate::metrics::record_rows_parsed(rows.len());
    Ok(rows)
}

fn parse_row(line: usize, text: &str, layout: &TableLayout) -> Result<Row, TableError> {
    let values: Vec<&str> = text.split_whitespace().collect();
    if values.len() != layout.columns.len() {
        return Err(TableError::FieldCount {
            line,
            layout: layout.name,
            expected: layout.columns.len(),
            found: values.len(),
        });
    }

    let mut fields = BTreeMap::new();
    for (column, value) in layout.columns.iter().zip(values) {
        let decoded = match column.kind {
            ColumnKind::Ignore => continue,
            ColumnKind::Text => FieldValue::Text(value.to_string()),
            ColumnKind::Integer => value
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| invalid(line, column, "integer", value))?,
            ColumnKind::Float => value
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(FieldValue::Float)
                .ok_or_else(|| invalid(line, column, "float", value))?,
        };
        fields.insert(column.name, decoded);
    }

    Ok(Row { line, fields })
}

fn invalid(line: usize, column: &Column, kind: &'static str, value: &str) -> TableError {
    TableError::InvalidNumber {
        line,
        column: column.name,
        kind,
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: TableLayout = TableLayout {
        name: "test",
        columns: &[
            Column::text("allele"),
            Column::integer("start"),
            Column::ignore("legacy"),
            Column::float("score"),
        ],
    };

    #[test]
    fn test_rows_are_returned_in_file_order() {
        let raw = "allele start legacy score\nA 1 x 0.5\nB 2 y 1.5\nC 3 z 7\n";
        let rows = parse_table(raw, &LAYOUT).unwrap();

        assert_eq!(rows.len(), 3);
        let alleles: Vec<&str> = rows.iter().map(|r| r.text("allele").unwrap()).collect();
        assert_eq!(alleles, vec!["A", "B", "C"]);
        assert_eq!(rows[1].integer("start").unwrap(), 2);
        assert_eq!(rows[2].float("score").unwrap(), 7.0);
        assert!(rows[0].get("legacy").is_none());
    }

    #[test]
    fn test_empty_input_and_header_only_yield_no_rows() {
        assert!(parse_table("", &LAYOUT).unwrap().is_empty());
        assert!(parse_table("\n\n", &LAYOUT).unwrap().is_empty());
        assert!(parse_table("allele\tstart\tlegacy\tscore\n", &LAYOUT).unwrap().is_empty());
    }

    #[test]
    fn test_first_line_that_decodes_is_kept_as_data() {
        let rows = parse_table("A 1 x 0.5\nB 2 y 1.5\n", &LAYOUT).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 1);
        assert_eq!(rows[0].text("allele").unwrap(), "A");

        let rows = parse_table("\nA 1 x 0.5", &LAYOUT).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].line, 2);
    }

    #[test]
    fn test_tabs_and_blank_lines_are_tolerated() {
        let raw = "allele\tstart\tlegacy\tscore\n\nA\t1\tx\t0.5\n\n";
        let rows = parse_table(raw, &LAYOUT).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].line, 3);
    }

    #[test]
    fn test_short_row_is_a_parse_error() {
        let raw = "header\nA 1 x 0.5\nB 2\n";
        let err = parse_table(raw, &LAYOUT).unwrap_err();
        assert_eq!(
            err,
            TableError::FieldCount {
                line: 3,
                layout: "test",
                expected: 4,
                found: 2
            }
        );
    }

    #[test]
    fn test_non_numeric_field_is_a_parse_error() {
        let raw = "header\nA one x 0.5\n";
        assert!(matches!(
            parse_table(raw, &LAYOUT),
            Err(TableError::InvalidNumber { column: "start", .. })
        ));

        let raw = "header\nA 1 x NaN\n";
        assert!(matches!(
            parse_table(raw, &LAYOUT),
            Err(TableError::InvalidNumber { column: "score", .. })
        ));
    }

    #[test]
    fn test_table_error_becomes_analyzer_parse_error() {
        let err: AnalyzerError = parse_table("h\nA\n", &LAYOUT).unwrap_err().into();
        assert_eq!(err.kind, crate::error::AnalyzerErrorKind::ParseError);
    }
}
