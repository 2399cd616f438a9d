// 🏗️ Parser Framework
// Extension-based dispatch onto the tabular and statement parsers

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::aliases::AliasTable;
use crate::normalizer::{normalize_row, read_table, split_extras, CanonicalRecord, Extras};
use crate::statement::parse_statement;

// ============================================================================
// CORE TYPES
// ============================================================================

/// FileFormat - which parser handles an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    /// Delimited text with a header row
    Csv,
    /// Line-tagged bank statement (`:61:` / `:86:`)
    Statement,
}

impl FileFormat {
    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            FileFormat::Csv => "CSV",
            FileFormat::Statement => "MT940 statement",
        }
    }
}

/// ParsedRow - canonical fields plus the extras that did not fit them
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    pub canonical: CanonicalRecord,
    pub extras: Extras,
}

/// Result of parsing one file. Parsing never fails outright: a file that
/// yields nothing says why instead.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(Vec<ParsedRow>),
    Empty { reason: String },
}

impl ParseOutcome {
    fn from_rows(rows: Vec<ParsedRow>, empty_reason: &str) -> Self {
        if rows.is_empty() {
            ParseOutcome::Empty {
                reason: empty_reason.to_string(),
            }
        } else {
            ParseOutcome::Parsed(rows)
        }
    }

    pub fn into_rows(self) -> Vec<ParsedRow> {
        match self {
            ParseOutcome::Parsed(rows) => rows,
            ParseOutcome::Empty { .. } => Vec::new(),
        }
    }
}

// ============================================================================
// PARSER TRAIT
// ============================================================================

/// FileParser - one implementation per input shape
pub trait FileParser {
    /// Parse decoded file text into canonical rows
    fn parse(&self, content: &str) -> ParseOutcome;

    /// Format this parser handles
    fn format(&self) -> FileFormat;
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Detect the format from the file extension (case-insensitive).
///
/// ```
/// use fee_ledger::parser::{detect_format, FileFormat};
///
/// assert_eq!(detect_format("fees_march.CSV"), Some(FileFormat::Csv));
/// assert_eq!(detect_format("statement.mt940"), Some(FileFormat::Statement));
/// assert_eq!(detect_format("report.pdf"), None);
/// ```
pub fn detect_format(filename: &str) -> Option<FileFormat> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())?
        .to_lowercase();

    match ext.as_str() {
        "csv" => Some(FileFormat::Csv),
        "txt" | "mt940" => Some(FileFormat::Statement),
        _ => None,
    }
}

/// Get the parser for a format
pub fn get_parser(format: FileFormat, table: &AliasTable) -> Box<dyn FileParser + '_> {
    match format {
        FileFormat::Csv => Box::new(CsvParser::new(table)),
        FileFormat::Statement => Box::new(StatementParser),
    }
}

// ============================================================================
// PARSERS
// ============================================================================

/// Tabular parser: header row, one record per line, alias-resolved
pub struct CsvParser<'a> {
    table: &'a AliasTable,
}

impl<'a> CsvParser<'a> {
    pub fn new(table: &'a AliasTable) -> Self {
        CsvParser { table }
    }
}

impl FileParser for CsvParser<'_> {
    fn parse(&self, content: &str) -> ParseOutcome {
        let table = read_table(content);

        let rows = table
            .rows
            .iter()
            .map(|raw| ParsedRow {
                canonical: normalize_row(self.table, raw),
                extras: split_extras(raw),
            })
            .collect();

        ParseOutcome::from_rows(rows, "no data rows")
    }

    fn format(&self) -> FileFormat {
        FileFormat::Csv
    }
}

/// Statement parser: fixed tags, no alias resolution, no extras
pub struct StatementParser;

impl FileParser for StatementParser {
    fn parse(&self, content: &str) -> ParseOutcome {
        let rows = parse_statement(content)
            .into_iter()
            .map(|entry| ParsedRow {
                canonical: entry.into_canonical(),
                extras: Extras::new(),
            })
            .collect();

        ParseOutcome::from_rows(rows, "no :61: transaction lines")
    }

    fn format(&self) -> FileFormat {
        FileFormat::Statement
    }
}

// ============================================================================
// TESTS
// ============================================================================
