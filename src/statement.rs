// 🏦 Statement Format Parser
// Simplified MT940: `:61:` opens a transaction, `:86:` describes it

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

use crate::normalizer::CanonicalRecord;

const TRANSACTION_TAG: &str = ":61:";
const DESCRIPTION_TAG: &str = ":86:";

/// `:61:` + value date (YYMMDD) + optional entry date (MMDD) + C/D mark + amount
fn transaction_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^:61:(\d{6})(\d{4})?([CD])([\d,]+)").expect("statement line pattern is valid")
    })
}

/// One `:61:` entry with the description of its following `:86:` line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementEntry {
    pub value_date: String,
    pub entry_date: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: f64,
    pub description: String,
}

impl StatementEntry {
    /// Canonical shape: value_date becomes `date`; statements carry no extras.
    pub fn into_canonical(self) -> CanonicalRecord {
        CanonicalRecord {
            date: self.value_date,
            amount: self.amount,
            description: self.description,
            kind: self.kind,
            ..CanonicalRecord::default()
        }
    }
}

/// Parse a `:61:` line. `None` when the line does not fit the pattern or the
/// amount is not a decimal number.
fn parse_transaction_line(line: &str) -> Option<StatementEntry> {
    let caps = transaction_line().captures(line)?;

    let amount = caps[4].replace(',', ".").parse::<f64>().ok()?;
    let kind = if &caps[3] == "C" { "credit" } else { "debit" };

    Some(StatementEntry {
        value_date: caps[1].to_string(),
        entry_date: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
        kind: kind.to_string(),
        amount,
        description: String::new(),
    })
}

/// Parse statement text into entries, in file order. Never fails: lines that
/// do not parse are skipped, and `:86:` before the first `:61:` is ignored.
pub fn parse_statement(content: &str) -> Vec<StatementEntry> {
    let mut entries: Vec<StatementEntry> = Vec::new();

    for (line_num, raw_line) in content.lines().enumerate() {
        let line = raw_line.trim();

        if line.starts_with(TRANSACTION_TAG) {
            match parse_transaction_line(line) {
                Some(entry) => entries.push(entry),
                None => debug!("Skipping malformed :61: line {}: {}", line_num + 1, line),
            }
        } else if let Some(text) = line.strip_prefix(DESCRIPTION_TAG) {
            if let Some(current) = entries.last_mut() {
                current.description = text.trim().to_string();
            }
        }
    }

    entries
}

// ============================================================================
// TESTS
// ============================================================================
