// 🧹 Tabular Row Normalizer
// One CSV row in, one canonical record plus its leftover fields out

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::aliases::{is_canonical, resolve_type_fallback, AliasTable, CanonicalField};

/// Fields outside the canonical schema, in input order
pub type Extras = Map<String, Value>;

// ============================================================================
// RAW RECORD
// ============================================================================

/// Header → value pairs of a single input row, kept in header order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: Vec<(String, String)>,
}

impl RawRecord {
    pub fn new() -> Self {
        RawRecord { fields: Vec::new() }
    }

    /// Insert a field; a repeated header overwrites the earlier value in place.
    pub fn insert(&mut self, header: impl Into<String>, value: impl Into<String>) {
        let header = header.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(h, _)| *h == header) {
            Some(existing) => existing.1 = value,
            None => self.fields.push((header, value)),
        }
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(h, v)| (h.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ============================================================================
// CANONICAL RECORD
// ============================================================================

/// The fixed output schema. `amount` is always numeric; every other field
/// defaults to an empty string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub date: String,
    pub amount: f64,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub transaction_time: String,
    pub currency: String,
    pub transaction_id: String,
    pub university_bank_name: String,
    pub university_account_number: String,
    pub payer_name: String,
    pub student_id: String,
    pub payer_email: String,
    pub academic_session: String,
    pub invoice_number: String,
    pub payment_status: String,
    pub source_file: String,
}

impl CanonicalRecord {
    /// Mutable access to a text field. `None` for `amount`.
    pub fn text_mut(&mut self, field: CanonicalField) -> Option<&mut String> {
        let slot = match field {
            CanonicalField::Amount => return None,
            CanonicalField::Date => &mut self.date,
            CanonicalField::Description => &mut self.description,
            CanonicalField::Type => &mut self.kind,
            CanonicalField::TransactionTime => &mut self.transaction_time,
            CanonicalField::Currency => &mut self.currency,
            CanonicalField::TransactionId => &mut self.transaction_id,
            CanonicalField::UniversityBankName => &mut self.university_bank_name,
            CanonicalField::UniversityAccountNumber => &mut self.university_account_number,
            CanonicalField::PayerName => &mut self.payer_name,
            CanonicalField::StudentId => &mut self.student_id,
            CanonicalField::PayerEmail => &mut self.payer_email,
            CanonicalField::AcademicSession => &mut self.academic_session,
            CanonicalField::InvoiceNumber => &mut self.invoice_number,
            CanonicalField::PaymentStatus => &mut self.payment_status,
            CanonicalField::SourceFile => &mut self.source_file,
        };
        Some(slot)
    }

    /// Flat JSON view with canonical names in canonical order
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            // A struct of strings and one f64 always serializes to an object
            _ => Map::new(),
        }
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Amount text as a finite number, ignoring thousands separators and any
/// whitespace. `None` when nothing numeric is left.
pub fn try_parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Coerce amount text, falling back to 0.0 on anything that is not a number.
pub fn parse_amount(text: &str) -> f64 {
    try_parse_amount(text).unwrap_or(0.0)
}

/// Build the canonical record for one raw row
pub fn normalize_row(table: &AliasTable, raw: &RawRecord) -> CanonicalRecord {
    let mut record = CanonicalRecord::default();

    for field in CanonicalField::ALL {
        let Some(value) = table.resolve(field, raw) else {
            continue;
        };
        match record.text_mut(field) {
            Some(slot) => *slot = value.to_string(),
            None => record.amount = parse_amount(value),
        }
    }

    if record.kind.is_empty() {
        if let Some(value) = resolve_type_fallback(raw) {
            record.kind = value.to_string();
        }
    }

    record
}

/// True for values that must never reach storage
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Every non-canonical raw field with a non-blank value
pub fn split_extras(raw: &RawRecord) -> Extras {
    raw.iter()
        .filter(|(header, value)| !is_canonical(header) && !value.trim().is_empty())
        .map(|(header, value)| (header.to_string(), Value::String(value.to_string())))
        .collect()
}

// ============================================================================
// DELIMITED TABLE READER
// ============================================================================

/// Rows read from one delimited text table
#[derive(Debug, Default)]
pub struct TableRead {
    pub headers: Vec<String>,
    pub rows: Vec<RawRecord>,
    /// Rows the reader could not decode and dropped
    pub skipped: usize,
}

/// Read a header row plus data rows. Short rows simply lack the trailing
/// fields; values past the last header are ignored.
pub fn read_table(text: &str) -> TableRead {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = match reader.headers() {
        Ok(h) => h.iter().map(|s| s.to_string()).collect(),
        Err(e) => {
            warn!("Failed to read CSV header row: {}", e);
            return TableRead::default();
        }
    };

    let mut table = TableRead {
        headers,
        ..TableRead::default()
    };

    for (line_num, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping CSV line {}: {}", line_num + 2, e);
                table.skipped += 1;
                continue;
            }
        };

        let mut raw = RawRecord::new();
        for (header, value) in table.headers.iter().zip(record.iter()) {
            raw.insert(header.as_str(), value);
        }
        table.rows.push(raw);
    }

    table
}

// ============================================================================
// TESTS
// ============================================================================
