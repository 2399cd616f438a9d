// 🏷️ Field Aliases - canonical vocabulary and header alias table
// Maps whatever a CSV export calls a column onto the fixed canonical names

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::normalizer::RawRecord;

// ============================================================================
// CANONICAL FIELDS
// ============================================================================

/// Every field of the canonical record, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Date,
    Amount,
    Description,
    Type,
    TransactionTime,
    Currency,
    TransactionId,
    UniversityBankName,
    UniversityAccountNumber,
    PayerName,
    StudentId,
    PayerEmail,
    AcademicSession,
    InvoiceNumber,
    PaymentStatus,
    SourceFile,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 16] = [
        CanonicalField::Date,
        CanonicalField::Amount,
        CanonicalField::Description,
        CanonicalField::Type,
        CanonicalField::TransactionTime,
        CanonicalField::Currency,
        CanonicalField::TransactionId,
        CanonicalField::UniversityBankName,
        CanonicalField::UniversityAccountNumber,
        CanonicalField::PayerName,
        CanonicalField::StudentId,
        CanonicalField::PayerEmail,
        CanonicalField::AcademicSession,
        CanonicalField::InvoiceNumber,
        CanonicalField::PaymentStatus,
        CanonicalField::SourceFile,
    ];

    /// Wire name (case-sensitive)
    pub fn name(&self) -> &'static str {
        match self {
            CanonicalField::Date => "date",
            CanonicalField::Amount => "amount",
            CanonicalField::Description => "description",
            CanonicalField::Type => "type",
            CanonicalField::TransactionTime => "transaction_time",
            CanonicalField::Currency => "currency",
            CanonicalField::TransactionId => "transaction_id",
            CanonicalField::UniversityBankName => "university_bank_name",
            CanonicalField::UniversityAccountNumber => "university_account_number",
            CanonicalField::PayerName => "payer_name",
            CanonicalField::StudentId => "student_id",
            CanonicalField::PayerEmail => "payer_email",
            CanonicalField::AcademicSession => "academic_session",
            CanonicalField::InvoiceNumber => "invoice_number",
            CanonicalField::PaymentStatus => "payment_status",
            CanonicalField::SourceFile => "source_file",
        }
    }

    pub fn from_name(name: &str) -> Option<CanonicalField> {
        CanonicalField::ALL.iter().copied().find(|f| f.name() == name)
    }
}

/// True if `name` is one of the canonical wire names.
pub fn is_canonical(name: &str) -> bool {
    CanonicalField::from_name(name).is_some()
}

/// Legacy headers consulted for `type` when no alias matched, in order.
pub const TYPE_FALLBACK_HEADERS: [&str; 2] = ["Fee Type", "Payment Method"];

// ============================================================================
// ALIAS TABLE
// ============================================================================

/// Canonical field → ordered list of accepted raw headers.
///
/// Declaration order matters: when a row carries several aliases of the same
/// field, the first listed alias with a non-empty value wins.
#[derive(Debug, Clone)]
pub struct AliasTable {
    entries: Vec<(CanonicalField, Vec<String>)>,
}

impl AliasTable {
    /// Empty table: every field resolves to its default
    pub fn empty() -> Self {
        AliasTable { entries: Vec::new() }
    }

    /// Load a table from a JSON file shaped `{"date": ["Date", ...], ...}`
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read alias table: {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("Invalid alias table in {}", path.display()))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let parsed: HashMap<String, Vec<String>> =
            serde_json::from_str(json).context("Alias table must be an object of string lists")?;

        let mut table = AliasTable::empty();
        for (name, aliases) in parsed {
            let field = CanonicalField::from_name(&name)
                .ok_or_else(|| anyhow!("Unknown canonical field in alias table: {}", name))?;
            table.set(field, aliases);
        }
        Ok(table)
    }

    /// Replace the alias list of one field
    pub fn set<S: Into<String>>(&mut self, field: CanonicalField, aliases: impl IntoIterator<Item = S>) {
        let aliases: Vec<String> = aliases.into_iter().map(Into::into).collect();
        match self.entries.iter_mut().find(|(f, _)| *f == field) {
            Some(entry) => entry.1 = aliases,
            None => self.entries.push((field, aliases)),
        }
    }

    pub fn aliases(&self, field: CanonicalField) -> &[String] {
        self.entries
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, aliases)| aliases.as_slice())
            .unwrap_or(&[])
    }

    /// First alias of `field` present in `raw` with a non-empty value
    pub fn resolve<'a>(&self, field: CanonicalField, raw: &'a RawRecord) -> Option<&'a str> {
        self.aliases(field)
            .iter()
            .find_map(|alias| raw.get(alias).filter(|v| !v.is_empty()))
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        use CanonicalField::*;

        let mut table = AliasTable::empty();
        table.set(Date, ["date", "value_date", "Date", "Transaction Date"]);
        table.set(Amount, ["amount", "Amount", "amt", "transaction_amount"]);
        table.set(
            Description,
            ["description", "Description", "desc", "narration", "Remarks"],
        );
        table.set(
            Type,
            [
                "type",
                "Type",
                "transaction_type",
                "Fee Type",
                "Payment Method",
                "Payment Status",
            ],
        );
        table.set(TransactionTime, ["Transaction Time"]);
        table.set(Currency, ["Currency"]);
        table.set(TransactionId, ["Transaction ID"]);
        table.set(UniversityBankName, ["University Bank Name"]);
        table.set(UniversityAccountNumber, ["University Account Number"]);
        table.set(PayerName, ["Payer Name"]);
        table.set(StudentId, ["Student ID/Roll Number"]);
        table.set(PayerEmail, ["Payer Email"]);
        table.set(AcademicSession, ["Academic Session"]);
        table.set(InvoiceNumber, ["Invoice/Challan Number"]);
        table.set(PaymentStatus, ["Payment Status"]);
        table
    }
}

/// Secondary lookup for `type`, separate from the alias mechanism.
pub fn resolve_type_fallback(raw: &RawRecord) -> Option<&str> {
    TYPE_FALLBACK_HEADERS
        .iter()
        .find_map(|header| raw.get(header).filter(|v| !v.is_empty()))
}

// ============================================================================
// TESTS
// ============================================================================
