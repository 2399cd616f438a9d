// 📥 Ingestion Orchestrator
// Batch upload (full replace per collection) and edit/save of flat records

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::aliases::{is_canonical, AliasTable, CanonicalField};
use crate::db::{self, Collection, Event, NewTransaction, StoredTransaction};
use crate::normalizer::{is_blank, try_parse_amount, CanonicalRecord, Extras};
use crate::parser::{detect_format, get_parser, FileFormat, ParseOutcome, ParsedRow};

/// Canonical fields a statement row exposes in its response
const STATEMENT_FIELDS: [CanonicalField; 5] = [
    CanonicalField::Date,
    CanonicalField::Amount,
    CanonicalField::Description,
    CanonicalField::Type,
    CanonicalField::SourceFile,
];

/// Identity key of a flat record
pub const ID_KEY: &str = "id";

// ============================================================================
// UPLOAD TYPES
// ============================================================================

/// One uploaded file: name (extension decides the parser) and raw bytes
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        UploadedFile {
            filename: filename.into(),
            content: content.into(),
        }
    }

    /// Read a file from disk, keeping only its file name
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        Ok(UploadedFile { filename, content })
    }

    fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.content);
        format!("{:x}", hasher.finalize())
    }
}

/// What happened to one file of a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Parsed { rows: usize },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub filename: String,
    pub format: Option<FileFormat>,
    pub sha256: String,
    #[serde(flatten)]
    pub status: FileStatus,
}

/// Result of one batch upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    /// Flat records in file-then-row order
    pub rows: Vec<Map<String, Value>>,
    pub files: Vec<FileReport>,
    /// Rows of the previous batch that were replaced
    pub deleted: usize,
}

/// Wire shape of an upload: `{"rows": [...]}`
#[derive(Debug, Serialize)]
pub struct UploadResponse<'a> {
    pub rows: &'a [Map<String, Value>],
}

impl UploadOutcome {
    pub fn response(&self) -> UploadResponse<'_> {
        UploadResponse { rows: &self.rows }
    }
}

// ============================================================================
// SAVE TYPES
// ============================================================================

/// `{"success": true, "updated": n, "created": m}` or
/// `{"success": false, "message": "..."}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SaveResult {
    pub fn ok(updated: usize, created: usize) -> Self {
        SaveResult {
            success: true,
            updated: Some(updated),
            created: Some(created),
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        SaveResult {
            success: false,
            updated: None,
            created: None,
            message: Some(message.into()),
        }
    }
}

/// A flat record from the editor, split back into stored fields and extras.
/// `None` means "not present" (or, for amount, not a number).
#[derive(Debug, Default, PartialEq)]
struct EditedRecord {
    id: Option<String>,
    date: Option<String>,
    amount: Option<f64>,
    description: Option<String>,
    kind: Option<String>,
    source_file: Option<String>,
    extras: Extras,
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn identity_of(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn coerce_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => try_parse_amount(s),
        _ => None,
    };
    amount.filter(|v| v.is_finite())
}

impl EditedRecord {
    fn from_fields(fields: &Map<String, Value>) -> Self {
        let mut record = EditedRecord::default();

        for (key, value) in fields {
            match key.as_str() {
                ID_KEY => record.id = identity_of(value),
                "date" => record.date = Some(text_of(value)),
                "amount" => record.amount = coerce_amount(value),
                "description" => record.description = Some(text_of(value)),
                "type" => record.kind = Some(text_of(value)),
                "source_file" => record.source_file = Some(text_of(value)),
                // Alias-derived fields are recomputed on upload, never stored
                name if is_canonical(name) => {}
                _ => {
                    record.extras.insert(key.clone(), value.clone());
                }
            }
        }

        record
    }

    /// Touch only the fields that were sent; merge extras, where a blank
    /// value removes the key.
    fn apply_to(self, stored: &mut StoredTransaction) {
        if let Some(date) = self.date {
            stored.date = date;
        }
        if let Some(amount) = self.amount {
            stored.amount = amount;
        }
        if let Some(description) = self.description {
            stored.description = description;
        }
        if let Some(kind) = self.kind {
            stored.kind = kind;
        }
        if let Some(source_file) = self.source_file {
            stored.source_file = source_file;
        }

        for (key, value) in self.extras {
            if is_blank(&value) {
                stored.extras.remove(&key);
            } else {
                stored.extras.insert(key, value);
            }
        }
    }

    fn into_new(self) -> NewTransaction {
        NewTransaction {
            date: self.date.unwrap_or_default(),
            amount: self.amount.unwrap_or(0.0),
            description: self.description.unwrap_or_default(),
            kind: self.kind.unwrap_or_default(),
            source_file: self.source_file.unwrap_or_default(),
            extras: self
                .extras
                .into_iter()
                .filter(|(_, value)| !is_blank(value))
                .collect(),
        }
    }
}

// ============================================================================
// INGESTOR
// ============================================================================

/// Runs uploads and saves against one alias table
pub struct Ingestor {
    table: AliasTable,
}

impl Default for Ingestor {
    fn default() -> Self {
        Ingestor::new(AliasTable::default())
    }
}

impl Ingestor {
    pub fn new(table: AliasTable) -> Self {
        Ingestor { table }
    }

    pub fn alias_table(&self) -> &AliasTable {
        &self.table
    }

    /// Decode and parse one file. Never fails: problems become a skipped report.
    fn parse_file(&self, collection: Collection, file: &UploadedFile) -> (FileReport, Vec<ParsedRow>) {
        let format = detect_format(&file.filename);
        let mut report = FileReport {
            filename: file.filename.clone(),
            format,
            sha256: file.fingerprint(),
            status: FileStatus::Parsed { rows: 0 },
        };

        let skip = |mut report: FileReport, reason: String| {
            warn!("Skipping {}: {}", report.filename, reason);
            report.status = FileStatus::Skipped { reason };
            (report, Vec::new())
        };

        let Some(format) = format else {
            return skip(report, "unsupported file extension".to_string());
        };
        if !collection.accepts(format) {
            return skip(
                report,
                format!("{} files are not accepted for the {} collection", format.name(), collection),
            );
        }

        let text = match std::str::from_utf8(&file.content) {
            Ok(text) => text.strip_prefix('\u{feff}').unwrap_or(text),
            Err(e) => return skip(report, format!("not valid UTF-8 text: {}", e)),
        };

        match get_parser(format, &self.table).parse(text) {
            ParseOutcome::Parsed(rows) => {
                debug!("Parsed {} rows from {} ({})", rows.len(), file.filename, format.name());
                report.status = FileStatus::Parsed { rows: rows.len() };
                (report, rows)
            }
            ParseOutcome::Empty { reason } => skip(report, reason),
        }
    }

    /// Replace a collection with the rows parsed from `files`.
    ///
    /// Runs in one database transaction: the old batch is deleted and the new
    /// one inserted, or (on any storage error) nothing changes.
    pub fn upload(
        &self,
        conn: &mut Connection,
        collection: Collection,
        files: &[UploadedFile],
    ) -> Result<UploadOutcome> {
        let tx = conn.transaction()?;

        let deleted = db::delete_all(&tx, collection)?;
        let mut rows = Vec::new();
        let mut reports = Vec::with_capacity(files.len());

        for file in files {
            let (report, parsed) = self.parse_file(collection, file);

            for ParsedRow { mut canonical, extras } in parsed {
                canonical.source_file = file.filename.clone();

                let new_tx = NewTransaction {
                    date: canonical.date.clone(),
                    amount: canonical.amount,
                    description: canonical.description.clone(),
                    kind: canonical.kind.clone(),
                    source_file: canonical.source_file.clone(),
                    extras: extras.clone(),
                };
                let id = db::insert_transaction(&tx, collection, &new_tx)?;

                rows.push(response_row(&id, &canonical, extras, report.format));
            }

            reports.push(report);
        }

        let event = Event::new(
            "batch_replaced",
            "collection",
            collection.as_str(),
            json!({
                "deleted": deleted,
                "inserted": rows.len(),
                "files": &reports,
            }),
            "uploader",
        );
        db::insert_event(&tx, &event)?;

        tx.commit()
            .with_context(|| format!("Failed to commit {} upload", collection))?;

        info!(
            "Replaced {} collection: {} rows deleted, {} rows inserted from {} files",
            collection,
            deleted,
            rows.len(),
            files.len()
        );

        Ok(UploadOutcome {
            rows,
            files: reports,
            deleted,
        })
    }

    /// Persist edited flat records: rows with a known `id` are updated in
    /// place, rows without one are created, unknown ids are skipped.
    pub fn save(
        &self,
        conn: &mut Connection,
        collection: Collection,
        payload: &Value,
    ) -> Result<SaveResult> {
        let Some(items) = payload.as_array() else {
            warn!("Rejected {} save: payload is not a list", collection);
            return Ok(SaveResult::rejected("Payload must be a list"));
        };

        let Some(records) = items.iter().map(Value::as_object).collect::<Option<Vec<_>>>() else {
            warn!("Rejected {} save: payload holds a non-object item", collection);
            return Ok(SaveResult::rejected("Every item must be an object"));
        };

        let tx = conn.transaction()?;
        let mut updated = 0;
        let mut created = 0;

        for fields in records {
            let edit = EditedRecord::from_fields(fields);

            match edit.id.clone() {
                Some(id) => {
                    let Some(mut stored) = db::find_by_id(&tx, collection, &id)? else {
                        debug!("Skipping unknown {} transaction {}", collection, id);
                        continue;
                    };
                    edit.apply_to(&mut stored);
                    db::update_transaction(&tx, &stored)?;
                    updated += 1;
                }
                None => {
                    db::insert_transaction(&tx, collection, &edit.into_new())?;
                    created += 1;
                }
            }
        }

        let event = Event::new(
            "transactions_saved",
            "collection",
            collection.as_str(),
            json!({ "updated": updated, "created": created }),
            "editor",
        );
        db::insert_event(&tx, &event)?;

        tx.commit()
            .with_context(|| format!("Failed to commit {} save", collection))?;

        info!("Saved {} collection: {} updated, {} created", collection, updated, created);
        Ok(SaveResult::ok(updated, created))
    }
}

/// `id`, then canonical fields, then extras (disjoint from canonical names)
fn response_row(
    id: &str,
    canonical: &CanonicalRecord,
    extras: Extras,
    format: Option<FileFormat>,
) -> Map<String, Value> {
    let mut row = Map::new();
    row.insert(ID_KEY.to_string(), Value::String(id.to_string()));

    let fields = canonical.to_map();
    match format {
        Some(FileFormat::Statement) => {
            for field in STATEMENT_FIELDS {
                if let Some(value) = fields.get(field.name()) {
                    row.insert(field.name().to_string(), value.clone());
                }
            }
        }
        _ => row.extend(fields),
    }

    row.extend(extras);
    row
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count, find_by_id, get_events_for_entity, setup_database};

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    const FEES_CSV: &str = "\
Transaction Date,Amount,Fee Type,Payer Name,Branch
2024-01-10,\"1,500.00\",Tuition,A. Khan,Main
2024-01-11,N/A,Late Fee,B. Ali,
";

    const STATEMENT: &str = ":61:2301010000C1500,00\n:86:Tuition payment\n:61:2301020000D20,00\n";

    #[test]
    fn test_upload_csv_rows() {
        let mut conn = test_db();
        let ingestor = Ingestor::default();

        let outcome = ingestor
            .upload(&mut conn, Collection::Unified, &[UploadedFile::new("fees.csv", FEES_CSV)])
            .unwrap();

        assert_eq!(outcome.rows.len(), 2);
        let first = &outcome.rows[0];
        assert_eq!(first["amount"], json!(1500.0));
        assert_eq!(first["type"], json!("Tuition"));
        assert_eq!(first["payer_name"], json!("A. Khan"));
        assert_eq!(first["source_file"], json!("fees.csv"));
        assert_eq!(first["Branch"], json!("Main"));
        assert_eq!(first["Payer Name"], json!("A. Khan"));

        let second = &outcome.rows[1];
        assert_eq!(second["amount"], json!(0.0));
        assert!(second.get("Branch").is_none());

        let id = first["id"].as_str().unwrap();
        let stored = find_by_id(&conn, Collection::Unified, id).unwrap().unwrap();
        assert_eq!(stored.kind, "Tuition");
        assert_eq!(stored.source_file, "fees.csv");
        assert!(stored.extras.contains_key("Fee Type"));
        assert!(!stored.extras.contains_key("payer_name"));
    }

    #[test]
    fn test_upload_statement_rows() {
        let mut conn = test_db();
        let ingestor = Ingestor::default();

        let outcome = ingestor
            .upload(&mut conn, Collection::Unified, &[UploadedFile::new("bank.mt940", STATEMENT)])
            .unwrap();

        assert_eq!(outcome.rows.len(), 2);
        let keys: Vec<&str> = outcome.rows[0].keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["id", "date", "amount", "description", "type", "source_file"]);
        assert_eq!(outcome.rows[0]["date"], json!("230101"));
        assert_eq!(outcome.rows[0]["description"], json!("Tuition payment"));
        assert_eq!(outcome.rows[1]["type"], json!("debit"));
    }

    #[test]
    fn test_upload_replaces_previous_batch() {
        let mut conn = test_db();
        let ingestor = Ingestor::default();

        ingestor
            .upload(&mut conn, Collection::Unified, &[UploadedFile::new("a.csv", FEES_CSV)])
            .unwrap();
        let outcome = ingestor
            .upload(&mut conn, Collection::Unified, &[UploadedFile::new("b.txt", STATEMENT)])
            .unwrap();

        assert_eq!(outcome.deleted, 2);
        assert_eq!(count(&conn, Collection::Unified).unwrap(), 2);
        let all = db::get_all(&conn, Collection::Unified).unwrap();
        assert!(all.iter().all(|tx| tx.source_file == "b.txt"));
    }

    #[test]
    fn test_upload_leaves_other_collection_alone() {
        let mut conn = test_db();
        let ingestor = Ingestor::default();

        ingestor
            .upload(&mut conn, Collection::Organization, &[UploadedFile::new("org.csv", FEES_CSV)])
            .unwrap();
        ingestor
            .upload(&mut conn, Collection::Unified, &[UploadedFile::new("bank.txt", STATEMENT)])
            .unwrap();

        assert_eq!(count(&conn, Collection::Organization).unwrap(), 2);
        assert_eq!(count(&conn, Collection::Unified).unwrap(), 2);
    }

    #[test]
    fn test_bad_files_contribute_zero_rows() {
        let mut conn = test_db();
        let ingestor = Ingestor::default();

        let files = vec![
            UploadedFile::new("notes.pdf", "whatever"),
            UploadedFile::new("broken.csv", vec![0xff_u8, 0xfe, 0x00, 0x41]),
            UploadedFile::new("empty.txt", "no tags here"),
            UploadedFile::new("fees.csv", FEES_CSV),
        ];
        let outcome = ingestor.upload(&mut conn, Collection::Unified, &files).unwrap();

        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.files.len(), 4);
        assert!(matches!(outcome.files[0].status, FileStatus::Skipped { .. }));
        assert!(matches!(outcome.files[1].status, FileStatus::Skipped { .. }));
        assert!(matches!(outcome.files[2].status, FileStatus::Skipped { .. }));
        assert_eq!(outcome.files[3].status, FileStatus::Parsed { rows: 2 });
    }

    #[test]
    fn test_organization_rejects_statements() {
        let mut conn = test_db();
        let ingestor = Ingestor::default();

        let outcome = ingestor
            .upload(&mut conn, Collection::Organization, &[UploadedFile::new("bank.mt940", STATEMENT)])
            .unwrap();

        assert!(outcome.rows.is_empty());
        assert_eq!(count(&conn, Collection::Organization).unwrap(), 0);
    }

    #[test]
    fn test_bom_is_stripped_from_first_header() {
        let mut conn = test_db();
        let ingestor = Ingestor::default();
        let content = format!("\u{feff}{}", "date,amount\n2024-02-01,10\n");

        let outcome = ingestor
            .upload(&mut conn, Collection::Unified, &[UploadedFile::new("bom.csv", content)])
            .unwrap();

        assert_eq!(outcome.rows[0]["date"], json!("2024-02-01"));
        assert_eq!(outcome.rows[0]["amount"], json!(10.0));
    }

    #[test]
    fn test_upload_records_audit_event() {
        let mut conn = test_db();
        Ingestor::default()
            .upload(&mut conn, Collection::Unified, &[UploadedFile::new("fees.csv", FEES_CSV)])
            .unwrap();

        let events = get_events_for_entity(&conn, "collection", "unified").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "batch_replaced");
        assert_eq!(events[0].data["inserted"], json!(2));
        assert_eq!(events[0].data["files"][0]["status"], json!("parsed"));
    }

    #[test]
    fn test_save_rejects_non_list() {
        let mut conn = test_db();
        let ingestor = Ingestor::default();

        let result = ingestor
            .save(&mut conn, Collection::Unified, &json!("not a list"))
            .unwrap();
        assert_eq!(result, SaveResult::rejected("Payload must be a list"));

        let result = ingestor
            .save(&mut conn, Collection::Unified, &json!({"date": "2024-01-01"}))
            .unwrap();
        assert!(!result.success);
        assert_eq!(count(&conn, Collection::Unified).unwrap(), 0);
        assert!(get_events_for_entity(&conn, "collection", "unified").unwrap().is_empty());
    }

    #[test]
    fn test_save_roundtrip_updates_and_merges_extras() {
        let mut conn = test_db();
        let ingestor = Ingestor::default();

        let outcome = ingestor
            .upload(&mut conn, Collection::Unified, &[UploadedFile::new("fees.csv", FEES_CSV)])
            .unwrap();

        let mut edited = outcome.rows[0].clone();
        edited.insert("description".to_string(), json!("Spring tuition"));
        edited.insert("Reviewer".to_string(), json!("finance office"));
        let id = edited["id"].as_str().unwrap().to_string();

        let result = ingestor
            .save(&mut conn, Collection::Unified, &json!([edited]))
            .unwrap();

        assert_eq!(result, SaveResult::ok(1, 0));
        assert_eq!(count(&conn, Collection::Unified).unwrap(), 2);

        let stored = find_by_id(&conn, Collection::Unified, &id).unwrap().unwrap();
        assert_eq!(stored.description, "Spring tuition");
        assert_eq!(stored.amount, 1500.0);
        assert_eq!(stored.extras["Reviewer"], json!("finance office"));
        assert_eq!(stored.extras["Branch"], json!("Main"));
        assert_eq!(stored.extras["Fee Type"], json!("Tuition"));
        assert!(!stored.extras.contains_key("payer_name"));
    }

    #[test]
    fn test_save_touches_only_present_fields() {
        let mut conn = test_db();
        let ingestor = Ingestor::default();
        let outcome = ingestor
            .upload(&mut conn, Collection::Unified, &[UploadedFile::new("fees.csv", FEES_CSV)])
            .unwrap();
        let id = outcome.rows[0]["id"].clone();

        let payload = json!([{ "id": id, "amount": "not money", "Branch": "" }]);
        let result = ingestor.save(&mut conn, Collection::Unified, &payload).unwrap();
        assert_eq!(result, SaveResult::ok(1, 0));

        let stored = find_by_id(&conn, Collection::Unified, id.as_str().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(stored.amount, 1500.0);
        assert_eq!(stored.kind, "Tuition");
        assert_eq!(stored.date, "2024-01-10");
        assert!(!stored.extras.contains_key("Branch"));
    }

    #[test]
    fn test_save_creates_and_skips() {
        let mut conn = test_db();
        let ingestor = Ingestor::default();

        let payload = json!([
            { "date": "2024-03-01", "amount": "2,000", "type": "credit", "Receipt": "R-1", "Blank": "" },
            { "id": "does-not-exist", "amount": 5 },
            { "id": null, "description": "manual entry" },
        ]);
        let result = ingestor.save(&mut conn, Collection::Organization, &payload).unwrap();

        assert_eq!(result, SaveResult::ok(0, 2));
        let all = db::get_all(&conn, Collection::Organization).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].amount, 2000.0);
        assert_eq!(all[0].extras.len(), 1);
        assert_eq!(all[0].extras["Receipt"], json!("R-1"));
        assert_eq!(all[1].amount, 0.0);
        assert_eq!(all[1].description, "manual entry");
    }

    #[test]
    fn test_save_rejects_non_object_item_without_writes() {
        let mut conn = test_db();
        let ingestor = Ingestor::default();

        let payload = json!([{ "date": "2024-01-01", "amount": 5 }, "not an object"]);
        let result = ingestor.save(&mut conn, Collection::Unified, &payload).unwrap();

        assert_eq!(result, SaveResult::rejected("Every item must be an object"));
        assert_eq!(count(&conn, Collection::Unified).unwrap(), 0);
        assert!(get_events_for_entity(&conn, "collection", "unified").unwrap().is_empty());
    }

    #[test]
    fn test_save_amount_with_inner_whitespace() {
        let mut conn = test_db();
        let ingestor = Ingestor::default();

        let result = ingestor
            .save(&mut conn, Collection::Unified, &json!([{ "amount": "1 000" }]))
            .unwrap();
        assert_eq!(result, SaveResult::ok(0, 1));

        let mut stored = db::get_all(&conn, Collection::Unified).unwrap().remove(0);
        assert_eq!(stored.amount, 1000.0);

        let payload = json!([{ "id": stored.id.clone(), "amount": "2 500" }]);
        ingestor.save(&mut conn, Collection::Unified, &payload).unwrap();
        stored = find_by_id(&conn, Collection::Unified, &stored.id).unwrap().unwrap();
        assert_eq!(stored.amount, 2500.0);
    }

    #[test]
    fn test_failed_upload_keeps_previous_batch() {
        let mut conn = test_db();
        let ingestor = Ingestor::default();

        ingestor
            .upload(&mut conn, Collection::Unified, &[UploadedFile::new("a.csv", FEES_CSV)])
            .unwrap();
        let before: Vec<String> = db::get_all(&conn, Collection::Unified)
            .unwrap()
            .into_iter()
            .map(|tx| tx.id)
            .collect();

        // Audit insert fails after the delete and the new inserts
        conn.execute("DROP TABLE events", []).unwrap();
        let result = ingestor.upload(
            &mut conn,
            Collection::Unified,
            &[UploadedFile::new("b.txt", STATEMENT)],
        );

        assert!(result.is_err());
        let after: Vec<String> = db::get_all(&conn, Collection::Unified)
            .unwrap()
            .into_iter()
            .map(|tx| tx.id)
            .collect();
        assert_eq!(after, before);
        assert!(db::get_all(&conn, Collection::Unified)
            .unwrap()
            .iter()
            .all(|tx| tx.source_file == "a.csv"));
    }

    #[test]
    fn test_save_result_wire_shape() {
        assert_eq!(
            serde_json::to_value(SaveResult::ok(2, 1)).unwrap(),
            json!({"success": true, "updated": 2, "created": 1})
        );
        assert_eq!(
            serde_json::to_value(SaveResult::rejected("Payload must be a list")).unwrap(),
            json!({"success": false, "message": "Payload must be a list"})
        );
    }

    #[test]
    fn test_upload_response_wire_shape() {
        let mut conn = test_db();
        let outcome = Ingestor::default()
            .upload(&mut conn, Collection::Unified, &[UploadedFile::new("bank.txt", STATEMENT)])
            .unwrap();

        let body = serde_json::to_value(outcome.response()).unwrap();
        assert_eq!(body.as_object().unwrap().len(), 1);
        assert_eq!(body["rows"].as_array().unwrap().len(), 2);
    }
}
