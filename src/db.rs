use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::normalizer::Extras;
use crate::parser::FileFormat;

// ============================================================================
// COLLECTIONS
// ============================================================================

/// The two parallel transaction sets. Same schema, same behavior; only the
/// set a row belongs to differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Unified,
    #[serde(alias = "org")]
    Organization,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Unified => "unified",
            Collection::Organization => "organization",
        }
    }

    /// Organization uploads take tabular files only
    pub fn accepts(&self, format: FileFormat) -> bool {
        match self {
            Collection::Unified => true,
            Collection::Organization => format == FileFormat::Csv,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "unified" => Ok(Collection::Unified),
            "organization" | "org" => Ok(Collection::Organization),
            other => Err(anyhow!("Unknown collection: {} (expected unified or organization)", other)),
        }
    }
}

// ============================================================================
// ENTITIES
// ============================================================================

/// Row to insert: the stored scalar fields plus extras
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTransaction {
    pub date: String,
    pub amount: f64,
    pub description: String,
    pub kind: String,
    pub source_file: String,
    pub extras: Extras,
}

/// Persisted transaction. `extras` is stored as NULL when empty.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTransaction {
    pub id: String,
    pub collection: Collection,
    pub date: String,
    pub amount: f64,
    pub description: String,
    pub kind: String,
    pub source_file: String,
    pub extras: Extras,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredTransaction {
    /// Flat view for listings: `id`, the non-empty scalar fields, then extras
    pub fn to_view(&self) -> Map<String, Value> {
        let mut view = Map::new();
        view.insert("id".to_string(), Value::String(self.id.clone()));

        let texts = [
            ("date", &self.date),
            ("description", &self.description),
            ("type", &self.kind),
            ("source_file", &self.source_file),
        ];
        for (key, value) in texts {
            if !value.is_empty() {
                view.insert(key.to_string(), Value::String(value.clone()));
            }
        }
        view.insert("amount".to_string(), Value::from(self.amount));

        for (key, value) in &self.extras {
            view.insert(key.clone(), value.clone());
        }
        view
    }
}

/// One page of a collection
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub total: i64,
    pub items: Vec<Map<String, Value>>,
}

/// Event for the audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery; in-memory databases silently keep "memory"
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            tx_uuid TEXT UNIQUE NOT NULL,
            collection TEXT NOT NULL,
            date TEXT NOT NULL,
            amount REAL NOT NULL,
            description TEXT NOT NULL,
            type TEXT NOT NULL,
            source_file TEXT NOT NULL,
            extras TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_collection ON transactions(collection, seq)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// STORE PRIMITIVES
// ============================================================================

fn encode_extras(extras: &Extras) -> Result<Option<String>> {
    if extras.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(extras)?))
}

fn parse_timestamp(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

const SELECT_COLUMNS: &str = "tx_uuid, collection, date, amount, description, type, source_file,
                              extras, created_at, updated_at";

fn row_to_transaction(row: &Row<'_>) -> rusqlite::Result<StoredTransaction> {
    let collection: String = row.get(1)?;
    let collection = collection.parse::<Collection>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, Type::Text, e.into())
    })?;

    let extras_json: Option<String> = row.get(7)?;
    let extras = match extras_json {
        Some(json) => serde_json::from_str::<Extras>(&json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?,
        None => Extras::new(),
    };

    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    Ok(StoredTransaction {
        id: row.get(0)?,
        collection,
        date: row.get(2)?,
        amount: row.get(3)?,
        description: row.get(4)?,
        kind: row.get(5)?,
        source_file: row.get(6)?,
        extras,
        created_at: parse_timestamp(8, &created_at)?,
        updated_at: parse_timestamp(9, &updated_at)?,
    })
}

/// Remove every row of a collection. Returns the number of rows deleted.
pub fn delete_all(conn: &Connection, collection: Collection) -> Result<usize> {
    let deleted = conn
        .execute(
            "DELETE FROM transactions WHERE collection = ?1",
            params![collection.as_str()],
        )
        .with_context(|| format!("Failed to clear {} transactions", collection))?;
    Ok(deleted)
}

/// Insert one row and return its new identity
pub fn insert_transaction(
    conn: &Connection,
    collection: Collection,
    tx: &NewTransaction,
) -> Result<String> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO transactions (
            tx_uuid, collection, date, amount, description, type, source_file,
            extras, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            id,
            collection.as_str(),
            tx.date,
            tx.amount,
            tx.description,
            tx.kind,
            tx.source_file,
            encode_extras(&tx.extras)?,
            now,
        ],
    )
    .with_context(|| format!("Failed to insert {} transaction", collection))?;

    Ok(id)
}

pub fn find_by_id(
    conn: &Connection,
    collection: Collection,
    id: &str,
) -> Result<Option<StoredTransaction>> {
    let sql = format!(
        "SELECT {} FROM transactions WHERE collection = ?1 AND tx_uuid = ?2",
        SELECT_COLUMNS
    );
    let tx = conn
        .query_row(&sql, params![collection.as_str(), id], row_to_transaction)
        .optional()?;
    Ok(tx)
}

/// Write back the scalar fields and extras of an existing row
pub fn update_transaction(conn: &Connection, tx: &StoredTransaction) -> Result<()> {
    let now = Utc::now().to_rfc3339();

    let changed = conn.execute(
        "UPDATE transactions
         SET date = ?1, amount = ?2, description = ?3, type = ?4, source_file = ?5,
             extras = ?6, updated_at = ?7
         WHERE collection = ?8 AND tx_uuid = ?9",
        params![
            tx.date,
            tx.amount,
            tx.description,
            tx.kind,
            tx.source_file,
            encode_extras(&tx.extras)?,
            now,
            tx.collection.as_str(),
            tx.id,
        ],
    )?;

    if changed == 0 {
        return Err(anyhow!("Transaction {} vanished during update", tx.id));
    }
    Ok(())
}

pub fn count(conn: &Connection, collection: Collection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM transactions WHERE collection = ?1",
        params![collection.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// All rows of a collection in insertion order
pub fn get_all(conn: &Connection, collection: Collection) -> Result<Vec<StoredTransaction>> {
    let sql = format!(
        "SELECT {} FROM transactions WHERE collection = ?1 ORDER BY seq",
        SELECT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![collection.as_str()], row_to_transaction)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// 1-based page of flat views in insertion order
pub fn get_page(
    conn: &Connection,
    collection: Collection,
    page: u32,
    page_size: u32,
) -> Result<Page> {
    let total = count(conn, collection)?;
    let offset = i64::from(page.max(1) - 1) * i64::from(page_size);

    let sql = format!(
        "SELECT {} FROM transactions WHERE collection = ?1 ORDER BY seq LIMIT ?2 OFFSET ?3",
        SELECT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(
            params![collection.as_str(), i64::from(page_size), offset],
            row_to_transaction,
        )?
        .map(|row| row.map(|tx| tx.to_view()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page { total, items })
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Events for one entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_timestamp(1, &timestamp)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}
