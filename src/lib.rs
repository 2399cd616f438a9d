// Fee Ledger - Core Library
// Normalizes CSV and MT940 uploads into one transaction shape and stores them

pub mod aliases;
pub mod analytics;
pub mod config;
pub mod db;
pub mod ingest;
pub mod normalizer;
pub mod parser;
pub mod statement;

// Re-export commonly used types
pub use aliases::{AliasTable, CanonicalField};
pub use analytics::{source_totals, summary, type_counts, Summary};
pub use config::AppConfig;
pub use db::{
    count, delete_all, find_by_id, get_all, get_events_for_entity, get_page, insert_event,
    insert_transaction, setup_database, update_transaction, Collection, Event, NewTransaction,
    Page, StoredTransaction,
};
pub use ingest::{
    FileReport, FileStatus, Ingestor, SaveResult, UploadOutcome, UploadResponse, UploadedFile,
};
pub use normalizer::{
    normalize_row, parse_amount, try_parse_amount, CanonicalRecord, Extras, RawRecord,
};
pub use parser::{detect_format, get_parser, FileFormat, FileParser, ParseOutcome, ParsedRow};
pub use statement::{parse_statement, StatementEntry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the tracing subscriber used by both binaries.
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}
