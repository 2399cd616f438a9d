use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::env;
use std::fs;
use std::path::Path;

use fee_ledger::{
    get_page, init_tracing, setup_database, source_totals, summary, type_counts, AppConfig,
    Collection, FileStatus, Ingestor, UploadedFile,
};

const USAGE: &str = "\
Usage:
  fee-ledger upload <unified|organization> <file>...
  fee-ledger list <unified|organization> [page] [page_size]
  fee-ledger summary <unified|organization>
  fee-ledger save <unified|organization> <edits.json>";

fn main() -> Result<()> {
    init_tracing("fee_ledger=info");

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let config = AppConfig::from_env()?;
    let mut conn = Connection::open(&config.database_path).with_context(|| {
        format!("Failed to open database: {}", config.database_path.display())
    })?;
    setup_database(&conn)?;

    let rest = &args[1..];
    match command.as_str() {
        "upload" => run_upload(&mut conn, &config, rest),
        "list" => run_list(&conn, rest),
        "summary" => run_summary(&conn, rest),
        "save" => run_save(&mut conn, &config, rest),
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}

fn collection_arg(args: &[String]) -> Result<Collection> {
    match args.first() {
        Some(name) => name.parse(),
        None => bail!("Missing collection argument\n\n{}", USAGE),
    }
}

fn run_upload(conn: &mut Connection, config: &AppConfig, args: &[String]) -> Result<()> {
    let collection = collection_arg(args)?;
    let paths = &args[1..];
    if paths.is_empty() {
        bail!("No files given\n\n{}", USAGE);
    }

    println!("📂 Uploading {} file(s) to the {} collection...", paths.len(), collection);

    let files = paths
        .iter()
        .map(|p| UploadedFile::from_path(Path::new(p)))
        .collect::<Result<Vec<_>>>()?;

    let ingestor = Ingestor::new(config.alias_table()?);
    let outcome = ingestor.upload(conn, collection, &files)?;

    for report in &outcome.files {
        match &report.status {
            FileStatus::Parsed { rows } => println!("  ✓ {}: {} rows", report.filename, rows),
            FileStatus::Skipped { reason } => println!("  ✗ {}: skipped ({})", report.filename, reason),
        }
    }

    println!(
        "\n✅ Replaced {} old rows with {} new rows",
        outcome.deleted,
        outcome.rows.len()
    );
    Ok(())
}

fn run_list(conn: &Connection, args: &[String]) -> Result<()> {
    let collection = collection_arg(args)?;
    let page: u32 = match args.get(1) {
        Some(p) => p.parse().context("page must be a positive number")?,
        None => 1,
    };
    let page_size: u32 = match args.get(2) {
        Some(p) => p.parse().context("page_size must be a positive number")?,
        None => 20,
    };
    if page == 0 || page_size == 0 {
        bail!("page and page_size start at 1");
    }

    let result = get_page(conn, collection, page, page_size)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn run_summary(conn: &Connection, args: &[String]) -> Result<()> {
    let collection = collection_arg(args)?;

    let body = serde_json::json!({
        "summary": summary(conn, collection)?,
        "types": type_counts(conn, collection)?,
        "sources": source_totals(conn, collection)?,
    });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn run_save(conn: &mut Connection, config: &AppConfig, args: &[String]) -> Result<()> {
    let collection = collection_arg(args)?;
    let Some(path) = args.get(1) else {
        bail!("Missing edits file\n\n{}", USAGE);
    };

    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    let payload: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path))?;

    let ingestor = Ingestor::new(config.alias_table()?);
    let result = ingestor.save(conn, collection, &payload)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
