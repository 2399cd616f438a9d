// 📊 Collection analytics - totals, type counts, per-source sums

use anyhow::Result;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::db::Collection;

/// Headline numbers for one collection. All zero when the collection is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total_credit: f64,
    pub total_debit: f64,
    pub total_fees_collected: f64,
    pub transaction_count: i64,
    pub largest_payment: f64,
    pub average_payment: f64,
    /// Amount of the most recently inserted row
    pub latest_balance: f64,
}

pub fn summary(conn: &Connection, collection: Collection) -> Result<Summary> {
    let (count, total, credit, debit, largest): (i64, f64, f64, f64, f64) = conn.query_row(
        "SELECT
            COUNT(*),
            COALESCE(SUM(amount), 0.0),
            COALESCE(SUM(CASE WHEN type = 'credit' THEN amount ELSE 0 END), 0.0),
            COALESCE(SUM(CASE WHEN type = 'debit' THEN amount ELSE 0 END), 0.0),
            COALESCE(MAX(amount), 0.0)
         FROM transactions
         WHERE collection = ?1",
        params![collection.as_str()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
    )?;

    if count == 0 {
        return Ok(Summary::default());
    }

    let latest: f64 = conn.query_row(
        "SELECT amount FROM transactions WHERE collection = ?1 ORDER BY seq DESC LIMIT 1",
        params![collection.as_str()],
        |row| row.get(0),
    )?;

    Ok(Summary {
        total_credit: credit,
        total_debit: debit,
        total_fees_collected: total,
        transaction_count: count,
        largest_payment: largest,
        average_payment: total / count as f64,
        latest_balance: latest,
    })
}

/// Row count per non-empty `type`
pub fn type_counts(conn: &Connection, collection: Collection) -> Result<BTreeMap<String, i64>> {
    let mut stmt = conn.prepare(
        "SELECT type, COUNT(*)
         FROM transactions
         WHERE collection = ?1 AND type <> ''
         GROUP BY type",
    )?;

    let counts = stmt
        .query_map(params![collection.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<BTreeMap<String, i64>, _>>()?;

    Ok(counts)
}

/// Summed amount per source file
pub fn source_totals(conn: &Connection, collection: Collection) -> Result<BTreeMap<String, f64>> {
    let mut stmt = conn.prepare(
        "SELECT source_file, SUM(amount)
         FROM transactions
         WHERE collection = ?1
         GROUP BY source_file",
    )?;

    let totals = stmt
        .query_map(params![collection.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<BTreeMap<String, f64>, _>>()?;

    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_transaction, setup_database, NewTransaction};

    fn seeded_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let rows = [
            ("credit", 1500.0, "bank.txt"),
            ("debit", 20.0, "bank.txt"),
            ("Tuition", 300.0, "fees.csv"),
            ("", 5.0, "fees.csv"),
        ];
        for (kind, amount, source) in rows {
            let tx = NewTransaction {
                amount,
                kind: kind.to_string(),
                source_file: source.to_string(),
                ..NewTransaction::default()
            };
            insert_transaction(&conn, Collection::Unified, &tx).unwrap();
        }
        conn
    }

    #[test]
    fn test_summary() {
        let conn = seeded_db();
        let s = summary(&conn, Collection::Unified).unwrap();

        assert_eq!(s.transaction_count, 4);
        assert_eq!(s.total_credit, 1500.0);
        assert_eq!(s.total_debit, 20.0);
        assert_eq!(s.total_fees_collected, 1825.0);
        assert_eq!(s.largest_payment, 1500.0);
        assert_eq!(s.average_payment, 456.25);
        assert_eq!(s.latest_balance, 5.0);
    }

    #[test]
    fn test_summary_empty_collection() {
        let conn = seeded_db();
        assert_eq!(summary(&conn, Collection::Organization).unwrap(), Summary::default());
    }

    #[test]
    fn test_type_counts_skip_empty_type() {
        let conn = seeded_db();
        let counts = type_counts(&conn, Collection::Unified).unwrap();

        assert_eq!(counts.len(), 3);
        assert_eq!(counts["credit"], 1);
        assert_eq!(counts["Tuition"], 1);
        assert!(!counts.contains_key(""));
    }

    #[test]
    fn test_source_totals() {
        let conn = seeded_db();
        let totals = source_totals(&conn, Collection::Unified).unwrap();

        assert_eq!(totals["bank.txt"], 1520.0);
        assert_eq!(totals["fees.csv"], 305.0);
    }
}
