// ABOUTME: SQLite sink that upserts export rows keyed by airtable_id
// ABOUTME: Creates one table per source table and adds columns as new fields appear

use crate::convert::cell_text;
use crate::model::{Record, ID_KEY};
use crate::Result;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;

pub struct SqliteSink {
    conn: Connection,
    /// Lowercased column names per table; SQLite identifiers ignore ASCII case.
    known_columns: HashMap<String, HashSet<String>>,
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_type(value: &Value) -> Option<&'static str> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some("INTEGER"),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some("INTEGER"),
        Value::Number(_) => Some("REAL"),
        Value::String(_) | Value::Array(_) | Value::Object(_) => Some("TEXT"),
    }
}

/// Columns for one row with names that differ only by ASCII case folded
/// together. `airtable_id` always wins its group; otherwise the first key in
/// map order does.
fn row_columns(record: &Record) -> Vec<(&str, &Value)> {
    let mut columns: Vec<(&str, &Value)> = Vec::with_capacity(record.len());
    for (key, value) in record {
        match columns
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
        {
            Some(slot) if key == ID_KEY => *slot = (key.as_str(), value),
            Some(_) => {
                tracing::debug!(column = %key, "dropping case-colliding field");
            }
            None => columns.push((key.as_str(), value)),
        }
    }
    columns
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(cell_text(value)),
    }
}

impl SqliteSink {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Ok(SqliteSink {
            conn,
            known_columns: HashMap::new(),
        })
    }

    fn existing_columns(&self, table: &str) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .map(|name| name.map(|n| n.to_ascii_lowercase()))
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(names)
    }

    /// Creates the table or adds any columns the batch introduces.
    fn ensure_schema(&mut self, table: &str, batch: &[Record]) -> Result<()> {
        if !self.known_columns.contains_key(table) {
            let existing = self.existing_columns(table)?;
            self.known_columns.insert(table.to_string(), existing);
        }

        // First-seen order, typed by the first non-null value
        let mut wanted: Vec<(&str, Option<&'static str>)> = Vec::new();
        for record in batch {
            for (key, value) in row_columns(record) {
                match wanted.iter_mut().find(|(name, _)| name.eq_ignore_ascii_case(key)) {
                    Some((_, ty @ None)) => *ty = column_type(value),
                    Some(_) => {}
                    None => wanted.push((key, column_type(value))),
                }
            }
        }

        let known = self.known_columns.entry(table.to_string()).or_default();
        if known.is_empty() {
            tracing::debug!(table, "creating table");
            self.conn.execute(
                &format!(
                    "CREATE TABLE {} ({} TEXT PRIMARY KEY)",
                    quote_ident(table),
                    quote_ident(ID_KEY)
                ),
                [],
            )?;
            known.insert(ID_KEY.to_string());
        }

        for (name, ty) in wanted {
            if known.contains(&name.to_ascii_lowercase()) {
                continue;
            }
            let ty = ty.unwrap_or("TEXT");
            tracing::debug!(table, column = name, ty, "adding column");
            self.conn.execute(
                &format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    quote_ident(table),
                    quote_ident(name),
                    ty
                ),
                [],
            )?;
            known.insert(name.to_ascii_lowercase());
        }

        Ok(())
    }

    /// Inserts or replaces every record of the batch in one transaction.
    pub fn upsert(&mut self, table: &str, batch: &[Record]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.ensure_schema(table, batch)?;

        let tx = self.conn.transaction()?;
        for record in batch {
            let row = row_columns(record);
            let columns: Vec<String> = row.iter().map(|(k, _)| quote_ident(k)).collect();
            let placeholders = vec!["?"; columns.len()].join(", ");
            let sql = format!(
                "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
                quote_ident(table),
                columns.join(", "),
                placeholders
            );
            tx.execute(&sql, params_from_iter(row.iter().map(|(_, v)| to_sql(v))))?;
        }
        tx.commit()?;

        tracing::debug!(table, rows = batch.len(), "upserted batch");
        Ok(())
    }
}
