// ABOUTME: Flattens raw Airtable records into export rows
// ABOUTME: Injects the server id and creation time under reserved keys

use crate::model::{RawRecord, Record, CREATED_TIME_KEY, ID_KEY};
use serde_json::Value;

/// Copies every field of `raw`, then sets `airtable_id` and
/// `airtable_createdTime`. A genuine field with either reserved name is
/// overwritten by the injected value.
pub fn normalize_record(raw: RawRecord) -> Record {
    let mut record = raw.fields;
    record.insert(ID_KEY.to_string(), Value::String(raw.id));
    record.insert(CREATED_TIME_KEY.to_string(), Value::String(raw.created_time));
    record
}

/// Renders a field value as a single text cell for CSV and SQLite.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
