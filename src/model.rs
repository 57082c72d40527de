// ABOUTME: Serde data models for Airtable API responses
// ABOUTME: Raw records keep fields as untyped JSON; Record is the flattened export row

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A flattened export row. Backed by a `BTreeMap`, so keys iterate sorted.
pub type Record = Map<String, Value>;

/// Key under which the server record id is injected. In SQLite it is the
/// primary key column, and a genuine field spelled with different case
/// (`AIRTABLE_ID`) is dropped from the row in its favour.
pub const ID_KEY: &str = "airtable_id";
/// Key under which the server creation timestamp is injected.
pub const CREATED_TIME_KEY: &str = "airtable_createdTime";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawRecord {
    pub id: String,
    #[serde(rename = "createdTime")]
    pub created_time: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordPage {
    #[serde(default)]
    pub records: Vec<RawRecord>,
    #[serde(default)]
    pub offset: Option<String>,
}

/// Table names from a base schema document, in server order.
pub fn table_names(schema: &Value) -> Vec<String> {
    schema
        .get("tables")
        .and_then(Value::as_array)
        .map(|tables| {
            tables
                .iter()
                .filter_map(|t| t.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
