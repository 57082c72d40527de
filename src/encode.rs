// ABOUTME: Whole-file encoders for a fully fetched table
// ABOUTME: JSON, NDJSON, YAML and CSV, all with deterministic key ordering

use crate::convert::cell_text;
use crate::model::Record;
use crate::{Error, Result};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Ndjson,
    Yaml,
    Csv,
}

impl Format {
    pub fn extension(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Ndjson => "ndjson",
            Format::Yaml => "yml",
            Format::Csv => "csv",
        }
    }

    /// Encodes the full record set. `Ok(None)` means nothing should be
    /// written (CSV with no records has no header to derive).
    pub fn encode(self, records: &[Record]) -> Result<Option<Vec<u8>>> {
        match self {
            Format::Json => to_json(records).map(|s| Some(s.into_bytes())),
            Format::Ndjson => to_ndjson(records).map(|s| Some(s.into_bytes())),
            Format::Yaml => to_yaml(records).map(|s| Some(s.into_bytes())),
            Format::Csv => to_csv(records),
        }
    }
}

/// Bulk formats selected for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Formats {
    pub json: bool,
    pub ndjson: bool,
    pub yaml: bool,
    pub csv: bool,
}

impl Formats {
    /// Falls back to YAML alone when no format was requested and no
    /// database sink is configured.
    pub fn with_default(mut self, has_database: bool) -> Self {
        if !self.json && !self.ndjson && !self.yaml && !self.csv && !has_database {
            self.yaml = true;
        }
        self
    }

    pub fn enabled(&self) -> Vec<Format> {
        [
            (self.json, Format::Json),
            (self.ndjson, Format::Ndjson),
            (self.yaml, Format::Yaml),
            (self.csv, Format::Csv),
        ]
        .into_iter()
        .filter_map(|(on, format)| on.then_some(format))
        .collect()
    }
}

struct Sorted<'a>(&'a Value);

struct SortedMap<'a>(&'a Map<String, Value>);

struct SortedRecords<'a>(&'a [Record]);

impl Serialize for Sorted<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            Value::Object(map) => SortedMap(map).serialize(serializer),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&Sorted(item))?;
                }
                seq.end()
            }
            other => other.serialize(serializer),
        }
    }
}

impl Serialize for SortedMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut entries: Vec<_> = self.0.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in entries {
            map.serialize_entry(key, &Sorted(value))?;
        }
        map.end()
    }
}

impl Serialize for SortedRecords<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for record in self.0 {
            seq.serialize_element(&SortedMap(record))?;
        }
        seq.end()
    }
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| {
        Error::Filesystem(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}

/// Pretty-printed array, 4-space indent, keys sorted at every level.
pub fn to_json(records: &[Record]) -> Result<String> {
    to_pretty_json(&SortedRecords(records))
}

/// Same layout as [`to_json`], for the `_schema.json` side artifact.
pub fn schema_json(schema: &Value) -> Result<String> {
    to_pretty_json(&Sorted(schema))
}

/// One compact object per line in fetch order, no trailing newline.
pub fn to_ndjson(records: &[Record]) -> Result<String> {
    let lines = records
        .iter()
        .map(|r| serde_json::to_string(&SortedMap(r)))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

pub fn to_yaml(records: &[Record]) -> Result<String> {
    Ok(serde_yaml::to_string(&SortedRecords(records))?)
}

/// Fresh CSV document with the header taken from the first record's keys.
/// Later records are projected onto that header. Returns `None` for an
/// empty record set.
pub fn to_csv(records: &[Record]) -> Result<Option<Vec<u8>>> {
    let Some(first) = records.first() else {
        return Ok(None);
    };
    let header: Vec<&String> = first.keys().collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&header)?;
    for record in records {
        writer.write_record(
            header
                .iter()
                .map(|key| record.get(*key).map(cell_text).unwrap_or_default()),
        )?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Filesystem(e.into_error()))?;
    Ok(Some(bytes))
}
