// ABOUTME: Incremental sinks fed with fixed-size record batches during a fetch
// ABOUTME: SQLite upserts and append-only per-table CSV files

use crate::convert::cell_text;
use crate::db::SqliteSink;
use crate::model::Record;
use crate::storage::OutputDir;
use crate::Result;
use std::fs::OpenOptions;
use std::path::Path;

pub const BATCH_SIZE: usize = 100;

/// Appends `batch` to the CSV file at `path`.
///
/// A header row is written from the first record's keys only when the file
/// is absent or empty. Every row is laid out by the keys of the batch's first
/// record, never by the header already on disk, so a file whose columns
/// drift between batches (or between runs) ends up with rows that do not
/// line up with its header. Keys missing from a record become empty cells;
/// keys the first record lacks are dropped.
pub fn append_csv_batch(path: &Path, batch: &[Record]) -> Result<()> {
    let Some(first) = batch.first() else {
        return Ok(());
    };
    let columns: Vec<&String> = first.keys().collect();

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let is_empty = file.metadata()?.len() == 0;

    let mut writer = csv::Writer::from_writer(file);
    if is_empty {
        writer.write_record(&columns)?;
    }
    for record in batch {
        writer.write_record(
            columns
                .iter()
                .map(|key| record.get(*key).map(cell_text).unwrap_or_default()),
        )?;
    }
    writer.flush()?;
    Ok(())
}

pub struct CsvAppendSink {
    out: OutputDir,
}

impl CsvAppendSink {
    pub fn new(out: OutputDir) -> Self {
        CsvAppendSink { out }
    }

    pub fn append(&self, table: &str, batch: &[Record]) -> Result<()> {
        append_csv_batch(&self.out.table_path(table, "csv"), batch)
    }
}

/// A destination that accepts batches while a table is still being fetched.
pub enum Sink {
    Sqlite(SqliteSink),
    CsvAppend(CsvAppendSink),
}

impl Sink {
    pub fn write_batch(&mut self, table: &str, batch: &[Record]) -> Result<()> {
        match self {
            Sink::Sqlite(db) => db.upsert(table, batch),
            Sink::CsvAppend(csv) => csv.append(table, batch),
        }
    }
}

/// Groups records into fixed-size batches and hands each one to every sink.
pub struct BatchDispatcher {
    sinks: Vec<Sink>,
    batch_size: usize,
    pending: Vec<Record>,
    flushes: usize,
}

impl BatchDispatcher {
    pub fn new(sinks: Vec<Sink>) -> Self {
        Self::with_batch_size(sinks, BATCH_SIZE)
    }

    pub fn with_batch_size(sinks: Vec<Sink>, batch_size: usize) -> Self {
        BatchDispatcher {
            sinks,
            batch_size: batch_size.max(1),
            pending: Vec::with_capacity(batch_size),
            flushes: 0,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn push(&mut self, table: &str, record: &Record) -> Result<()> {
        if self.is_noop() {
            return Ok(());
        }
        self.pending.push(record.clone());
        if self.pending.len() >= self.batch_size {
            self.flush(table)?;
        }
        Ok(())
    }

    /// Flushes whatever is pending for `table`, even an empty batch.
    pub fn finish(&mut self, table: &str) -> Result<()> {
        if self.is_noop() {
            return Ok(());
        }
        self.flush(table)
    }

    fn flush(&mut self, table: &str) -> Result<()> {
        tracing::trace!(table, size = self.pending.len(), "flushing batch");
        for sink in &mut self.sinks {
            sink.write_batch(table, &self.pending)?;
        }
        self.pending.clear();
        self.flushes += 1;
        Ok(())
    }

    /// Number of batches handed to the sinks so far.
    pub fn flushes(&self) -> usize {
        self.flushes
    }
}
