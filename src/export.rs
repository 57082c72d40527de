// ABOUTME: Export orchestration for one base, table by table
// ABOUTME: Drives fetch → normalize → batch sinks → bulk encoders and reports counts

use crate::{
    api::ApiClient,
    convert::normalize_record,
    db::SqliteSink,
    encode::{schema_json, Formats},
    model::{table_names, Record},
    sink::{BatchDispatcher, CsvAppendSink, Sink},
    storage::{remove_if_exists, write_atomic, OutputDir},
    Result,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    pub base_id: String,
    /// Tables to export; empty means every table in the base schema.
    pub tables: Vec<String>,
    pub formats: Formats,
    pub sqlite: Option<PathBuf>,
    /// Write `_schema.json` even when tables were named explicitly.
    pub schema: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSummary {
    pub table: String,
    pub records: usize,
    pub files: Vec<PathBuf>,
}

impl TableSummary {
    pub fn message(&self) -> String {
        let files: Vec<String> = self.files.iter().map(|p| p.display().to_string()).collect();
        format!(
            "Wrote {} record{} to {}",
            self.records,
            if self.records == 1 { "" } else { "s" },
            files.join(", ")
        )
    }
}

fn build_sinks(out: &OutputDir, opts: &ExportOptions) -> Result<Vec<Sink>> {
    let mut sinks = Vec::new();
    if let Some(path) = &opts.sqlite {
        sinks.push(Sink::Sqlite(SqliteSink::open(path)?));
    }
    if opts.formats.csv {
        sinks.push(Sink::CsvAppend(CsvAppendSink::new(out.clone())));
    }
    Ok(sinks)
}

fn progress(verbose: bool, table: &str) -> ProgressBar {
    if !verbose {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}: {pos} records") {
        pb.set_style(style);
    }
    pb.set_message(table.to_string());
    pb
}

/// Exports every requested table of the base. Stops at the first error;
/// tables already written stay on disk.
pub fn export_base(client: &ApiClient, opts: &ExportOptions) -> Result<Vec<TableSummary>> {
    let out = OutputDir::new(&opts.output_dir);
    out.ensure()?;

    let formats = opts.formats.with_default(opts.sqlite.is_some());

    let mut tables = opts.tables.clone();
    if tables.is_empty() || opts.schema {
        let schema = client.list_tables(&opts.base_id)?;
        write_atomic(&out.schema_path(), schema_json(&schema)?.as_bytes())?;
        if tables.is_empty() {
            tables = table_names(&schema);
        }
        tracing::debug!(base = %opts.base_id, tables = tables.len(), "schema written");
    }

    let mut dispatcher = BatchDispatcher::new(build_sinks(&out, opts)?);

    let mut summaries = Vec::with_capacity(tables.len());
    for table in &tables {
        let summary = export_table(client, opts, &out, &formats, &mut dispatcher, table)?;
        if opts.verbose {
            eprintln!("{}", summary.message());
        }
        summaries.push(summary);
    }

    Ok(summaries)
}

fn export_table(
    client: &ApiClient,
    opts: &ExportOptions,
    out: &OutputDir,
    formats: &Formats,
    dispatcher: &mut BatchDispatcher,
    table: &str,
) -> Result<TableSummary> {
    let pb = progress(opts.verbose, table);

    let mut records: Vec<Record> = Vec::new();
    for raw in client.records(&opts.base_id, table) {
        let record = normalize_record(raw?);
        dispatcher.push(table, &record)?;
        records.push(record);
        pb.inc(1);
    }
    dispatcher.finish(table)?;
    pb.finish_and_clear();

    let mut files = Vec::new();
    for format in formats.enabled() {
        let path = out.table_path(table, format.extension());
        let Some(bytes) = format.encode(&records)? else {
            // A file from an earlier run must not outlive an empty table
            tracing::debug!(table, format = format.extension(), "nothing to write");
            remove_if_exists(&path)?;
            continue;
        };
        write_atomic(&path, &bytes)?;
        files.push(path);
    }

    Ok(TableSummary {
        table: table.to_string(),
        records: records.len(),
        files,
    })
}
