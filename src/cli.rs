// ABOUTME: Command-line interface definitions using clap
// ABOUTME: Positional output dir/base/tables plus format and sink flags

use crate::api::DEFAULT_API_BASE;
use crate::encode::Formats;
use crate::export::ExportOptions;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "airtable-export")]
#[command(about = "Export Airtable data to YAML file on disk", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Directory to write exported files into
    pub output_path: PathBuf,

    /// Airtable base ID
    pub base_id: String,

    /// Tables to export (default: every table in the base)
    pub tables: Vec<String>,

    /// Airtable API key (falls back to AIRTABLE_KEY)
    #[arg(long)]
    pub key: Option<String>,

    /// Timeout (in seconds) for network read operations
    #[arg(long)]
    pub http_read_timeout: Option<u64>,

    /// User agent to use for requests
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// JSON format
    #[arg(long)]
    pub json: bool,

    /// Newline delimited JSON format
    #[arg(long)]
    pub ndjson: bool,

    /// YAML format (default)
    #[arg(long)]
    pub yaml: bool,

    /// CSV format
    #[arg(long)]
    pub csv: bool,

    /// Export to this SQLite database
    #[arg(long, value_name = "PATH")]
    pub sqlite: Option<PathBuf>,

    /// Save Airtable schema to output_path/_schema.json
    #[arg(long)]
    pub schema: bool,

    /// API base URL
    #[arg(long, default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Disable the pause between result pages (not recommended)
    #[arg(long)]
    pub no_throttle: bool,
}

impl Cli {
    pub fn read_timeout(&self) -> Option<Duration> {
        self.http_read_timeout.map(Duration::from_secs)
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            output_dir: self.output_path.clone(),
            base_id: self.base_id.clone(),
            tables: self.tables.clone(),
            formats: Formats {
                json: self.json,
                ndjson: self.ndjson,
                yaml: self.yaml,
                csv: self.csv,
            },
            sqlite: self.sqlite.clone(),
            schema: self.schema,
            verbose: self.verbose,
        }
    }
}
