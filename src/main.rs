// ABOUTME: CLI entrypoint for airtable-export command
// ABOUTME: Sets up logging, handles error exit codes, and runs the export

use airtable_export::{api::ApiClient, auth::resolve_key, cli::Cli, export::export_base, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("airtable_export=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("airtable-export: [E{}] {}", e.exit_code(), e);
        std::process::exit(e.exit_code());
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let key = resolve_key(cli.key.clone())?;
    let mut client = ApiClient::new(key, Some(cli.api_base.clone()), cli.read_timeout())?;

    if let Some(user_agent) = &cli.user_agent {
        client = client.with_user_agent(user_agent.clone());
    }
    if cli.no_throttle {
        client = client.disable_throttle();
    }

    export_base(&client, &cli.export_options())?;

    Ok(())
}
