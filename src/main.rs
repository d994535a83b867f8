mod content_scanner;
mod enumerator;
mod logging;
mod mail_reader;
mod settings;
mod telemetry;
mod web;


use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(name = "mail-scanner", about = "A utility to scan mailboxes for security issues")]
struct Cli {
    #[clap(long, default_value = settings::DEFAULT_SETTINGS_PATH)]
    config: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the API and the front end
    Serve,
    /// Scan the authorized mailbox for messages containing links
    Scan,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = settings::load_settings(&cli.config)?;
    logging::setup_logging(&config.logging)?;

    match cli.command {
        Command::Serve => web::entrypoint(&config).await,
        Command::Scan => mail_reader::main(&config).await,
    }
}
