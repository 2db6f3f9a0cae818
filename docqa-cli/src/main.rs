//! `docqa`: build an index from a document and answer questions about it.

mod args;
mod commands;

use anyhow::Result;
use clap::Parser;

use crate::args::{Cli, Command};

const SERVICE_NAME: &str = "docqa";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match (&cli.otlp_endpoint, cli.log_json) {
        (Some(endpoint), _) => docqa_telemetry::init_with_otlp(SERVICE_NAME, endpoint)?,
        (None, true) => docqa_telemetry::init_json_telemetry(SERVICE_NAME)?,
        (None, false) => docqa_telemetry::init_telemetry(SERVICE_NAME)?,
    }

    let result = match cli.command {
        Command::Index(args) => commands::index(args).await,
        Command::Ask(args) => commands::ask(args).await,
        Command::Chat(args) => commands::chat(args).await,
    };

    if cli.otlp_endpoint.is_some() {
        docqa_telemetry::shutdown_telemetry();
    }
    result
}
