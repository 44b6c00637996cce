use std::io::Read as _;

use anyhow::Context;
use clap::Parser;

mod bootstrap;
mod cli;
mod output;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("stagectl error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    let service = bootstrap::open_service(&cli).await?;

    match &cli.command {
        Commands::Stage { payload } => {
            let text = read_input(payload.as_deref())?;
            let value: serde_json::Value = serde_json::from_str(&text).context("payload is not valid JSON")?;
            let response = service.stage(&value).await?;
            output::print(&response, cli.format)
        }
        Commands::Query { sql } => {
            let text = match sql {
                Some(s) => s.clone(),
                None => read_input(None)?,
            };
            match service.query(&text).await? {
                Ok(response) => output::print(&response, cli.format),
                Err(failure) => output::print(&failure, cli.format),
            }
        }
        Commands::Introspect => {
            let response = service.introspect().await?;
            output::print(&response, cli.format)
        }
        Commands::TableColumns { table } => {
            let response = service.table_columns(table).await?;
            output::print(&response, cli.format)
        }
        Commands::ChunkingStats => {
            let response = service.chunking_stats().await?;
            output::print(&response, cli.format)
        }
        Commands::Delete { yes } => {
            if !yes && !confirm_delete()? {
                println!("aborted");
                return Ok(());
            }
            service.delete_all().await?;
            println!("compartment dropped");
            Ok(())
        }
    }
}

fn read_input(path: Option<&std::path::Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn confirm_delete() -> anyhow::Result<bool> {
    eprint!("This drops every table in the compartment. Continue? [y/N] ");
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer).context("failed to read confirmation")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("STAGE_LOG").unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialise tracing subscriber: {error}"))?;

    Ok(())
}
