use std::path::Path;

use anyhow::Context;
use stage_config::StageConfig;
use stage_db::{Compartment, StagingService};
use stage_schema::ParsedDescriptor;

use crate::cli::Cli;

/// Open the compartment named by `--db` (or an in-memory one) and build the
/// [`StagingService`] facade over it, loading config and an optional schema
/// descriptor from the paths named on the CLI.
pub async fn open_service(cli: &Cli) -> anyhow::Result<StagingService> {
    let config = StageConfig::load(cli.config.as_deref()).context("failed to load staging configuration")?;
    let descriptor = load_descriptor(cli.descriptor.as_deref());

    let compartment = match cli.db.as_deref() {
        Some(path) => Compartment::open_file(&path.display().to_string())
            .await
            .with_context(|| format!("failed to open database at {}", path.display()))?,
        None => Compartment::open_in_memory().await.context("failed to open in-memory database")?,
    };

    StagingService::new(compartment.into_connection(), config.chunking, descriptor)
        .await
        .map_err(anyhow::Error::from)
        .context("failed to initialise staging service")
}

/// Read and parse the descriptor file at `path`, if any. A missing file, a
/// read failure, or a parse error all degrade to `None` (pure structural
/// inference) rather than aborting the CLI — matching `spec.md` C4's
/// "informative only" contract.
fn load_descriptor(path: Option<&Path>) -> Option<ParsedDescriptor> {
    let path = path?;
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "failed to read descriptor file, falling back to structural inference");
            return None;
        }
    };
    match stage_schema::descriptor::parse(&source) {
        Ok(descriptor) => Some(descriptor),
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "failed to parse descriptor file, falling back to structural inference");
            None
        }
    }
}
