use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Top-level CLI parser for the `stagectl` binary.
#[derive(Debug, Parser)]
#[command(name = "stagectl", version, about = "JSON-to-relational staging engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the libsql database file (default: in-memory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Path to a TOML config file layered under `STAGE_*` env vars
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to an optional schema descriptor file (`spec.md` C4 grammar)
    #[arg(long, global = true)]
    pub descriptor: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Raw,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Stage a JSON payload: infer schema, create tables, insert rows.
    Stage {
        /// Path to a JSON payload file; reads stdin if omitted.
        payload: Option<PathBuf>,
    },
    /// Run a read-only analytic SQL query against the compartment.
    Query {
        /// SQL text. If omitted, read from stdin.
        sql: Option<String>,
    },
    /// Summarise every table/view in the compartment.
    Introspect,
    /// Column metadata for a single table.
    TableColumns {
        /// Table name.
        table: String,
    },
    /// Aggregate chunk-store statistics.
    ChunkingStats,
    /// Drop every table/view in the compartment.
    Delete {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::{Cli, Commands, OutputFormat};

    #[test]
    fn clap_command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_before_subcommand() {
        let cli = Cli::try_parse_from(["stagectl", "--format", "raw", "--verbose", "introspect"]).expect("cli should parse");
        assert_eq!(cli.format, OutputFormat::Raw);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Introspect));
    }

    #[test]
    fn stage_accepts_optional_payload_path() {
        let cli = Cli::try_parse_from(["stagectl", "stage"]).expect("cli should parse");
        assert!(matches!(cli.command, Commands::Stage { payload: None }));

        let cli = Cli::try_parse_from(["stagectl", "stage", "payload.json"]).expect("cli should parse");
        assert!(matches!(cli.command, Commands::Stage { payload: Some(_) }));
    }

    #[test]
    fn delete_requires_explicit_yes_flag_to_skip_prompt() {
        let cli = Cli::try_parse_from(["stagectl", "delete"]).expect("cli should parse");
        assert!(matches!(cli.command, Commands::Delete { yes: false }));
    }
}
