use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use batch_review::commands::{self, ConfigAction, ReviewArgs, SqlArgs};
use batch_review::Config;

/// Review every source file under a directory with a Gemini model and
/// collect the answers into one HTML report.
#[derive(Debug, Parser)]
#[command(name = "batch-review", version, about)]
struct Cli {
    /// Config file (default: <config dir>/batch-review/config.toml).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Review source files and write an HTML report.
    Review(ReviewArgs),
    /// Generate BigQuery INSERT statements from transformation workbooks.
    Sql(SqlArgs),
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "batch_review=info",
        1 => "batch_review=debug",
        _ => "batch_review=trace",
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Review(args) => commands::run_review(config, args).await,
        Command::Sql(args) => commands::run_sql(config, args).await,
        Command::Config { action } => commands::run_config(&config, cli.config.as_deref(), action),
    }
}
