mod commands;
mod output;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Instrument GitHub Actions workflows and follow local runs live
#[derive(Parser, Debug)]
#[command(name = "detent", version, about, long_about = None)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Write logs to a file instead of stderr
    #[arg(long, value_name = "FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Instrument the workflow directory and report what would run
    Prepare(commands::prepare::PrepareArgs),

    /// Print the manifest of the workflow directory as JSON
    Manifest(commands::manifest::ManifestArgs),

    /// Instrument the workflows, run them and follow the run live
    Run(commands::run::RunArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let interactive = matches!(&cli.command, Commands::Run(args) if !args.plain);
    init_logging(cli.verbose, cli.log_file.as_deref(), interactive)?;
    debug!(verbose = cli.verbose, "detent started");

    let exit_code = match cli.command {
        Commands::Prepare(args) => {
            commands::prepare::execute(args).await?;
            0
        }
        Commands::Manifest(args) => {
            commands::manifest::execute(args)?;
            0
        }
        Commands::Run(args) => commands::run::execute(args).await?,
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over `-v`.
///
/// The live view owns the terminal, so without `RUST_LOG` or a log file
/// nothing is logged while it runs.
fn init_logging(verbose: u8, log_file: Option<&Path>, interactive: bool) -> Result<()> {
    let level = match verbose {
        _ if interactive && log_file.is_none() => "off",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_line_number(verbose >= 3);

    match log_file {
        Some(path) => {
            let file = File::create(path)
                .wrap_err_with(|| format!("failed to create log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}
