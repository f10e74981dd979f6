mod catalogue;
mod cmd_generate;
mod cmd_plugins;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "chlog", version, about = "Changelogs from git history or GitHub issues")]
struct Cli {
    /// Debug-level logging on stderr
    #[arg(long, global = true)]
    debug: bool,
    /// Info-level logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a changelog from a source through a renderer
    Generate(cmd_generate::GenerateArgs),
    /// List available sources and renderers
    Plugins {
        /// Show identities without stripping the capability suffix
        #[arg(long)]
        full_names: bool,
    },
}

/// `CHLOG_LOG` wins; otherwise `--debug`, `--verbose`, or warnings only.
fn init_tracing(debug: bool, verbose: bool) {
    let base_filter = match std::env::var("CHLOG_LOG") {
        Ok(filter) => filter,
        Err(_) if debug => "debug".to_string(),
        Err(_) if verbose => "info".to_string(),
        Err(_) => "warn".to_string(),
    };
    let filter = EnvFilter::try_new(&base_filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(debug)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug, cli.verbose);

    match cli.cmd {
        Command::Generate(args) => cmd_generate::execute(&args),
        Command::Plugins { full_names } => cmd_plugins::execute(full_names),
    }
}
