//! CLI entry point - the composition root.
//!
//! Infrastructure is wired in `bootstrap`; command dispatch routes to
//! handlers.

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use reverie_cli::{Cli, CliError, Commands, handlers};

/// Log to stderr; `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        // No command provided - show help
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Render(args) => handlers::render::execute(&args, &cli.backend).await,
        Commands::Config => handlers::config::execute(),
        Commands::Moods => handlers::moods::execute(),
    }
}

#[tokio::main]
async fn main() {
    // Load environment variables before clap reads its `env` fallbacks
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {err:#}");
        let code = err.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
        std::process::exit(code);
    }
}
