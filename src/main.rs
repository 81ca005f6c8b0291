use anyhow::Result;
use clap::Parser;
use stagecraft::cli::{AppContext, Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        dry_run: cli.dry_run,
    };

    match cli.command {
        Commands::Tree(args) => stagecraft::cli_ext::tree_cmd::run(args, &ctx),
        Commands::Manifests(args) => stagecraft::cli_ext::manifests_cmd::run(args, &ctx),
        Commands::Similar(args) => stagecraft::cli_ext::similar_cmd::run(args, &ctx),
        Commands::Extract(args) => stagecraft::cli_ext::extract_cmd::run(args, &ctx),
        Commands::Ingest(args) => stagecraft::cli_ext::ingest_cmd::run(args, &ctx),
        Commands::Init(args) => stagecraft::infra::config::init(args, &ctx),
        Commands::Completions(args) => stagecraft::completion::run(args),
    }
}

/// Logs go to stderr; `STAGECRAFT_LOG` takes precedence over `--verbose`.
fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_env("STAGECRAFT_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("stagecraft={fallback}")));

    // A second init (e.g. from tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
