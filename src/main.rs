use anyhow::Result;
use clap::Parser;
use texweave::cli::{AppContext, Cli, Commands};
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
        Commands::Process(args) => texweave::process_run(args, &ctx),
        Commands::Root(args) => texweave::root_run(args, &ctx),
        Commands::Flatten(args) => texweave::flatten_run(args, &ctx),
        Commands::Tree(args) => texweave::tree_run(args, &ctx),
        Commands::Init(args) => texweave::infra::config::init(args, &ctx),
        Commands::Completions(args) => texweave::completion::run(args, &ctx),
    }
}

/// TEXWEAVE_LOG, then RUST_LOG, then `warn` (`info` with --verbose). Logs go to stderr.
fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env("TEXWEAVE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
