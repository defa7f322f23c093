//! mkpc - pkg-config driven dylib relinking

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mkpc_cli::cmd;
use mkpc_cli::{Cli, Commands};

fn main() -> Result<()> {
    // Initialize logging; rewrites are reported at info level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let dry_run = cli.dry_run;

    match cli.command {
        Commands::Relink {
            root,
            editable,
            dist_roots,
            python,
            system_prefixes,
            pc_paths,
        } => cmd::relink::relink(&cmd::relink::RelinkArgs {
            root,
            editable,
            dist_roots,
            python,
            system_prefixes,
            pc_paths,
            dry_run,
        }),
        Commands::Inspect { paths } => cmd::inspect::inspect(&paths),
        Commands::Packages { root } => cmd::packages::packages(&root),
    }
}
