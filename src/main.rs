use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::info;

use mdvdb::config::Config;
use mdvdb::Engine;

/// One-shot full reindex of a markdown notes space.
#[derive(Parser)]
#[command(name = "init-index", about)]
struct Cli {
    /// Wipe the graph first, forcing every file to be re-embedded.
    #[arg(long)]
    rebuild: bool,

    /// Notes space root (overrides SPACE_PATH).
    #[arg(long)]
    space_path: Option<PathBuf>,

    /// Graph store directory (overrides DB_PATH).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Skip embedding calls; index structure only.
    #[arg(long)]
    no_embeddings: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    mdvdb::logging::init(cli.verbose)?;

    let cwd = std::env::current_dir()?;
    let mut config = Config::load(&cwd)?;
    if let Some(space_path) = cli.space_path {
        config.space_path = space_path;
    }
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }
    if cli.no_embeddings {
        config.enable_embeddings = false;
    }

    let engine = Engine::open_with_config(config)?;

    if cli.rebuild {
        info!("rebuild requested, clearing existing graph");
        engine.clear_all()?;
    }

    engine.reindex_all().await?;
    let status = engine.status();
    info!(chunks = status.chunk_count, "index build complete");

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {:#}", e);
        process::exit(1);
    }
}
