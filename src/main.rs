use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use docsift::cli::{
    run_fetch, run_index, run_mcp_server, run_prune, run_search, run_status, Args, Command,
    Services,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays clean for results and the MCP channel.
    let default_level = if args.verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = args.config.as_deref();
    let db = args.db.as_deref();

    match args.command {
        Command::Index {
            path,
            no_embed,
            prune,
        } => {
            let services = Services::open(config, db)?;
            run_index(&services, &path, no_embed, prune).await
        }
        Command::Search { query, top_k, json } => {
            let services = Services::open_existing(config, db)?;
            run_search(&services, &query, top_k, json).await
        }
        Command::Fetch { id, json } => {
            let services = Services::open_existing(config, db)?;
            run_fetch(&services, id, json).await
        }
        Command::Status { json } => {
            let services = Services::open_existing(config, db)?;
            run_status(&services, json).await
        }
        Command::Prune => {
            let services = Services::open_existing(config, db)?;
            run_prune(&services).await
        }
        Command::Serve => {
            let services = Services::open(config, db)?;
            run_mcp_server(services).await
        }
    }
}
