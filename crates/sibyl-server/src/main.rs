use std::path::PathBuf;

use clap::Parser;

use sibyl_server::{Result, Server, ServerConfig};

/// Natural-language-to-SQL query assistant service.
#[derive(Parser, Debug)]
#[command(name = "sibyl-server", version, about)]
struct Args {
    /// Path to a TOML config file (env vars with SIBYL__ prefix override).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ServerConfig::load(args.config.as_deref())?;
    let server = Server::new(config).await?;
    server.run().await
}
