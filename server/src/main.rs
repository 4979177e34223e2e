use clap::Parser;
use log::{error, info};
use server::catalog::SpecCatalog;
use server::network::{Server, ServerConfig};
use server::rules::GameRules;
use server::store::JsonStore;
use std::path::PathBuf;
use std::sync::Arc;

/// Command line arguments for the game server
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,
    /// Directory holding troops.json, towers.json and an optional rules.json
    #[clap(short, long, default_value = "configs")]
    configs: PathBuf,
    /// Directory for player profiles and credentials
    #[clap(short, long, default_value = "data")]
    data: PathBuf,
    /// Match time limit in seconds, 0 disables it. Overrides rules.json
    #[clap(short, long)]
    match_time_limit: Option<u64>,
    /// Seed for match randomness, for reproducible games
    #[clap(short, long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let catalog = SpecCatalog::load(&args.configs)?;
    let mut rules = GameRules::load_or_default(&args.configs.join("rules.json"))?;
    if let Some(limit) = args.match_time_limit {
        rules.match_duration_secs = limit;
    }
    let store = Arc::new(JsonStore::open(&args.data)?);
    info!(
        "Data directory {}, match time limit {}s",
        args.data.display(),
        rules.match_duration_secs
    );

    let config = ServerConfig {
        catalog: Arc::new(catalog),
        rules: Arc::new(rules),
        profiles: store.clone(),
        credentials: store,
        seed: args.seed,
    };

    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
