use std::sync::Arc;

use {
    clap::Parser,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    comcore_mail::LogMailer,
    comcore_server::Server,
    comcore_store::MemStore,
};

#[derive(Parser)]
#[command(name = "comcore", about = "Comcore — group collaboration server")]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Address to bind to (overrides config value).
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on (overrides config value).
    #[arg(long)]
    port: Option<u16>,

    /// Config file path (overrides discovery).
    #[arg(long, env = "COMCORE_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Custom data directory (overrides config value).
    #[arg(long, env = "COMCORE_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    let mut config = match &cli.config {
        Some(path) => comcore_config::load_config(path)?,
        None => comcore_config::discover_and_load(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(dir) = cli.data_dir {
        config.data.dir = Some(dir);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "starting comcore");
    // Confirmation codes go to the log until a mail transport is wired in.
    let server = Server::new(config, Arc::new(MemStore::new()), Arc::new(LogMailer));
    server.run().await
}
