//! lumen-relay - development room relay

use clap::Parser;
use log::{error, info};
use lumen_rtc::relay::{RelayServer, DEFAULT_BIND};

#[derive(Parser, Debug)]
#[command(name = "lumen-relay")]
#[command(version)]
#[command(about = "Minimal room relay for local LumenRTC sessions", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = DEFAULT_BIND)]
    bind: String,

    /// Verbose logging
    #[arg(short, long, action)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::new()
        .parse_filters(&std::env::var("LUMEN_LOG").unwrap_or_else(|_| log_level.to_string()))
        .init();

    info!("lumen-relay v{}", env!("CARGO_PKG_VERSION"));
    let server = RelayServer::bind(&args.bind).await?;
    tokio::select! {
        result = server.run() => {
            if let Err(e) = &result {
                error!("Relay stopped: {}", e);
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => info!("Relay shutting down"),
    }
    Ok(())
}
