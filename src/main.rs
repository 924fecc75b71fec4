//! lumen-rtc - main entry point

use clap::Parser;
use log::{error, info};
use lumen_rtc::args::Args;
use lumen_rtc::SessionController;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", args.config.display(), e);
            return Err(e.into());
        }
    };

    // Noise filtering for third-party WebRTC crates
    let log_level = if args.verbose { "debug".to_string() } else { config.logging.level.clone() };
    env_logger::Builder::new()
        .parse_filters(&std::env::var("LUMEN_LOG").unwrap_or(log_level))
        .filter_module("webrtc_ice", log::LevelFilter::Error)
        .filter_module("webrtc_dtls", log::LevelFilter::Error)
        .filter_module("webrtc_mdns", log::LevelFilter::Error)
        .filter_module("webrtc_srtp", log::LevelFilter::Error)
        .init();

    info!("lumen-rtc v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e.into());
    }
    info!(
        "Room {} via {} ({}x{}@{}fps)",
        config.signaling.room, config.signaling.url, config.media.width, config.media.height, config.media.frame_rate
    );

    let mut controller = SessionController::new(config, args.role);
    if args.chat {
        controller = controller.with_chat(args.chat_name());
    }

    match controller.run().await {
        Ok(summary) => {
            info!(
                "Session ended: {} frames ({} substituted), {} offers, {} answers",
                summary.media.total_frames,
                summary.media.substituted_frames,
                summary.negotiation.offers_sent,
                summary.negotiation.answers_sent
            );
            Ok(())
        }
        Err(e) => {
            error!("Session failed: {}", e);
            Err(e.into())
        }
    }
}
