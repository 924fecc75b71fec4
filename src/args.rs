use clap::Parser;
use std::path::PathBuf;

use crate::config::{self, CaptureSourceKind, Config, ConfigError};
use crate::session::Role;

#[derive(Parser, Debug)]
#[command(name = "lumen-rtc")]
#[command(author = "LumenRTC Team")]
#[command(version)]
#[command(about = "Room-based peer-to-peer WebRTC video sessions", long_about = None)]
pub struct Args {
    /// Session role: the host sends the offer, the joiner answers
    #[arg(value_enum, ignore_case = true, default_value_t = Role::Joiner)]
    pub role: Role,

    /// Configuration file path
    #[arg(short, long, default_value = "lumen-rtc.toml")]
    pub config: PathBuf,

    /// Room to join (overrides config)
    #[arg(long)]
    pub room: Option<String>,

    /// Relay URL (overrides config)
    #[arg(long)]
    pub url: Option<String>,

    /// Interactive chat console on stdin
    #[arg(long, action)]
    pub chat: bool,

    /// Display name for chat messages
    #[arg(long)]
    pub name: Option<String>,

    /// Capture from this camera instead of the configured source
    #[arg(long, value_name = "INDEX")]
    pub camera: Option<u32>,

    /// Write preview snapshots
    #[arg(long, action)]
    pub preview: bool,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl Args {
    /// Load the config file, then apply command line overrides
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let mut config = config::Config::load(&self.config)?;
        self.apply_overrides(&mut config);
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(room) = &self.room {
            config.signaling.room = room.clone();
        }
        if let Some(url) = &self.url {
            config.signaling.url = url.clone();
        }
        if let Some(index) = self.camera {
            config.media.source = CaptureSourceKind::Camera;
            config.media.camera_index = index;
        }
        if self.preview {
            config.media.preview_enabled = true;
        }
    }

    /// Chat name, defaulting to the role
    pub fn chat_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.role.to_string())
    }
}
