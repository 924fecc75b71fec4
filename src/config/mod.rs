//! Configuration management for lumen-rtc

use crate::hardware::HardwareTier;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Config file is not valid TOML for this schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// Semantically invalid value
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Frame source selection for the media pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureSourceKind {
    /// Synthetic moving test pattern
    #[default]
    TestPattern,
    /// Local camera picked by `camera_index`
    Camera,
    /// No device; every read fails and yields a blank frame
    None,
}

impl CaptureSourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureSourceKind::TestPattern => "test-pattern",
            CaptureSourceKind::Camera => "camera",
            CaptureSourceKind::None => "none",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Relay connection and room
    #[serde(default)]
    pub signaling: SignalingConfig,

    /// Session orchestration
    #[serde(default)]
    pub session: SessionConfig,

    /// Capture and processing
    #[serde(default)]
    pub media: MediaConfig,

    /// Hardware probe overrides
    #[serde(default)]
    pub hardware: HardwareConfig,

    /// WebRTC transport
    #[serde(default)]
    pub webrtc: WebRTCConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// Relay WebSocket URL
    #[serde(default = "default_signaling_url")]
    pub url: String,

    /// Room joined after connecting
    #[serde(default = "default_room")]
    pub room: String,

    /// Upper bound on the WebSocket handshake
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl SignalingConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: default_signaling_url(),
            room: default_room(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Delay between peerJoined and createOffer on the host side
    #[serde(default = "default_offer_grace_ms")]
    pub offer_grace_ms: u64,
}

impl SessionConfig {
    pub fn offer_grace(&self) -> Duration {
        Duration::from_millis(self.offer_grace_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            offer_grace_ms: default_offer_grace_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Frame width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Frame height in pixels
    #[serde(default = "default_height")]
    pub height: u32,

    /// Target frame rate
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// Timeout for a single capture read
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,

    /// Emit a performance log line every N frames
    #[serde(default = "default_perf_log_interval")]
    pub perf_log_interval: u64,

    /// Frame source
    #[serde(default)]
    pub source: CaptureSourceKind,

    /// Device index used by the camera source
    #[serde(default)]
    pub camera_index: u32,

    /// Write local preview snapshots
    #[serde(default)]
    pub preview_enabled: bool,

    /// Preview snapshot path
    #[serde(default = "default_preview_path")]
    pub preview_path: PathBuf,

    /// Write a snapshot every N frames
    #[serde(default = "default_preview_interval")]
    pub preview_interval: u64,
}

impl MediaConfig {
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            frame_rate: default_frame_rate(),
            capture_timeout_ms: default_capture_timeout_ms(),
            perf_log_interval: default_perf_log_interval(),
            source: CaptureSourceKind::TestPattern,
            camera_index: 0,
            preview_enabled: false,
            preview_path: default_preview_path(),
            preview_interval: default_preview_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// Skip classification and use this tier
    #[serde(default)]
    pub force_tier: Option<HardwareTier>,
}

/// ICE server entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

/// WebRTC transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebRTCConfig {
    /// STUN/TURN servers
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<IceServerConfig>,

    /// Stream id announced for the local video track
    #[serde(default = "default_stream_id")]
    pub stream_id: String,
}

impl Default for WebRTCConfig {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
            stream_id: default_stream_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.media.width == 0 || self.media.height == 0 {
            return Err(ConfigError::Invalid("Frame dimensions must be non-zero".into()));
        }

        if self.media.frame_rate == 0 {
            return Err(ConfigError::Invalid("Frame rate must be non-zero".into()));
        }

        if self.media.perf_log_interval == 0 {
            return Err(ConfigError::Invalid("Performance log interval must be non-zero".into()));
        }

        if self.media.preview_enabled && self.media.preview_interval == 0 {
            return Err(ConfigError::Invalid("Preview interval must be non-zero".into()));
        }

        if self.signaling.room.trim().is_empty() {
            return Err(ConfigError::Invalid("Room id must not be empty".into()));
        }

        let url = self.signaling.url.as_str();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::Invalid(format!(
                "Signaling url must use ws:// or wss://, got {}",
                url
            )));
        }

        if self.signaling.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid("Connect timeout must be non-zero".into()));
        }

        Ok(())
    }
}

fn default_signaling_url() -> String {
    "ws://127.0.0.1:3000/".to_string()
}

fn default_room() -> String {
    "test-room".to_string()
}

fn default_connect_timeout_secs() -> u64 { 10 }
fn default_offer_grace_ms() -> u64 { 1000 }
fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }
fn default_frame_rate() -> u32 { 15 }
fn default_capture_timeout_ms() -> u64 { 500 }
fn default_perf_log_interval() -> u64 { 30 }
fn default_preview_interval() -> u64 { 15 }

fn default_preview_path() -> PathBuf {
    PathBuf::from("lumen-preview.png")
}

fn default_ice_servers() -> Vec<IceServerConfig> {
    vec![IceServerConfig {
        urls: vec!["stun:stun.l.google.com:19302".to_string()],
        username: None,
        credential: None,
    }]
}

fn default_stream_id() -> String {
    "lumen-stream".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.media.width, 640);
        assert_eq!(cfg.media.height, 480);
        assert_eq!(cfg.media.frame_rate, 15);
        assert_eq!(cfg.signaling.room, "test-room");
    }

    #[test]
    fn validate_rejects_invalid_dimensions() {
        let mut cfg = Config::default();
        cfg.media.width = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_http_relay_url() {
        let mut cfg = Config::default();
        cfg.signaling.url = "http://localhost:3000".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_blank_room() {
        let mut cfg = Config::default();
        cfg.signaling.room = "  ".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg = Config::from_toml(
            r#"
            [signaling]
            room = "lobby"

            [hardware]
            force_tier = "GPU_ACCEL"

            [media]
            source = "none"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.signaling.room, "lobby");
        assert_eq!(cfg.signaling.connect_timeout_secs, 10);
        assert_eq!(cfg.hardware.force_tier, Some(HardwareTier::GpuAccel));
        assert_eq!(cfg.media.source, CaptureSourceKind::None);
        assert_eq!(cfg.media.frame_rate, 15);
    }

    #[test]
    fn camera_source_takes_an_index() {
        let cfg = Config::from_toml(
            r#"
            [media]
            source = "camera"
            camera_index = 1
            "#,
        )
        .unwrap();
        assert_eq!(cfg.media.source, CaptureSourceKind::Camera);
        assert_eq!(cfg.media.camera_index, 1);
        assert_eq!(Config::default().media.camera_index, 0);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load(Path::new("/nonexistent/lumen-rtc.toml")).unwrap();
        assert_eq!(cfg.session.offer_grace_ms, 1000);
    }
}
