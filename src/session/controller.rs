//! Session controller
//!
//! Startup order: probe hardware, build the signaling channel and the
//! negotiation coordinator, wire subscriptions, attach the media pipeline to
//! the transport, connect. Every event (signaling, ICE, console, the host's
//! offer timer) is handled on one loop, so negotiation and room state are
//! never touched concurrently. Shutdown closes signaling, then the
//! transport, then releases the media pipeline.

use super::chat::{self, ChatCommand};
use super::{Role, SessionError};
use crate::capture::{open_source, FrameStats};
use crate::config::{Config, HardwareConfig};
use crate::hardware::{self, HardwareProfile};
use crate::media::{MediaPipeline, PipelineConfig, SnapshotPreview};
use crate::signaling::{MessageKind, RoomSession, SignalMessage, SignalSender, SignalingChannel};
use crate::webrtc::{
    IceConnectionState, NegotiationCoordinator, NegotiationOutcome, NegotiationStats, TrackSpec,
    TransportError, TransportSession,
};
use log::{debug, error, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};

/// Input to the session loop
#[derive(Debug)]
pub enum SessionEvent {
    Signal(SignalMessage),
    IceState(IceConnectionState),
    Chat(ChatCommand),
    /// The relay dropped the connection
    SignalingLost,
}

/// What the session did before it stopped
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub profile: HardwareProfile,
    pub media: FrameStats,
    pub negotiation: NegotiationStats,
    pub signaling_connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Top-level orchestration for one process
pub struct SessionController {
    config: Config,
    role: Role,
    chat_name: Option<String>,
}

impl SessionController {
    pub fn new(config: Config, role: Role) -> Self {
        Self {
            config,
            role,
            chat_name: None,
        }
    }

    /// Enable the terminal chat console under `name`
    pub fn with_chat(mut self, name: impl Into<String>) -> Self {
        self.chat_name = Some(name.into());
        self
    }

    /// Run until Ctrl+C (or `/quit`)
    pub async fn run(self) -> Result<SessionSummary, SessionError> {
        let transport = crate::webrtc::create_transport(&self.config.webrtc).await?;
        self.run_with(transport, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for interrupt: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Interrupt received");
        })
        .await
    }

    /// Run on a given transport until `shutdown` resolves
    pub async fn run_with<F>(self, transport: Arc<dyn TransportSession>, shutdown: F) -> Result<SessionSummary, SessionError>
    where
        F: Future<Output = ()>,
    {
        let config = &self.config;
        info!("Starting as {}", self.role);

        let profile = probe_profile(&config.hardware);
        info!(
            "Hardware: {} ({} cores{})",
            profile.tier.description(),
            profile.cpu_cores,
            profile
                .accelerator_name
                .as_deref()
                .map(|name| format!(", {}", name))
                .unwrap_or_default()
        );

        // The one startup failure that is fatal: no capture device at all
        let source = open_source(&config.media)?;

        let channel = Arc::new(SignalingChannel::new(
            config.signaling.room.clone(),
            config.signaling.connect_timeout(),
        ));
        let negotiation = NegotiationCoordinator::new(transport.clone(), channel.clone());

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        for kind in [
            MessageKind::PeerJoined,
            MessageKind::PeerLeft,
            MessageKind::Offer,
            MessageKind::Answer,
            MessageKind::Candidate,
            MessageKind::HardwareInfo,
            MessageKind::ChatMessage,
        ] {
            let tx = events_tx.clone();
            channel.subscribe(kind, move |message| {
                let _ = tx.send(SessionEvent::Signal(message));
            });
        }
        let lost_tx = events_tx.clone();
        channel.on_disconnect(move || {
            let _ = lost_tx.send(SessionEvent::SignalingLost);
        });
        forward_ice_state(transport.as_ref(), events_tx.clone());

        let sink = transport
            .add_track(&TrackSpec {
                stream_id: config.webrtc.stream_id.clone(),
                width: config.media.width,
                height: config.media.height,
                frame_rate: config.media.frame_rate,
            })
            .await?;
        let mut pipeline = MediaPipeline::new(PipelineConfig::from(&config.media), &profile, source);
        if config.media.preview_enabled {
            pipeline = pipeline.with_preview(Box::new(SnapshotPreview::new(
                config.media.preview_path.clone(),
                config.media.preview_interval,
            )));
        }
        let (media_stop, media_stop_rx) = watch::channel(false);
        let media_task = tokio::spawn(pipeline.run(sink, media_stop_rx));

        let room = match channel.connect(&config.signaling.url).await {
            Ok(room) => {
                channel.send(SignalMessage::HardwareInfo { specs: profile.clone() });
                Some(room)
            }
            Err(e) => {
                error!("Signaling unavailable ({}); running without it", e);
                None
            }
        };
        let signaling_connected = room.is_some();

        if let Some(name) = &self.chat_name {
            chat::print_banner(name, &config.signaling.room);
            if let Err(e) = chat::spawn_console(events_tx.clone()) {
                warn!("Chat console unavailable: {}", e);
            }
        }
        drop(events_tx);

        match (self.role, signaling_connected) {
            (Role::Host, true) => info!("Waiting for a peer to join..."),
            (Role::Joiner, true) => info!("Joined room, waiting for an offer..."),
            _ => {}
        }

        let mut core = SessionCore {
            role: self.role,
            profile,
            signals: channel.clone(),
            negotiation,
            room,
            offer_grace: config.session.offer_grace(),
            offer_deadline: None,
            chat_name: self.chat_name.clone(),
        };

        tokio::pin!(shutdown);
        loop {
            let deadline = core.offer_deadline;
            tokio::select! {
                _ = &mut shutdown => break,
                event = events_rx.recv() => match event {
                    Some(event) => {
                        if core.handle_event(event).await == Flow::Stop {
                            break;
                        }
                    }
                    None => break,
                },
                _ = offer_timer(deadline) => core.offer_due().await,
            }
        }

        info!("Shutting down");
        channel.close().await;
        if let Err(e) = core.negotiation.close().await {
            warn!("Transport close failed: {}", e);
        }
        let _ = media_stop.send(true);
        let media = match media_task.await {
            Ok(stats) => stats,
            Err(e) => {
                error!("Media pipeline task failed: {}", e);
                FrameStats::default()
            }
        };

        Ok(SessionSummary {
            profile: core.profile,
            media,
            negotiation: core.negotiation.stats().clone(),
            signaling_connected,
        })
    }
}

fn probe_profile(config: &HardwareConfig) -> HardwareProfile {
    let profile = hardware::probe();
    match config.force_tier {
        Some(tier) if tier != profile.tier => {
            info!("Hardware tier forced to {} (probed {})", tier, profile.tier);
            profile.with_tier(tier)
        }
        _ => profile,
    }
}

async fn offer_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// State owned by the session loop
struct SessionCore {
    role: Role,
    profile: HardwareProfile,
    signals: Arc<dyn SignalSender>,
    negotiation: NegotiationCoordinator,
    room: Option<RoomSession>,
    offer_grace: Duration,
    offer_deadline: Option<Instant>,
    chat_name: Option<String>,
}

impl SessionCore {
    async fn handle_event(&mut self, event: SessionEvent) -> Flow {
        match event {
            SessionEvent::Signal(message) => {
                self.handle_signal(message).await;
                Flow::Continue
            }
            SessionEvent::IceState(state) => {
                info!("ICE connection state: {}", state);
                Flow::Continue
            }
            SessionEvent::Chat(command) => self.handle_chat(command).await,
            SessionEvent::SignalingLost => {
                self.signaling_lost();
                Flow::Continue
            }
        }
    }

    async fn handle_signal(&mut self, message: SignalMessage) {
        match message {
            SignalMessage::PeerJoined { user_id } => self.peer_joined(&user_id),
            SignalMessage::PeerLeft { user_id } => {
                if let Some(room) = self.room.as_mut() {
                    if room.peer_left(&user_id) {
                        info!("Peer {} left ({} remaining)", user_id, room.peer_count());
                    }
                }
            }
            SignalMessage::Offer { sdp } => {
                if self.chat_name.is_some() {
                    chat::print_notice("Incoming video call, accepting.");
                }
                let result = self.negotiation.handle_offer(sdp).await;
                self.log_outcome("offer", result);
            }
            SignalMessage::Answer { sdp } => {
                let result = self.negotiation.handle_answer(sdp).await;
                self.log_outcome("answer", result);
            }
            SignalMessage::Candidate { candidate } => self.negotiation.handle_candidate(&candidate),
            SignalMessage::HardwareInfo { specs } => {
                info!(
                    "Peer hardware: {} ({} cores, accelerator {})",
                    specs.tier,
                    specs.cpu_cores,
                    specs.accelerator_name.as_deref().unwrap_or("none")
                );
            }
            SignalMessage::ChatMessage { sender, message } => {
                if self.chat_name.as_deref() == Some(sender.as_str()) {
                    return;
                }
                if self.chat_name.is_some() {
                    chat::print_incoming(&sender, &message);
                } else {
                    info!("Chat from {}: {}", sender, message);
                }
            }
            SignalMessage::Join { .. } => debug!("Ignoring inbound join"),
        }
    }

    fn peer_joined(&mut self, user_id: &str) {
        if let Some(room) = self.room.as_mut() {
            if room.is_local(user_id) {
                debug!("Ignoring our own join");
                return;
            }
            room.peer_joined(user_id);
        }
        info!("Peer {} joined", user_id);
        if self.chat_name.is_some() {
            chat::print_notice(&format!("User {} joined the room.", user_id));
        }

        self.signals.send(SignalMessage::HardwareInfo {
            specs: self.profile.clone(),
        });

        if self.role.is_initiator() {
            info!("Calling {} in {:?}", user_id, self.offer_grace);
            self.offer_deadline = Some(Instant::now() + self.offer_grace);
        }
    }

    fn signaling_lost(&mut self) {
        if let Some(room) = self.room.take() {
            warn!(
                "Lost relay connection; left room {} ({} peers), running without signaling",
                room.room_id,
                room.peer_count()
            );
        }
        self.offer_deadline = None;
        if self.chat_name.is_some() {
            chat::print_notice("Disconnected from the relay.");
        }
    }

    async fn offer_due(&mut self) {
        self.offer_deadline = None;
        let result = self.negotiation.create_offer().await;
        self.log_outcome("offer creation", result);
    }

    async fn handle_chat(&mut self, command: ChatCommand) -> Flow {
        match command {
            ChatCommand::Say(text) => {
                let sender = self.chat_name.clone().unwrap_or_default();
                if !self.signals.is_connected() {
                    chat::print_notice("Not connected to the relay; message not sent.");
                }
                self.signals.send(SignalMessage::ChatMessage { sender, message: text });
            }
            ChatCommand::Call => {
                chat::print_notice("Starting video call...");
                let result = self.negotiation.create_offer().await;
                if let Ok(NegotiationOutcome::Discarded(reason)) = &result {
                    chat::print_notice(&format!("Cannot call now: {}", reason));
                }
                self.log_outcome("offer creation", result);
            }
            ChatCommand::Peers => match &self.room {
                Some(room) if room.peer_count() > 0 => {
                    chat::print_notice(&format!("Peers in {}: {}", room.room_id, room.remote_peers().join(", ")))
                }
                Some(room) => chat::print_notice(&format!("No other peers in {}", room.room_id)),
                None => chat::print_notice("Not in a room"),
            },
            ChatCommand::Quit => {
                chat::print_notice("Exiting...");
                return Flow::Stop;
            }
            ChatCommand::Unknown(command) => {
                chat::print_notice(&format!("Unknown command {}; try /call, /peers or /quit", command))
            }
        }
        Flow::Continue
    }

    fn log_outcome(&self, what: &str, result: Result<NegotiationOutcome, TransportError>) {
        match result {
            Ok(NegotiationOutcome::Applied) => debug!("{} applied ({})", what, self.negotiation.state()),
            Ok(NegotiationOutcome::Discarded(reason)) => debug!("{} discarded: {}", what, reason),
            Err(e) => error!("Negotiation failed on {}: {}", what, e),
        }
    }
}

fn forward_ice_state(transport: &dyn TransportSession, events: mpsc::UnboundedSender<SessionEvent>) {
    transport.on_ice_connection_state_change(Box::new(move |state| {
        let _ = events.send(SessionEvent::IceState(state));
    }));
}
