//! WebRTC PeerConnection transport
//!
//! `TransportSession` over a webrtc-rs `RTCPeerConnection`. Descriptions are
//! sent non-trickle: setting a local description waits for ICE gathering so
//! the SDP handed to signaling already carries the local candidates.

use super::media_track::{h264_capability, H264TrackSink, H264_CLOCK_RATE, H264_FMTP};
use super::{
    IceConnectionState, IceStateCallback, SdpKind, SessionDescription, TrackSpec, TransportError, TransportSession,
};
use crate::config::WebRTCConfig;
use crate::media::FrameSink;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecParameters, RTPCodecType};
use webrtc::track::track_local::TrackLocal;

/// Upper bound on waiting for ICE gathering after setting a local description
const ICE_GATHER_TIMEOUT: Duration = Duration::from_secs(5);

const H264_PAYLOAD_TYPE: u8 = 102;

/// webrtc-rs backed transport session
pub struct WebRtcTransport {
    peer_connection: Arc<RTCPeerConnection>,
    closed: AtomicBool,
}

impl WebRtcTransport {
    /// Create a peer connection with the configured ICE servers
    pub async fn new(config: &WebRTCConfig) -> Result<Self, TransportError> {
        let mut media_engine = MediaEngine::default();
        register_video_codecs(&mut media_engine)?;

        // Interceptor registry for RTCP feedback
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| TransportError::ConnectionFailed(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: build_ice_servers(config),
            ..Default::default()
        };

        let peer_connection = api
            .new_peer_connection(rtc_config)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("Failed to create peer connection: {}", e)))?;
        let peer_connection = Arc::new(peer_connection);

        peer_connection.on_peer_connection_state_change(Box::new(|state| {
            Box::pin(async move {
                info!("Peer connection state: {}", state);
            })
        }));

        peer_connection.on_track(Box::new(|track, _receiver, _transceiver| {
            Box::pin(async move {
                info!("Remote {} track received (id {})", track.kind(), track.id());
                // drain so the receive buffers never fill
                while track.read_rtp().await.is_ok() {}
                debug!("Remote track {} ended", track.id());
            })
        }));

        info!("Peer connection created ({} ICE servers)", config.ice_servers.len());
        Ok(Self {
            peer_connection,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

fn register_video_codecs(media_engine: &mut MediaEngine) -> Result<(), TransportError> {
    media_engine
        .register_codec(
            RTCRtpCodecParameters {
                capability: h264_capability(),
                payload_type: H264_PAYLOAD_TYPE,
                ..Default::default()
            },
            RTPCodecType::Video,
        )
        .map_err(|e| {
            TransportError::ConnectionFailed(format!(
                "Failed to register H264 ({} Hz, {}): {}",
                H264_CLOCK_RATE, H264_FMTP, e
            ))
        })
}

fn build_ice_servers(config: &WebRTCConfig) -> Vec<RTCIceServer> {
    config
        .ice_servers
        .iter()
        .map(|server| RTCIceServer {
            urls: server.urls.clone(),
            username: server.username.clone().unwrap_or_default(),
            credential: server.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect()
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription, TransportError> {
    let kind = description.kind;
    let parsed = match kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp),
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp),
    };
    parsed.map_err(|e| TransportError::SdpError(format!("Invalid SDP {}: {}", kind, e)))
}

fn ice_state(state: RTCIceConnectionState) -> IceConnectionState {
    match state {
        RTCIceConnectionState::New => IceConnectionState::New,
        RTCIceConnectionState::Checking => IceConnectionState::Checking,
        RTCIceConnectionState::Connected => IceConnectionState::Connected,
        RTCIceConnectionState::Completed => IceConnectionState::Completed,
        RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
        RTCIceConnectionState::Failed => IceConnectionState::Failed,
        RTCIceConnectionState::Closed => IceConnectionState::Closed,
        _ => IceConnectionState::Unknown,
    }
}

#[async_trait]
impl TransportSession for WebRtcTransport {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        self.ensure_open()?;
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| TransportError::SdpError(format!("Failed to create offer: {}", e)))?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        self.ensure_open()?;
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| TransportError::SdpError(format!("Failed to create answer: {}", e)))?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), TransportError> {
        self.ensure_open()?;
        let description = to_rtc(description)?;
        let mut gather_complete = self.peer_connection.gathering_complete_promise().await;

        self.peer_connection
            .set_local_description(description)
            .await
            .map_err(|e| TransportError::SdpError(format!("Failed to set local description: {}", e)))?;

        if tokio::time::timeout(ICE_GATHER_TIMEOUT, gather_complete.recv()).await.is_err() {
            warn!("ICE gathering incomplete after {:?}; sending partial candidates", ICE_GATHER_TIMEOUT);
        }
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), TransportError> {
        self.ensure_open()?;
        let description = to_rtc(description)?;
        self.peer_connection
            .set_remote_description(description)
            .await
            .map_err(|e| TransportError::SdpError(format!("Failed to set remote description: {}", e)))
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let description = self.peer_connection.local_description().await?;
        let sdp = description.sdp;
        Some(match description.sdp_type {
            webrtc::peer_connection::sdp::sdp_type::RTCSdpType::Answer => SessionDescription::answer(sdp),
            _ => SessionDescription::offer(sdp),
        })
    }

    async fn add_track(&self, spec: &TrackSpec) -> Result<Arc<dyn FrameSink>, TransportError> {
        self.ensure_open()?;
        let sink = H264TrackSink::new(spec).map_err(|e| TransportError::MediaError(e.to_string()))?;

        let rtp_sender = self
            .peer_connection
            .add_track(sink.track() as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| TransportError::MediaError(format!("Failed to add video track: {}", e)))?;

        // Read incoming RTCP so interceptors keep working
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while rtp_sender.read(&mut buf).await.is_ok() {}
        });

        info!(
            "H.264 video track added ({}x{}@{}fps, stream {})",
            spec.width, spec.height, spec.frame_rate, spec.stream_id
        );
        Ok(Arc::new(sink))
    }

    fn on_ice_connection_state_change(&self, callback: IceStateCallback) {
        let callback = Arc::new(callback);
        self.peer_connection
            .on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
                let callback = callback.clone();
                Box::pin(async move {
                    callback(ice_state(state));
                })
            }));
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.peer_connection
            .close()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("Failed to close connection: {}", e)))?;
        info!("Peer connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ice_servers_carry_credentials() {
        let mut config = WebRTCConfig::default();
        config.ice_servers.push(crate::config::IceServerConfig {
            urls: vec!["turn:turn.example.org:3478".to_string()],
            username: Some("user".to_string()),
            credential: Some("secret".to_string()),
        });
        let servers = build_ice_servers(&config);
        let turn = servers.last().unwrap();
        assert_eq!(turn.username, "user");
        assert_eq!(turn.credential, "secret");
        assert!(servers[0].username.is_empty());
    }

    #[test]
    fn ice_states_map_one_to_one() {
        assert_eq!(ice_state(RTCIceConnectionState::Connected), IceConnectionState::Connected);
        assert_eq!(ice_state(RTCIceConnectionState::Failed), IceConnectionState::Failed);
        assert_eq!(ice_state(RTCIceConnectionState::Unspecified), IceConnectionState::Unknown);
    }

    #[tokio::test]
    async fn offer_and_answer_between_two_local_peers() {
        let config = WebRTCConfig {
            ice_servers: vec![],
            ..WebRTCConfig::default()
        };
        let initiator = WebRtcTransport::new(&config).await.unwrap();
        let responder = WebRtcTransport::new(&config).await.unwrap();
        let spec = TrackSpec {
            stream_id: "lumen-stream".to_string(),
            width: 64,
            height: 48,
            frame_rate: 15,
        };
        initiator.add_track(&spec).await.unwrap();

        let offer = initiator.create_offer().await.unwrap();
        initiator.set_local_description(offer).await.unwrap();
        let offer = initiator.local_description().await.unwrap();
        assert_eq!(offer.kind, SdpKind::Offer);
        assert!(offer.sdp.contains("H264"));

        responder.set_remote_description(offer).await.unwrap();
        let answer = responder.create_answer().await.unwrap();
        responder.set_local_description(answer).await.unwrap();
        let answer = responder.local_description().await.unwrap();
        assert_eq!(answer.kind, SdpKind::Answer);

        initiator.set_remote_description(answer).await.unwrap();
        initiator.close().await.unwrap();
        initiator.close().await.unwrap();
        responder.close().await.unwrap();
        assert!(matches!(initiator.create_offer().await, Err(TransportError::Closed)));
    }
}
