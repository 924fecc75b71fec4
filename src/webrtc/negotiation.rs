//! Offer/answer negotiation
//!
//! ```text
//!   Stable --create_offer--> HaveLocalOffer --handle_answer--> Stable
//!   Stable --handle_offer--> HaveRemoteOffer --(answer sent)--> Stable
//! ```
//!
//! Collisions are not resolved: an offer that arrives while we are not
//! `Stable` is dropped with a warning, as is an answer nobody asked for.
//! Remote ICE candidates are logged only; they are not added to the transport.

use super::{SessionDescription, TransportError, TransportSession};
use crate::signaling::{IceCandidateInfo, SignalMessage, SignalSender};
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::Arc;

/// Signaling state, mirroring the transport's own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationState::Stable => f.write_str("stable"),
            NegotiationState::HaveLocalOffer => f.write_str("have-local-offer"),
            NegotiationState::HaveRemoteOffer => f.write_str("have-remote-offer"),
        }
    }
}

/// Why a negotiation step was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Remote offer while not stable
    Glare,
    /// Answer without an outstanding local offer
    StaleAnswer,
    /// create_offer while an exchange is in flight
    NotStable,
    /// Coordinator already closed
    Closed,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscardReason::Glare => f.write_str("glare"),
            DiscardReason::StaleAnswer => f.write_str("stale answer"),
            DiscardReason::NotStable => f.write_str("negotiation in progress"),
            DiscardReason::Closed => f.write_str("closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationOutcome {
    Applied,
    Discarded(DiscardReason),
}

/// Counters for the lifetime of one coordinator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NegotiationStats {
    pub offers_sent: u64,
    pub answers_sent: u64,
    pub answers_applied: u64,
    pub candidates_received: u64,
    pub discarded: u64,
}

/// Drives one transport session through offer/answer.
///
/// Every transition takes `&mut self`, so transitions never interleave.
pub struct NegotiationCoordinator {
    transport: Arc<dyn TransportSession>,
    signals: Arc<dyn SignalSender>,
    state: NegotiationState,
    closed: bool,
    stats: NegotiationStats,
}

impl NegotiationCoordinator {
    pub fn new(transport: Arc<dyn TransportSession>, signals: Arc<dyn SignalSender>) -> Self {
        Self {
            transport,
            signals,
            state: NegotiationState::Stable,
            closed: false,
            stats: NegotiationStats::default(),
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn stats(&self) -> &NegotiationStats {
        &self.stats
    }

    fn discard(&mut self, reason: DiscardReason) -> NegotiationOutcome {
        self.stats.discarded += 1;
        NegotiationOutcome::Discarded(reason)
    }

    /// Create, apply and send a local offer. Only legal from `Stable`.
    pub async fn create_offer(&mut self) -> Result<NegotiationOutcome, TransportError> {
        if self.closed {
            return Ok(self.discard(DiscardReason::Closed));
        }
        if self.state != NegotiationState::Stable {
            warn!("Not creating offer while {}", self.state);
            return Ok(self.discard(DiscardReason::NotStable));
        }

        let offer = self.transport.create_offer().await?;
        self.transport.set_local_description(offer.clone()).await?;
        self.state = NegotiationState::HaveLocalOffer;

        let offer = self.transport.local_description().await.unwrap_or(offer);
        self.signals.send(SignalMessage::Offer { sdp: offer.sdp });
        self.stats.offers_sent += 1;
        info!("Sent offer ({})", self.state);
        Ok(NegotiationOutcome::Applied)
    }

    /// Apply a remote offer and answer it
    pub async fn handle_offer(&mut self, sdp: String) -> Result<NegotiationOutcome, TransportError> {
        if self.closed {
            return Ok(self.discard(DiscardReason::Closed));
        }
        if self.state != NegotiationState::Stable {
            warn!("Glare: ignoring remote offer while {}", self.state);
            return Ok(self.discard(DiscardReason::Glare));
        }

        info!("Received offer ({} bytes)", sdp.len());
        self.transport
            .set_remote_description(SessionDescription::offer(sdp))
            .await?;
        self.state = NegotiationState::HaveRemoteOffer;

        let answer = match self.answer_remote_offer().await {
            Ok(answer) => answer,
            Err(e) => {
                error!(
                    "Answering remote offer failed: {}; negotiation is stuck in {} and will refuse \
                     further offers until the session is restarted",
                    e, self.state
                );
                return Err(e);
            }
        };
        self.state = NegotiationState::Stable;

        let answer = self.transport.local_description().await.unwrap_or(answer);
        self.signals.send(SignalMessage::Answer { sdp: answer.sdp });
        self.stats.answers_sent += 1;
        info!("Sent answer ({})", self.state);
        Ok(NegotiationOutcome::Applied)
    }

    async fn answer_remote_offer(&self) -> Result<SessionDescription, TransportError> {
        let answer = self.transport.create_answer().await?;
        self.transport.set_local_description(answer.clone()).await?;
        Ok(answer)
    }

    /// Apply the answer to our outstanding offer
    pub async fn handle_answer(&mut self, sdp: String) -> Result<NegotiationOutcome, TransportError> {
        if self.closed {
            return Ok(self.discard(DiscardReason::Closed));
        }
        if self.state != NegotiationState::HaveLocalOffer {
            warn!("Ignoring answer while {}", self.state);
            return Ok(self.discard(DiscardReason::StaleAnswer));
        }

        self.transport
            .set_remote_description(SessionDescription::answer(sdp))
            .await?;
        self.state = NegotiationState::Stable;
        self.stats.answers_applied += 1;
        info!("Applied answer ({})", self.state);
        Ok(NegotiationOutcome::Applied)
    }

    /// Record a remote ICE candidate. Not applied to the transport.
    pub fn handle_candidate(&mut self, candidate: &IceCandidateInfo) {
        self.stats.candidates_received += 1;
        info!(
            "Received ICE candidate (not applied): {} mid={:?} mline={:?}",
            candidate.candidate, candidate.sdp_mid, candidate.sdp_mline_index
        );
    }

    /// Tear down the transport session. Idempotent.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            debug!("Negotiation already closed");
            return Ok(());
        }
        self.closed = true;
        self.state = NegotiationState::Stable;
        self.transport.close().await?;
        info!(
            "Negotiation closed ({} offers, {} answers sent, {} discarded)",
            self.stats.offers_sent, self.stats.answers_sent, self.stats.discarded
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webrtc::mock::{MockSignals, MockTransport, TransportCall};

    fn coordinator() -> (NegotiationCoordinator, Arc<MockTransport>, Arc<MockSignals>) {
        let transport = MockTransport::new();
        let signals = MockSignals::connected();
        let coordinator = NegotiationCoordinator::new(transport.clone(), signals.clone());
        (coordinator, transport, signals)
    }

    fn is_set_local(call: &TransportCall) -> bool {
        matches!(call, TransportCall::SetLocal(_))
    }

    fn is_set_remote(call: &TransportCall) -> bool {
        matches!(call, TransportCall::SetRemote(_))
    }

    #[tokio::test]
    async fn create_offer_moves_to_have_local_offer() {
        let (mut coordinator, transport, signals) = coordinator();
        assert_eq!(coordinator.create_offer().await.unwrap(), NegotiationOutcome::Applied);
        assert_eq!(coordinator.state(), NegotiationState::HaveLocalOffer);
        assert_eq!(
            transport.calls(),
            vec![
                TransportCall::CreateOffer,
                TransportCall::SetLocal(SessionDescription::offer("v=0 mock-offer")),
            ]
        );
        assert_eq!(signals.sent(), vec![SignalMessage::Offer { sdp: "v=0 mock-offer".to_string() }]);

        // a second offer is refused until the exchange finishes
        assert_eq!(
            coordinator.create_offer().await.unwrap(),
            NegotiationOutcome::Discarded(DiscardReason::NotStable)
        );
        assert_eq!(signals.sent().len(), 1);
    }

    #[tokio::test]
    async fn remote_offer_during_local_offer_is_glare() {
        let (mut coordinator, transport, signals) = coordinator();
        coordinator.create_offer().await.unwrap();
        let calls_before = transport.calls().len();
        signals.take();

        let outcome = coordinator.handle_offer("v=0 remote".to_string()).await.unwrap();
        assert_eq!(outcome, NegotiationOutcome::Discarded(DiscardReason::Glare));
        assert_eq!(coordinator.state(), NegotiationState::HaveLocalOffer);
        assert_eq!(transport.calls().len(), calls_before);
        assert!(signals.sent().is_empty());
        assert_eq!(coordinator.stats().discarded, 1);
    }

    #[tokio::test]
    async fn answer_while_stable_is_stale() {
        let (mut coordinator, transport, signals) = coordinator();
        let outcome = coordinator.handle_answer("v=0 late".to_string()).await.unwrap();
        assert_eq!(outcome, NegotiationOutcome::Discarded(DiscardReason::StaleAnswer));
        assert_eq!(coordinator.state(), NegotiationState::Stable);
        assert!(transport.calls().is_empty());
        assert!(signals.sent().is_empty());
    }

    #[tokio::test]
    async fn offer_answer_happy_path() {
        let (mut initiator, initiator_transport, initiator_signals) = coordinator();
        let (mut responder, responder_transport, responder_signals) = coordinator();

        initiator.create_offer().await.unwrap();
        assert_eq!(initiator.state(), NegotiationState::HaveLocalOffer);
        let offer = match initiator_signals.take().as_slice() {
            [SignalMessage::Offer { sdp }] => sdp.clone(),
            other => panic!("expected one offer, got {:?}", other),
        };

        assert_eq!(responder.handle_offer(offer).await.unwrap(), NegotiationOutcome::Applied);
        assert_eq!(responder.state(), NegotiationState::Stable);
        assert_eq!(responder_transport.count(is_set_local), 1);
        assert_eq!(responder_transport.count(is_set_remote), 1);
        let answer = match responder_signals.take().as_slice() {
            [SignalMessage::Answer { sdp }] => sdp.clone(),
            other => panic!("expected one answer, got {:?}", other),
        };

        assert_eq!(initiator.handle_answer(answer).await.unwrap(), NegotiationOutcome::Applied);
        assert_eq!(initiator.state(), NegotiationState::Stable);
        assert_eq!(initiator_transport.count(is_set_remote), 1);
        assert_eq!(
            initiator_transport.calls().last(),
            Some(&TransportCall::SetRemote(SessionDescription::answer("v=0 mock-answer")))
        );
    }

    #[tokio::test]
    async fn failed_answer_surfaces_error_without_sending() {
        let transport = MockTransport::failing_answers();
        let signals = MockSignals::connected();
        let mut coordinator = NegotiationCoordinator::new(transport.clone(), signals.clone());

        assert!(coordinator.handle_offer("v=0 remote".to_string()).await.is_err());
        assert_eq!(coordinator.state(), NegotiationState::HaveRemoteOffer);
        assert!(signals.sent().is_empty());

        // stuck until restart: later offers read as glare
        assert_eq!(
            coordinator.handle_offer("v=0 retry".to_string()).await.unwrap(),
            NegotiationOutcome::Discarded(DiscardReason::Glare)
        );
        assert_eq!(transport.count(|c| matches!(c, TransportCall::CreateAnswer)), 1);
    }

    #[tokio::test]
    async fn candidates_are_logged_not_applied() {
        let (mut coordinator, transport, _signals) = coordinator();
        coordinator.handle_candidate(&IceCandidateInfo {
            candidate: "candidate:1 1 udp 1 10.0.0.1 9 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        });
        assert!(transport.calls().is_empty());
        assert_eq!(coordinator.stats().candidates_received, 1);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_further_transitions() {
        let (mut coordinator, transport, signals) = coordinator();
        coordinator.create_offer().await.unwrap();
        coordinator.close().await.unwrap();
        coordinator.close().await.unwrap();
        assert_eq!(transport.count(|c| *c == TransportCall::Close), 1);
        assert!(coordinator.is_closed());

        signals.take();
        assert_eq!(
            coordinator.handle_offer("v=0".to_string()).await.unwrap(),
            NegotiationOutcome::Discarded(DiscardReason::Closed)
        );
        assert!(signals.sent().is_empty());
    }
}
