//! Recording doubles for the transport and signaling seams

use super::{IceConnectionState, IceStateCallback, SessionDescription, TrackSpec, TransportError, TransportSession};
use crate::media::{FrameSink, NullSink};
use crate::signaling::{SignalMessage, SignalSender};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    CreateOffer,
    CreateAnswer,
    SetLocal(SessionDescription),
    SetRemote(SessionDescription),
    AddTrack(String),
    Close,
}

#[derive(Default)]
pub struct MockTransport {
    calls: Mutex<Vec<TransportCall>>,
    local: Mutex<Option<SessionDescription>>,
    ice_callback: Mutex<Option<IceStateCallback>>,
    fail_answer: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_answers() -> Arc<Self> {
        let transport = Self::default();
        transport.fail_answer.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| matches(call)).count()
    }

    pub fn emit_ice_state(&self, state: IceConnectionState) {
        if let Some(callback) = self.ice_callback.lock().as_ref() {
            callback(state);
        }
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl TransportSession for MockTransport {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        self.record(TransportCall::CreateOffer);
        Ok(SessionDescription::offer("v=0 mock-offer"))
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        self.record(TransportCall::CreateAnswer);
        if self.fail_answer.load(Ordering::SeqCst) {
            return Err(TransportError::SdpError("mock answer failure".to_string()));
        }
        Ok(SessionDescription::answer("v=0 mock-answer"))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), TransportError> {
        *self.local.lock() = Some(description.clone());
        self.record(TransportCall::SetLocal(description));
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), TransportError> {
        self.record(TransportCall::SetRemote(description));
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    async fn add_track(&self, spec: &TrackSpec) -> Result<Arc<dyn FrameSink>, TransportError> {
        self.record(TransportCall::AddTrack(spec.stream_id.clone()));
        Ok(Arc::new(NullSink))
    }

    fn on_ice_connection_state_change(&self, callback: IceStateCallback) {
        *self.ice_callback.lock() = Some(callback);
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.record(TransportCall::Close);
        Ok(())
    }
}

/// Signal sender that records instead of sending
pub struct MockSignals {
    sent: Mutex<Vec<SignalMessage>>,
    connected: AtomicBool,
}

impl MockSignals {
    pub fn connected() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        })
    }

    pub fn sent(&self) -> Vec<SignalMessage> {
        self.sent.lock().clone()
    }

    pub fn take(&self) -> Vec<SignalMessage> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl SignalSender for MockSignals {
    fn send(&self, message: SignalMessage) {
        if self.is_connected() {
            self.sent.lock().push(message);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
