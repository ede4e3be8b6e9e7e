//! Sans-IO transfer session.
//!
//! One [`TransferSession`] sends one file to one peer. It is fed
//! [`LinkEvent`]s through [`TransferSession::handle`] and answers with the
//! [`LinkCommand`]s to execute next. Every dispatch checks the current
//! phase, so events that arrive late or out of order are ignored.

use bytes::Bytes;
use tracing::{debug, info, trace, warn};

use crate::error::{EncodingError, LinkError, LongformError, ProtocolError};
use crate::protocol::{
    CCCD_UUID, CHUNK_HEADER_SIZE, CLIENT_CHARACTERISTIC_UUID, ChunkWindow, ChunkWindows,
    DEFAULT_MTU, ENABLE_INDICATION, Frame, REQUESTED_MTU, RESPONSE_SIZE, SERVER_CHARACTERISTIC_UUID,
    SERVICE_UUID, TransactionId, WRITE_OVERHEAD, chunk_windows, fit_file_name,
};
use crate::state::TransferPhase;
use crate::transfer::discovery::PeerRef;
use crate::transfer::link::{GattService, LinkCommand, LinkEvent};

// ── TransferFailure ──────────────────────────────────────────────

/// Why a session ended in `Disconnected`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferFailure {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

impl From<TransferFailure> for LongformError {
    fn from(f: TransferFailure) -> Self {
        match f {
            TransferFailure::Protocol(e) => LongformError::Protocol(e),
            TransferFailure::Link(e) => LongformError::Link(e),
            TransferFailure::Encoding(e) => LongformError::Encoding(e),
        }
    }
}

// ── TransferProgress ─────────────────────────────────────────────

/// Point-in-time view of a session for display.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransferProgress {
    pub phase: TransferPhase,
    pub status: String,
    /// Bytes the peer has confirmed.
    pub confirmed: usize,
    pub total: usize,
}

impl TransferProgress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return if self.phase == TransferPhase::Complete { 100 } else { 0 };
        }
        ((self.confirmed as u128 * 100) / self.total as u128) as u8
    }
}

// ── TransferSession ──────────────────────────────────────────────

pub struct TransferSession {
    txn_id: TransactionId,
    name: String,
    payload: Bytes,
    phase: TransferPhase,
    mtu: u16,
    status: String,
    failure: Option<TransferFailure>,
    name_truncation: Option<EncodingError>,
    windows: Option<ChunkWindows>,
    in_flight: Option<ChunkWindow>,
    write_pending: bool,
    confirmed: usize,
}

impl TransferSession {
    /// A session with a fresh random transaction id.
    pub fn new(name: impl Into<String>, payload: impl Into<Bytes>) -> Result<Self, EncodingError> {
        Self::with_txn_id(TransactionId::random(), name, payload)
    }

    pub fn with_txn_id(
        txn_id: TransactionId,
        name: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Result<Self, EncodingError> {
        let payload = payload.into();
        if payload.len() > u32::MAX as usize {
            return Err(EncodingError::PayloadTooLarge {
                size: payload.len(),
                max: u32::MAX as usize,
            });
        }
        Ok(Self {
            txn_id,
            name: name.into(),
            payload,
            phase: TransferPhase::Idle,
            mtu: DEFAULT_MTU,
            status: String::new(),
            failure: None,
            name_truncation: None,
            windows: None,
            in_flight: None,
            write_pending: false,
            confirmed: 0,
        })
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn txn_id(&self) -> TransactionId {
        self.txn_id
    }

    pub fn phase(&self) -> TransferPhase {
        self.phase
    }

    /// Negotiated MTU, [`DEFAULT_MTU`] until the peer agrees to another.
    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    /// Human-readable status line.
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn failure(&self) -> Option<&TransferFailure> {
        self.failure.as_ref()
    }

    pub fn take_failure(&mut self) -> Option<TransferFailure> {
        self.failure.take()
    }

    /// Set when the file name had to be shortened to fit the offer.
    pub fn name_truncation(&self) -> Option<&EncodingError> {
        self.name_truncation.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn progress(&self) -> TransferProgress {
        TransferProgress {
            phase: self.phase,
            status: self.status.clone(),
            confirmed: self.confirmed,
            total: self.payload.len(),
        }
    }

    // ── Entry points ─────────────────────────────────────────────

    /// Start the session against `peer`.
    pub fn connect(&mut self, peer: PeerRef) -> Vec<LinkCommand> {
        if self.phase.begin_connect().is_err() {
            return Vec::new();
        }
        info!(txn_id = %self.txn_id, %peer, bytes = self.payload.len(), "transfer starting");
        self.set_status("Connecting...");
        vec![LinkCommand::Connect(peer)]
    }

    /// Stop the session. Safe to call repeatedly.
    pub fn abort(&mut self) -> Vec<LinkCommand> {
        self.fail(LinkError::Aborted, "Disconnected")
    }

    /// Feed one link event.
    pub fn handle(&mut self, event: LinkEvent) -> Vec<LinkCommand> {
        trace!(phase = %self.phase, ?event, "link event");
        match event {
            LinkEvent::Connected => self.on_connected(),
            LinkEvent::Disconnected => self.on_disconnected(),
            LinkEvent::MtuChanged(mtu) => self.on_mtu(Some(mtu)),
            LinkEvent::MtuRejected => self.on_mtu(None),
            LinkEvent::ServicesDiscovered(services) => self.on_services(&services),
            LinkEvent::DiscoveryFailed => self.on_discovery_failed(),
            LinkEvent::Subscribed { ok } => self.on_subscribed(ok),
            LinkEvent::DescriptorWritten { status } => self.on_descriptor_written(status),
            LinkEvent::CharacteristicWritten { status } => self.on_characteristic_written(status),
            LinkEvent::Indication {
                characteristic,
                value,
            } => {
                if characteristic == SERVER_CHARACTERISTIC_UUID {
                    self.on_indication(&value)
                } else {
                    Vec::new()
                }
            }
            LinkEvent::Failed(err) => self.on_failed(err),
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────

    fn on_connected(&mut self) -> Vec<LinkCommand> {
        if self.phase.link_up().is_err() {
            return Vec::new();
        }
        self.set_status("Requesting MTU...");
        vec![LinkCommand::RequestMtu(REQUESTED_MTU)]
    }

    fn on_disconnected(&mut self) -> Vec<LinkCommand> {
        self.fail(LinkError::Lost, "Disconnected");
        Vec::new()
    }

    fn on_mtu(&mut self, mtu: Option<u16>) -> Vec<LinkCommand> {
        if self.phase != TransferPhase::NegotiatingSize {
            return Vec::new();
        }
        match mtu {
            Some(mtu) => self.mtu = mtu,
            None => debug!(mtu = self.mtu, "peer ignored MTU request, keeping default"),
        }
        let _ = self.phase.begin_discovery();
        self.set_status("Discovering services...");
        vec![LinkCommand::DiscoverServices]
    }

    fn on_services(&mut self, services: &[GattService]) -> Vec<LinkCommand> {
        if self.phase != TransferPhase::DiscoveringCapabilities {
            return Vec::new();
        }
        if let Err(err) = Self::check_profile(services) {
            let status = err.to_string();
            return self.fail(err, &status);
        }
        let _ = self.phase.begin_enabling();
        self.set_status("Enabling indications...");
        vec![LinkCommand::Subscribe(SERVER_CHARACTERISTIC_UUID)]
    }

    fn check_profile(services: &[GattService]) -> Result<(), ProtocolError> {
        let service = services
            .iter()
            .find(|s| s.uuid == SERVICE_UUID)
            .ok_or(ProtocolError::MissingEndpoint("Service"))?;
        let server = service
            .characteristic(SERVER_CHARACTERISTIC_UUID)
            .ok_or(ProtocolError::MissingEndpoint("Server characteristic"))?;
        if !server.has_descriptor(CCCD_UUID) {
            return Err(ProtocolError::MissingEndpoint("CCCD"));
        }
        service
            .characteristic(CLIENT_CHARACTERISTIC_UUID)
            .ok_or(ProtocolError::MissingEndpoint("Client characteristic"))?;
        Ok(())
    }

    fn on_discovery_failed(&mut self) -> Vec<LinkCommand> {
        if self.phase != TransferPhase::DiscoveringCapabilities {
            return Vec::new();
        }
        self.fail(ProtocolError::DiscoveryFailed, "Service discovery failed")
    }

    fn on_subscribed(&mut self, ok: bool) -> Vec<LinkCommand> {
        if self.phase != TransferPhase::EnablingNotifications {
            return Vec::new();
        }
        if !ok {
            return self.fail(
                ProtocolError::SubscribeFailed,
                "Failed to enable local notifications",
            );
        }
        vec![LinkCommand::WriteDescriptor {
            characteristic: SERVER_CHARACTERISTIC_UUID,
            descriptor: CCCD_UUID,
            value: Bytes::from_static(&ENABLE_INDICATION),
        }]
    }

    fn on_descriptor_written(&mut self, status: u8) -> Vec<LinkCommand> {
        if self.phase != TransferPhase::EnablingNotifications {
            return Vec::new();
        }
        if status != 0 {
            let err = ProtocolError::IndicationsRejected { status };
            let text = format!("Failed to enable indications (status: {status})");
            return self.fail(err, &text);
        }
        let _ = self.phase.begin_offer();
        self.set_status("Sending offer...");
        self.send_offer()
    }

    fn send_offer(&mut self) -> Vec<LinkCommand> {
        let fitted = fit_file_name(&self.name, self.mtu as usize);
        self.name_truncation = fitted.truncated;
        let frame = Frame::offer(self.txn_id, self.payload.len() as u32, fitted.bytes);
        debug!(mtu = self.mtu, len = frame.encoded_len(), "sending offer");
        self.write(frame)
    }

    fn on_characteristic_written(&mut self, status: u8) -> Vec<LinkCommand> {
        if !self.write_pending {
            return Vec::new();
        }
        self.write_pending = false;

        if status != 0 {
            let err = LinkError::WriteFailed(format!("status {status}"));
            let text = format!("Write failed (status: {status})");
            return self.fail(err, &text);
        }

        match self.phase {
            TransferPhase::SendingOffer => {
                let _ = self.phase.offer_written();
                Vec::new()
            }
            TransferPhase::SendingChunks => {
                if let Some(window) = self.in_flight.take() {
                    self.confirmed = window.end();
                }
                self.send_next_chunk()
            }
            _ => Vec::new(),
        }
    }

    fn on_indication(&mut self, value: &[u8]) -> Vec<LinkCommand> {
        if value.len() < RESPONSE_SIZE {
            trace!(len = value.len(), "indication too short, ignored");
            return Vec::new();
        }
        let status = match Frame::decode(value) {
            Ok(Frame::Response { txn_id, status }) if txn_id == self.txn_id => status,
            Ok(frame) => {
                debug!(txn_id = %frame.txn_id(), kind = %frame.frame_type(), "foreign frame ignored");
                return Vec::new();
            }
            Err(err) => {
                debug!(%err, "undecodable indication ignored");
                return Vec::new();
            }
        };
        if !self.phase.accepts_response() {
            return Vec::new();
        }

        if status != 0 {
            let err = ProtocolError::PeerRejected { code: status };
            let text = err.to_string();
            return self.fail(err, &text);
        }

        let windows = match chunk_windows(
            self.mtu as usize,
            CHUNK_HEADER_SIZE,
            WRITE_OVERHEAD,
            self.payload.len(),
        ) {
            Ok(w) => w,
            Err(err) => {
                let text = err.to_string();
                return self.fail(err, &text);
            }
        };
        self.windows = Some(windows);
        let _ = self.phase.offer_accepted();
        self.set_status("Sending file...");

        // The offer write may still be outstanding; its completion sends the
        // first chunk.
        if self.write_pending {
            return Vec::new();
        }
        self.send_next_chunk()
    }

    fn on_failed(&mut self, err: LinkError) -> Vec<LinkCommand> {
        let text = err.to_string();
        self.fail(err, &text)
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn send_next_chunk(&mut self) -> Vec<LinkCommand> {
        let Some(window) = self.windows.as_mut().and_then(Iterator::next) else {
            let _ = self.phase.complete();
            self.set_status("File sent successfully");
            info!(txn_id = %self.txn_id, bytes = self.confirmed, "transfer complete");
            return vec![LinkCommand::Close];
        };

        let frame = Frame::Chunk {
            txn_id: self.txn_id,
            offset: window.offset as u32,
            payload: self.payload.slice(window.range()),
        };
        self.in_flight = Some(window);
        let percent = (window.end() as u128 * 100 / self.payload.len() as u128) as u8;
        self.set_status(&format!("Sending file... ({percent}%)"));
        trace!(offset = window.offset, len = window.len, "sending chunk");
        self.write(frame)
    }

    fn write(&mut self, frame: Frame) -> Vec<LinkCommand> {
        self.write_pending = true;
        vec![LinkCommand::WriteCharacteristic {
            characteristic: CLIENT_CHARACTERISTIC_UUID,
            value: frame.encode(),
        }]
    }

    fn fail(&mut self, err: impl Into<TransferFailure>, status: &str) -> Vec<LinkCommand> {
        if !self.phase.force_disconnect() {
            return Vec::new();
        }
        let err = err.into();
        let lost = matches!(err, TransferFailure::Link(LinkError::Lost));
        warn!(txn_id = %self.txn_id, %err, "transfer ended");
        self.failure = Some(err);
        self.in_flight = None;
        self.windows = None;
        self.write_pending = false;
        self.set_status(status);
        if lost {
            Vec::new()
        } else {
            vec![LinkCommand::Close]
        }
    }

    fn set_status(&mut self, status: &str) {
        if self.status != status {
            debug!(status, "transfer status");
            self.status = status.to_string();
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
