//! Emulated e-ink peer for bench runs and tests.
//!
//! Accepts one host connection at a time, plays the GATT server side of
//! the link, and reassembles the offered file from its chunks.

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::LinkCodec;
use crate::error::{LongformError, ProtocolError};
use crate::message::LinkMessage;
use crate::protocol::{
    CCCD_UUID, CLIENT_CHARACTERISTIC_UUID, DEFAULT_MTU, ENABLE_INDICATION, Frame, SERVER_CHARACTERISTIC_UUID,
    SERVICE_UUID, TransactionId,
};
use crate::transfer::{GattCharacteristic, GattService};

/// ATT status for a write the peer could not accept.
pub const STATUS_WRITE_REJECTED: u8 = 0x0E;

/// ATT header bytes per write; a write carries at most `mtu - 3` bytes.
const ATT_WRITE_HEADER: usize = 3;

/// Most bytes reserved up front for an offered file; larger files grow the
/// buffer as chunks arrive.
const MAX_RESERVE: usize = 64 * 1024;

// ── EmulatorConfig ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Largest MTU the peer agrees to; `None` refuses negotiation.
    pub mtu: Option<u16>,
    /// Whether discovery reports the longform service.
    pub expose_service: bool,
    /// Status returned for the indication-enable descriptor write.
    pub descriptor_status: u8,
    /// Refuse every offer with this status.
    pub reject_offer_with: Option<i32>,
    /// Never answer offers.
    pub silent: bool,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            mtu: Some(185),
            expose_service: true,
            descriptor_status: 0,
            reject_offer_with: None,
            silent: false,
        }
    }
}

/// A file reassembled from one accepted offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub txn_id: TransactionId,
}

/// The longform GATT profile as the peer exposes it.
pub fn longform_profile() -> Vec<GattService> {
    vec![GattService {
        uuid: SERVICE_UUID,
        characteristics: vec![
            GattCharacteristic {
                uuid: CLIENT_CHARACTERISTIC_UUID,
                descriptors: vec![],
            },
            GattCharacteristic {
                uuid: SERVER_CHARACTERISTIC_UUID,
                descriptors: vec![CCCD_UUID],
            },
        ],
    }]
}

// ── PeerState ────────────────────────────────────────────────────

struct Incoming {
    txn_id: TransactionId,
    name: String,
    total: usize,
    bytes: Vec<u8>,
}

/// Server-side state of one host connection.
struct PeerState {
    config: EmulatorConfig,
    mtu: u16,
    indications: bool,
    incoming: Option<Incoming>,
}

impl PeerState {
    fn new(config: EmulatorConfig) -> Self {
        Self {
            config,
            mtu: DEFAULT_MTU,
            indications: false,
            incoming: None,
        }
    }

    /// Replies to send, plus a file if this message completed one.
    fn handle(&mut self, message: LinkMessage) -> (Vec<LinkMessage>, Option<ReceivedFile>) {
        match message {
            LinkMessage::MtuRequest { mtu } => {
                let agreed = self.config.mtu.map(|max| mtu.min(max));
                if let Some(agreed) = agreed {
                    self.mtu = agreed;
                }
                (vec![LinkMessage::MtuResponse { mtu: agreed }], None)
            }
            LinkMessage::DiscoverServices => {
                let services = if self.config.expose_service {
                    longform_profile()
                } else {
                    Vec::new()
                };
                (vec![LinkMessage::Services { services }], None)
            }
            LinkMessage::WriteDescriptor {
                characteristic,
                descriptor,
                value,
            } => {
                let status = self.config.descriptor_status;
                if status == 0
                    && characteristic == SERVER_CHARACTERISTIC_UUID
                    && descriptor == CCCD_UUID
                {
                    self.indications = value[..] == ENABLE_INDICATION;
                }
                (vec![LinkMessage::DescriptorWritten { status }], None)
            }
            LinkMessage::WriteCharacteristic {
                characteristic,
                value,
            } => self.on_write(characteristic == CLIENT_CHARACTERISTIC_UUID, &value),
            other => {
                debug!(?other, "unexpected message from host ignored");
                (Vec::new(), None)
            }
        }
    }

    fn on_write(&mut self, to_client: bool, value: &[u8]) -> (Vec<LinkMessage>, Option<ReceivedFile>) {
        let limit = (self.mtu as usize).saturating_sub(ATT_WRITE_HEADER);
        if !to_client || value.len() > limit {
            warn!(len = value.len(), limit, "write rejected");
            return (vec![written(STATUS_WRITE_REJECTED)], None);
        }

        let frame = match Frame::decode(value) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("undecodable write: {e}");
                return (vec![written(STATUS_WRITE_REJECTED)], None);
            }
        };

        match frame {
            Frame::Offer {
                txn_id,
                total_length,
                name,
                ..
            } => self.on_offer(txn_id, total_length as usize, &name),
            Frame::Chunk {
                txn_id,
                offset,
                payload,
            } => match self.on_chunk(txn_id, offset as usize, &payload) {
                Ok(done) => (vec![written(0)], done),
                Err(e) => {
                    warn!("chunk rejected: {e}");
                    (vec![written(STATUS_WRITE_REJECTED)], None)
                }
            },
            Frame::Response { .. } => (vec![written(STATUS_WRITE_REJECTED)], None),
        }
    }

    fn on_offer(&mut self, txn_id: TransactionId, total: usize, name: &[u8]) -> (Vec<LinkMessage>, Option<ReceivedFile>) {
        let name = String::from_utf8_lossy(name).into_owned();
        info!(%txn_id, name, total, "offer received");

        let mut replies = vec![written(0)];
        if self.config.silent || !self.indications {
            return (replies, None);
        }

        let status = self.config.reject_offer_with.unwrap_or(0);
        let response = Frame::Response { txn_id, status };
        replies.push(LinkMessage::Indication {
            characteristic: SERVER_CHARACTERISTIC_UUID,
            value: response.encode().to_vec(),
        });
        if status != 0 {
            self.incoming = None;
            return (replies, None);
        }

        let incoming = Incoming {
            txn_id,
            name,
            total,
            bytes: Vec::with_capacity(total.min(MAX_RESERVE)),
        };
        if total == 0 {
            return (replies, Some(finish(incoming)));
        }
        self.incoming = Some(incoming);
        (replies, None)
    }

    fn on_chunk(
        &mut self,
        txn_id: TransactionId,
        offset: usize,
        payload: &[u8],
    ) -> Result<Option<ReceivedFile>, ProtocolError> {
        let incoming = self
            .incoming
            .as_mut()
            .ok_or(ProtocolError::MalformedFrame("chunk without accepted offer"))?;
        if incoming.txn_id != txn_id {
            return Err(ProtocolError::TransactionMismatch {
                expected: incoming.txn_id.get(),
                actual: txn_id.get(),
            });
        }
        if offset != incoming.bytes.len() {
            return Err(ProtocolError::UnexpectedOffset {
                expected: incoming.bytes.len() as u32,
                actual: offset as u32,
            });
        }
        if offset + payload.len() > incoming.total {
            return Err(ProtocolError::MalformedFrame("chunk past announced length"));
        }
        incoming.bytes.extend_from_slice(payload);
        if incoming.bytes.len() < incoming.total {
            return Ok(None);
        }
        Ok(self.incoming.take().map(finish))
    }
}

fn written(status: u8) -> LinkMessage {
    LinkMessage::CharacteristicWritten { status }
}

fn finish(incoming: Incoming) -> ReceivedFile {
    info!(txn_id = %incoming.txn_id, name = incoming.name, bytes = incoming.bytes.len(), "file received");
    ReceivedFile {
        name: incoming.name,
        bytes: incoming.bytes,
        txn_id: incoming.txn_id,
    }
}

// ── PeerEmulator ─────────────────────────────────────────────────

pub struct PeerEmulator {
    listener: TcpListener,
    config: EmulatorConfig,
}

impl PeerEmulator {
    pub async fn bind(addr: &str, config: EmulatorConfig) -> Result<Self, LongformError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, LongformError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve a single host connection until it closes.
    ///
    /// Returns the file if one was fully received.
    pub async fn accept_one(&self) -> Result<Option<ReceivedFile>, LongformError> {
        let (stream, host) = self.listener.accept().await?;
        info!("host connected from {host}");
        self.serve_connection(stream).await
    }

    /// Serve hosts one after another until `cancel` fires, forwarding every
    /// received file to `files`.
    pub async fn serve(
        &self,
        files: mpsc::Sender<ReceivedFile>,
        cancel: CancellationToken,
    ) -> Result<(), LongformError> {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                accepted = self.listener.accept() => accepted,
            };
            let (stream, host) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept error: {e}");
                    continue;
                }
            };
            info!("host connected from {host}");

            let served = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                served = self.serve_connection(stream) => served,
            };
            match served {
                Ok(Some(file)) => files.send(file).await?,
                Ok(None) => {}
                Err(e) => warn!("session with {host} failed: {e}"),
            }
            info!("session with {host} ended");
        }
    }

    async fn serve_connection(&self, stream: TcpStream) -> Result<Option<ReceivedFile>, LongformError> {
        let mut framed = Framed::new(stream, LinkCodec);
        let mut state = PeerState::new(self.config.clone());
        let mut received = None;

        while let Some(message) = framed.next().await {
            let (replies, file) = state.handle(message?);
            for reply in replies {
                framed.send(reply).await?;
            }
            if file.is_some() {
                received = file;
            }
        }
        Ok(received)
    }
}
