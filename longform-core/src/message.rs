//! Messages of the emulated GATT link.
//!
//! Bench setups without a radio run the host and the peer emulator over
//! TCP. Each GATT operation and its completion becomes one [`LinkMessage`],
//! serialized with `bincode` and framed by [`LinkCodec`].
//!
//! ```text
//! Host ──[MtuRequest]──────────────► Peer
//! Host ◄─[MtuResponse]────────────── Peer
//! Host ──[DiscoverServices]────────► Peer
//! Host ◄─[Services]───────────────── Peer
//! Host ──[WriteDescriptor]─────────► Peer
//! Host ◄─[DescriptorWritten]──────── Peer
//! Host ──[WriteCharacteristic]─────► Peer      (offer, chunks)
//! Host ◄─[CharacteristicWritten]──── Peer
//! Host ◄─[Indication]─────────────── Peer      (offer response)
//! ```
//!
//! [`LinkCodec`]: crate::codec::LinkCodec

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LongformError;
use crate::transfer::{GattService, LinkEvent};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkMessage {
    // ── Host → Peer ──────────────────────────────────────────────
    MtuRequest { mtu: u16 },
    DiscoverServices,
    WriteDescriptor {
        characteristic: Uuid,
        descriptor: Uuid,
        value: Vec<u8>,
    },
    WriteCharacteristic { characteristic: Uuid, value: Vec<u8> },

    // ── Peer → Host ──────────────────────────────────────────────
    /// `None` when the peer refuses to change the MTU.
    MtuResponse { mtu: Option<u16> },
    Services { services: Vec<GattService> },
    DiscoveryFailed,
    DescriptorWritten { status: u8 },
    CharacteristicWritten { status: u8 },
    Indication { characteristic: Uuid, value: Vec<u8> },
}

impl LinkMessage {
    /// Serialize to bytes for a frame body.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LongformError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from a frame body.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LongformError> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// The session event a peer message stands for. Host-side messages
    /// have none.
    pub fn into_event(self) -> Option<LinkEvent> {
        match self {
            LinkMessage::MtuResponse { mtu: Some(mtu) } => Some(LinkEvent::MtuChanged(mtu)),
            LinkMessage::MtuResponse { mtu: None } => Some(LinkEvent::MtuRejected),
            LinkMessage::Services { services } => Some(LinkEvent::ServicesDiscovered(services)),
            LinkMessage::DiscoveryFailed => Some(LinkEvent::DiscoveryFailed),
            LinkMessage::DescriptorWritten { status } => Some(LinkEvent::DescriptorWritten { status }),
            LinkMessage::CharacteristicWritten { status } => {
                Some(LinkEvent::CharacteristicWritten { status })
            }
            LinkMessage::Indication {
                characteristic,
                value,
            } => Some(LinkEvent::Indication {
                characteristic,
                value: Bytes::from(value),
            }),
            LinkMessage::MtuRequest { .. }
            | LinkMessage::DiscoverServices
            | LinkMessage::WriteDescriptor { .. }
            | LinkMessage::WriteCharacteristic { .. } => None,
        }
    }
}
