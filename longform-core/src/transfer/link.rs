//! The boundary between the transfer session and a GATT link.
//!
//! The session never touches the radio. It consumes [`LinkEvent`]s and
//! emits [`LinkCommand`]s; a [`GattLink`] implementation carries those out
//! and reports completions back as events on a single queue.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LinkError;
use crate::transfer::discovery::PeerRef;

// ── GATT profile description ─────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub descriptors: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    pub fn characteristic(&self, uuid: Uuid) -> Option<&GattCharacteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

impl GattCharacteristic {
    pub fn has_descriptor(&self, uuid: Uuid) -> bool {
        self.descriptors.contains(&uuid)
    }
}

// ── Events and commands ──────────────────────────────────────────

/// Something the link reports to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Disconnected,
    /// The peer agreed to this MTU.
    MtuChanged(u16),
    /// The peer ignored or refused the MTU request.
    MtuRejected,
    ServicesDiscovered(Vec<GattService>),
    DiscoveryFailed,
    /// Result of a local subscribe.
    Subscribed { ok: bool },
    DescriptorWritten { status: u8 },
    CharacteristicWritten { status: u8 },
    Indication { characteristic: Uuid, value: Bytes },
    /// A command could not be carried out.
    Failed(LinkError),
}

/// Something the session asks the link to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    Connect(PeerRef),
    RequestMtu(u16),
    DiscoverServices,
    Subscribe(Uuid),
    WriteDescriptor {
        characteristic: Uuid,
        descriptor: Uuid,
        value: Bytes,
    },
    WriteCharacteristic { characteristic: Uuid, value: Bytes },
    Close,
}

// ── GattLink ─────────────────────────────────────────────────────

/// A GATT client connection to one peer.
///
/// Each operation only starts the request; its outcome arrives later as a
/// [`LinkEvent`] on the queue the link was created with. `subscribe` is
/// local and answers directly.
#[async_trait]
pub trait GattLink: Send {
    async fn connect(&mut self, peer: &PeerRef) -> Result<(), LinkError>;

    async fn request_mtu(&mut self, mtu: u16) -> Result<(), LinkError>;

    async fn discover_services(&mut self) -> Result<(), LinkError>;

    /// Start forwarding indications from `characteristic`.
    async fn subscribe(&mut self, characteristic: Uuid) -> Result<bool, LinkError>;

    async fn write_descriptor(
        &mut self,
        characteristic: Uuid,
        descriptor: Uuid,
        value: Bytes,
    ) -> Result<(), LinkError>;

    async fn write_characteristic(&mut self, characteristic: Uuid, value: Bytes) -> Result<(), LinkError>;

    async fn close(&mut self);
}
