//! Wire protocol spoken with the e-ink peer over GATT.
//!
//! The host writes [`Frame::Offer`] and [`Frame::Chunk`] frames to the
//! client characteristic; the peer answers with [`Frame::Response`]
//! indications on the server characteristic. All integer fields are 32-bit
//! little-endian.
//!
//! ```text
//! Offer     type=0  txn_id  version=1  total_length  name_length  name[..]
//! Response  type=1  txn_id  status
//! Chunk     type=2  txn_id  offset     payload[..]
//! ```

pub mod chunk;
pub mod frame;
pub mod offer;

pub use chunk::{ChunkWindow, ChunkWindows, chunk_windows, window_size};
pub use frame::{Frame, FrameType, TransactionId};
pub use offer::{FittedName, fit_file_name, name_budget};

use uuid::Uuid;

// ── GATT profile ─────────────────────────────────────────────────

/// Service advertised by the peer.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x4ae29d01_499a_480a_8c41_a82192105125);

/// Characteristic the host writes offers and chunks to.
pub const CLIENT_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xa00e530d_b48b_48c8_aadb_d062a1b91792);

/// Characteristic the peer indicates responses on.
pub const SERVER_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0c656023_dee6_47c5_9afb_e601dfbdaa1d);

/// Client characteristic configuration descriptor.
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// CCCD value that enables indications.
pub const ENABLE_INDICATION: [u8; 2] = [0x02, 0x00];

// ── Sizes ────────────────────────────────────────────────────────

/// MTU the host asks for after connecting.
pub const REQUESTED_MTU: u16 = 517;

/// MTU of a link on which negotiation never happened.
pub const DEFAULT_MTU: u16 = 23;

/// Per-write ATT overhead subtracted from the MTU.
pub const WRITE_OVERHEAD: usize = 5;

pub const OFFER_HEADER_SIZE: usize = 20;
pub const RESPONSE_SIZE: usize = 12;
pub const CHUNK_HEADER_SIZE: usize = 12;

pub const PROTOCOL_VERSION: u32 = 1;
