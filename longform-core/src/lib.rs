//! # longform-core
//!
//! Core library for capturing long-form article text from an on-screen
//! accessibility tree and sending it to an e-ink reader over BLE.
//!
//! This crate contains:
//! - **Tree**: `ForeignNode`/`TreeProvider` seams, arena `Snapshot`, paragraph classification
//! - **Capture**: `CaptureService`, the tick-driven scroll-and-reconverge loop
//! - **Protocol**: offer/response/chunk `Frame`s, chunk windows, file-name fitting
//! - **State**: `TransferPhase` machine
//! - **Transfer**: sans-IO `TransferSession` and the async `TransferDriver`
//! - **Network**: TCP emulation of the GATT link and of the peer
//! - **Error**: `LongformError`, a typed `thiserror`-based error hierarchy

pub mod capture;
pub mod codec;
pub mod error;
pub mod flags;
pub mod message;
pub mod network;
pub mod protocol;
pub mod state;
pub mod transfer;
pub mod tree;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use capture::{
    Article, CaptureConfig, CaptureHandle, CapturePhase, CaptureReport, CaptureService, PresentationSink,
    StopReason, TickOutcome,
};
pub use codec::LinkCodec;
pub use error::{EncodingError, LinkError, LongformError, ProtocolError};
pub use flags::NodeActions;
pub use message::LinkMessage;
pub use network::{EmulatorConfig, PeerEmulator, ReceivedFile, TcpGattLink};
pub use protocol::{Frame, FrameType, TransactionId};
pub use state::TransferPhase;
pub use transfer::{
    GattLink, LinkCommand, LinkEvent, PeerRef, TransferConfig, TransferDriver, TransferProgress, TransferReport,
    TransferSession,
};
pub use tree::{Document, ForeignNode, NodeClass, Snapshot, TreeProvider};
