//! GATT link emulation over TCP.
//!
//! [`TcpGattLink`] is the host side and implements
//! [`GattLink`](crate::transfer::GattLink); [`PeerEmulator`] plays the
//! e-ink peer.

pub mod connection;
pub mod emulator;

pub use connection::TcpGattLink;
pub use emulator::{EmulatorConfig, PeerEmulator, ReceivedFile, longform_profile};
