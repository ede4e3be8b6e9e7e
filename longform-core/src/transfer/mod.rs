//! Sending a file to an e-ink peer.
//!
//! [`TransferSession`] holds the protocol state machine and does no I/O.
//! [`TransferDriver`] runs it against a [`GattLink`]; the TCP emulation in
//! [`crate::network`] provides one, and a radio backend would provide
//! another.

pub mod discovery;
pub mod driver;
pub mod link;
pub mod session;

pub use discovery::{Advertisement, PeerRef, PeerScanner};
pub use driver::{TransferConfig, TransferDriver, TransferReport};
pub use link::{GattCharacteristic, GattLink, GattService, LinkCommand, LinkEvent};
pub use session::{TransferFailure, TransferProgress, TransferSession};
