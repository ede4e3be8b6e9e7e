//! State machines shared by the transfer session and its driver.

pub mod transfer;

pub use transfer::TransferPhase;
