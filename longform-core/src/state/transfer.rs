//! Transfer session state machine.
//!
//! Provides a `TransferPhase` enum that models the lifecycle of one file
//! transfer to a peer, with validated transitions that return `Result`
//! instead of panicking.

use crate::error::LongformError;

// ── TransferPhase ────────────────────────────────────────────────

/// The current phase of a transfer session.
///
/// ```text
///  Idle ─► Connecting ─► NegotiatingSize ─► DiscoveringCapabilities
///                                                    │
///        SendingChunks ◄─ AwaitingOfferAck ◄─ SendingOffer ◄─ EnablingNotifications
///              │
///              ▼
///          Complete            (any non-terminal) ─► Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferPhase {
    #[default]
    Idle,

    /// Link open requested.
    Connecting,

    /// Link is up; MTU request outstanding.
    NegotiatingSize,

    /// Service discovery outstanding.
    DiscoveringCapabilities,

    /// Subscribing locally and enabling indications on the peer.
    EnablingNotifications,

    /// Offer write outstanding.
    SendingOffer,

    /// Offer written; waiting for the peer's response.
    AwaitingOfferAck,

    /// Offer accepted; chunks are being written one at a time.
    SendingChunks,

    /// Every byte confirmed. Terminal.
    Complete,

    /// Link lost, aborted or failed. Terminal.
    Disconnected,
}

impl std::fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::NegotiatingSize => "NegotiatingSize",
            Self::DiscoveringCapabilities => "DiscoveringCapabilities",
            Self::EnablingNotifications => "EnablingNotifications",
            Self::SendingOffer => "SendingOffer",
            Self::AwaitingOfferAck => "AwaitingOfferAck",
            Self::SendingChunks => "SendingChunks",
            Self::Complete => "Complete",
            Self::Disconnected => "Disconnected",
        };
        f.write_str(name)
    }
}

impl TransferPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Disconnected)
    }

    /// Whether an offer response from the peer is meaningful now.
    pub fn accepts_response(&self) -> bool {
        matches!(self, Self::SendingOffer | Self::AwaitingOfferAck)
    }

    fn advance(
        &mut self,
        from: &[TransferPhase],
        to: TransferPhase,
        err: &'static str,
    ) -> Result<(), LongformError> {
        if from.contains(self) {
            *self = to;
            Ok(())
        } else {
            Err(LongformError::InvalidTransition(err))
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Valid from: `Idle`.
    pub fn begin_connect(&mut self) -> Result<(), LongformError> {
        self.advance(&[Self::Idle], Self::Connecting, "cannot connect: not in Idle state")
    }

    /// Valid from: `Connecting`.
    pub fn link_up(&mut self) -> Result<(), LongformError> {
        self.advance(
            &[Self::Connecting],
            Self::NegotiatingSize,
            "link up outside Connecting state",
        )
    }

    /// Valid from: `NegotiatingSize`.
    pub fn begin_discovery(&mut self) -> Result<(), LongformError> {
        self.advance(
            &[Self::NegotiatingSize],
            Self::DiscoveringCapabilities,
            "cannot discover: not in NegotiatingSize state",
        )
    }

    /// Valid from: `DiscoveringCapabilities`.
    pub fn begin_enabling(&mut self) -> Result<(), LongformError> {
        self.advance(
            &[Self::DiscoveringCapabilities],
            Self::EnablingNotifications,
            "cannot enable indications: discovery not finished",
        )
    }

    /// Valid from: `EnablingNotifications`.
    pub fn begin_offer(&mut self) -> Result<(), LongformError> {
        self.advance(
            &[Self::EnablingNotifications],
            Self::SendingOffer,
            "cannot send offer: indications not enabled",
        )
    }

    /// Valid from: `SendingOffer`.
    pub fn offer_written(&mut self) -> Result<(), LongformError> {
        self.advance(
            &[Self::SendingOffer],
            Self::AwaitingOfferAck,
            "offer written outside SendingOffer state",
        )
    }

    /// Valid from: `SendingOffer`, `AwaitingOfferAck`.
    pub fn offer_accepted(&mut self) -> Result<(), LongformError> {
        self.advance(
            &[Self::SendingOffer, Self::AwaitingOfferAck],
            Self::SendingChunks,
            "offer accepted while no offer outstanding",
        )
    }

    /// Valid from: `SendingChunks`.
    pub fn complete(&mut self) -> Result<(), LongformError> {
        self.advance(
            &[Self::SendingChunks],
            Self::Complete,
            "cannot complete: not in SendingChunks state",
        )
    }

    /// Move to `Disconnected` from any non-terminal state.
    ///
    /// Returns `false` when the session had already ended.
    pub fn force_disconnect(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        *self = Self::Disconnected;
        true
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_lifecycle() {
        let mut phase = TransferPhase::default();
        phase.begin_connect().unwrap();
        phase.link_up().unwrap();
        phase.begin_discovery().unwrap();
        phase.begin_enabling().unwrap();
        phase.begin_offer().unwrap();
        phase.offer_written().unwrap();
        assert!(phase.accepts_response());
        phase.offer_accepted().unwrap();
        phase.complete().unwrap();
        assert_eq!(phase, TransferPhase::Complete);
        assert!(phase.is_terminal());
    }

    #[test]
    fn response_may_beat_write_completion() {
        let mut phase = TransferPhase::SendingOffer;
        phase.offer_accepted().unwrap();
        assert_eq!(phase, TransferPhase::SendingChunks);
    }

    #[test]
    fn invalid_transitions() {
        let mut phase = TransferPhase::Idle;
        assert!(phase.link_up().is_err());
        assert!(phase.complete().is_err());

        let mut phase = TransferPhase::Connecting;
        assert!(phase.begin_connect().is_err());
        assert_eq!(phase, TransferPhase::Connecting);
    }

    #[test]
    fn disconnected_is_absorbing() {
        let mut phase = TransferPhase::SendingChunks;
        assert!(phase.force_disconnect());
        assert!(!phase.force_disconnect());
        assert!(phase.begin_connect().is_err());

        let mut phase = TransferPhase::Complete;
        assert!(!phase.force_disconnect());
        assert_eq!(phase, TransferPhase::Complete);
    }

    #[test]
    fn display_format() {
        assert_eq!(TransferPhase::AwaitingOfferAck.to_string(), "AwaitingOfferAck");
        assert_eq!(TransferPhase::default().to_string(), "Idle");
    }
}
