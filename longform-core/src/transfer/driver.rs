//! Async driver that runs a [`TransferSession`] over a [`GattLink`].
//!
//! Events are taken one at a time from a single queue: the link's event
//! channel, plus completions of local operations (subscribe, failed
//! commands) that the driver queues itself. A peer that stays silent for
//! longer than [`TransferConfig::peer_timeout`] ends the session with
//! [`LinkError::Timeout`].

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{EncodingError, LinkError, LongformError};
use crate::protocol::TransactionId;
use crate::state::TransferPhase;
use crate::transfer::discovery::PeerRef;
use crate::transfer::link::{GattLink, LinkCommand, LinkEvent};
use crate::transfer::session::{TransferProgress, TransferSession};

// ── TransferConfig ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Longest silence tolerated from the link before giving up.
    pub peer_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            peer_timeout: Duration::from_secs(10),
        }
    }
}

/// Summary of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub txn_id: TransactionId,
    pub bytes: usize,
    pub mtu: u16,
    pub name_truncation: Option<EncodingError>,
}

// ── TransferDriver ───────────────────────────────────────────────

pub struct TransferDriver<L: GattLink> {
    link: L,
    events: mpsc::Receiver<LinkEvent>,
    config: TransferConfig,
    cancel: CancellationToken,
    progress: watch::Sender<TransferProgress>,
}

impl<L: GattLink> TransferDriver<L> {
    /// `events` must be the queue `link` reports on.
    pub fn new(link: L, events: mpsc::Receiver<LinkEvent>, config: TransferConfig) -> Self {
        let (progress, _) = watch::channel(TransferProgress::default());
        Self {
            link,
            events,
            config,
            cancel: CancellationToken::new(),
            progress,
        }
    }

    /// Receiver of status updates, one per processed event.
    pub fn progress(&self) -> watch::Receiver<TransferProgress> {
        self.progress.subscribe()
    }

    /// Cancelling the token aborts the transfer.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Send `session`'s payload to `peer`.
    pub async fn run(
        mut self,
        mut session: TransferSession,
        peer: PeerRef,
    ) -> Result<TransferReport, LongformError> {
        let cancel = self.cancel.clone();
        let peer_timeout = self.config.peer_timeout;
        let mut pending = VecDeque::new();

        let commands = session.connect(peer);
        self.execute(commands, &mut pending).await;
        self.publish(&session);

        while !session.is_finished() {
            let event = match pending.pop_front() {
                Some(event) => Some(event),
                None => tokio::select! {
                    _ = cancel.cancelled() => None,
                    received = tokio::time::timeout(peer_timeout, self.events.recv()) => {
                        Some(match received {
                            Ok(Some(event)) => event,
                            Ok(None) => LinkEvent::Disconnected,
                            Err(_) => LinkEvent::Failed(LinkError::Timeout(peer_timeout)),
                        })
                    }
                },
            };

            let commands = match event {
                Some(event) => session.handle(event),
                None => {
                    info!("transfer cancelled");
                    session.abort()
                }
            };
            self.execute(commands, &mut pending).await;
            self.publish(&session);
        }

        if session.phase() == TransferPhase::Complete {
            return Ok(TransferReport {
                txn_id: session.txn_id(),
                bytes: session.progress().confirmed,
                mtu: session.mtu(),
                name_truncation: session.name_truncation().cloned(),
            });
        }
        Err(session
            .take_failure()
            .map(LongformError::from)
            .unwrap_or(LongformError::Link(LinkError::Lost)))
    }

    async fn execute(&mut self, commands: Vec<LinkCommand>, pending: &mut VecDeque<LinkEvent>) {
        for command in commands {
            debug!(?command, "link command");
            let result = match command {
                LinkCommand::Connect(peer) => self.link.connect(&peer).await,
                LinkCommand::RequestMtu(mtu) => self.link.request_mtu(mtu).await,
                LinkCommand::DiscoverServices => self.link.discover_services().await,
                LinkCommand::Subscribe(characteristic) => self
                    .link
                    .subscribe(characteristic)
                    .await
                    .map(|ok| pending.push_back(LinkEvent::Subscribed { ok })),
                LinkCommand::WriteDescriptor {
                    characteristic,
                    descriptor,
                    value,
                } => {
                    self.link
                        .write_descriptor(characteristic, descriptor, value)
                        .await
                }
                LinkCommand::WriteCharacteristic {
                    characteristic,
                    value,
                } => self.link.write_characteristic(characteristic, value).await,
                LinkCommand::Close => {
                    self.link.close().await;
                    Ok(())
                }
            };
            if let Err(err) = result {
                pending.push_back(LinkEvent::Failed(err));
            }
        }
    }

    fn publish(&self, session: &TransferSession) {
        self.progress.send_replace(session.progress());
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use crate::protocol::{
        CCCD_UUID, CLIENT_CHARACTERISTIC_UUID, Frame, SERVER_CHARACTERISTIC_UUID, SERVICE_UUID,
    };
    use crate::transfer::link::{GattCharacteristic, GattService};
    use async_trait::async_trait;
    use bytes::{Bytes, BytesMut};
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    /// In-memory peer that answers every request immediately.
    struct ScriptedLink {
        events: mpsc::Sender<LinkEvent>,
        mtu: u16,
        reject_with: Option<i32>,
        silent_after_offer: bool,
        refuse_connect: bool,
        received: Arc<Mutex<BytesMut>>,
        closed: Arc<Mutex<u32>>,
    }

    impl ScriptedLink {
        fn new() -> (Self, mpsc::Receiver<LinkEvent>) {
            let (events, rx) = mpsc::channel(16);
            let link = Self {
                events,
                mtu: 64,
                reject_with: None,
                silent_after_offer: false,
                refuse_connect: false,
                received: Arc::default(),
                closed: Arc::default(),
            };
            (link, rx)
        }

        async fn emit(&self, event: LinkEvent) {
            let _ = self.events.send(event).await;
        }
    }

    #[async_trait]
    impl GattLink for ScriptedLink {
        async fn connect(&mut self, _peer: &PeerRef) -> Result<(), LinkError> {
            if self.refuse_connect {
                return Err(LinkError::ConnectFailed("refused".into()));
            }
            self.emit(LinkEvent::Connected).await;
            Ok(())
        }

        async fn request_mtu(&mut self, _mtu: u16) -> Result<(), LinkError> {
            self.emit(LinkEvent::MtuChanged(self.mtu)).await;
            Ok(())
        }

        async fn discover_services(&mut self) -> Result<(), LinkError> {
            self.emit(LinkEvent::ServicesDiscovered(vec![GattService {
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
            }]))
            .await;
            Ok(())
        }

        async fn subscribe(&mut self, _characteristic: Uuid) -> Result<bool, LinkError> {
            Ok(true)
        }

        async fn write_descriptor(
            &mut self,
            _characteristic: Uuid,
            _descriptor: Uuid,
            _value: Bytes,
        ) -> Result<(), LinkError> {
            self.emit(LinkEvent::DescriptorWritten { status: 0 }).await;
            Ok(())
        }

        async fn write_characteristic(&mut self, _characteristic: Uuid, value: Bytes) -> Result<(), LinkError> {
            let frame = Frame::decode(&value).map_err(|e| LinkError::WriteFailed(e.to_string()))?;
            match frame {
                Frame::Offer { txn_id, .. } => {
                    if self.silent_after_offer {
                        return Ok(());
                    }
                    self.emit(LinkEvent::CharacteristicWritten { status: 0 }).await;
                    let response = Frame::Response {
                        txn_id,
                        status: self.reject_with.unwrap_or(0),
                    };
                    self.emit(LinkEvent::Indication {
                        characteristic: SERVER_CHARACTERISTIC_UUID,
                        value: response.encode(),
                    })
                    .await;
                }
                Frame::Chunk { payload, .. } => {
                    self.received.lock().unwrap().extend_from_slice(&payload);
                    self.emit(LinkEvent::CharacteristicWritten { status: 0 }).await;
                }
                Frame::Response { .. } => {}
            }
            Ok(())
        }

        async fn close(&mut self) {
            *self.closed.lock().unwrap() += 1;
        }
    }

    #[tokio::test]
    async fn delivers_payload_and_reports_progress() {
        let (link, events) = ScriptedLink::new();
        let received = Arc::clone(&link.received);
        let closed = Arc::clone(&link.closed);
        let driver = TransferDriver::new(link, events, TransferConfig::default());
        let progress = driver.progress();

        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let session = TransferSession::new("article.txt", payload.clone()).unwrap();
        let report = driver.run(session, PeerRef::new("mock")).await.unwrap();

        assert_eq!(report.bytes, 1000);
        assert_eq!(report.mtu, 64);
        assert!(report.name_truncation.is_none());
        assert_eq!(&received.lock().unwrap()[..], &payload[..]);
        assert_eq!(*closed.lock().unwrap(), 1);

        let last = progress.borrow().clone();
        assert_eq!(last.phase, TransferPhase::Complete);
        assert_eq!(last.status, "File sent successfully");
    }

    #[tokio::test]
    async fn rejection_surfaces_as_protocol_error() {
        let (mut link, events) = ScriptedLink::new();
        link.reject_with = Some(2);
        let driver = TransferDriver::new(link, events, TransferConfig::default());
        let session = TransferSession::new("a.txt", "data").unwrap();

        let err = driver.run(session, PeerRef::new("mock")).await.unwrap_err();
        assert!(matches!(
            err,
            LongformError::Protocol(ProtocolError::PeerRejected { code: 2 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out() {
        let (mut link, events) = ScriptedLink::new();
        link.silent_after_offer = true;
        let closed = Arc::clone(&link.closed);
        let config = TransferConfig {
            peer_timeout: Duration::from_secs(3),
        };
        let driver = TransferDriver::new(link, events, config);
        let session = TransferSession::new("a.txt", "data").unwrap();

        let err = driver.run(session, PeerRef::new("mock")).await.unwrap_err();
        assert!(matches!(err, LongformError::Link(LinkError::Timeout(d)) if d == Duration::from_secs(3)));
        assert_eq!(*closed.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn connect_failure_ends_session() {
        let (mut link, events) = ScriptedLink::new();
        link.refuse_connect = true;
        let driver = TransferDriver::new(link, events, TransferConfig::default());
        let session = TransferSession::new("a.txt", "data").unwrap();

        let err = driver.run(session, PeerRef::new("mock")).await.unwrap_err();
        assert!(matches!(err, LongformError::Link(LinkError::ConnectFailed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts() {
        let (mut link, events) = ScriptedLink::new();
        link.silent_after_offer = true;
        let driver = TransferDriver::new(link, events, TransferConfig::default());
        let cancel = driver.cancel_token();
        let session = TransferSession::new("a.txt", "data").unwrap();

        let task = tokio::spawn(driver.run(session, PeerRef::new("mock")));
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, LongformError::Link(LinkError::Aborted)));
    }
}
