//! [`GattLink`] over a TCP connection to a peer emulator.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::codec::LinkCodec;
use crate::error::LinkError;
use crate::message::LinkMessage;
use crate::transfer::{GattLink, LinkEvent, PeerRef};

/// Capacity of the outgoing message queue and of the event queue.
const QUEUE_DEPTH: usize = 100;

type Subscriptions = Arc<Mutex<HashSet<Uuid>>>;

/// Emulated GATT client link.
///
/// Incoming peer messages are turned into [`LinkEvent`]s on the queue
/// returned by [`TcpGattLink::new`]; indications are dropped until the
/// characteristic has been subscribed to.
#[derive(Debug)]
pub struct TcpGattLink {
    events: mpsc::Sender<LinkEvent>,
    tx: Option<mpsc::Sender<LinkMessage>>,
    subscriptions: Subscriptions,
    cancel: CancellationToken,
}

impl TcpGattLink {
    pub fn new() -> (Self, mpsc::Receiver<LinkEvent>) {
        let (events, rx) = mpsc::channel(QUEUE_DEPTH);
        let link = Self {
            events,
            tx: None,
            subscriptions: Arc::default(),
            cancel: CancellationToken::new(),
        };
        (link, rx)
    }

    /// Attach to an already-open stream and report `Connected`.
    pub async fn attach(&mut self, stream: TcpStream) -> Result<(), LinkError> {
        let (mut net_writer, mut net_reader) = Framed::new(stream, LinkCodec).split();

        // Link -> Network
        let (user_tx, mut network_rx) = mpsc::channel::<LinkMessage>(QUEUE_DEPTH);
        tokio::spawn(async move {
            while let Some(message) = network_rx.recv().await {
                if let Err(e) = net_writer.send(message).await {
                    warn!("link write error: {e}");
                    break;
                }
            }
            let _ = net_writer.close().await;
        });

        // Network -> Events
        let events = self.events.clone();
        let subscriptions = Arc::clone(&self.subscriptions);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => return,
                    next = net_reader.next() => next,
                };
                let message = match next {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => {
                        warn!("link read error: {e}");
                        break;
                    }
                    None => break,
                };
                if let LinkMessage::Indication { characteristic, .. } = &message {
                    let subscribed = subscriptions
                        .lock()
                        .map(|s| s.contains(characteristic))
                        .unwrap_or(false);
                    if !subscribed {
                        trace!(%characteristic, "indication without subscription dropped");
                        continue;
                    }
                }
                let Some(event) = message.into_event() else {
                    continue;
                };
                if events.send(event).await.is_err() {
                    return;
                }
            }
            if !cancel.is_cancelled() {
                let _ = events.send(LinkEvent::Disconnected).await;
            }
        });

        self.tx = Some(user_tx);
        self.events
            .send(LinkEvent::Connected)
            .await
            .map_err(|_| LinkError::NotConnected)
    }

    async fn send(&self, message: LinkMessage) -> Result<(), LinkError> {
        let tx = self.tx.as_ref().ok_or(LinkError::NotConnected)?;
        tx.send(message).await.map_err(|_| LinkError::Lost)
    }
}

#[async_trait]
impl GattLink for TcpGattLink {
    async fn connect(&mut self, peer: &PeerRef) -> Result<(), LinkError> {
        debug!(%peer, "connecting");
        let stream = TcpStream::connect(&peer.address)
            .await
            .map_err(|e| LinkError::ConnectFailed(format!("{}: {e}", peer.address)))?;
        self.attach(stream).await
    }

    async fn request_mtu(&mut self, mtu: u16) -> Result<(), LinkError> {
        self.send(LinkMessage::MtuRequest { mtu }).await
    }

    async fn discover_services(&mut self) -> Result<(), LinkError> {
        self.send(LinkMessage::DiscoverServices).await
    }

    async fn subscribe(&mut self, characteristic: Uuid) -> Result<bool, LinkError> {
        if self.tx.is_none() {
            return Err(LinkError::NotConnected);
        }
        let mut subscriptions = self
            .subscriptions
            .lock()
            .map_err(|_| LinkError::Lost)?;
        subscriptions.insert(characteristic);
        Ok(true)
    }

    async fn write_descriptor(
        &mut self,
        characteristic: Uuid,
        descriptor: Uuid,
        value: Bytes,
    ) -> Result<(), LinkError> {
        self.send(LinkMessage::WriteDescriptor {
            characteristic,
            descriptor,
            value: value.to_vec(),
        })
        .await
    }

    async fn write_characteristic(&mut self, characteristic: Uuid, value: Bytes) -> Result<(), LinkError> {
        self.send(LinkMessage::WriteCharacteristic {
            characteristic,
            value: value.to_vec(),
        })
        .await
    }

    async fn close(&mut self) {
        self.cancel.cancel();
        // Dropping the sender ends the writer task, which closes the socket.
        self.tx = None;
    }
}
