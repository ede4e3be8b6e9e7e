//! Filtering scan results down to longform peers.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::SERVICE_UUID;

/// A peer the user can pick as a transfer target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerRef {
    /// Radio address, or `host:port` for emulated peers.
    pub address: String,
    pub name: Option<String>,
}

impl PeerRef {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    pub fn named(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: Some(name.into()),
        }
    }
}

impl fmt::Display for PeerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.name.as_deref().unwrap_or("Unknown"),
            self.address
        )
    }
}

/// One advertisement seen while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub address: String,
    pub name: Option<String>,
    pub service_uuids: Vec<Uuid>,
}

/// Collects peers advertising the longform service, first-seen order.
#[derive(Debug, Default)]
pub struct PeerScanner {
    seen: HashSet<String>,
    peers: Vec<PeerRef>,
}

impl PeerScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one advertisement. Returns the peer if it is new.
    pub fn observe(&mut self, ad: Advertisement) -> Option<&PeerRef> {
        if !ad.service_uuids.contains(&SERVICE_UUID) {
            return None;
        }
        if !self.seen.insert(ad.address.clone()) {
            return None;
        }
        self.peers.push(PeerRef {
            address: ad.address,
            name: ad.name,
        });
        self.peers.last()
    }

    /// Record a batch of advertisements.
    pub fn observe_all(&mut self, ads: impl IntoIterator<Item = Advertisement>) {
        for ad in ads {
            self.observe(ad);
        }
    }

    pub fn peers(&self) -> &[PeerRef] {
        &self.peers
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.peers.clear();
    }
}
