//! Offer / Response / Chunk frames.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::Rng;

use crate::error::ProtocolError;
use crate::protocol::{CHUNK_HEADER_SIZE, OFFER_HEADER_SIZE, PROTOCOL_VERSION, RESPONSE_SIZE};

// ── FrameType ────────────────────────────────────────────────────

/// Leading type field of every frame.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Offer = 0,
    Response = 1,
    Chunk = 2,
}

impl TryFrom<u32> for FrameType {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FrameType::Offer),
            1 => Ok(FrameType::Response),
            2 => Ok(FrameType::Chunk),
            other => Err(ProtocolError::UnknownFrameType(other)),
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameType::Offer => write!(f, "Offer"),
            FrameType::Response => write!(f, "Response"),
            FrameType::Chunk => write!(f, "Chunk"),
        }
    }
}

// ── TransactionId ────────────────────────────────────────────────

/// Session identifier carried by every frame; always in `1..=i32::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(u32);

impl TransactionId {
    pub const MAX: u32 = i32::MAX as u32;

    /// Draw a fresh id for a new session.
    pub fn random() -> Self {
        Self(rand::thread_rng().gen_range(1..=Self::MAX))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for TransactionId {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if (1..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ProtocolError::InvalidTransactionId(value))
        }
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Frame ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Host proposes a file.
    Offer {
        txn_id: TransactionId,
        version: u32,
        total_length: u32,
        name: Bytes,
    },
    /// Peer accepts (`status == 0`) or refuses an offer.
    Response { txn_id: TransactionId, status: i32 },
    /// A slice of the payload starting at `offset`.
    Chunk {
        txn_id: TransactionId,
        offset: u32,
        payload: Bytes,
    },
}

impl Frame {
    pub fn offer(txn_id: TransactionId, total_length: u32, name: Bytes) -> Self {
        Frame::Offer {
            txn_id,
            version: PROTOCOL_VERSION,
            total_length,
            name,
        }
    }

    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Offer { .. } => FrameType::Offer,
            Frame::Response { .. } => FrameType::Response,
            Frame::Chunk { .. } => FrameType::Chunk,
        }
    }

    pub fn txn_id(&self) -> TransactionId {
        match self {
            Frame::Offer { txn_id, .. }
            | Frame::Response { txn_id, .. }
            | Frame::Chunk { txn_id, .. } => *txn_id,
        }
    }

    /// Size of the encoded frame.
    pub fn encoded_len(&self) -> usize {
        match self {
            Frame::Offer { name, .. } => OFFER_HEADER_SIZE + name.len(),
            Frame::Response { .. } => RESPONSE_SIZE,
            Frame::Chunk { payload, .. } => CHUNK_HEADER_SIZE + payload.len(),
        }
    }

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u32_le(self.frame_type() as u32);
        buf.put_u32_le(self.txn_id().get());
        match self {
            Frame::Offer {
                version,
                total_length,
                name,
                ..
            } => {
                buf.put_u32_le(*version);
                buf.put_u32_le(*total_length);
                buf.put_u32_le(name.len() as u32);
                buf.put_slice(name);
            }
            Frame::Response { status, .. } => buf.put_i32_le(*status),
            Frame::Chunk {
                offset, payload, ..
            } => {
                buf.put_u32_le(*offset);
                buf.put_slice(payload);
            }
        }
        buf.freeze()
    }

    /// Deserialize from bytes.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < 8 {
            return Err(ProtocolError::MalformedFrame("shorter than type and txn_id"));
        }
        let mut buf = data;
        let frame_type = FrameType::try_from(buf.get_u32_le())?;
        let txn_id = TransactionId(buf.get_u32_le());

        match frame_type {
            FrameType::Offer => {
                if data.len() < OFFER_HEADER_SIZE {
                    return Err(ProtocolError::MalformedFrame("offer header truncated"));
                }
                let version = buf.get_u32_le();
                let total_length = buf.get_u32_le();
                let name_length = buf.get_u32_le() as usize;
                if buf.remaining() != name_length {
                    return Err(ProtocolError::MalformedFrame("offer name length mismatch"));
                }
                Ok(Frame::Offer {
                    txn_id,
                    version,
                    total_length,
                    name: Bytes::copy_from_slice(buf),
                })
            }
            FrameType::Response => {
                if data.len() < RESPONSE_SIZE {
                    return Err(ProtocolError::MalformedFrame("response truncated"));
                }
                Ok(Frame::Response {
                    txn_id,
                    status: buf.get_i32_le(),
                })
            }
            FrameType::Chunk => {
                if data.len() < CHUNK_HEADER_SIZE {
                    return Err(ProtocolError::MalformedFrame("chunk header truncated"));
                }
                let offset = buf.get_u32_le();
                Ok(Frame::Chunk {
                    txn_id,
                    offset,
                    payload: Bytes::copy_from_slice(buf),
                })
            }
        }
    }
}
