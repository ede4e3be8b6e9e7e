//! Length-prefixed framing for [`LinkMessage`]s over a byte stream.
//!
//! ```text
//! length: u32 LE   body: [u8; length]  (bincode)
//! ```

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::LongformError;
use crate::message::LinkMessage;

/// Largest body accepted in either direction.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

const LENGTH_PREFIX: usize = 4;

#[derive(Debug, Default, Clone, Copy)]
pub struct LinkCodec;

impl Decoder for LinkCodec {
    type Item = LinkMessage;
    type Error = LongformError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX]);
        let length = u32::from_le_bytes(prefix) as usize;
        if length > MAX_FRAME_SIZE {
            return Err(LongformError::Other(format!(
                "frame size exceeded: {length} > {MAX_FRAME_SIZE}"
            )));
        }

        if src.len() < LENGTH_PREFIX + length {
            src.reserve(LENGTH_PREFIX + length - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        let body = src.split_to(length);
        LinkMessage::from_bytes(&body).map(Some)
    }
}

impl Encoder<LinkMessage> for LinkCodec {
    type Error = LongformError;

    fn encode(&mut self, item: LinkMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = item.to_bytes()?;
        if body.len() > MAX_FRAME_SIZE {
            return Err(LongformError::Other(format!(
                "frame size exceeded: {} > {MAX_FRAME_SIZE}",
                body.len()
            )));
        }
        dst.reserve(LENGTH_PREFIX + body.len());
        dst.put_u32_le(body.len() as u32);
        dst.extend_from_slice(&body);
        Ok(())
    }
}
