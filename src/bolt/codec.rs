//! Bolt message framing for tokio_util.
//!
//! A message is split into chunks, each prefixed with a 2-byte big-endian
//! length, and terminated by a zero-length chunk. A terminator with no
//! preceding chunks is a NOOP (keep-alive) and is skipped.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::message::{BoltRequest, BoltResponse};
use super::packstream::{decode_with_context, encode, DecodeContext, PackStreamValue};
use super::BoltError;

/// Largest chunk the encoder writes (16KB)
pub const MAX_CHUNK_SIZE: usize = 16384;

/// Default per-message ceiling (16MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// End of message marker (0x00 0x00)
pub const END_MARKER: [u8; 2] = [0x00, 0x00];

/// Chunked framing of single PackStream values.
#[derive(Debug)]
pub struct BoltCodec {
    max_message_size: usize,
    context: DecodeContext,
    message_buffer: BytesMut,
}

impl BoltCodec {
    /// Create a codec that decodes in the given direction.
    pub fn new(context: DecodeContext) -> Self {
        Self::with_max_size(context, DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a codec with a custom message ceiling.
    pub fn with_max_size(context: DecodeContext, max_message_size: usize) -> Self {
        Self {
            max_message_size,
            context,
            message_buffer: BytesMut::with_capacity(4096),
        }
    }

    /// True while a message has been partially received.
    pub fn in_message(&self) -> bool {
        !self.message_buffer.is_empty()
    }

    fn write_chunked(data: &[u8], dst: &mut BytesMut) {
        dst.reserve(data.len() + 2 * (data.len() / MAX_CHUNK_SIZE + 2));
        for chunk in data.chunks(MAX_CHUNK_SIZE) {
            dst.put_u16(chunk.len() as u16);
            dst.put_slice(chunk);
        }
        dst.put_slice(&END_MARKER);
    }
}

impl Decoder for BoltCodec {
    type Item = PackStreamValue;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < 2 {
                return Ok(None);
            }
            let chunk_size = u16::from_be_bytes([src[0], src[1]]) as usize;

            if chunk_size == 0 {
                src.advance(2);
                if self.message_buffer.is_empty() {
                    continue;
                }
                let message = self.message_buffer.split();
                return decode_with_context(&message, self.context)
                    .map(Some)
                    .map_err(BoltError::from);
            }

            if src.len() < 2 + chunk_size {
                src.reserve(2 + chunk_size - src.len());
                return Ok(None);
            }

            let size = self.message_buffer.len() + chunk_size;
            if size > self.max_message_size {
                self.message_buffer.clear();
                return Err(BoltError::MessageTooLarge {
                    size,
                    max: self.max_message_size,
                });
            }

            src.advance(2);
            self.message_buffer.extend_from_slice(&src[..chunk_size]);
            src.advance(chunk_size);
        }
    }
}

impl Encoder<PackStreamValue> for BoltCodec {
    type Error = BoltError;

    fn encode(&mut self, item: PackStreamValue, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let encoded = encode(&item)?;
        Self::write_chunked(&encoded, dst);
        Ok(())
    }
}

/// Server-side codec: decodes requests, encodes responses.
#[cfg(test)]
#[derive(Debug)]
pub struct BoltRequestCodec {
    inner: BoltCodec,
}

#[cfg(test)]
impl BoltRequestCodec {
    /// Create a new request codec.
    pub fn new() -> Self {
        Self {
            inner: BoltCodec::new(DecodeContext::Request),
        }
    }
}

#[cfg(test)]
impl Default for BoltRequestCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl Decoder for BoltRequestCodec {
    type Item = BoltRequest;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(PackStreamValue::Structure(s)) => Ok(Some(BoltRequest::from_structure(&s)?)),
            Some(other) => Err(BoltError::Protocol(format!(
                "expected message structure, got {}",
                other.type_name()
            ))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
impl Encoder<BoltResponse> for BoltRequestCodec {
    type Error = BoltError;

    fn encode(&mut self, item: BoltResponse, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner.encode(item.to_structure().into(), dst)
    }
}

/// Client-side codec: encodes requests, decodes responses.
#[derive(Debug)]
pub struct BoltResponseCodec {
    inner: BoltCodec,
}

impl BoltResponseCodec {
    /// Create a new response codec.
    pub fn new() -> Self {
        Self {
            inner: BoltCodec::new(DecodeContext::Response),
        }
    }

    /// Create a response codec with a custom message ceiling.
    pub fn with_max_size(max_message_size: usize) -> Self {
        Self {
            inner: BoltCodec::with_max_size(DecodeContext::Response, max_message_size),
        }
    }
}

impl Default for BoltResponseCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for BoltResponseCodec {
    type Item = BoltResponse;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(PackStreamValue::Structure(s)) => Ok(Some(BoltResponse::from_structure(s)?)),
            Some(other) => Err(BoltError::Protocol(format!(
                "expected message structure, got {}",
                other.type_name()
            ))),
            None => Ok(None),
        }
    }
}

impl Encoder<BoltRequest> for BoltResponseCodec {
    type Error = BoltError;

    fn encode(&mut self, item: BoltRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner.encode(item.to_structure().into(), dst)
    }
}
