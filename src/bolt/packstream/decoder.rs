//! PackStream decoder.

use bytes::Buf;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use super::marker::*;
use super::types::{PackStreamStructure, PackStreamValue};
use super::{DecodeContext, PackStreamError};

/// Deepest list/map/structure nesting the decoder accepts.
pub const MAX_NESTING_DEPTH: usize = 128;

/// PackStream decoder that reads values from a byte slice.
pub struct PackStreamDecoder<'a> {
    data: &'a [u8],
    context: DecodeContext,
    depth: usize,
}

impl<'a> PackStreamDecoder<'a> {
    /// Create a decoder for server responses.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_context(data, DecodeContext::Response)
    }

    /// Create a decoder for the given message direction.
    pub fn with_context(data: &'a [u8], context: DecodeContext) -> Self {
        Self { data, context, depth: 0 }
    }

    /// Get remaining bytes count.
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    /// Check if all data has been consumed.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> Result<PackStreamValue, PackStreamError> {
        let marker = self.read_u8()?;
        match marker {
            0x00..=0x7F | 0xF0..=0xFF => Ok(PackStreamValue::Integer(marker as i8 as i64)),
            0x80..=0x8F => self.read_string(low_nibble(marker)),
            0x90..=0x9F => self.nested(|d| d.read_list(low_nibble(marker))),
            0xA0..=0xAF => self.nested(|d| d.read_map(low_nibble(marker))),
            0xB0..=0xBF => self.nested(|d| d.read_structure(low_nibble(marker))),

            NULL => Ok(PackStreamValue::Null),
            TRUE => Ok(PackStreamValue::Boolean(true)),
            FALSE => Ok(PackStreamValue::Boolean(false)),
            FLOAT_64 => Ok(PackStreamValue::Float(self.take(8)?.get_f64())),

            INT_8 => Ok(PackStreamValue::Integer(self.take(1)?.get_i8() as i64)),
            INT_16 => Ok(PackStreamValue::Integer(self.take(2)?.get_i16() as i64)),
            INT_32 => Ok(PackStreamValue::Integer(self.take(4)?.get_i32() as i64)),
            INT_64 => Ok(PackStreamValue::Integer(self.take(8)?.get_i64())),

            BYTES_8 | BYTES_16 | BYTES_32 => {
                let len = self.read_len(marker, &BYTES)?;
                Ok(PackStreamValue::Bytes(self.take(len)?.to_vec()))
            }
            STRING_8 | STRING_16 | STRING_32 => {
                let len = self.read_len(marker, &STRING)?;
                self.read_string(len)
            }
            LIST_8 | LIST_16 | LIST_32 => {
                let len = self.read_len(marker, &LIST)?;
                self.nested(|d| d.read_list(len))
            }
            MAP_8 | MAP_16 | MAP_32 => {
                let len = self.read_len(marker, &MAP)?;
                self.nested(|d| d.read_map(len))
            }

            _ => Err(PackStreamError::UnknownMarker(marker)),
        }
    }

    fn nested<F>(&mut self, read: F) -> Result<PackStreamValue, PackStreamError>
    where
        F: FnOnce(&mut Self) -> Result<PackStreamValue, PackStreamError>,
    {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(PackStreamError::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        self.depth += 1;
        let value = read(self);
        self.depth -= 1;
        value
    }

    fn read_len(&mut self, marker: u8, markers: &SizedMarkers) -> Result<usize, PackStreamError> {
        let len = if marker == markers.len_8 {
            self.take(1)?.get_u8() as usize
        } else if marker == markers.len_16 {
            self.take(2)?.get_u16() as usize
        } else {
            self.take(4)?.get_u32() as usize
        };
        Ok(len)
    }

    fn read_string(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        let bytes = self.take(len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|e| PackStreamError::InvalidUtf8(e.to_string()))?;
        Ok(PackStreamValue::String(s.to_string()))
    }

    fn read_list(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        // Every element takes at least one byte, so the input bounds the allocation.
        let mut items = Vec::with_capacity(len.min(self.remaining()));
        for _ in 0..len {
            items.push(self.decode()?);
        }
        Ok(PackStreamValue::List(items))
    }

    fn read_map(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        let mut map = HashMap::with_capacity(len.min(self.remaining() / 2));
        for _ in 0..len {
            let key = match self.decode()? {
                PackStreamValue::String(s) => s,
                _ => return Err(PackStreamError::InvalidMapKey),
            };
            let value = self.decode()?;
            match map.entry(key) {
                Entry::Occupied(e) => return Err(PackStreamError::DuplicateMapKey(e.key().clone())),
                Entry::Vacant(e) => {
                    e.insert(value);
                }
            }
        }
        Ok(PackStreamValue::Map(map))
    }

    fn read_structure(&mut self, field_count: usize) -> Result<PackStreamValue, PackStreamError> {
        let tag = self.read_u8()?;
        if self.context == DecodeContext::Request && is_graph_tag(tag) {
            return Err(PackStreamError::UnexpectedStructure(tag));
        }
        let mut fields = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            fields.push(self.decode()?);
        }
        Ok(PackStreamValue::Structure(PackStreamStructure::new(tag, fields)))
    }

    fn read_u8(&mut self) -> Result<u8, PackStreamError> {
        Ok(self.take(1)?[0])
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], PackStreamError> {
        if self.data.len() < len {
            return Err(PackStreamError::UnexpectedEof);
        }
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }
}

#[inline]
fn low_nibble(marker: u8) -> usize {
    (marker & 0x0F) as usize
}

/// Decode exactly one response value from `data`.
pub fn decode(data: &[u8]) -> Result<PackStreamValue, PackStreamError> {
    decode_with_context(data, DecodeContext::Response)
}

/// Decode exactly one value; trailing bytes are an error.
pub fn decode_with_context(
    data: &[u8],
    context: DecodeContext,
) -> Result<PackStreamValue, PackStreamError> {
    let mut decoder = PackStreamDecoder::with_context(data, context);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(PackStreamError::TrailingBytes(decoder.remaining()));
    }
    Ok(value)
}
