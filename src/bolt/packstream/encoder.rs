//! PackStream encoder.

use bytes::{BufMut, BytesMut};
use std::collections::HashMap;

use super::marker::*;
use super::types::{PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// PackStream encoder that appends values to a byte buffer.
///
/// Sizes always use the smallest header class that fits.
pub struct PackStreamEncoder {
    buffer: BytesMut,
}

impl PackStreamEncoder {
    /// Create a new encoder with default buffer capacity.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create a new encoder with specified buffer capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Get the current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consume the encoder and return the bytes.
    pub fn into_bytes(self) -> BytesMut {
        self.buffer
    }

    /// Get the bytes as a slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Encode a value.
    ///
    /// On error the buffer may hold a partial encoding and should be discarded.
    pub fn encode(&mut self, value: &PackStreamValue) -> Result<(), PackStreamError> {
        match value {
            PackStreamValue::Null => self.buffer.put_u8(NULL),
            PackStreamValue::Boolean(b) => self.buffer.put_u8(if *b { TRUE } else { FALSE }),
            PackStreamValue::Integer(i) => self.encode_int(*i),
            PackStreamValue::Float(f) => {
                self.buffer.put_u8(FLOAT_64);
                self.buffer.put_f64(*f);
            }
            PackStreamValue::Bytes(b) => {
                self.write_header(&BYTES, b.len())?;
                self.buffer.put_slice(b);
            }
            PackStreamValue::String(s) => self.encode_string(s)?,
            PackStreamValue::List(items) => {
                self.write_header(&LIST, items.len())?;
                for item in items {
                    self.encode(item)?;
                }
            }
            PackStreamValue::Map(map) => self.encode_map(map)?,
            PackStreamValue::Structure(s) => self.encode_structure(s)?,
        }
        Ok(())
    }

    /// Encode an integer using the smallest representation.
    pub fn encode_int(&mut self, value: i64) {
        if (TINY_INT_MIN..=TINY_INT_MAX).contains(&value) {
            self.buffer.put_i8(value as i8);
        } else if let Ok(v) = i8::try_from(value) {
            self.buffer.put_u8(INT_8);
            self.buffer.put_i8(v);
        } else if let Ok(v) = i16::try_from(value) {
            self.buffer.put_u8(INT_16);
            self.buffer.put_i16(v);
        } else if let Ok(v) = i32::try_from(value) {
            self.buffer.put_u8(INT_32);
            self.buffer.put_i32(v);
        } else {
            self.buffer.put_u8(INT_64);
            self.buffer.put_i64(value);
        }
    }

    /// Encode a string.
    pub fn encode_string(&mut self, value: &str) -> Result<(), PackStreamError> {
        self.write_header(&STRING, value.len())?;
        self.buffer.put_slice(value.as_bytes());
        Ok(())
    }

    /// Encode a map.
    pub fn encode_map(
        &mut self,
        map: &HashMap<String, PackStreamValue>,
    ) -> Result<(), PackStreamError> {
        self.write_header(&MAP, map.len())?;
        for (key, value) in map {
            self.encode_string(key)?;
            self.encode(value)?;
        }
        Ok(())
    }

    /// Encode a structure.
    pub fn encode_structure(&mut self, s: &PackStreamStructure) -> Result<(), PackStreamError> {
        let len = s.fields.len();
        if len > MAX_STRUCT_FIELDS {
            return Err(PackStreamError::ValueTooLarge("structure", len));
        }
        self.buffer.put_u8(TINY_STRUCT + len as u8);
        self.buffer.put_u8(s.tag);
        for field in &s.fields {
            self.encode(field)?;
        }
        Ok(())
    }

    fn write_header(&mut self, markers: &SizedMarkers, len: usize) -> Result<(), PackStreamError> {
        match (markers.tiny, len) {
            (Some(base), n) if n <= TINY_MAX_LEN => self.buffer.put_u8(base + n as u8),
            (_, n) if n <= u8::MAX as usize => {
                self.buffer.put_u8(markers.len_8);
                self.buffer.put_u8(n as u8);
            }
            (_, n) if n <= u16::MAX as usize => {
                self.buffer.put_u8(markers.len_16);
                self.buffer.put_u16(n as u16);
            }
            (_, n) if n <= u32::MAX as usize => {
                self.buffer.put_u8(markers.len_32);
                self.buffer.put_u32(n as u32);
            }
            (_, n) => return Err(PackStreamError::ValueTooLarge(markers.name, n)),
        }
        Ok(())
    }
}

impl Default for PackStreamEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience function to encode a single value.
pub fn encode(value: &PackStreamValue) -> Result<BytesMut, PackStreamError> {
    let mut encoder = PackStreamEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}
