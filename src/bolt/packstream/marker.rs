//! PackStream type markers.
//!
//! Every value starts with a marker byte. Sized types (strings, bytes,
//! lists, maps) come in size classes: a tiny form that stores the length in
//! the low nibble of the marker, then 8, 16 and 32-bit length headers.

/// Null marker
pub const NULL: u8 = 0xC0;
/// 64-bit IEEE 754 float, big-endian
pub const FLOAT_64: u8 = 0xC1;
/// Boolean false
pub const FALSE: u8 = 0xC2;
/// Boolean true
pub const TRUE: u8 = 0xC3;

/// Smallest integer stored inline in the marker byte
pub const TINY_INT_MIN: i64 = -16;
/// Largest integer stored inline in the marker byte
pub const TINY_INT_MAX: i64 = 127;
/// 8-bit integer
pub const INT_8: u8 = 0xC8;
/// 16-bit integer
pub const INT_16: u8 = 0xC9;
/// 32-bit integer
pub const INT_32: u8 = 0xCA;
/// 64-bit integer
pub const INT_64: u8 = 0xCB;

/// Byte array with 8-bit length
pub const BYTES_8: u8 = 0xCC;
/// Byte array with 16-bit length
pub const BYTES_16: u8 = 0xCD;
/// Byte array with 32-bit length
pub const BYTES_32: u8 = 0xCE;

/// Tiny string base (0x80..=0x8F)
pub const TINY_STRING: u8 = 0x80;
/// String with 8-bit length
pub const STRING_8: u8 = 0xD0;
/// String with 16-bit length
pub const STRING_16: u8 = 0xD1;
/// String with 32-bit length
pub const STRING_32: u8 = 0xD2;

/// Tiny list base (0x90..=0x9F)
pub const TINY_LIST: u8 = 0x90;
/// List with 8-bit length
pub const LIST_8: u8 = 0xD4;
/// List with 16-bit length
pub const LIST_16: u8 = 0xD5;
/// List with 32-bit length
pub const LIST_32: u8 = 0xD6;

/// Tiny map base (0xA0..=0xAF)
pub const TINY_MAP: u8 = 0xA0;
/// Map with 8-bit length
pub const MAP_8: u8 = 0xD8;
/// Map with 16-bit length
pub const MAP_16: u8 = 0xD9;
/// Map with 32-bit length
pub const MAP_32: u8 = 0xDA;

/// Tiny structure base (0xB0..=0xBF)
pub const TINY_STRUCT: u8 = 0xB0;
/// Maximum number of fields a structure may carry
pub const MAX_STRUCT_FIELDS: usize = 15;

/// Largest length carried by a tiny marker
pub const TINY_MAX_LEN: usize = 15;

/// Node structure tag ('N')
pub const NODE_TAG: u8 = 0x4E;
/// Relationship structure tag ('R')
pub const RELATIONSHIP_TAG: u8 = 0x52;
/// Unbound relationship structure tag ('r')
pub const UNBOUND_RELATIONSHIP_TAG: u8 = 0x72;
/// Path structure tag ('P')
pub const PATH_TAG: u8 = 0x50;

/// Returns true for the tags of graph structures, which only servers send.
#[inline]
pub fn is_graph_tag(tag: u8) -> bool {
    matches!(
        tag,
        NODE_TAG | RELATIONSHIP_TAG | UNBOUND_RELATIONSHIP_TAG | PATH_TAG
    )
}

/// Marker set of a length-prefixed type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizedMarkers {
    /// Name used in error messages
    pub name: &'static str,
    /// Tiny marker base, if the type has a tiny form
    pub tiny: Option<u8>,
    /// 8-bit length marker
    pub len_8: u8,
    /// 16-bit length marker
    pub len_16: u8,
    /// 32-bit length marker
    pub len_32: u8,
}

/// Markers for byte arrays (no tiny form).
pub const BYTES: SizedMarkers = SizedMarkers {
    name: "bytes",
    tiny: None,
    len_8: BYTES_8,
    len_16: BYTES_16,
    len_32: BYTES_32,
};

/// Markers for strings.
pub const STRING: SizedMarkers = SizedMarkers {
    name: "string",
    tiny: Some(TINY_STRING),
    len_8: STRING_8,
    len_16: STRING_16,
    len_32: STRING_32,
};

/// Markers for lists.
pub const LIST: SizedMarkers = SizedMarkers {
    name: "list",
    tiny: Some(TINY_LIST),
    len_8: LIST_8,
    len_16: LIST_16,
    len_32: LIST_32,
};

/// Markers for maps.
pub const MAP: SizedMarkers = SizedMarkers {
    name: "map",
    tiny: Some(TINY_MAP),
    len_8: MAP_8,
    len_16: MAP_16,
    len_32: MAP_32,
};

/// Size of the header for a value of `len` elements (marker byte included).
pub fn header_len(markers: &SizedMarkers, len: usize) -> usize {
    match len {
        n if markers.tiny.is_some() && n <= TINY_MAX_LEN => 1,
        n if n <= u8::MAX as usize => 2,
        n if n <= u16::MAX as usize => 3,
        _ => 5,
    }
}
