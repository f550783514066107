//! Bolt protocol version definitions.

use std::fmt;

/// A Bolt protocol version.
///
/// On the wire a version occupies 4 bytes: `[0x00, range, minor, major]`.
/// Ordering compares major first, then minor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoltVersion {
    /// Major version
    pub major: u8,
    /// Minor version
    pub minor: u8,
}

impl BoltVersion {
    /// Bolt 4.0
    pub const V4_0: BoltVersion = BoltVersion::new(4, 0);
    /// Bolt 4.1
    pub const V4_1: BoltVersion = BoltVersion::new(4, 1);
    /// Bolt 4.2
    pub const V4_2: BoltVersion = BoltVersion::new(4, 2);
    /// Bolt 4.3, adds ROUTE
    pub const V4_3: BoltVersion = BoltVersion::new(4, 3);
    /// Bolt 4.4
    pub const V4_4: BoltVersion = BoltVersion::new(4, 4);
    /// Bolt 5.0, adds element ids
    pub const V5_0: BoltVersion = BoltVersion::new(5, 0);

    /// Every version this crate can speak, newest first.
    pub const ALL: [BoltVersion; 6] = [
        BoltVersion::V5_0,
        BoltVersion::V4_4,
        BoltVersion::V4_3,
        BoltVersion::V4_2,
        BoltVersion::V4_1,
        BoltVersion::V4_0,
    ];

    /// Create a version.
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Check whether the client can speak this version.
    pub fn is_supported(self) -> bool {
        Self::ALL.contains(&self)
    }

    /// Encode as a server reply (no range).
    pub fn to_bytes(self) -> [u8; 4] {
        [0x00, 0x00, self.minor, self.major]
    }

    /// Decode a server reply. Returns `None` for the all-zero rejection.
    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        match bytes {
            [_, _, 0, 0] => None,
            [_, _, minor, major] => Some(Self::new(major, minor)),
        }
    }

    /// ROUTE message is available (4.3+).
    pub fn supports_route(self) -> bool {
        self >= Self::V4_3
    }

    /// Entities carry element ids (5.0+).
    pub fn has_element_ids(self) -> bool {
        self.major >= 5
    }
}

impl fmt::Display for BoltVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// One slot of the client's handshake: a version plus how many minor
/// versions below it are also acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionProposal {
    /// Highest acceptable version
    pub version: BoltVersion,
    /// Number of lower minor versions also acceptable
    pub range: u8,
}

impl VersionProposal {
    /// An exact version.
    pub const fn exact(version: BoltVersion) -> Self {
        Self { version, range: 0 }
    }

    /// A version plus `range` lower minors.
    pub const fn with_range(version: BoltVersion, range: u8) -> Self {
        Self { version, range }
    }

    /// Empty slot.
    pub const NONE: VersionProposal = VersionProposal {
        version: BoltVersion::new(0, 0),
        range: 0,
    };

    /// Wire form of this slot.
    pub fn to_bytes(self) -> [u8; 4] {
        [0x00, self.range, self.version.minor, self.version.major]
    }

    /// Parse a slot sent by a client.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            version: BoltVersion::new(bytes[3], bytes[2]),
            range: bytes[1],
        }
    }

    /// Whether `version` falls inside this proposal.
    pub fn accepts(self, version: BoltVersion) -> bool {
        self.version.major != 0
            && version.major == self.version.major
            && version.minor <= self.version.minor
            && version.minor >= self.version.minor.saturating_sub(self.range)
    }

    /// Versions covered by this proposal, highest first.
    pub fn versions(self) -> impl Iterator<Item = BoltVersion> {
        let low = self.version.minor.saturating_sub(self.range);
        let major = self.version.major;
        (low..=self.version.minor)
            .rev()
            .map(move |minor| BoltVersion::new(major, minor))
            .filter(move |_| major != 0)
    }
}

/// What the client proposes by default: 5.0, 4.4 down to 4.2, 4.1, 4.0.
pub const DEFAULT_PROPOSALS: [VersionProposal; 4] = [
    VersionProposal::exact(BoltVersion::V5_0),
    VersionProposal::with_range(BoltVersion::V4_4, 2),
    VersionProposal::exact(BoltVersion::V4_1),
    VersionProposal::exact(BoltVersion::V4_0),
];
