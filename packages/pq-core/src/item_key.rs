//! The 32-byte item identifier ("pop receipt") that names an enqueued item.
//!
//! Layout (see the module-level docs on [`ItemKey`]):
//!
//! ```text
//! bytes  0..15  128-bit uuid (random; globally unique)
//! bytes 16..23  partition_id (u64)
//! bytes 24..31  tag (u64; concurrency/version cookie, default 0)
//! ```
//!
//! The textual form is 64 lowercase hex characters: four 16-char
//! big-endian-printed u64 words, in the order `uuid_hi, uuid_lo,
//! partition_id, tag`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of hex characters in the textual form of an [`ItemKey`].
pub const HEX_LEN: usize = 64;
/// Number of bytes in the binary form of an [`ItemKey`].
pub const BYTE_LEN: usize = 32;

/// Opaque 32-byte handle that names an enqueued item and encodes its
/// partition.
///
/// Comparison, hashing, and equality treat the whole 32-byte blob as a
/// big-endian number, which falls out of deriving on the four `u64` words
/// in declaration order.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemKey {
    uuid_hi: u64,
    uuid_lo: u64,
    partition_id: u64,
    tag: u64,
}

/// Error returned when parsing an [`ItemKey`] from text or bytes fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ItemKeyParseError {
    /// The hex string was not exactly [`HEX_LEN`] characters.
    #[error("item key hex string must be {HEX_LEN} characters, got {0}")]
    WrongHexLength(usize),
    /// The byte slice was not exactly [`BYTE_LEN`] bytes.
    #[error("item key byte slice must be {BYTE_LEN} bytes, got {0}")]
    WrongByteLength(usize),
    /// The hex string contained a non-hex-digit character.
    #[error("item key hex string contains a non-hex character")]
    InvalidHexDigit,
}

impl ItemKey {
    /// Allocates a fresh key for `partition_id` with a random uuid and tag 0.
    #[must_use]
    pub fn new(partition_id: u64) -> Self {
        let mut rng = rand::rng();
        Self {
            uuid_hi: rng.next_u64(),
            uuid_lo: rng.next_u64(),
            partition_id,
            tag: 0,
        }
    }

    /// Builds a key from its four raw words. Exposed mainly for tests and
    /// for stores that need to reconstruct a key from persisted fields.
    #[must_use]
    pub const fn from_words(uuid_hi: u64, uuid_lo: u64, partition_id: u64, tag: u64) -> Self {
        Self {
            uuid_hi,
            uuid_lo,
            partition_id,
            tag,
        }
    }

    /// The partition this key belongs to.
    #[must_use]
    pub const fn partition_id(&self) -> u64 {
        self.partition_id
    }

    /// The concurrency/version cookie. Zero unless explicitly set.
    #[must_use]
    pub const fn tag(&self) -> u64 {
        self.tag
    }

    /// Returns a copy of this key with a new tag.
    #[must_use]
    pub const fn with_tag(mut self, tag: u64) -> Self {
        self.tag = tag;
        self
    }

    /// Renders the 32-byte binary form.
    #[must_use]
    pub fn to_bytes(self) -> [u8; BYTE_LEN] {
        let mut out = [0_u8; BYTE_LEN];
        out[0..8].copy_from_slice(&self.uuid_hi.to_be_bytes());
        out[8..16].copy_from_slice(&self.uuid_lo.to_be_bytes());
        out[16..24].copy_from_slice(&self.partition_id.to_be_bytes());
        out[24..32].copy_from_slice(&self.tag.to_be_bytes());
        out
    }

    /// Parses the 32-byte binary form. Rejects any length other than
    /// [`BYTE_LEN`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ItemKeyParseError> {
        if bytes.len() != BYTE_LEN {
            return Err(ItemKeyParseError::WrongByteLength(bytes.len()));
        }
        let word = |range: std::ops::Range<usize>| {
            let mut buf = [0_u8; 8];
            buf.copy_from_slice(&bytes[range]);
            u64::from_be_bytes(buf)
        };
        Ok(Self {
            uuid_hi: word(0..8),
            uuid_lo: word(8..16),
            partition_id: word(16..24),
            tag: word(24..32),
        })
    }

    /// Renders the lowercase 64-char hex form.
    #[must_use]
    pub fn to_hex_lower(self) -> String {
        format!(
            "{:016x}{:016x}{:016x}{:016x}",
            self.uuid_hi, self.uuid_lo, self.partition_id, self.tag
        )
    }

    /// Renders the uppercase 64-char hex form.
    #[must_use]
    pub fn to_hex_upper(self) -> String {
        format!(
            "{:016X}{:016X}{:016X}{:016X}",
            self.uuid_hi, self.uuid_lo, self.partition_id, self.tag
        )
    }

    /// Parses a hex string in either case. Rejects any length other than
    /// [`HEX_LEN`] or a non-hex-digit character.
    pub fn from_hex(s: &str) -> Result<Self, ItemKeyParseError> {
        if s.len() != HEX_LEN {
            return Err(ItemKeyParseError::WrongHexLength(s.len()));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ItemKeyParseError::InvalidHexDigit);
        }
        let word = |range: std::ops::Range<usize>| {
            // Length and hex-digit validity were just checked above.
            u64::from_str_radix(&s[range], 16).map_err(|_| ItemKeyParseError::InvalidHexDigit)
        };
        Ok(Self {
            uuid_hi: word(0..16)?,
            uuid_lo: word(16..32)?,
            partition_id: word(32..48)?,
            tag: word(48..64)?,
        })
    }
}

impl fmt::Debug for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ItemKey").field(&self.to_hex_lower()).finish()
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex_lower())
    }
}

impl FromStr for ItemKey {
    type Err = ItemKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl PartialOrd for ItemKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ItemKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Big-endian-number comparison over the four words in declaration
        // order, matching the big-endian byte layout of `to_bytes`.
        (self.uuid_hi, self.uuid_lo, self.partition_id, self.tag).cmp(&(
            other.uuid_hi,
            other.uuid_lo,
            other.partition_id,
            other.tag,
        ))
    }
}

impl Serialize for ItemKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex_lower())
    }
}

impl<'de> Deserialize<'de> for ItemKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
