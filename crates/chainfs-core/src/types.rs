use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of a chunk address in bytes (BLAKE3 digest)
pub const ADDRESS_SIZE: usize = 32;

/// Content address of an encrypted chunk: BLAKE3 of the stored bytes.
///
/// Displayed and parsed as 64 lowercase hex chars, which is also the object
/// name used by the chunk store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    /// The all-zero address, written into the `next` field of terminal chunks
    pub const ZERO: Address = Address([0u8; ADDRESS_SIZE]);

    pub fn from_bytes(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    /// Compute the address of an encrypted chunk.
    pub fn of(encrypted: &[u8]) -> Self {
        Self(*blake3::hash(encrypted).as_bytes())
    }

    /// Returns true if `encrypted` hashes to this address.
    pub fn matches(&self, encrypted: &[u8]) -> bool {
        // blake3::Hash equality is constant-time
        blake3::Hash::from(self.0) == blake3::hash(encrypted)
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    pub fn from_hex(hex: &str) -> anyhow::Result<Self> {
        blake3::Hash::from_hex(hex.trim())
            .map(|h| Self(*h.as_bytes()))
            .map_err(|e| anyhow::anyhow!("invalid chunk address '{}': {}", hex, e))
    }

    /// Short form for log lines: first 12 hex chars
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.short())
    }
}

impl FromStr for Address {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
