//! Core identity types shared by every component.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use unicode_normalization::UnicodeNormalization;

/// Hash: Generic 256-bit hash value
pub type Hash = [u8; 32];

/// ContentHash: 128-bit MD5 digest of a file's bytes.
///
/// MD5 keeps stored digests comparable with the hashes recorded by earlier
/// ingestion runs. Serialized as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(pub [u8; 16]);

impl ContentHash {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 16];
        hex::decode_to_slice(s.trim(), &mut out)?;
        Ok(ContentHash(out))
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// DiskId: stable identifier derived from a disk folder's name.
///
/// Also the remote archive item identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DiskId(String);

impl DiskId {
    /// Derive an identifier from a folder name.
    ///
    /// NFC-normalized, lowercased; anything outside `[a-z0-9_-]` becomes `-`,
    /// dash runs collapse and a trailing dash is dropped.
    pub fn from_folder_name(name: &str) -> Self {
        let lowered: String = name.nfc().collect::<String>().to_lowercase();
        let mut out = String::with_capacity(lowered.len());
        for c in lowered.chars() {
            let mapped = if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-'
            {
                c
            } else {
                '-'
            };
            if mapped == '-' && out.ends_with('-') {
                continue;
            }
            out.push(mapped);
        }
        while out.ends_with('-') {
            out.pop();
        }
        DiskId(out)
    }

    /// Wrap an identifier that is already in canonical form.
    pub fn new(id: impl Into<String>) -> Self {
        DiskId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DiskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
