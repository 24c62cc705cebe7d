use std::fmt;
use std::io::Read;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};

/// Hashing is streamed in fixed chunks so large artifacts never load whole.
const CHUNK_SIZE: usize = 1024 * 1024;

/// Content-addressed identity. Stored as raw digest bytes, displayed as hex.
/// Avoids normalization bugs and case drift vs a String representation.
///
/// A node id is the SHA-256 of the artifact bytes; transform and environment
/// digests are the SHA-256 of the definition blob. Same width, same rules:
/// 64 lowercase hex chars on the wire, raw `[u8; 32]` in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Compute the digest of a byte slice.
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Digest(hasher.finalize().into())
    }

    /// Compute the digest of a reader's full contents, streaming.
    pub fn of_reader<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Digest(hasher.finalize().into()))
    }

    /// Access the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse from hex. Uppercase input is accepted and normalized; the
    /// canonical form is always lowercase.
    pub fn from_hex(s: &str) -> Result<Self, DigestParseError> {
        if s.len() != 64 {
            return Err(DigestParseError::Length(s.len()));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.to_ascii_lowercase(), &mut bytes)
            .map_err(|_| DigestParseError::NonHex)?;
        Ok(Digest(bytes))
    }

    /// First hex chars, used for shard directories and workspace labels.
    pub fn hex_prefix(&self, len: usize) -> String {
        let mut s = hex::encode(self.0);
        s.truncate(len);
        s
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl std::str::FromStr for Digest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestParseError {
    Length(usize),
    NonHex,
}

impl fmt::Display for DigestParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestParseError::Length(got) => {
                write!(f, "digest must be 64 hex chars, got {}", got)
            }
            DigestParseError::NonHex => write!(f, "digest contains non-hex characters"),
        }
    }
}

impl std::error::Error for DigestParseError {}
