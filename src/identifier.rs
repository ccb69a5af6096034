//! Content-addressed identifier: a fixed-size digest, totally ordered by
//! byte value, rendered as base32 on the wire and in filenames.

use crate::error::Error;
use sha2::{Digest, Sha256};
use std::fmt;

/// Digest size in bytes. SHA-256 gives us a 32-byte identifier; the original
/// source used whatever `EVP_MD_CTX` was configured for, so this is a
/// reimplementation choice, not a wire-format fact pulled from the original.
pub const HASH_SIZE: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier([u8; HASH_SIZE]);

impl Identifier {
    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Identifier(bytes)
    }

    /// An identifier is valid iff it is the right length (guaranteed by the
    /// type) and not all zero.
    pub fn is_valid(&self) -> bool {
        self.0.iter().any(|&b| b != 0)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn zero() -> Self {
        Identifier([0u8; HASH_SIZE])
    }

    pub fn to_base32(&self) -> String {
        base32_encode(&self.0)
    }

    pub fn from_base32(s: &str) -> Result<Self, Error> {
        let bytes = base32_decode(s)
            .ok_or_else(|| Error::InvalidFormat(format!("not valid base32: {s}")))?;
        if bytes.len() != HASH_SIZE {
            return Err(Error::InvalidFormat(format!(
                "identifier must decode to {HASH_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut arr = [0u8; HASH_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Identifier(arr))
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.to_base32())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base32())
    }
}

impl serde::Serialize for Identifier {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_base32())
    }
}

impl<'de> serde::Deserialize<'de> for Identifier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Identifier::from_base32(&s).map_err(serde::de::Error::custom)
    }
}

/// Incremental hasher used by the dataset writer and the download query to
/// feed every byte written/read into a single running digest.
#[derive(Default)]
pub struct HashContext(Sha256);

impl HashContext {
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    pub fn finalize(self) -> Identifier {
        let digest = self.0.finalize();
        let mut arr = [0u8; HASH_SIZE];
        arr.copy_from_slice(&digest);
        Identifier(arr)
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Identifier {
    let mut ctx = HashContext::new();
    ctx.update(bytes);
    ctx.finalize()
}

// RFC 4648 base32 (no padding), lower case on output, case-insensitive on
// input. No crate in the reference pack covers base32, so this is hand
// rolled rather than bringing in an unused-elsewhere dependency.
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz234567";

fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits_in_buffer = 0u32;

    for &byte in data {
        buffer = (buffer << 8) | byte as u32;
        bits_in_buffer += 8;
        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            let idx = (buffer >> bits_in_buffer) & 0x1f;
            out.push(ALPHABET[idx as usize] as char);
        }
    }
    if bits_in_buffer > 0 {
        let idx = (buffer << (5 - bits_in_buffer)) & 0x1f;
        out.push(ALPHABET[idx as usize] as char);
    }
    out
}

fn base32_decode(s: &str) -> Option<Vec<u8>> {
    let mut buffer: u32 = 0;
    let mut bits_in_buffer = 0u32;
    let mut out = Vec::with_capacity(s.len() * 5 / 8);

    for c in s.chars() {
        let c = c.to_ascii_lowercase();
        let val = ALPHABET.iter().position(|&a| a as char == c)? as u32;
        buffer = (buffer << 5) | val;
        bits_in_buffer += 5;
        if bits_in_buffer >= 8 {
            bits_in_buffer -= 8;
            out.push(((buffer >> bits_in_buffer) & 0xff) as u8);
        }
    }
    Some(out)
}
