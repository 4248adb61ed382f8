//! Curve25519 key types and their two textual encodings.
//!
//! Keys are base64 at the human interface (config files, CLI output) and
//! lowercase hex on the UAPI wire. Secret keys zeroize on drop and never
//! appear in `Debug` output.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size in bytes of every key handled here.
pub const KEY_LEN: usize = 32;

/// Errors from decoding a key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("invalid base64 encoding")]
    Base64,

    #[error("invalid hex encoding")]
    Hex,

    #[error("invalid key size: expected {KEY_LEN} bytes, got {0}")]
    Length(usize),

    #[error("key must not be all zeros")]
    Zero,
}

fn to_array(mut bytes: Vec<u8>) -> Result<[u8; KEY_LEN], KeyError> {
    let result =
        <[u8; KEY_LEN]>::try_from(bytes.as_slice()).map_err(|_| KeyError::Length(bytes.len()));
    bytes.zeroize();
    result
}

fn decode_base64(s: &str) -> Result<[u8; KEY_LEN], KeyError> {
    let bytes = BASE64.decode(s.trim()).map_err(|_| KeyError::Base64)?;
    to_array(bytes)
}

fn decode_hex(s: &str) -> Result<[u8; KEY_LEN], KeyError> {
    let bytes = hex::decode(s.trim()).map_err(|_| KeyError::Hex)?;
    to_array(bytes)
}

/// A peer or interface public key. Identity of a peer within an interface.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; KEY_LEN]);

impl PublicKey {
    /// Wrap raw bytes, rejecting the all-zero key.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Result<Self, KeyError> {
        if bytes == [0u8; KEY_LEN] {
            return Err(KeyError::Zero);
        }
        Ok(Self(bytes))
    }

    pub fn from_base64(s: &str) -> Result<Self, KeyError> {
        Self::from_bytes(decode_base64(s)?)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        Self::from_bytes(decode_hex(s)?)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Lowercase hex, as written on the UAPI wire.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First eight hex digits, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&BASE64.encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

impl serde::Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An interface private key, clamped for Curve25519 on construction.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey([u8; KEY_LEN]);

impl PrivateKey {
    pub fn from_bytes(mut bytes: [u8; KEY_LEN]) -> Self {
        bytes[0] &= 248;
        bytes[31] = (bytes[31] & 127) | 64;
        Self(bytes)
    }

    pub fn from_base64(s: &str) -> Result<Self, KeyError> {
        Ok(Self::from_bytes(decode_base64(s)?))
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        Ok(Self::from_bytes(decode_hex(s)?))
    }

    pub fn is_zero(&self) -> bool {
        let clamped_zero = Self::from_bytes([0u8; KEY_LEN]);
        self.0 == clamped_zero.0
    }

    /// Derive the matching public key (X25519 scalar base multiplication).
    pub fn public_key(&self) -> PublicKey {
        let secret = x25519_dalek::StaticSecret::from(self.0);
        PublicKey(*x25519_dalek::PublicKey::from(&secret).as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for PrivateKey {}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PrivateKey").field(&"[REDACTED]").finish()
    }
}

/// A symmetric preshared key mixed into a peer's handshake.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PresharedKey([u8; KEY_LEN]);

impl PresharedKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_base64(s: &str) -> Result<Self, KeyError> {
        Ok(Self(decode_base64(s)?))
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        Ok(Self(decode_hex(s)?))
    }

    /// Whether this is the all-zero key the engine reports for "no PSK".
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; KEY_LEN]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl PartialEq for PresharedKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for PresharedKey {}

impl fmt::Debug for PresharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PresharedKey").field(&"[REDACTED]").finish()
    }
}
