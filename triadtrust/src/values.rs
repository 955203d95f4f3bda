// Identities, keys and the random values bound into every handshake.
//
// Numeric values travel inside fragments as canonical decimal ASCII, so a
// value has exactly one field encoding and byte equality of fields is the
// same as equality of values.

use std::fmt;

use bytes::Bytes;
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, TriadTrustError};

/// Separator between the fields of a fragment.
pub const DELIMITER: u8 = b':';

/// Parse a canonical decimal `u64` field: digits only, no sign, no leading
/// zeros.
fn parse_decimal(field: &[u8], what: &str) -> Result<u64> {
    let canonical = !field.is_empty()
        && field.iter().all(u8::is_ascii_digit)
        && (field.len() == 1 || field[0] != b'0');
    if !canonical {
        return Err(TriadTrustError::Malformed(format!("{what} is not a decimal value")));
    }
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| TriadTrustError::Malformed(format!("{what} out of range")))
}

fn decimal_field(v: u64) -> Bytes {
    Bytes::from(v.to_string())
}

// ── Principal identity ───────────────────────────────────────────────────

/// Identity of a Client or Server, as registered with the Trusted Authority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Build an identity. It must be non-empty and free of the field
    /// delimiter, otherwise it could not be carried inside a fragment.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.as_bytes().contains(&DELIMITER) {
            return Err(TriadTrustError::InvalidPrincipal(id));
        }
        Ok(Self(id))
    }

    /// Parse an identity out of a decoded fragment field.
    pub fn from_field(field: &[u8]) -> Result<Self> {
        let s = std::str::from_utf8(field)
            .map_err(|_| TriadTrustError::Malformed("identity is not UTF-8".into()))?;
        Self::new(s).map_err(|_| TriadTrustError::Malformed("identity field is invalid".into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_field(&self) -> Bytes {
        Bytes::copy_from_slice(self.0.as_bytes())
    }
}

impl TryFrom<String> for PrincipalId {
    type Error = TriadTrustError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for PrincipalId {
    type Error = TriadTrustError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<PrincipalId> for String {
    fn from(id: PrincipalId) -> Self {
        id.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Shared key ───────────────────────────────────────────────────────────

/// Long-term secret shared between one principal and the Trusted Authority.
///
/// Never leaves the process; only used to encode and decode fragments.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop, Deserialize)]
#[serde(transparent)]
pub struct SharedKey(u64);

impl SharedKey {
    pub fn new(key: u64) -> Self {
        Self(key)
    }

    /// Additive shift applied by the shift codec (`key mod 256`).
    ///
    /// Keys congruent modulo 256 share a shift, so the shift codec only
    /// tells apart keys that differ modulo 256.
    pub fn shift(&self) -> u8 {
        (self.0 % 256) as u8
    }

    /// Raw key material, big-endian. Input to AEAD key derivation.
    pub(crate) fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

// ── Challenge ────────────────────────────────────────────────────────────

/// Random value generated by the Client for one handshake attempt and
/// echoed by every other party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Challenge(u64);

impl Challenge {
    pub fn generate() -> Self {
        Self(OsRng.gen())
    }

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn from_field(field: &[u8]) -> Result<Self> {
        parse_decimal(field, "challenge").map(Self)
    }

    pub fn to_field(&self) -> Bytes {
        decimal_field(self.0)
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Nonce ────────────────────────────────────────────────────────────────

/// Freshness token generated by a principal for its own leg of the
/// handshake. Only ever compared against the value the same principal
/// generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce(u64);

impl Nonce {
    pub fn generate() -> Self {
        Self(OsRng.gen())
    }

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn from_field(field: &[u8]) -> Result<Self> {
        parse_decimal(field, "nonce").map(Self)
    }

    pub fn to_field(&self) -> Bytes {
        decimal_field(self.0)
    }
}

// ── Session key ──────────────────────────────────────────────────────────

/// Fresh key minted by the Trusted Authority for one successful handshake.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey(u64);

impl SessionKey {
    pub fn generate() -> Self {
        Self(OsRng.gen())
    }

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn from_field(field: &[u8]) -> Result<Self> {
        parse_decimal(field, "session key").map(Self)
    }

    pub fn to_field(&self) -> Bytes {
        decimal_field(self.0)
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}
