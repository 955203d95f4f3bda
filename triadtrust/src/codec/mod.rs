//! Fragment protection.
//!
//! A fragment is a list of fields joined with `:` and protected under one
//! principal's shared key. Two protections exist:
//! - **Shift**: additive byte shift by `key mod 256` (`shift::encode` /
//!   `shift::decode`). Decoding never fails; a wrong key yields garbage that
//!   the caller rejects through arity and field validation.
//! - **ChaCha20Poly1305**: authenticated encryption under a key derived from
//!   the shared key. Decoding under a wrong key fails outright.

pub mod aead;
pub mod shift;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::values::{SharedKey, DELIMITER};

/// An encoded field list, opaque to everyone without the owner's key.
pub type Fragment = Bytes;

/// Fragment protection used by every role of one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Protection {
    #[default]
    #[serde(rename = "shift")]
    Shift,
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

impl Protection {
    /// Protect `fields` under `key`.
    pub fn encode<F: AsRef<[u8]>>(self, fields: &[F], key: &SharedKey) -> Result<Fragment> {
        match self {
            Protection::Shift => Ok(shift::encode(fields, key)),
            Protection::ChaCha20Poly1305 => aead::seal(fields, key),
        }
    }

    /// Recover the field list of `fragment` under `key`.
    pub fn decode(self, fragment: &[u8], key: &SharedKey) -> Result<Vec<Bytes>> {
        match self {
            Protection::Shift => Ok(shift::decode(fragment, key)),
            Protection::ChaCha20Poly1305 => aead::open(fragment, key),
        }
    }
}

/// Join fields with the delimiter.
pub(crate) fn join_fields<F: AsRef<[u8]>>(fields: &[F]) -> BytesMut {
    let len = fields.iter().map(|f| f.as_ref().len() + 1).sum::<usize>();
    let mut out = BytesMut::with_capacity(len);
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.put_u8(DELIMITER);
        }
        out.put_slice(field.as_ref());
    }
    out
}

/// Split on the delimiter. An empty input is a single empty field.
pub(crate) fn split_fields(plain: Bytes) -> Vec<Bytes> {
    let mut fields = Vec::new();
    let mut start = 0;
    for (i, b) in plain.iter().enumerate() {
        if *b == DELIMITER {
            fields.push(plain.slice(start..i));
            start = i + 1;
        }
    }
    fields.push(plain.slice(start..));
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_matches_join() {
        let joined = join_fields(&["12", "34", "alice", "bob"]).freeze();
        assert_eq!(&joined[..], b"12:34:alice:bob");
        let fields = split_fields(joined);
        assert_eq!(fields, vec!["12", "34", "alice", "bob"]);
    }

    #[test]
    fn split_keeps_empty_fields() {
        assert_eq!(split_fields(Bytes::new()), vec![Bytes::new()]);
        assert_eq!(
            split_fields(Bytes::from_static(b"a::b:")),
            vec!["a", "", "b", ""]
        );
    }
}
