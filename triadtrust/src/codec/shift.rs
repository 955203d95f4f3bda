// Additive shift codec: every byte of the joined field list is moved by
// `key mod 256`, wrapping.
//
// This is the protection the protocol was designed around. It gives no real
// confidentiality; see `aead` for an authenticated alternative.

use bytes::Bytes;

use crate::codec::{join_fields, split_fields, Fragment};
use crate::values::SharedKey;

/// Join `fields` with `:` and shift every byte up by the key.
pub fn encode<F: AsRef<[u8]>>(fields: &[F], key: &SharedKey) -> Fragment {
    let shift = key.shift();
    let mut joined = join_fields(fields);
    for b in joined.iter_mut() {
        *b = b.wrapping_add(shift);
    }
    joined.freeze()
}

/// Shift every byte down by the key and split on `:`.
///
/// Total: a wrong key still yields some field list.
pub fn decode(fragment: &[u8], key: &SharedKey) -> Vec<Bytes> {
    let shift = key.shift();
    let plain: Vec<u8> = fragment.iter().map(|b| b.wrapping_sub(shift)).collect();
    split_fields(Bytes::from(plain))
}
