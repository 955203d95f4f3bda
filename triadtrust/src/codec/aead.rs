// ChaCha20-Poly1305 fragment protection.
//
// Layout: nonce (12 bytes) || ciphertext || tag (16 bytes). The cipher key
// is HKDF-SHA256(shared key); a fresh random nonce is drawn per fragment.

use bytes::{BufMut, Bytes, BytesMut};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::codec::{join_fields, split_fields, Fragment};
use crate::error::{Result, TriadTrustError};
use crate::values::SharedKey;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

const KDF_SALT: &[u8] = b"triad fragment salt";
const KDF_INFO: &[u8] = b"triad fragment key";

/// Derive the 32-byte cipher key for a shared key.
fn derive_key(key: &SharedKey) -> Result<Zeroizing<[u8; 32]>> {
    let ikm = Zeroizing::new(key.to_be_bytes());
    let hk = Hkdf::<Sha256>::new(Some(KDF_SALT), &ikm[..]);
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(KDF_INFO, &mut okm[..])
        .map_err(|e| TriadTrustError::Encryption(format!("HKDF expand error: {e}")))?;
    Ok(okm)
}

fn cipher(key: &SharedKey) -> Result<ChaCha20Poly1305> {
    let okm = derive_key(key)?;
    ChaCha20Poly1305::new_from_slice(&okm[..])
        .map_err(|e| TriadTrustError::Encryption(format!("cipher init: {e}")))
}

/// Encrypt the joined field list under `key`.
pub fn seal<F: AsRef<[u8]>>(fields: &[F], key: &SharedKey) -> Result<Fragment> {
    let plaintext = Zeroizing::new(join_fields(fields).to_vec());
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher(key)?
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
        .map_err(|e| TriadTrustError::Encryption(format!("{e}")))?;

    let mut out = BytesMut::with_capacity(NONCE_LEN + ciphertext.len());
    out.put_slice(&nonce);
    out.put_slice(&ciphertext);
    Ok(out.freeze())
}

/// Authenticate and decrypt `fragment` under `key`, then split it.
pub fn open(fragment: &[u8], key: &SharedKey) -> Result<Vec<Bytes>> {
    if fragment.len() < NONCE_LEN + TAG_LEN {
        return Err(TriadTrustError::Malformed(format!(
            "fragment too short: expected at least {} bytes, got {}",
            NONCE_LEN + TAG_LEN,
            fragment.len()
        )));
    }
    let (nonce, ciphertext) = fragment.split_at(NONCE_LEN);
    let plaintext = cipher(key)?
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| TriadTrustError::Decryption(format!("{e}")))?;
    Ok(split_fields(Bytes::from(plaintext)))
}
