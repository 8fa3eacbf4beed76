//! Authenticated encryption for secret records.
//!
//! AES-256-GCM with a fresh random 12-byte nonce per encryption. The
//! ciphertext, nonce, and 16-byte authentication tag are kept as separate
//! fields so the store can persist them in distinct columns. Any mismatch
//! on decryption (wrong key, flipped bit, swapped nonce) surfaces as
//! [`Error::AuthFailure`].
//!
//! This module holds no key material: callers pass the key per operation
//! and own its lifetime.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use px_domain::error::{Error, Result};
use zeroize::Zeroizing;

/// AEAD nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// An encrypted secret as persisted: ciphertext, nonce, and tag split out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedSecret {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub auth_tag: [u8; TAG_LEN],
}

/// Encrypt `plaintext` under `key` with a freshly drawn random nonce.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<EncryptedSecret> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| Error::Keychain("master key has invalid length".into()))?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    // aes-gcm appends the tag to the ciphertext; split it back off.
    let mut combined = cipher
        .encrypt((&nonce).into(), plaintext)
        .map_err(|_| Error::AuthFailure)?;
    let tag_start = combined.len() - TAG_LEN;
    let mut auth_tag = [0u8; TAG_LEN];
    auth_tag.copy_from_slice(&combined[tag_start..]);
    combined.truncate(tag_start);

    Ok(EncryptedSecret {
        ciphertext: combined,
        nonce,
        auth_tag,
    })
}

/// Decrypt a record under `key`. The plaintext buffer zeroes itself on drop.
pub fn decrypt(key: &[u8; 32], record: &EncryptedSecret) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| Error::Keychain("master key has invalid length".into()))?;

    let mut combined = Vec::with_capacity(record.ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(&record.ciphertext);
    combined.extend_from_slice(&record.auth_tag);

    cipher
        .decrypt((&record.nonce).into(), combined.as_slice())
        .map(Zeroizing::new)
        .map_err(|_| Error::AuthFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x42; 32];

    #[test]
    fn roundtrip() {
        let record = encrypt(&KEY, b"AIza_REAL").unwrap();
        let plaintext = decrypt(&KEY, &record).unwrap();
        assert_eq!(plaintext.as_slice(), b"AIza_REAL");
    }

    #[test]
    fn wrong_key_is_auth_failure() {
        let record = encrypt(&KEY, b"AIza_REAL").unwrap();
        let other = [0x43u8; 32];
        assert!(matches!(decrypt(&other, &record), Err(Error::AuthFailure)));
    }

    #[test]
    fn flipped_tag_bit_is_auth_failure() {
        let mut record = encrypt(&KEY, b"AIza_REAL").unwrap();
        record.auth_tag[0] ^= 0x01;
        assert!(matches!(decrypt(&KEY, &record), Err(Error::AuthFailure)));
    }

    #[test]
    fn tampered_ciphertext_is_auth_failure() {
        let mut record = encrypt(&KEY, b"some longer plaintext payload").unwrap();
        record.ciphertext[3] ^= 0xFF;
        assert!(matches!(decrypt(&KEY, &record), Err(Error::AuthFailure)));
    }

    #[test]
    fn nonces_are_unique_per_encryption() {
        let a = encrypt(&KEY, b"x").unwrap();
        let b = encrypt(&KEY, b"x").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let record = encrypt(&KEY, b"").unwrap();
        assert!(record.ciphertext.is_empty());
        let plaintext = decrypt(&KEY, &record).unwrap();
        assert!(plaintext.is_empty());
    }
}
