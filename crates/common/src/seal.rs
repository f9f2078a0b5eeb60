//! Password sealing for test data files
//!
//! Layout: `HCTD1` | salt (16) | nonce (12) | AES-256-GCM ciphertext + tag.
//! The key is derived from the password with Argon2id.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use argon2::Argon2;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{Error, Result};

const MAGIC: &[u8] = b"HCTD1";
const SALT_LENGTH: usize = 16;
const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

/// True when `bytes` start with the sealed test data magic
pub fn is_sealed(bytes: &[u8]) -> bool {
    bytes.starts_with(MAGIC)
}

fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; 32]> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| Error::Seal(format!("key derivation failed: {}", e)))?;
    Ok(key)
}

/// Seal `plain` with `password`
pub fn seal(plain: &[u8], password: &str) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_LENGTH];
    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce_bytes);

    let key = derive_key(password, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| Error::Seal(format!("invalid key: {}", e)))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plain)
        .map_err(|e| Error::Seal(format!("encryption failed: {}", e)))?;

    let mut out = Vec::with_capacity(MAGIC.len() + SALT_LENGTH + NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open data produced by [`seal`]
pub fn open(sealed: &[u8], password: &str) -> Result<Vec<u8>> {
    if !is_sealed(sealed) {
        return Err(Error::Seal("missing HCTD1 header".to_string()));
    }
    let body = &sealed[MAGIC.len()..];
    if body.len() < SALT_LENGTH + NONCE_LENGTH + TAG_LENGTH {
        return Err(Error::Seal("sealed data is truncated".to_string()));
    }

    let (salt, rest) = body.split_at(SALT_LENGTH);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LENGTH);

    let key = derive_key(password, salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| Error::Seal(format!("invalid key: {}", e)))?;
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| Error::Seal("wrong password or corrupted test data".to_string()))
}
