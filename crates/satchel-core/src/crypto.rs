use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::CodecError;

pub const SALT_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;
pub const DERIVED_KEY_LEN: usize = 32;

pub const KDF_TIME_COST: u32 = 3;
pub const KDF_MEMORY_COST: u32 = 65536; // 64MB
pub const KDF_PARALLELISM: u32 = 4;

// Bounds for parameters read back out of an artifact header. Anything outside
// is treated as malformed rather than attempted.
const KDF_TIME_RANGE: std::ops::RangeInclusive<u32> = 1..=16;
const KDF_MEMORY_RANGE: std::ops::RangeInclusive<u32> = 8 * 1024..=1024 * 1024;
const KDF_PARALLELISM_RANGE: std::ops::RangeInclusive<u32> = 1..=16;

/// Argon2id cost parameters carried in every artifact header, so decoding
/// keeps working after the defaults are retuned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub time_cost: u32,
    pub memory_cost: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            time_cost: KDF_TIME_COST,
            memory_cost: KDF_MEMORY_COST,
            parallelism: KDF_PARALLELISM,
        }
    }
}

impl KdfParams {
    pub fn in_bounds(&self) -> bool {
        KDF_TIME_RANGE.contains(&self.time_cost)
            && KDF_MEMORY_RANGE.contains(&self.memory_cost)
            && KDF_PARALLELISM_RANGE.contains(&self.parallelism)
    }
}

/// Derive a 32-byte key from a phrase and per-artifact salt. The result is
/// zeroized on drop.
pub fn derive_key(
    phrase: &[u8],
    salt: &[u8],
    params: KdfParams,
) -> Result<Zeroizing<[u8; DERIVED_KEY_LEN]>, CodecError> {
    let params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(DERIVED_KEY_LEN),
    )
    .map_err(|e| CodecError::KeyDerivation(e.to_string()))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = Zeroizing::new([0u8; DERIVED_KEY_LEN]);
    argon
        .hash_password_into(phrase, salt, &mut *key)
        .map_err(|e| CodecError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

/// Encrypt `plaintext` under `key`. `aad` is authenticated but not encrypted.
pub fn encrypt(
    key: &[u8; DERIVED_KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CodecError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CodecError::EncryptionFailed)
}

/// Verify and decrypt. Fails on any tag mismatch; the plaintext buffer is
/// zeroized on drop.
pub fn decrypt(
    key: &[u8; DERIVED_KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CodecError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let plaintext = cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CodecError::DecryptionFailed)?;
    Ok(Zeroizing::new(plaintext))
}

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}
