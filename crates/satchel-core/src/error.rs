use thiserror::Error;

/// Failures surfaced by the profile codec.
///
/// `DecryptionFailed` covers both an incorrect passphrase and tampered or
/// corrupted bytes; the two causes are intentionally not distinguishable
/// from the error value or its message.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("malformed artifact: {0}")]
    MalformedArtifact(&'static str),

    #[error("decryption failed: incorrect passphrase or corrupted artifact")]
    DecryptionFailed,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("profile serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("payload compression failed: {0}")]
    Compression(#[source] std::io::Error),
}
