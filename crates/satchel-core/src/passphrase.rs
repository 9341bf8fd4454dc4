use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CodecError;

/// User-memorable secret used as the sole key material for profile artifacts.
///
/// The codec never reads a phrase from the environment or from disk; callers
/// construct a `Passphrase` and pass it into every encode/decode call. The
/// backing string is zeroized on drop and `Debug` output is redacted.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Passphrase(String);

impl Passphrase {
    /// Wrap a phrase, rejecting the empty string before any cryptographic
    /// work can happen downstream.
    pub fn new(phrase: impl Into<String>) -> Result<Self, CodecError> {
        let phrase = phrase.into();
        if phrase.is_empty() {
            return Err(CodecError::InvalidInput("passphrase must not be empty"));
        }
        Ok(Self(phrase))
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Phrase length in bytes. Callers may use this for strength warnings;
    /// the codec itself imposes no minimum beyond non-empty.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}
