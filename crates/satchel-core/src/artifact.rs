//! Portable encrypted profile artifacts.
//!
//! An artifact is a fixed 96-byte header followed by XChaCha20-Poly1305
//! ciphertext (tag included). The header carries everything needed to
//! re-derive the key from a passphrase and is bound into the authentication
//! tag as AAD, so header tampering fails exactly like ciphertext tampering.
//!
//! Layout (integers little-endian):
//!
//! ```text
//!  0..8    magic            b"SATCHEL1"
//!  8..12   artifact_version u32
//! 12..16   flags            u32 (bit 0: zstd-compressed payload)
//! 16..20   kdf_time_cost    u32
//! 20..24   kdf_memory_cost  u32 (KiB)
//! 24..28   kdf_parallelism  u32
//! 28..60   salt
//! 60..84   nonce
//! 84..96   reserved (zero)
//! 96..     ciphertext || tag
//! ```

use zeroize::Zeroizing;

use crate::crypto::{
    decrypt, derive_key, encrypt, generate_nonce, generate_salt, KdfParams, NONCE_LEN, SALT_LEN,
    TAG_LEN,
};
use crate::error::CodecError;
use crate::passphrase::Passphrase;
use crate::profile::{migrate_profile, UserProfile};

pub const ARTIFACT_MAGIC: &[u8] = b"SATCHEL1";
pub const ARTIFACT_VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 96;

/// Conventional file extension for exported artifacts.
pub const ARTIFACT_EXTENSION: &str = "satchel";

const FLAG_ZSTD: u32 = 1 << 0;
const KNOWN_FLAGS: u32 = FLAG_ZSTD;

const COMPRESSION_THRESHOLD: usize = 4 * 1024; // 4 KiB
const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHeader {
    pub artifact_version: u32,
    pub flags: u32,
    pub kdf: KdfParams,
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
}

impl ArtifactHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..8].copy_from_slice(ARTIFACT_MAGIC);
        buf[8..12].copy_from_slice(&self.artifact_version.to_le_bytes());
        buf[12..16].copy_from_slice(&self.flags.to_le_bytes());
        buf[16..20].copy_from_slice(&self.kdf.time_cost.to_le_bytes());
        buf[20..24].copy_from_slice(&self.kdf.memory_cost.to_le_bytes());
        buf[24..28].copy_from_slice(&self.kdf.parallelism.to_le_bytes());
        buf[28..60].copy_from_slice(&self.salt);
        buf[60..84].copy_from_slice(&self.nonce);
        // remaining bytes stay zero
        buf
    }

    /// Parse the header portion of an artifact. Structural failures only;
    /// nothing here depends on the passphrase.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < HEADER_SIZE + TAG_LEN {
            return Err(CodecError::MalformedArtifact("artifact truncated"));
        }
        if &buf[..8] != ARTIFACT_MAGIC {
            return Err(CodecError::MalformedArtifact("bad magic"));
        }
        let artifact_version = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        if artifact_version != ARTIFACT_VERSION {
            return Err(CodecError::MalformedArtifact("unsupported version"));
        }
        let flags = u32::from_le_bytes(buf[12..16].try_into().unwrap());
        if flags & !KNOWN_FLAGS != 0 {
            return Err(CodecError::MalformedArtifact("unknown flags"));
        }
        let kdf = KdfParams {
            time_cost: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            memory_cost: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
            parallelism: u32::from_le_bytes(buf[24..28].try_into().unwrap()),
        };
        if !kdf.in_bounds() {
            return Err(CodecError::MalformedArtifact(
                "key derivation parameters out of range",
            ));
        }
        Ok(Self {
            artifact_version,
            flags,
            kdf,
            salt: buf[28..60].try_into().unwrap(),
            nonce: buf[60..84].try_into().unwrap(),
        })
    }
}

/// Encode a profile into a portable encrypted artifact.
///
/// Every call draws a fresh salt and nonce, so encoding the same profile
/// twice yields different bytes that decode to the same profile.
pub fn encode(profile: &UserProfile, phrase: &Passphrase) -> Result<Vec<u8>, CodecError> {
    encode_with_params(profile, phrase, KdfParams::default())
}

pub fn encode_with_params(
    profile: &UserProfile,
    phrase: &Passphrase,
    kdf: KdfParams,
) -> Result<Vec<u8>, CodecError> {
    if !kdf.in_bounds() {
        return Err(CodecError::InvalidInput(
            "key derivation parameters out of range",
        ));
    }
    let serialized = serde_json::to_vec(profile)?;
    let (payload, flags) = if serialized.len() > COMPRESSION_THRESHOLD {
        let compressed =
            zstd::encode_all(&serialized[..], ZSTD_LEVEL).map_err(CodecError::Compression)?;
        (compressed, FLAG_ZSTD)
    } else {
        (serialized, 0)
    };

    let header = ArtifactHeader {
        artifact_version: ARTIFACT_VERSION,
        flags,
        kdf,
        salt: generate_salt(),
        nonce: generate_nonce(),
    };
    let header_bytes = header.to_bytes();
    let key = derive_key(phrase.as_bytes(), &header.salt, header.kdf)?;
    let ciphertext = encrypt(&key, &header.nonce, &header_bytes, &payload)?;

    let mut out = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decode an artifact back into a profile.
///
/// The authentication tag is verified before any plaintext is inspected.
/// A wrong phrase and a tampered artifact produce the same
/// [`CodecError::DecryptionFailed`].
pub fn decode(artifact: &[u8], phrase: &Passphrase) -> Result<UserProfile, CodecError> {
    let header = ArtifactHeader::from_bytes(artifact)?;
    let header_bytes = &artifact[..HEADER_SIZE];
    let ciphertext = &artifact[HEADER_SIZE..];

    let key = derive_key(phrase.as_bytes(), &header.salt, header.kdf)?;
    let plaintext = decrypt(&key, &header.nonce, header_bytes, ciphertext)?;

    let payload = if header.flags & FLAG_ZSTD != 0 {
        Zeroizing::new(zstd::decode_all(&plaintext[..]).map_err(CodecError::Compression)?)
    } else {
        plaintext
    };

    let mut profile: UserProfile = serde_json::from_slice(&payload)?;
    migrate_profile(&mut profile);
    Ok(profile)
}

/// Short BLAKE3 digest of an artifact, for display next to exported files.
pub fn fingerprint(artifact: &[u8]) -> String {
    let hex = blake3::hash(artifact).to_hex();
    hex[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::MeetingRecord;
    use chrono::TimeZone;
    use chrono::Utc;

    fn sample_profile() -> UserProfile {
        let mut profile = UserProfile::new("alice");
        let starts = Utc.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap();
        let mut meeting = MeetingRecord::new("weekly sync", starts, 45);
        meeting.participants = vec!["bob".into(), "carol".into()];
        meeting.notes = Some("agenda: roadmap".into());
        profile.add_meeting(meeting);
        profile
    }

    fn phrase(s: &str) -> Passphrase {
        Passphrase::new(s).unwrap()
    }

    // Keep the KDF cheap in tests; bounds and defaults are covered separately.
    fn fast() -> KdfParams {
        KdfParams {
            time_cost: 1,
            memory_cost: 8 * 1024,
            parallelism: 1,
        }
    }

    #[test]
    fn roundtrip() {
        let profile = sample_profile();
        let artifact = encode_with_params(&profile, &phrase("open sesame"), fast()).unwrap();
        let decoded = decode(&artifact, &phrase("open sesame")).unwrap();
        assert_eq!(decoded, profile);
    }

    #[test]
    fn roundtrip_with_default_params() {
        let profile = sample_profile();
        let artifact = encode(&profile, &phrase("open sesame")).unwrap();
        let decoded = decode(&artifact, &phrase("open sesame")).unwrap();
        assert_eq!(decoded, profile);
    }

    #[test]
    fn large_profile_roundtrips_compressed() {
        let mut profile = sample_profile();
        let starts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        for i in 0..200 {
            let mut meeting = MeetingRecord::new(format!("meeting {i}"), starts, 30);
            meeting.notes = Some("minutes ".repeat(16));
            profile.add_meeting(meeting);
        }
        let artifact = encode_with_params(&profile, &phrase("open sesame"), fast()).unwrap();
        let header = ArtifactHeader::from_bytes(&artifact).unwrap();
        assert_eq!(header.flags & FLAG_ZSTD, FLAG_ZSTD);
        let decoded = decode(&artifact, &phrase("open sesame")).unwrap();
        assert_eq!(decoded, profile);
    }

    #[test]
    fn wrong_phrase_fails() {
        let artifact =
            encode_with_params(&sample_profile(), &phrase("right phrase"), fast()).unwrap();
        assert!(matches!(
            decode(&artifact, &phrase("wrong phrase")),
            Err(CodecError::DecryptionFailed)
        ));
    }

    #[test]
    fn any_single_byte_flip_is_detected() {
        let artifact = encode_with_params(&sample_profile(), &phrase("pw"), fast()).unwrap();
        // salt, nonce, reserved header bytes, first ciphertext byte, tag byte
        for &offset in &[40usize, 70, 90, HEADER_SIZE, artifact.len() - 1] {
            let mut tampered = artifact.clone();
            tampered[offset] ^= 0x01;
            assert!(
                matches!(
                    decode(&tampered, &phrase("pw")),
                    Err(CodecError::DecryptionFailed)
                ),
                "flip at offset {offset} not detected"
            );
        }
    }

    #[test]
    fn corrupt_magic_is_malformed() {
        let mut artifact = encode_with_params(&sample_profile(), &phrase("pw"), fast()).unwrap();
        artifact[0] ^= 0x01;
        assert!(matches!(
            decode(&artifact, &phrase("pw")),
            Err(CodecError::MalformedArtifact(_))
        ));
    }

    #[test]
    fn truncated_artifact_is_malformed() {
        let artifact = encode_with_params(&sample_profile(), &phrase("pw"), fast()).unwrap();
        assert!(matches!(
            decode(&artifact[..HEADER_SIZE - 4], &phrase("pw")),
            Err(CodecError::MalformedArtifact(_))
        ));
    }

    #[test]
    fn plain_json_is_malformed_not_a_crash() {
        let bytes = serde_json::to_vec(&sample_profile()).unwrap();
        assert!(matches!(
            decode(&bytes, &phrase("pw")),
            Err(CodecError::MalformedArtifact(_))
        ));
    }

    #[test]
    fn oversized_kdf_params_are_malformed() {
        let mut artifact = encode_with_params(&sample_profile(), &phrase("pw"), fast()).unwrap();
        // memory_cost field
        artifact[20..24].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            decode(&artifact, &phrase("pw")),
            Err(CodecError::MalformedArtifact(_))
        ));
    }

    #[test]
    fn repeated_encodes_differ_but_decode_identically() {
        let profile = sample_profile();
        let a = encode_with_params(&profile, &phrase("pw"), fast()).unwrap();
        let b = encode_with_params(&profile, &phrase("pw"), fast()).unwrap();
        assert_ne!(a, b);
        assert_eq!(decode(&a, &phrase("pw")).unwrap(), profile);
        assert_eq!(decode(&b, &phrase("pw")).unwrap(), profile);
    }

    #[test]
    fn embedded_kdf_params_are_honored() {
        let custom = KdfParams {
            time_cost: 2,
            memory_cost: 16 * 1024,
            parallelism: 2,
        };
        let artifact = encode_with_params(&sample_profile(), &phrase("pw"), custom).unwrap();
        let header = ArtifactHeader::from_bytes(&artifact).unwrap();
        assert_eq!(header.kdf, custom);
        assert!(decode(&artifact, &phrase("pw")).is_ok());
    }
}
