//! Curve25519 key material.
//!
//! Keys are 32 bytes. Configuration files carry them as padded base64; the
//! userspace control protocol carries them as lowercase hex. Decode failures
//! are reported as [`WgEmbedError::Protocol`] and the callers that accept
//! user input rewrap them as field-level validation errors.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey as DalekPublic, StaticSecret};

use crate::error::{Result, WgEmbedError};

/// Length of every key in bytes.
pub const KEY_SIZE: usize = 32;

fn to_array(bytes: &[u8]) -> Result<[u8; KEY_SIZE]> {
    <[u8; KEY_SIZE]>::try_from(bytes).map_err(|_| {
        WgEmbedError::Protocol(format!(
            "invalid key length: expected {KEY_SIZE}, got {}",
            bytes.len()
        ))
    })
}

fn decode_base64(text: &str) -> Result<[u8; KEY_SIZE]> {
    let bytes = BASE64
        .decode(text.trim())
        .map_err(|e| WgEmbedError::Protocol(format!("invalid base64 key: {e}")))?;
    to_array(&bytes)
}

fn decode_hex(text: &str) -> Result<[u8; KEY_SIZE]> {
    let bytes =
        hex::decode(text.trim()).map_err(|e| WgEmbedError::Protocol(format!("invalid hex key: {e}")))?;
    to_array(&bytes)
}

fn random_bytes() -> Result<[u8; KEY_SIZE]> {
    let mut out = [0u8; KEY_SIZE];
    OsRng
        .try_fill_bytes(&mut out)
        .map_err(|e| WgEmbedError::KeyGeneration(e.to_string()))?;
    Ok(out)
}

/// Codec methods shared by every key type.
macro_rules! key_codec {
    ($ty:ident) => {
        impl $ty {
            /// Wraps a 32-byte array.
            #[must_use]
            pub const fn from_bytes_array(bytes: [u8; KEY_SIZE]) -> Self {
                Self(bytes)
            }

            /// Copies a slice that must be exactly [`KEY_SIZE`] bytes.
            ///
            /// # Errors
            ///
            /// Returns a `Protocol` error for any other length.
            pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
                to_array(bytes).map(Self)
            }

            /// Raw key bytes.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
                &self.0
            }

            /// Padded standard base64, as written in configuration files.
            #[must_use]
            pub fn to_base64(&self) -> String {
                BASE64.encode(self.0)
            }

            /// Parses padded standard base64. Surrounding whitespace is ignored.
            ///
            /// # Errors
            ///
            /// Returns a `Protocol` error for malformed base64 or a decoded
            /// length other than [`KEY_SIZE`].
            pub fn from_base64(text: &str) -> Result<Self> {
                decode_base64(text).map(Self)
            }

            /// Lowercase hex, as used on the control protocol.
            #[must_use]
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parses hex.
            ///
            /// # Errors
            ///
            /// Returns a `Protocol` error for malformed hex or a wrong length.
            pub fn from_hex(text: &str) -> Result<Self> {
                decode_hex(text).map(Self)
            }

            /// True for the all-zero key, which the control protocol uses to
            /// mean "unset".
            #[must_use]
            pub fn is_zero(&self) -> bool {
                self.0.ct_eq(&[0u8; KEY_SIZE]).into()
            }
        }
    };
}

/// A peer or interface public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_SIZE]);

key_codec!(PublicKey);

impl PublicKey {
    /// First eight base64 characters, for log fields.
    #[must_use]
    pub fn short(&self) -> String {
        let mut text = self.to_base64();
        text.truncate(8);
        text
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}...)", self.short())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_base64(&text).map_err(serde::de::Error::custom)
    }
}

impl From<DalekPublic> for PublicKey {
    fn from(key: DalekPublic) -> Self {
        Self(key.to_bytes())
    }
}

/// An interface private key. `Debug` never prints the key.
#[derive(Clone)]
pub struct PrivateKey([u8; KEY_SIZE]);

key_codec!(PrivateKey);

impl PrivateKey {
    /// Generates a clamped key from the OS random source.
    ///
    /// # Errors
    ///
    /// Returns `KeyGeneration` if the OS random source fails.
    pub fn generate() -> Result<Self> {
        let mut bytes = random_bytes()?;
        bytes[0] &= 0b1111_1000;
        bytes[31] &= 0b0111_1111;
        bytes[31] |= 0b0100_0000;
        Ok(Self(bytes))
    }

    /// Derives the matching public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        DalekPublic::from(&StaticSecret::from(self.0)).into()
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for PrivateKey {}

/// An optional per-peer symmetric key. `Debug` never prints the key.
#[derive(Clone)]
pub struct PresharedKey([u8; KEY_SIZE]);

key_codec!(PresharedKey);

impl PresharedKey {
    /// Generates a random key from the OS random source.
    ///
    /// # Errors
    ///
    /// Returns `KeyGeneration` if the OS random source fails.
    pub fn generate() -> Result<Self> {
        random_bytes().map(Self)
    }
}

impl fmt::Debug for PresharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PresharedKey(<redacted>)")
    }
}

impl PartialEq for PresharedKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for PresharedKey {}

/// A private key with its derived public key.
#[derive(Clone)]
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generates a fresh pair.
    ///
    /// # Errors
    ///
    /// Returns `KeyGeneration` if the OS random source fails. The caller
    /// decides whether that is fatal.
    pub fn generate() -> Result<Self> {
        PrivateKey::generate().map(Self::from_private_key)
    }

    /// Derives the public half of `private`.
    #[must_use]
    pub fn from_private_key(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { private, public }
    }

    /// The private half.
    #[must_use]
    pub const fn private_key(&self) -> &PrivateKey {
        &self.private
    }

    /// The public half.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Drops the public half.
    #[must_use]
    pub fn into_private_key(self) -> PrivateKey {
        self.private
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Keys from the dual-stack sample configuration.
    const SAMPLE_PRIVATE: &str = "wPNV/LaCgF5yx7bAotuxaaQ6jxsy1H7zs8LuNYzOXHQ=";
    const SAMPLE_PUBLIC: &str = "gysKSkCS/VeAyHIAVtf8B/sbQnEd5FYogtj7kO4d4zY=";

    #[test]
    fn generated_private_key_is_clamped() {
        let key = PrivateKey::generate().expect("generate");
        let raw = key.as_bytes();
        assert_eq!(raw[0] & 7, 0);
        assert_eq!(raw[31] & 128, 0);
        assert_eq!(raw[31] & 64, 64);
    }

    #[test]
    fn distinct_private_keys_derive_distinct_public_keys() {
        let a = PrivateKey::generate().expect("generate");
        let b = PrivateKey::generate().expect("generate");
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn rfc7748_vector() {
        let private = PrivateKey::from_hex(
            "77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a",
        )
        .expect("private");
        assert_eq!(
            private.public_key().to_hex(),
            "8520f0098930a754748b7ddcb43ef75a0dbf3a0d26381af4eba4a98eaa9b4e6a"
        );
    }

    #[test]
    fn sample_keys_decode() {
        let private = PrivateKey::from_base64(SAMPLE_PRIVATE).expect("private");
        assert_eq!(private.to_base64(), SAMPLE_PRIVATE);
        let public = PublicKey::from_base64(SAMPLE_PUBLIC).expect("public");
        assert_eq!(public.to_string(), SAMPLE_PUBLIC);
        assert_eq!(public.short(), "gysKSkCS");
    }

    #[test]
    fn hex_form_is_lowercase_and_reversible() {
        let public = PublicKey::from_base64(SAMPLE_PUBLIC).expect("public");
        let text = public.to_hex();
        assert_eq!(text.len(), 64);
        assert_eq!(text, text.to_lowercase());
        assert_eq!(PublicKey::from_hex(&text).expect("hex"), public);
    }

    #[test]
    fn secret_keys_are_redacted_in_debug() {
        let pair = KeyPair::generate().expect("generate");
        let private = pair.private_key().to_base64();
        assert!(!format!("{:?}", pair.private_key()).contains(&private));
        assert!(!format!("{pair:?}").contains(&private));
        let psk = PresharedKey::generate().expect("psk");
        assert!(!format!("{psk:?}").contains(&psk.to_base64()));
    }

    #[test]
    fn public_key_serde_uses_base64() {
        let public = PublicKey::from_base64(SAMPLE_PUBLIC).expect("public");
        let json = serde_json::to_string(&public).expect("serialize");
        assert_eq!(json, format!("\"{SAMPLE_PUBLIC}\""));
        let back: PublicKey = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, public);
    }

    #[test]
    fn keypair_halves_match() {
        let pair = KeyPair::generate().expect("generate");
        assert_eq!(pair.private_key().public_key(), *pair.public_key());
        let public = *pair.public_key();
        assert_eq!(pair.into_private_key().public_key(), public);
    }

    #[test]
    fn short_inputs_rejected() {
        assert!(PrivateKey::from_bytes(&[0u8; 16]).is_err());
        assert!(PublicKey::from_bytes(&[0u8; 31]).is_err());
        assert!(PublicKey::from_base64("AAAAAAAAAAAAAAAAAAAAAA==").is_err());
        assert!(PublicKey::from_hex("abcd").is_err());
    }

    #[test]
    fn zero_key_detected() {
        assert!(PrivateKey::from_bytes_array([0u8; KEY_SIZE]).is_zero());
        assert!(!PublicKey::from_base64(SAMPLE_PUBLIC).expect("public").is_zero());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn base64_roundtrip(raw in prop::array::uniform32(any::<u8>())) {
                let public = PublicKey::from_bytes_array(raw);
                prop_assert_eq!(PublicKey::from_base64(&public.to_base64()).ok(), Some(public));
            }

            #[test]
            fn wrong_length_always_rejected(raw in prop::collection::vec(any::<u8>(), 0..64)) {
                prop_assume!(raw.len() != KEY_SIZE);
                let encoded = BASE64.encode(&raw);
                prop_assert!(PublicKey::from_base64(&encoded).is_err());
                prop_assert!(PrivateKey::from_base64(&encoded).is_err());
                prop_assert!(PresharedKey::from_base64(&encoded).is_err());
            }
        }
    }
}
