//! Cryptographic primitives used throughout the capability kernel.
//!
//! Every hash in this crate is SHA-256, every MAC is HMAC-SHA-256, and every
//! signature is ECDSA over P-256. No other algorithm choice is exposed here;
//! components that need cryptography depend on this crate rather than
//! reaching for `sha2`/`hmac`/`p256` directly, so the algorithm set stays
//! centralized and auditable.

use hmac::{Hmac, Mac};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("signature verification failed")]
    BadSignature,
    #[error("malformed key material: {0}")]
    MalformedKey(&'static str),
    #[error("malformed signature encoding")]
    MalformedSignature,
}

pub type Result<T> = core::result::Result<T, CryptoError>;

/// A 32-byte SHA-256 digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Digest32(#[serde(with = "hex_bytes_32")] pub [u8; 32]);

impl Digest32 {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex_encode(&self.0)
    }
}

impl core::fmt::Display for Digest32 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Hash a single byte slice with SHA-256.
pub fn sha256(data: &[u8]) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Digest32(hasher.finalize().into())
}

/// Hash a sequence of length-prefixed fields, so that concatenation of
/// variable-length fields cannot be confused with one another
/// (`sha256(["ab", "c"]) != sha256(["a", "bc"])`).
pub fn sha256_framed(fields: &[&[u8]]) -> Digest32 {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field);
    }
    Digest32(hasher.finalize().into())
}

type HmacSha256 = Hmac<Sha256>;

/// An HMAC-SHA-256 key. Zeroized on drop; never `Debug`-printed in full.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct MacKey(Vec<u8>);

impl MacKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = vec![0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Exposes the raw key bytes for sealed persistence. Callers must not
    /// write these bytes anywhere that isn't already encrypted at rest.
    pub fn expose_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl core::fmt::Debug for MacKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("MacKey(..)")
    }
}

/// Compute an HMAC-SHA-256 tag over `data` under `key`.
pub fn hmac_sign(key: &MacKey, data: &[u8]) -> Result<[u8; 32]> {
    let mut mac =
        HmacSha256::new_from_slice(&key.0).map_err(|_| CryptoError::MalformedKey("hmac key"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// Verify an HMAC-SHA-256 tag in constant time.
pub fn hmac_verify(key: &MacKey, data: &[u8], tag: &[u8; 32]) -> Result<()> {
    let computed = hmac_sign(key, data)?;
    if computed.ct_eq(tag).into() {
        Ok(())
    } else {
        Err(CryptoError::BadSignature)
    }
}

/// An ECDSA P-256 signing key, as held by the secure key vault.
pub struct EcdsaKeyPair {
    signing: SigningKey,
}

impl EcdsaKeyPair {
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::random(&mut OsRng),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let signing =
            SigningKey::from_slice(bytes).map_err(|_| CryptoError::MalformedKey("p256 key"))?;
        Ok(Self { signing })
    }

    pub fn public_key_bytes(&self) -> Vec<u8> {
        VerifyingKey::from(&self.signing)
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    /// Exposes the raw scalar for sealed persistence. Only ever called by
    /// a vault implementation writing to encrypted storage.
    pub fn private_key_bytes(&self) -> Vec<u8> {
        self.signing.to_bytes().to_vec()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        let sig: Signature = self.signing.sign(message);
        sig.to_bytes().into()
    }
}

/// Verify an ECDSA P-256 signature against a compressed SEC1 public key.
pub fn ecdsa_verify(public_key: &[u8], message: &[u8], signature: &[u8; 64]) -> Result<()> {
    let verifying = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|_| CryptoError::MalformedKey("p256 public key"))?;
    let sig =
        Signature::from_slice(signature).map_err(|_| CryptoError::MalformedSignature)?;
    verifying
        .verify(message, &sig)
        .map_err(|_| CryptoError::BadSignature)
}

fn hex_encode(bytes: &[u8]) -> String {
    use core::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

mod hex_bytes_32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::hex_encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let mut out = [0u8; 32];
        if s.len() != 64 {
            return Err(serde::de::Error::custom("expected 32-byte hex string"));
        }
        for i in 0..32 {
            out[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| serde::de::Error::custom("invalid hex digit"))?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_matches_known_vector() {
        let digest = sha256(b"abc");
        assert_eq!(
            digest.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn framed_hash_distinguishes_field_boundaries() {
        let a = sha256_framed(&[b"ab", b"c"]);
        let b = sha256_framed(&[b"a", b"bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn hmac_round_trip() {
        let key = MacKey::new(b"test-key".to_vec());
        let tag = hmac_sign(&key, b"payload").unwrap();
        assert!(hmac_verify(&key, b"payload", &tag).is_ok());
        assert!(hmac_verify(&key, b"tampered", &tag).is_err());
    }

    #[test]
    fn ecdsa_round_trip() {
        let pair = EcdsaKeyPair::generate();
        let sig = pair.sign(b"plan-hash");
        let pubkey = pair.public_key_bytes();
        assert!(ecdsa_verify(&pubkey, b"plan-hash", &sig).is_ok());
        assert!(ecdsa_verify(&pubkey, b"other", &sig).is_err());
    }
}
