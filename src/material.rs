//! Key material adapters and the dispatch surface over them
//!
//! Three kinds of material exist: AES-CBC with a separate HMAC-SHA1 key,
//! RSA private, and RSA public. [`KeyMaterial`] is the tagged sum over the
//! three; the type/purpose pairing is validated once at construction, never
//! lazily at call time.
//!
//! Every ciphertext this crate produces starts with the fixed format marker
//! byte so that consumers can distinguish raw wire bytes from base64url
//! text. SHA-1 appears throughout because the legacy wire format pins it;
//! it is a compatibility constraint, not a recommendation.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha1::Sha1;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::codec::{b64_decode, b64_encode, pack_byte_strings, unpack_byte_strings};
use crate::error::KeyError;
use crate::meta::{check_pairing, KeyPurpose, KeyType};

type HmacSha1 = Hmac<Sha1>;

/// Marker byte prepended to every ciphertext.
pub(crate) const FORMAT_VERSION: u8 = 0;

/// AES block (and IV) size in bytes.
const AES_BLOCK_SIZE: usize = 16;
/// HMAC-SHA1 tag length in bytes.
const HMAC_TAG_SIZE: usize = 20;
/// Default AES key size in bytes (128-bit).
pub(crate) const DEFAULT_AES_KEY_SIZE: usize = 16;
/// Default HMAC key size in bytes.
const DEFAULT_HMAC_KEY_SIZE: usize = 32;
/// Default RSA modulus length in bits.
const DEFAULT_RSA_BITS: usize = 4096;
/// Block cipher mode named in serialized AES blobs.
const AES_MODE: &str = "CBC";

/// AES-CBC + HMAC-SHA1 key material
///
/// Encryption is randomized with a fresh IV per call; the MAC covers
/// `IV || ciphertext` and is verified in constant time before any
/// decryption happens.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct AesKey {
    aes_key: Vec<u8>,
    hmac_key: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct HmacKeyBlob {
    #[serde(rename = "hmacKeyString")]
    hmac_key_string: String,
    size: u32,
}

#[derive(Serialize, Deserialize)]
struct AesKeyBlob {
    #[serde(rename = "aesKeyString")]
    aes_key_string: String,
    #[serde(rename = "hmacKey")]
    hmac_key: HmacKeyBlob,
    mode: String,
    size: u32,
}

impl AesKey {
    /// Generate fresh AES and HMAC keys from the OS secure generator.
    pub(crate) fn generate(aes_key_size: usize) -> Result<Self, KeyError> {
        let mut aes_key = vec![0u8; aes_key_size];
        let mut hmac_key = vec![0u8; DEFAULT_HMAC_KEY_SIZE];
        OsRng.fill_bytes(&mut aes_key);
        OsRng.fill_bytes(&mut hmac_key);
        Self::from_bytes(aes_key, hmac_key)
    }

    /// Build from raw key bytes. Used by the session protocol, which ships
    /// the two key byte strings packed inside the session material.
    pub(crate) fn from_bytes(aes_key: Vec<u8>, hmac_key: Vec<u8>) -> Result<Self, KeyError> {
        if !matches!(aes_key.len(), 16 | 24 | 32) {
            return Err(KeyError::InvalidParameter(format!(
                "unsupported AES key length {} bytes",
                aes_key.len()
            )));
        }
        if hmac_key.is_empty() {
            return Err(KeyError::InvalidParameter("empty HMAC key".into()));
        }
        Ok(AesKey { aes_key, hmac_key })
    }

    pub(crate) fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeyError> {
        let mut iv = [0u8; AES_BLOCK_SIZE];
        OsRng.fill_bytes(&mut iv);
        let ciphertext = cbc_encrypt(&self.aes_key, &iv, plaintext)?;

        let mut out = Vec::with_capacity(1 + AES_BLOCK_SIZE + ciphertext.len() + HMAC_TAG_SIZE);
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        let tag = hmac_sha1(&self.hmac_key, &out[1..])?;
        out.extend_from_slice(&tag);
        Ok(out)
    }

    pub(crate) fn decrypt(&self, message: &[u8]) -> Result<Vec<u8>, KeyError> {
        if message.len() < 1 + AES_BLOCK_SIZE + HMAC_TAG_SIZE {
            return Err(KeyError::Format("ciphertext too short".into()));
        }
        if message[0] != FORMAT_VERSION {
            return Err(KeyError::Format(format!(
                "unknown ciphertext format version {}",
                message[0]
            )));
        }
        let (body, tag) = message[1..].split_at(message.len() - 1 - HMAC_TAG_SIZE);
        let expected = hmac_sha1(&self.hmac_key, body)?;
        // Constant-time comparison; nothing is decrypted on mismatch.
        if !bool::from(expected.ct_eq(tag)) {
            return Err(KeyError::Integrity);
        }
        let (iv, ciphertext) = body.split_at(AES_BLOCK_SIZE);
        cbc_decrypt(&self.aes_key, iv, ciphertext)
    }

    fn serialize(&self) -> Result<Value, KeyError> {
        let blob = AesKeyBlob {
            aes_key_string: b64_encode(&self.aes_key),
            hmac_key: HmacKeyBlob {
                hmac_key_string: b64_encode(&self.hmac_key),
                size: (self.hmac_key.len() * 8) as u32,
            },
            mode: AES_MODE.to_string(),
            size: (self.aes_key.len() * 8) as u32,
        };
        Ok(serde_json::to_value(blob)?)
    }

    fn from_blob(blob: &Value) -> Result<Self, KeyError> {
        let blob: AesKeyBlob = serde_json::from_value(blob.clone())?;
        if blob.mode != AES_MODE {
            return Err(KeyError::UnsupportedAlgorithm(format!(
                "AES mode {}",
                blob.mode
            )));
        }
        Self::from_bytes(
            b64_decode(&blob.aes_key_string)?,
            b64_decode(&blob.hmac_key.hmac_key_string)?,
        )
    }

    /// Pack the raw key byte strings for transport inside session material.
    pub(crate) fn pack(&self) -> Vec<u8> {
        pack_byte_strings(&[&self.aes_key, &self.hmac_key])
    }

    /// Inverse of [`AesKey::pack`].
    pub(crate) fn unpack(packed: &[u8]) -> Result<Self, KeyError> {
        let mut parts = unpack_byte_strings(packed)?;
        if parts.len() != 2 {
            return Err(KeyError::Format(format!(
                "expected 2 packed key strings, found {}",
                parts.len()
            )));
        }
        let hmac_key = parts.pop().unwrap_or_default();
        let aes_key = parts.pop().unwrap_or_default();
        Self::from_bytes(aes_key, hmac_key)
    }
}

/// RSA private key material (OAEP-SHA1)
pub struct RsaPrivateMaterial {
    key: RsaPrivateKey,
}

/// RSA public key material (OAEP-SHA1, encrypt-only)
pub struct RsaPublicMaterial {
    key: RsaPublicKey,
}

#[derive(Serialize, Deserialize)]
struct RsaPublicBlob {
    modulus: String,
    #[serde(rename = "publicExponent")]
    public_exponent: String,
    size: u32,
}

#[derive(Serialize, Deserialize)]
struct RsaPrivateBlob {
    #[serde(rename = "publicKey")]
    public_key: RsaPublicBlob,
    #[serde(rename = "privateExponent")]
    private_exponent: String,
    #[serde(rename = "primeP")]
    prime_p: String,
    #[serde(rename = "primeQ")]
    prime_q: String,
    size: u32,
}

impl RsaPrivateMaterial {
    /// Generate a fresh keypair. CPU-bound and potentially long-running for
    /// large moduli; callers wanting responsiveness run this on a worker.
    fn generate(bits: usize) -> Result<Self, KeyError> {
        if !matches!(bits, 1024 | 2048 | 4096) {
            return Err(KeyError::InvalidParameter(format!(
                "unsupported RSA modulus size {bits}"
            )));
        }
        let key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| KeyError::InvalidParameter(format!("RSA key generation failed: {e}")))?;
        Ok(RsaPrivateMaterial { key })
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeyError> {
        rsa_oaep_encrypt(&RsaPublicKey::from(&self.key), plaintext)
    }

    fn decrypt(&self, message: &[u8]) -> Result<Vec<u8>, KeyError> {
        let body = strip_format_version(message)?;
        self.key
            .decrypt(Oaep::new::<Sha1>(), body)
            .map_err(|_| KeyError::Decryption)
    }

    fn export_public(&self) -> RsaPublicMaterial {
        RsaPublicMaterial {
            key: RsaPublicKey::from(&self.key),
        }
    }

    fn serialize(&self) -> Result<Value, KeyError> {
        let primes = self.key.primes();
        if primes.len() != 2 {
            return Err(KeyError::Format(format!(
                "expected 2 RSA primes, found {}",
                primes.len()
            )));
        }
        let blob = RsaPrivateBlob {
            public_key: public_blob(&RsaPublicKey::from(&self.key)),
            private_exponent: b64_encode(&self.key.d().to_bytes_be()),
            prime_p: b64_encode(&primes[0].to_bytes_be()),
            prime_q: b64_encode(&primes[1].to_bytes_be()),
            size: self.key.n().bits() as u32,
        };
        Ok(serde_json::to_value(blob)?)
    }

    fn from_blob(blob: &Value) -> Result<Self, KeyError> {
        let blob: RsaPrivateBlob = serde_json::from_value(blob.clone())?;
        let n = biguint(&blob.public_key.modulus)?;
        let e = biguint(&blob.public_key.public_exponent)?;
        let d = biguint(&blob.private_exponent)?;
        let p = biguint(&blob.prime_p)?;
        let q = biguint(&blob.prime_q)?;
        // CRT parameters are not carried on the wire; from_components
        // rebuilds them from (n, e, d, p, q).
        let key = RsaPrivateKey::from_components(n, e, d, vec![p, q])
            .map_err(|e| KeyError::Format(format!("invalid RSA private key: {e}")))?;
        Ok(RsaPrivateMaterial { key })
    }
}

impl RsaPublicMaterial {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeyError> {
        rsa_oaep_encrypt(&self.key, plaintext)
    }

    fn serialize(&self) -> Result<Value, KeyError> {
        Ok(serde_json::to_value(public_blob(&self.key))?)
    }

    fn from_blob(blob: &Value) -> Result<Self, KeyError> {
        let blob: RsaPublicBlob = serde_json::from_value(blob.clone())?;
        let key = RsaPublicKey::new(biguint(&blob.modulus)?, biguint(&blob.public_exponent)?)
            .map_err(|e| KeyError::Format(format!("invalid RSA public key: {e}")))?;
        Ok(RsaPublicMaterial { key })
    }
}

/// Tagged sum over the three key material kinds
///
/// Constructed through [`KeyMaterial::generate`] or
/// [`KeyMaterial::from_blob`], both of which validate the type/purpose
/// pairing up front.
pub enum KeyMaterial {
    Aes(AesKey),
    RsaPrivate(RsaPrivateMaterial),
    RsaPublic(RsaPublicMaterial),
}

impl KeyMaterial {
    /// Generate fresh material of the given type. `size` is in bits; each
    /// type has its own default.
    pub(crate) fn generate(key_type: KeyType, size: Option<u32>) -> Result<Self, KeyError> {
        match key_type {
            KeyType::Aes => {
                let bits = size.unwrap_or((DEFAULT_AES_KEY_SIZE * 8) as u32);
                if !matches!(bits, 128 | 192 | 256) {
                    return Err(KeyError::InvalidParameter(format!(
                        "unsupported AES key size {bits}"
                    )));
                }
                Ok(KeyMaterial::Aes(AesKey::generate(bits as usize / 8)?))
            }
            KeyType::RsaPrivate => {
                let bits = size.unwrap_or(DEFAULT_RSA_BITS as u32) as usize;
                Ok(KeyMaterial::RsaPrivate(RsaPrivateMaterial::generate(bits)?))
            }
            KeyType::RsaPublic => Err(KeyError::UnsupportedKey(
                "cannot generate a standalone public key; export one from an RSA private key set"
                    .into(),
            )),
        }
    }

    /// Reconstruct material from a serialized key blob.
    pub(crate) fn from_blob(
        key_type: KeyType,
        purpose: KeyPurpose,
        blob: &Value,
    ) -> Result<Self, KeyError> {
        check_pairing(key_type, purpose)?;
        match key_type {
            KeyType::Aes => Ok(KeyMaterial::Aes(AesKey::from_blob(blob)?)),
            KeyType::RsaPrivate => Ok(KeyMaterial::RsaPrivate(RsaPrivateMaterial::from_blob(
                blob,
            )?)),
            KeyType::RsaPublic => Ok(KeyMaterial::RsaPublic(RsaPublicMaterial::from_blob(blob)?)),
        }
    }

    pub(crate) fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeyError> {
        match self {
            KeyMaterial::Aes(key) => key.encrypt(plaintext),
            KeyMaterial::RsaPrivate(key) => key.encrypt(plaintext),
            KeyMaterial::RsaPublic(key) => key.encrypt(plaintext),
        }
    }

    pub(crate) fn decrypt(&self, message: &[u8]) -> Result<Vec<u8>, KeyError> {
        match self {
            KeyMaterial::Aes(key) => key.decrypt(message),
            KeyMaterial::RsaPrivate(key) => key.decrypt(message),
            KeyMaterial::RsaPublic(_) => Err(KeyError::UnsupportedKey(
                "public keys cannot decrypt".into(),
            )),
        }
    }

    /// Serialize to the kind-specific JSON key blob.
    pub(crate) fn serialize(&self) -> Result<Value, KeyError> {
        match self {
            KeyMaterial::Aes(key) => key.serialize(),
            KeyMaterial::RsaPrivate(key) => key.serialize(),
            KeyMaterial::RsaPublic(key) => key.serialize(),
        }
    }

    /// Derive the public-only counterpart. RSA private material only.
    pub(crate) fn export_public(&self) -> Result<KeyMaterial, KeyError> {
        match self {
            KeyMaterial::RsaPrivate(key) => Ok(KeyMaterial::RsaPublic(key.export_public())),
            _ => Err(KeyError::UnsupportedKey(
                "only RSA private keys export a public key".into(),
            )),
        }
    }
}

fn hmac_sha1(key: &[u8], data: &[u8]) -> Result<[u8; HMAC_TAG_SIZE], KeyError> {
    let mut mac = HmacSha1::new_from_slice(key)
        .map_err(|_| KeyError::InvalidParameter("unusable HMAC key".into()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

pub(crate) fn cbc_encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, KeyError> {
    macro_rules! encrypt_with {
        ($cipher:ty) => {
            cbc::Encryptor::<$cipher>::new_from_slices(key, iv)
                .map_err(|_| KeyError::InvalidParameter("bad AES key or IV length".into()))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
        };
    }
    match key.len() {
        16 => Ok(encrypt_with!(aes::Aes128)),
        24 => Ok(encrypt_with!(aes::Aes192)),
        32 => Ok(encrypt_with!(aes::Aes256)),
        other => Err(KeyError::InvalidParameter(format!(
            "unsupported AES key length {other} bytes"
        ))),
    }
}

pub(crate) fn cbc_decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, KeyError> {
    macro_rules! decrypt_with {
        ($cipher:ty) => {
            cbc::Decryptor::<$cipher>::new_from_slices(key, iv)
                .map_err(|_| KeyError::InvalidParameter("bad AES key or IV length".into()))?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(|_| KeyError::Decryption)
        };
    }
    match key.len() {
        16 => decrypt_with!(aes::Aes128),
        24 => decrypt_with!(aes::Aes192),
        32 => decrypt_with!(aes::Aes256),
        other => Err(KeyError::InvalidParameter(format!(
            "unsupported AES key length {other} bytes"
        ))),
    }
}

fn rsa_oaep_encrypt(key: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>, KeyError> {
    let ciphertext = key
        .encrypt(&mut OsRng, Oaep::new::<Sha1>(), plaintext)
        .map_err(|e| KeyError::InvalidParameter(format!("RSA-OAEP encryption failed: {e}")))?;
    let mut out = Vec::with_capacity(1 + ciphertext.len());
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn strip_format_version(message: &[u8]) -> Result<&[u8], KeyError> {
    match message.split_first() {
        Some((&FORMAT_VERSION, body)) => Ok(body),
        Some((&other, _)) => Err(KeyError::Format(format!(
            "unknown ciphertext format version {other}"
        ))),
        None => Err(KeyError::Format("empty ciphertext".into())),
    }
}

fn public_blob(key: &RsaPublicKey) -> RsaPublicBlob {
    RsaPublicBlob {
        modulus: b64_encode(&key.n().to_bytes_be()),
        public_exponent: b64_encode(&key.e().to_bytes_be()),
        size: key.n().bits() as u32,
    }
}

fn biguint(b64: &str) -> Result<BigUint, KeyError> {
    Ok(BigUint::from_bytes_be(&b64_decode(b64)?))
}
