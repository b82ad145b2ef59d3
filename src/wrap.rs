//! Password wrapping of serialized key material
//!
//! A PBKDF2-derived AES-128 key encrypts the serialized key blob; the
//! result travels as a self-describing envelope whose `cipher` and `hmac`
//! fields are fixed strings. PBKDF2 uses SHA-1 because the on-wire `hmac`
//! field says so; it is a legacy-format constraint.

use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use zeroize::Zeroizing;

use crate::codec::{b64_decode, b64_encode};
use crate::error::KeyError;
use crate::material::{cbc_decrypt, cbc_encrypt};

/// Cipher name fixed by the envelope format.
const WRAP_CIPHER: &str = "AES128";
/// PRF name fixed by the envelope format.
const WRAP_HMAC: &str = "HMAC_SHA1";
/// Default PBKDF2 iteration count for newly produced envelopes.
const WRAP_ITERATION_COUNT: i64 = 10_000;
/// Salt length in bytes.
const WRAP_SALT_SIZE: usize = 16;
/// Derived key length in bytes (AES-128).
const WRAP_KEY_SIZE: usize = 16;
/// IV length in bytes.
const WRAP_IV_SIZE: usize = 16;

/// Password-wrapped key envelope
///
/// `salt`, `iv`, and `key` are base64url strings; `key` holds the
/// ciphertext of the serialized key material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedKey {
    pub cipher: String,
    pub hmac: String,
    pub salt: String,
    #[serde(rename = "iterationCount")]
    pub iteration_count: i64,
    pub iv: String,
    pub key: String,
}

/// PBKDF2-HMAC-SHA1 key derivation. The iteration count must be positive.
pub(crate) fn derive_key(
    password: &str,
    salt: &[u8],
    iteration_count: i64,
) -> Result<Zeroizing<[u8; WRAP_KEY_SIZE]>, KeyError> {
    let rounds = u32::try_from(iteration_count)
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| {
            KeyError::InvalidParameter(format!(
                "iteration count must be positive, got {iteration_count}"
            ))
        })?;
    let mut derived = Zeroizing::new([0u8; WRAP_KEY_SIZE]);
    pbkdf2_hmac::<Sha1>(password.as_bytes(), salt, rounds, &mut derived[..]);
    Ok(derived)
}

/// Wrap serialized key material under a password-derived key.
pub(crate) fn encrypt_key_blob(
    serialized: &[u8],
    password: &str,
) -> Result<WrappedKey, KeyError> {
    let mut salt = [0u8; WRAP_SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    let derived = derive_key(password, &salt, WRAP_ITERATION_COUNT)?;

    let mut iv = [0u8; WRAP_IV_SIZE];
    OsRng.fill_bytes(&mut iv);
    let ciphertext = cbc_encrypt(&derived[..], &iv, serialized)?;

    Ok(WrappedKey {
        cipher: WRAP_CIPHER.to_string(),
        hmac: WRAP_HMAC.to_string(),
        salt: b64_encode(&salt),
        iteration_count: WRAP_ITERATION_COUNT,
        iv: b64_encode(&iv),
        key: b64_encode(&ciphertext),
    })
}

/// Unwrap an envelope back into the serialized key material.
pub(crate) fn decrypt_key_blob(envelope: &WrappedKey, password: &str) -> Result<Vec<u8>, KeyError> {
    if envelope.cipher != WRAP_CIPHER {
        return Err(KeyError::UnsupportedAlgorithm(envelope.cipher.clone()));
    }
    if envelope.hmac != WRAP_HMAC {
        return Err(KeyError::UnsupportedAlgorithm(envelope.hmac.clone()));
    }
    let salt = b64_decode(&envelope.salt)?;
    let iv = b64_decode(&envelope.iv)?;
    let ciphertext = b64_decode(&envelope.key)?;
    let derived = derive_key(password, &salt, envelope.iteration_count)?;
    cbc_decrypt(&derived[..], &iv, &ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_is_deterministic() {
        let salt = [7u8; WRAP_SALT_SIZE];
        let a = derive_key("hunter2", &salt, 1000).unwrap();
        let b = derive_key("hunter2", &salt, 1000).unwrap();
        assert_eq!(&a[..], &b[..]);

        let c = derive_key("hunter3", &salt, 1000).unwrap();
        assert_ne!(&a[..], &c[..]);
    }

    #[test]
    fn test_derive_key_rejects_nonpositive_iterations() {
        let salt = [0u8; WRAP_SALT_SIZE];
        for count in [0, -1, -10_000] {
            assert!(matches!(
                derive_key("pw", &salt, count),
                Err(KeyError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let blob = br#"{"aesKeyString":"abc","size":128}"#;
        let envelope = encrypt_key_blob(blob, "correct horse").unwrap();
        assert_eq!(envelope.cipher, "AES128");
        assert_eq!(envelope.hmac, "HMAC_SHA1");
        assert_eq!(envelope.iteration_count, 10_000);

        let unwrapped = decrypt_key_blob(&envelope, "correct horse").unwrap();
        assert_eq!(unwrapped, blob);
    }

    #[test]
    fn test_unwrap_wrong_password_fails() {
        let envelope = encrypt_key_blob(b"secret material", "right").unwrap();
        assert!(decrypt_key_blob(&envelope, "wrong").is_err());
    }

    #[test]
    fn test_unwrap_rejects_unknown_algorithms() {
        let mut envelope = encrypt_key_blob(b"blob", "pw").unwrap();
        envelope.cipher = "AES256".into();
        assert!(matches!(
            decrypt_key_blob(&envelope, "pw"),
            Err(KeyError::UnsupportedAlgorithm(_))
        ));

        let mut envelope = encrypt_key_blob(b"blob", "pw").unwrap();
        envelope.hmac = "HMAC_SHA256".into();
        assert!(matches!(
            decrypt_key_blob(&envelope, "pw"),
            Err(KeyError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_salts_and_ivs_are_fresh() {
        let a = encrypt_key_blob(b"same", "pw").unwrap();
        let b = encrypt_key_blob(b"same", "pw").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.key, b.key);
    }
}
