//! Hybrid session encryption
//!
//! An asymmetric key set wraps a fresh AES+HMAC key; the wrapped key is the
//! session material, and the symmetric key carries the bulk traffic. The
//! single-call wire format is
//! `base64url(pack(session_material, ciphertext))`.

use crate::codec::{b64_decode, b64_encode, pack_byte_strings, unpack_byte_strings};
use crate::error::KeyError;
use crate::keyset::KeySet;
use crate::material::{AesKey, DEFAULT_AES_KEY_SIZE, FORMAT_VERSION};
use crate::meta::KeyType;

/// An ephemeral symmetric crypter established through one asymmetric
/// encryption
///
/// The initiator role ([`SessionCrypter::new`]) generates the symmetric key
/// and produces the session material; the responder role
/// ([`SessionCrypter::from_material`]) reconstructs the key from received
/// material. Both sides then encrypt and decrypt with the same symmetric
/// key.
pub struct SessionCrypter {
    session_key: AesKey,
    session_material: Vec<u8>,
}

impl SessionCrypter {
    /// Initiator: generate a fresh session key and wrap it under the
    /// asymmetric key set.
    pub fn new(key_set: &KeySet) -> Result<Self, KeyError> {
        check_asymmetric(key_set)?;
        let session_key = AesKey::generate(DEFAULT_AES_KEY_SIZE)?;
        let session_material = key_set.material().encrypt(&session_key.pack())?;
        Ok(SessionCrypter {
            session_key,
            session_material,
        })
    }

    /// Responder: reconstruct the session key from received material.
    ///
    /// Material whose first byte equals the ciphertext format marker is
    /// taken as raw bytes; anything else is base64url-decoded first. A
    /// base64url string whose first character happens to encode the marker
    /// byte would be misread as raw; the heuristic is a known ambiguity of
    /// the legacy wire format and is kept as-is for compatibility.
    pub fn from_material(key_set: &KeySet, session_material: &[u8]) -> Result<Self, KeyError> {
        check_asymmetric(key_set)?;
        let session_material = if session_material.first() == Some(&FORMAT_VERSION) {
            session_material.to_vec()
        } else {
            let text = std::str::from_utf8(session_material).map_err(|_| {
                KeyError::Format("session material is neither raw nor base64url".into())
            })?;
            b64_decode(text)?
        };

        let packed = key_set.material().decrypt(&session_material)?;
        let session_key = AesKey::unpack(&packed)?;
        Ok(SessionCrypter {
            session_key,
            session_material,
        })
    }

    /// Raw session material: the asymmetric ciphertext of the packed
    /// session key.
    pub fn session_material(&self) -> &[u8] {
        &self.session_material
    }

    /// Session material as unpadded base64url.
    pub fn session_material_b64(&self) -> String {
        b64_encode(&self.session_material)
    }

    /// Encrypt UTF-8 text with the session key, returning base64url.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, KeyError> {
        Ok(b64_encode(&self.encrypt_raw(plaintext)?))
    }

    /// Encrypt UTF-8 text with the session key, returning raw bytes.
    pub fn encrypt_raw(&self, plaintext: &str) -> Result<Vec<u8>, KeyError> {
        self.session_key.encrypt(plaintext.as_bytes())
    }

    /// Decrypt a base64url message with the session key.
    pub fn decrypt(&self, message: &str) -> Result<String, KeyError> {
        self.decrypt_raw(&b64_decode(message)?)
    }

    /// Decrypt raw ciphertext bytes with the session key.
    pub fn decrypt_raw(&self, message: &[u8]) -> Result<String, KeyError> {
        let plaintext = self.session_key.decrypt(message)?;
        String::from_utf8(plaintext)
            .map_err(|_| KeyError::Format("plaintext is not valid UTF-8".into()))
    }
}

/// Single-call hybrid encrypt: establish a session under the asymmetric
/// key, encrypt the message, and pack material and ciphertext into one
/// base64url value.
pub fn encrypt_with_session(key_set: &KeySet, plaintext: &str) -> Result<String, KeyError> {
    let crypter = SessionCrypter::new(key_set)?;
    let ciphertext = crypter.encrypt_raw(plaintext)?;
    Ok(b64_encode(&pack_byte_strings(&[
        crypter.session_material(),
        &ciphertext,
    ])))
}

/// Inverse of [`encrypt_with_session`].
pub fn decrypt_with_session(key_set: &KeySet, packed: &str) -> Result<String, KeyError> {
    let bytes = b64_decode(packed)?;
    let parts = unpack_byte_strings(&bytes)?;
    if parts.len() != 2 {
        return Err(KeyError::Format(format!(
            "expected 2 packed values, found {}",
            parts.len()
        )));
    }
    let crypter = SessionCrypter::from_material(key_set, &parts[0])?;
    crypter.decrypt_raw(&parts[1])
}

fn check_asymmetric(key_set: &KeySet) -> Result<(), KeyError> {
    match key_set.meta().key_type {
        KeyType::RsaPrivate | KeyType::RsaPublic => Ok(()),
        KeyType::Aes => Err(KeyError::UnsupportedKey(
            "session crypter requires an RSA key set".into(),
        )),
    }
}
