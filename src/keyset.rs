//! Key container: metadata plus the primary version's key material
//!
//! The serialized form is a JSON object with the metadata JSON as a string
//! under `meta` and the key blob keyed by its decimal version number:
//! `{"meta": "<metadata json>", "1": <key blob>}`. When the set is
//! encrypted, the blob is a password-wrapped envelope instead.

use serde_json::{Map, Value};

use crate::codec::{b64_decode, b64_encode};
use crate::error::KeyError;
use crate::material::KeyMaterial;
use crate::meta::{KeyMeta, KeyPurpose, KeyType};
use crate::wrap::{decrypt_key_blob, encrypt_key_blob, WrappedKey};

/// Options for [`KeySet::create`]
#[derive(Debug, Default)]
pub struct CreateOptions {
    /// Key size in bits; each key type has its own default (AES 128,
    /// RSA 4096).
    pub size: Option<u32>,
    /// Human-readable key-set name.
    pub name: Option<String>,
}

/// A key set: metadata and exactly one active key's material
///
/// Instances are either fully constructed or the constructor fails; there
/// is no partially-initialized state. Material is owned exclusively by its
/// key set and never shared between instances.
pub struct KeySet {
    meta: KeyMeta,
    primary: KeyMaterial,
}

impl KeySet {
    /// Generate a fresh key set of the given type with a single PRIMARY
    /// version #1.
    pub fn create(key_type: KeyType, options: CreateOptions) -> Result<Self, KeyError> {
        let primary = KeyMaterial::generate(key_type, options.size)?;
        let meta = KeyMeta::new(
            options.name.unwrap_or_default(),
            key_type,
            key_type.default_purpose(),
        );
        Ok(KeySet { meta, primary })
    }

    pub fn meta(&self) -> &KeyMeta {
        &self.meta
    }

    pub(crate) fn material(&self) -> &KeyMaterial {
        &self.primary
    }

    /// Derive the public-only key set from an RSA private one.
    ///
    /// The result shares the version metadata but carries only public
    /// material, so it can encrypt messages this set can decrypt while
    /// exposing no decrypt path itself.
    pub fn export_public_key(&self) -> Result<KeySet, KeyError> {
        if self.meta.key_type != KeyType::RsaPrivate
            || self.meta.purpose != KeyPurpose::DecryptAndEncrypt
        {
            return Err(KeyError::UnsupportedKey(
                "only RSA private key sets export a public key".into(),
            ));
        }
        if self.meta.versions.len() != 1 {
            return Err(KeyError::MultiVersionUnsupported);
        }
        let primary = self.primary.export_public()?;
        let meta = KeyMeta {
            name: self.meta.name.clone(),
            purpose: KeyPurpose::Encrypt,
            key_type: KeyType::RsaPublic,
            encrypted: false,
            versions: self.meta.versions.clone(),
        };
        Ok(KeySet { meta, primary })
    }

    /// Load a key set from its serialized JSON envelope.
    ///
    /// An encrypted set requires a non-empty password; supplying a password
    /// for an unencrypted set is an error, since it almost certainly means
    /// the caller expected wrapping that is not there.
    pub fn from_json(json: &str, password: Option<&str>) -> Result<Self, KeyError> {
        let envelope: Map<String, Value> = serde_json::from_str(json)?;
        let meta_json = envelope
            .get("meta")
            .and_then(Value::as_str)
            .ok_or_else(|| KeyError::Format("missing or non-string meta field".into()))?;
        let meta = KeyMeta::from_json(meta_json)?;

        let primary_version = meta.primary_version()?;
        let blob = envelope
            .get(&primary_version.to_string())
            .ok_or_else(|| {
                KeyError::Format(format!("missing key data for version {primary_version}"))
            })?;

        let primary = if meta.encrypted {
            let password = match password {
                None => return Err(KeyError::MissingPassword),
                Some("") => return Err(KeyError::EmptyPassword),
                Some(password) => password,
            };
            let wrapped: WrappedKey = serde_json::from_value(blob.clone())?;
            let serialized = decrypt_key_blob(&wrapped, password)?;
            let blob: Value = serde_json::from_slice(&serialized)
                .map_err(|_| KeyError::Decryption)?;
            KeyMaterial::from_blob(meta.key_type, meta.purpose, &blob)?
        } else {
            if password.is_some() {
                return Err(KeyError::UnexpectedPassword);
            }
            KeyMaterial::from_blob(meta.key_type, meta.purpose, blob)?
        };

        Ok(KeySet { meta, primary })
    }

    /// Serialize to the plain (unencrypted) JSON envelope.
    pub fn to_json(&self) -> Result<String, KeyError> {
        if self.meta.encrypted {
            return Err(KeyError::AlreadyEncrypted);
        }
        if self.meta.versions.len() != 1 {
            return Err(KeyError::MultiVersionUnsupported);
        }
        let primary_version = self.meta.primary_version()?;
        let mut envelope = Map::new();
        envelope.insert("meta".into(), Value::String(self.meta.to_json()?));
        envelope.insert(primary_version.to_string(), self.primary.serialize()?);
        Ok(serde_json::to_string(&Value::Object(envelope))?)
    }

    /// Serialize with the key blob wrapped under a password-derived key.
    ///
    /// The `encrypted` flag flips on a derived metadata copy; this instance
    /// is left untouched.
    pub fn to_json_encrypted(&self, password: &str) -> Result<String, KeyError> {
        if password.is_empty() {
            return Err(KeyError::EmptyPassword);
        }
        if self.meta.encrypted {
            return Err(KeyError::AlreadyEncrypted);
        }
        if self.meta.versions.len() != 1 {
            return Err(KeyError::MultiVersionUnsupported);
        }
        let primary_version = self.meta.primary_version()?;

        let mut meta = self.meta.clone();
        meta.encrypted = true;

        let serialized = serde_json::to_vec(&self.primary.serialize()?)?;
        let wrapped = encrypt_key_blob(&serialized, password)?;

        let mut envelope = Map::new();
        envelope.insert("meta".into(), Value::String(meta.to_json()?));
        envelope.insert(
            primary_version.to_string(),
            serde_json::to_value(&wrapped)?,
        );
        Ok(serde_json::to_string(&Value::Object(envelope))?)
    }

    /// Encrypt UTF-8 text, returning base64url ciphertext.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, KeyError> {
        Ok(b64_encode(&self.encrypt_raw(plaintext)?))
    }

    /// Encrypt UTF-8 text, returning raw ciphertext bytes.
    pub fn encrypt_raw(&self, plaintext: &str) -> Result<Vec<u8>, KeyError> {
        self.primary.encrypt(plaintext.as_bytes())
    }

    /// Decrypt a base64url message back to UTF-8 text.
    pub fn decrypt(&self, message: &str) -> Result<String, KeyError> {
        self.decrypt_raw(&b64_decode(message)?)
    }

    /// Decrypt raw ciphertext bytes back to UTF-8 text.
    pub fn decrypt_raw(&self, message: &[u8]) -> Result<String, KeyError> {
        if self.meta.purpose != KeyPurpose::DecryptAndEncrypt {
            return Err(KeyError::UnsupportedKey(
                "key set purpose does not allow decryption".into(),
            ));
        }
        let plaintext = self.primary.decrypt(message)?;
        String::from_utf8(plaintext)
            .map_err(|_| KeyError::Format("plaintext is not valid UTF-8".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_aes_encrypt_decrypt() {
        let key_set = KeySet::create(KeyType::Aes, CreateOptions::default()).unwrap();
        assert_eq!(key_set.meta().key_type, KeyType::Aes);
        assert_eq!(key_set.meta().purpose, KeyPurpose::DecryptAndEncrypt);
        assert_eq!(key_set.meta().primary_version().unwrap(), 1);

        let message = key_set.encrypt("hi").unwrap();
        assert_eq!(key_set.decrypt(&message).unwrap(), "hi");
    }

    #[test]
    fn test_create_with_options() {
        let key_set = KeySet::create(
            KeyType::Aes,
            CreateOptions {
                size: Some(256),
                name: Some("backup".into()),
            },
        )
        .unwrap();
        assert_eq!(key_set.meta().name, "backup");
    }

    #[test]
    fn test_create_public_fails() {
        assert!(matches!(
            KeySet::create(KeyType::RsaPublic, CreateOptions::default()),
            Err(KeyError::UnsupportedKey(_))
        ));
    }

    #[test]
    fn test_corrupted_ciphertext_rejected() {
        let key_set = KeySet::create(KeyType::Aes, CreateOptions::default()).unwrap();
        let message = key_set.encrypt("hi").unwrap();

        // Replace the final character, as a transport corruption would
        let mut corrupted = message[..message.len() - 1].to_string();
        corrupted.push(if message.ends_with('A') { 'B' } else { 'A' });
        assert!(matches!(
            key_set.decrypt(&corrupted),
            Err(KeyError::Integrity) | Err(KeyError::Format(_))
        ));
    }

    #[test]
    fn test_plain_json_roundtrip() {
        let original = KeySet::create(KeyType::Aes, CreateOptions::default()).unwrap();
        let json = original.to_json().unwrap();

        let restored = KeySet::from_json(&json, None).unwrap();
        let message = original.encrypt("round and round").unwrap();
        assert_eq!(restored.decrypt(&message).unwrap(), "round and round");

        let message = restored.encrypt("and back").unwrap();
        assert_eq!(original.decrypt(&message).unwrap(), "and back");
    }

    #[test]
    fn test_password_contract() {
        let key_set = KeySet::create(KeyType::Aes, CreateOptions::default()).unwrap();
        let plain = key_set.to_json().unwrap();
        let encrypted = key_set.to_json_encrypted("sekrit").unwrap();

        assert!(matches!(
            KeySet::from_json(&plain, Some("sekrit")),
            Err(KeyError::UnexpectedPassword)
        ));
        assert!(matches!(
            KeySet::from_json(&encrypted, None),
            Err(KeyError::MissingPassword)
        ));
        assert!(matches!(
            KeySet::from_json(&encrypted, Some("")),
            Err(KeyError::EmptyPassword)
        ));
        assert!(matches!(
            key_set.to_json_encrypted(""),
            Err(KeyError::EmptyPassword)
        ));
    }

    #[test]
    fn test_encrypted_json_roundtrip() {
        let original = KeySet::create(KeyType::Aes, CreateOptions::default()).unwrap();
        let json = original.to_json_encrypted("open sesame").unwrap();

        // The loaded instance keeps its encrypted flag; plain serialization
        // must refuse
        let restored = KeySet::from_json(&json, Some("open sesame")).unwrap();
        assert!(restored.meta().encrypted);
        assert!(matches!(
            restored.to_json(),
            Err(KeyError::AlreadyEncrypted)
        ));

        let message = original.encrypt("wrapped").unwrap();
        assert_eq!(restored.decrypt(&message).unwrap(), "wrapped");

        // Producing the encrypted form leaves the source meta untouched
        assert!(!original.meta().encrypted);
    }

    #[test]
    fn test_encrypted_json_wrong_password() {
        let original = KeySet::create(KeyType::Aes, CreateOptions::default()).unwrap();
        let json = original.to_json_encrypted("right password").unwrap();
        assert!(KeySet::from_json(&json, Some("wrong password")).is_err());
    }

    #[test]
    fn test_envelope_shape() {
        let key_set = KeySet::create(KeyType::Aes, CreateOptions::default()).unwrap();
        let envelope: Map<String, Value> =
            serde_json::from_str(&key_set.to_json().unwrap()).unwrap();
        assert!(envelope["meta"].is_string());
        assert!(envelope["1"].is_object());
        assert!(envelope["1"]["aesKeyString"].is_string());

        let envelope: Map<String, Value> =
            serde_json::from_str(&key_set.to_json_encrypted("pw").unwrap()).unwrap();
        assert_eq!(envelope["1"]["cipher"], "AES128");
        assert_eq!(envelope["1"]["hmac"], "HMAC_SHA1");
        assert_eq!(envelope["1"]["iterationCount"], 10_000);
    }
}
