//! Key-set metadata: key type, purpose, versions, primary resolution
//!
//! The metadata JSON is bit-compatible with legacy deployments, so every
//! field and enum value is pinned with serde renames rather than relying on
//! Rust naming conventions.

use serde::{Deserialize, Serialize};

use crate::error::KeyError;

/// Kind of key material a key set holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    #[serde(rename = "AES")]
    Aes,
    #[serde(rename = "RSA_PRIV")]
    RsaPrivate,
    #[serde(rename = "RSA_PUB")]
    RsaPublic,
}

impl KeyType {
    /// Legacy wire name for this key type.
    pub fn as_str(self) -> &'static str {
        match self {
            KeyType::Aes => "AES",
            KeyType::RsaPrivate => "RSA_PRIV",
            KeyType::RsaPublic => "RSA_PUB",
        }
    }

    /// The purpose a freshly created key set of this type carries.
    pub fn default_purpose(self) -> KeyPurpose {
        match self {
            KeyType::Aes | KeyType::RsaPrivate => KeyPurpose::DecryptAndEncrypt,
            KeyType::RsaPublic => KeyPurpose::Encrypt,
        }
    }
}

/// What a key set is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPurpose {
    #[serde(rename = "ENCRYPT")]
    Encrypt,
    #[serde(rename = "DECRYPT_AND_ENCRYPT")]
    DecryptAndEncrypt,
}

impl KeyPurpose {
    /// Legacy wire name for this purpose.
    pub fn as_str(self) -> &'static str {
        match self {
            KeyPurpose::Encrypt => "ENCRYPT",
            KeyPurpose::DecryptAndEncrypt => "DECRYPT_AND_ENCRYPT",
        }
    }
}

/// Lifecycle status of a single key version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionStatus {
    #[serde(rename = "PRIMARY")]
    Primary,
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "INACTIVE")]
    Inactive,
}

/// One versioned key within a key set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyVersion {
    pub exportable: bool,
    pub status: VersionStatus,
    #[serde(rename = "versionNumber")]
    pub version_number: u32,
}

/// Key-set metadata
///
/// Immutable once attached to a key set, with one exception: producing an
/// encrypted serialization flips `encrypted` on a derived copy, never on
/// the loaded instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMeta {
    pub name: String,
    pub purpose: KeyPurpose,
    #[serde(rename = "type")]
    pub key_type: KeyType,
    pub encrypted: bool,
    pub versions: Vec<KeyVersion>,
}

impl KeyMeta {
    /// Metadata for a freshly created key set: a single PRIMARY version #1,
    /// not encrypted.
    pub fn new(name: String, key_type: KeyType, purpose: KeyPurpose) -> Self {
        KeyMeta {
            name,
            purpose,
            key_type,
            encrypted: false,
            versions: vec![KeyVersion {
                exportable: false,
                status: VersionStatus::Primary,
                version_number: 1,
            }],
        }
    }

    /// Parse the metadata JSON string, validating the type/purpose pairing.
    pub fn from_json(json: &str) -> Result<Self, KeyError> {
        let meta: KeyMeta = serde_json::from_str(json)?;
        check_pairing(meta.key_type, meta.purpose)?;
        Ok(meta)
    }

    pub fn to_json(&self) -> Result<String, KeyError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Resolve the single PRIMARY version number.
    ///
    /// Every load, export, and serialize path goes through here; the result
    /// names the version whose blob is the active key.
    pub fn primary_version(&self) -> Result<u32, KeyError> {
        let mut primary = None;
        for version in &self.versions {
            if version.status == VersionStatus::Primary {
                if primary.is_some() {
                    return Err(KeyError::MultiplePrimary);
                }
                primary = Some(version.version_number);
            }
        }
        primary.ok_or(KeyError::NoPrimary)
    }
}

/// Validate a type/purpose combination. Only three pairings exist in the
/// format; everything else is rejected up front.
pub(crate) fn check_pairing(key_type: KeyType, purpose: KeyPurpose) -> Result<(), KeyError> {
    match (key_type, purpose) {
        (KeyType::Aes, KeyPurpose::DecryptAndEncrypt)
        | (KeyType::RsaPrivate, KeyPurpose::DecryptAndEncrypt)
        | (KeyType::RsaPublic, KeyPurpose::Encrypt) => Ok(()),
        _ => Err(KeyError::UnsupportedKey(format!(
            "{} with purpose {}",
            key_type.as_str(),
            purpose.as_str()
        ))),
    }
}
