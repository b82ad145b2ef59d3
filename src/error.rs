//! Unified error type for the keycase public API
//!
//! Every operation in this crate fails synchronously with one of these
//! variants. Nothing is retried internally; callers that want retry
//! semantics (for example re-prompting for a password) do so themselves.

use thiserror::Error;

/// Error type for all key-set and session operations
#[derive(Debug, Error)]
pub enum KeyError {
    /// Key type/purpose combination is invalid, or the key type cannot
    /// perform the requested operation
    #[error("unsupported key type or purpose: {0}")]
    UnsupportedKey(String),

    /// Metadata contains no PRIMARY version
    #[error("key set has no primary version")]
    NoPrimary,

    /// Metadata contains more than one PRIMARY version
    #[error("key set has more than one primary version")]
    MultiplePrimary,

    /// Key set is encrypted but no password was supplied
    #[error("key set is encrypted and requires a password")]
    MissingPassword,

    /// An empty password was supplied
    #[error("password must not be empty")]
    EmptyPassword,

    /// A password was supplied for an unencrypted key set
    #[error("password supplied for an unencrypted key set")]
    UnexpectedPassword,

    /// Wrapped-key envelope names a cipher or MAC this crate does not support
    #[error("unsupported wrapping algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Cryptographic decryption failed (wrong key, wrong password, or
    /// corrupted ciphertext)
    #[error("decryption failed")]
    Decryption,

    /// Ciphertext MAC did not verify
    #[error("ciphertext failed integrity verification")]
    Integrity,

    /// Operation is only defined for single-version key sets
    #[error("operation supports only single-version key sets")]
    MultiVersionUnsupported,

    /// A parameter was out of range or otherwise unusable
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Plain serialization was requested for an already-encrypted key set
    #[error("key set is already encrypted")]
    AlreadyEncrypted,

    /// Malformed JSON, base64, or packed byte-string input
    #[error("malformed input: {0}")]
    Format(String),
}

impl From<serde_json::Error> for KeyError {
    fn from(err: serde_json::Error) -> Self {
        KeyError::Format(err.to_string())
    }
}

impl From<base64::DecodeError> for KeyError {
    fn from(err: base64::DecodeError) -> Self {
        KeyError::Format(err.to_string())
    }
}
