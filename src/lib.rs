mod codec;
mod error;
mod keyset;
mod material;
mod meta;
mod session;
mod wrap;

pub use codec::{b64_decode, b64_encode, pack_byte_strings, unpack_byte_strings};
pub use error::KeyError;
pub use keyset::{CreateOptions, KeySet};
pub use meta::{KeyMeta, KeyPurpose, KeyType, KeyVersion, VersionStatus};
pub use session::{decrypt_with_session, encrypt_with_session, SessionCrypter};
pub use wrap::WrappedKey;
