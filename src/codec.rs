//! Wire codecs: unpadded base64url and length-prefixed byte-string packing
//!
//! Every textual encoding in this format is unpadded base64url. Multiple
//! binary values are bundled into a single byte string by prefixing each
//! value with its length as a 4-byte big-endian integer.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine as _};

use crate::error::KeyError;

/// Width of the length prefix in packed byte strings.
const LEN_PREFIX_SIZE: usize = 4;

/// Encode bytes as unpadded base64url.
pub fn b64_encode(bytes: &[u8]) -> String {
    BASE64URL.encode(bytes)
}

/// Decode unpadded base64url. Trailing `=` padding is tolerated for
/// producers that still emit it.
pub fn b64_decode(s: &str) -> Result<Vec<u8>, KeyError> {
    Ok(BASE64URL.decode(s.trim_end_matches('='))?)
}

/// Bundle byte strings into one buffer. Each value is written as a 4-byte
/// big-endian length immediately followed by its raw bytes.
pub fn pack_byte_strings(parts: &[&[u8]]) -> Vec<u8> {
    let total: usize = parts.iter().map(|p| LEN_PREFIX_SIZE + p.len()).sum();
    let mut out = Vec::with_capacity(total);
    for part in parts {
        out.extend_from_slice(&(part.len() as u32).to_be_bytes());
        out.extend_from_slice(part);
    }
    out
}

/// Inverse of [`pack_byte_strings`]. Parsing is strict: a declared length
/// that overruns the remaining input fails rather than being clamped.
pub fn unpack_byte_strings(mut input: &[u8]) -> Result<Vec<Vec<u8>>, KeyError> {
    let mut parts = Vec::new();
    while !input.is_empty() {
        if input.len() < LEN_PREFIX_SIZE {
            return Err(KeyError::Format("truncated length prefix".into()));
        }
        let (prefix, rest) = input.split_at(LEN_PREFIX_SIZE);
        let len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        if rest.len() < len {
            return Err(KeyError::Format(format!(
                "declared length {} exceeds remaining {} bytes",
                len,
                rest.len()
            )));
        }
        let (value, remainder) = rest.split_at(len);
        parts.push(value.to_vec());
        input = remainder;
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_b64_roundtrip() {
        let data = b"\x00\x01binary\xffdata";
        let encoded = b64_encode(data);
        assert!(!encoded.contains('='));
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert_eq!(b64_decode(&encoded).unwrap(), data);
    }

    #[test]
    fn test_b64_decode_tolerates_padding() {
        // "hi" encodes to "aGk" unpadded, "aGk=" padded
        assert_eq!(b64_decode("aGk").unwrap(), b"hi");
        assert_eq!(b64_decode("aGk=").unwrap(), b"hi");
    }

    #[test]
    fn test_b64_decode_rejects_standard_alphabet() {
        // '+' and '/' belong to the standard alphabet, not base64url
        assert!(b64_decode("a+b/").is_err());
    }

    #[test]
    fn test_pack_roundtrip() {
        let parts: Vec<&[u8]> = vec![b"first", b"", b"\x00\x00zero\x00bytes"];
        let packed = pack_byte_strings(&parts);
        let unpacked = unpack_byte_strings(&packed).unwrap();
        assert_eq!(unpacked.len(), 3);
        assert_eq!(unpacked[0], b"first");
        assert_eq!(unpacked[1], b"");
        assert_eq!(unpacked[2], b"\x00\x00zero\x00bytes");
    }

    #[test]
    fn test_pack_empty_sequence() {
        let packed = pack_byte_strings(&[]);
        assert!(packed.is_empty());
        assert!(unpack_byte_strings(&packed).unwrap().is_empty());
    }

    #[test]
    fn test_pack_layout_is_big_endian() {
        let packed = pack_byte_strings(&[b"ab"]);
        assert_eq!(packed, vec![0, 0, 0, 2, b'a', b'b']);
    }

    #[test]
    fn test_unpack_rejects_truncated_value() {
        // Declares a 16-byte value but supplies only 3
        let mut bad = vec![0, 0, 0, 16];
        bad.extend_from_slice(b"abc");
        assert!(matches!(
            unpack_byte_strings(&bad),
            Err(KeyError::Format(_))
        ));
    }

    #[test]
    fn test_unpack_rejects_truncated_prefix() {
        assert!(matches!(
            unpack_byte_strings(&[0, 0, 1]),
            Err(KeyError::Format(_))
        ));
    }
}
