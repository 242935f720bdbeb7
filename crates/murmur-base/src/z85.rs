//! Z85 text encoding for binary key material.
//!
//! Every 4 input bytes become 5 printable characters. Inputs whose length is
//! not a multiple of 4 (encode) or 5 (decode) are rejected rather than padded.

use crate::CertError;

const ALPHABET: &[u8; 85] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ.-:+=^!/*?&<>()[]{}@%$#";

/// Reverse lookup table, indexed by `byte - 32`. `0xFF` marks an invalid character.
const DECODER: [u8; 96] = build_decoder();

const fn build_decoder() -> [u8; 96] {
    let mut table = [0xFFu8; 96];
    let mut i = 0;
    while i < ALPHABET.len() {
        table[(ALPHABET[i] - 32) as usize] = i as u8;
        i += 1;
    }
    table
}

/// Encode `data` as Z85. The length must be a multiple of 4.
pub fn encode(data: &[u8]) -> Result<String, CertError> {
    if data.len() % 4 != 0 {
        return Err(CertError::Z85(format!(
            "encode input length {} is not a multiple of 4",
            data.len()
        )));
    }

    let mut out = String::with_capacity(data.len() / 4 * 5);
    for chunk in data.chunks_exact(4) {
        let mut value = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let mut block = [0u8; 5];
        for slot in block.iter_mut().rev() {
            *slot = ALPHABET[(value % 85) as usize];
            value /= 85;
        }
        // The alphabet is pure ASCII.
        out.extend(block.iter().map(|&b| b as char));
    }
    Ok(out)
}

/// Decode a Z85 string. The length must be a multiple of 5.
pub fn decode(text: &str) -> Result<Vec<u8>, CertError> {
    let bytes = text.as_bytes();
    if bytes.len() % 5 != 0 {
        return Err(CertError::Z85(format!(
            "decode input length {} is not a multiple of 5",
            bytes.len()
        )));
    }

    let mut out = Vec::with_capacity(bytes.len() / 5 * 4);
    for chunk in bytes.chunks_exact(5) {
        let mut value: u64 = 0;
        for &c in chunk {
            let digit = c
                .checked_sub(32)
                .and_then(|i| DECODER.get(i as usize).copied())
                .filter(|&d| d != 0xFF)
                .ok_or_else(|| CertError::Z85(format!("invalid character {:?}", c as char)))?;
            value = value * 85 + u64::from(digit);
        }
        let value = u32::try_from(value)
            .map_err(|_| CertError::Z85(format!("block {:?} overflows 32 bits", chunk)))?;
        out.extend_from_slice(&value.to_be_bytes());
    }
    Ok(out)
}

/// Decode exactly 40 characters into a 32-byte key.
pub(crate) fn decode_key(text: &str) -> Result<[u8; 32], CertError> {
    if text.len() != 40 {
        return Err(CertError::InvalidKey { len: text.len() });
    }
    let bytes = decode(text)?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Encode a 32-byte key as 40 characters.
pub(crate) fn encode_key(key: &[u8; 32]) -> String {
    // A 32-byte key is always a multiple of 4.
    encode(key).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_vector() {
        let data = [0x86, 0x4F, 0xD2, 0x6F, 0xB5, 0x59, 0xF7, 0x5B];
        assert_eq!(encode(&data).unwrap(), "HelloWorld");
        assert_eq!(decode("HelloWorld").unwrap(), data);
    }

    #[test]
    fn zero_key_is_all_zero_digits() {
        assert_eq!(encode_key(&[0u8; 32]), "0".repeat(40));
        assert_eq!(decode_key(&"0".repeat(40)).unwrap(), [0u8; 32]);
    }

    #[test]
    fn rejects_bad_lengths() {
        assert!(encode(&[1, 2, 3]).is_err());
        assert!(decode("abcd").is_err());
        assert!(matches!(
            decode_key("abcde"),
            Err(CertError::InvalidKey { len: 5 })
        ));
    }

    #[test]
    fn rejects_characters_outside_alphabet() {
        assert!(decode("Hello Worl").is_err());
        assert!(decode("Hello~Worl").is_err());
        assert!(decode("héllo").is_err());
    }

    #[test]
    fn rejects_overflowing_block() {
        // "#####" is 85^5 - 1, which does not fit in 32 bits.
        assert!(decode("#####").is_err());
    }
}
