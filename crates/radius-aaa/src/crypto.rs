//! Stored-password cipher and one-time codes
//!
//! Subscriber passwords and LDAP bind passwords are kept as base64 of
//! AES-CBC ciphertext (PKCS#7 padded). The configured key string is used
//! verbatim as key bytes and its first 16 bytes double as the IV.

use aes::{Aes128, Aes192, Aes256};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;

const TOTP_STEP_SECS: i64 = 30;
const TOTP_DIGITS: u32 = 6;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("AES key must be 16, 24 or 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("ciphertext is not block aligned or padding is corrupt")]
    Padding,
    #[error("plaintext is not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("invalid base32 secret")]
    Base32,
}

pub fn is_valid_key_length(len: usize) -> bool {
    matches!(len, 16 | 24 | 32)
}

/// Encrypt `plain` and return standard base64.
pub fn encrypt_to_b64(plain: &str, key: &str) -> Result<String, CryptoError> {
    let key = key.as_bytes();
    let iv = iv_of(key)?;
    let data = plain.as_bytes();
    let cipher = match key.len() {
        16 => cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
        24 => cbc::Encryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
        32 => cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
        n => return Err(CryptoError::InvalidKeyLength(n)),
    };
    Ok(STANDARD.encode(cipher))
}

/// Reverse of [`encrypt_to_b64`].
pub fn decrypt_from_b64(encoded: &str, key: &str) -> Result<String, CryptoError> {
    let key = key.as_bytes();
    let iv = iv_of(key)?;
    let data = STANDARD.decode(encoded.trim())?;
    let plain = match key.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?
            .decrypt_padded_vec_mut::<Pkcs7>(&data),
        24 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?
            .decrypt_padded_vec_mut::<Pkcs7>(&data),
        32 => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?
            .decrypt_padded_vec_mut::<Pkcs7>(&data),
        n => return Err(CryptoError::InvalidKeyLength(n)),
    }
    .map_err(|_| CryptoError::Padding)?;
    Ok(String::from_utf8(plain)?)
}

fn iv_of(key: &[u8]) -> Result<&[u8], CryptoError> {
    if !is_valid_key_length(key.len()) {
        return Err(CryptoError::InvalidKeyLength(key.len()));
    }
    Ok(&key[..16])
}

/// RFC 6238 TOTP (HMAC-SHA1, 30 s step, 6 digits) for a base32 secret.
pub fn totp_code(secret: &str, at: DateTime<Utc>) -> Result<String, CryptoError> {
    let key = base32_decode(secret)?;
    let counter = at.timestamp().div_euclid(TOTP_STEP_SECS) as u64;
    Ok(hotp(&key, counter))
}

fn hotp(key: &[u8], counter: u64) -> String {
    // HMAC accepts keys of any length, so construction cannot fail here.
    let mut mac = match HmacSha1::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    format!(
        "{:0width$}",
        binary % 10u32.pow(TOTP_DIGITS),
        width = TOTP_DIGITS as usize
    )
}

/// RFC 4648 base32, case-insensitive, padding and whitespace ignored.
fn base32_decode(input: &str) -> Result<Vec<u8>, CryptoError> {
    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;

    for c in input.chars() {
        let value = match c.to_ascii_uppercase() {
            ch @ 'A'..='Z' => ch as u32 - 'A' as u32,
            ch @ '2'..='7' => ch as u32 - '2' as u32 + 26,
            '=' | ' ' | '-' => continue,
            _ => return Err(CryptoError::Base32),
        };
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }

    if out.is_empty() {
        return Err(CryptoError::Base32);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const KEY16: &str = "t8Ce3TGxq7vJ2mWf";
    const KEY32: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_aes_round_trip_all_key_sizes() {
        for key in [KEY16, "0123456789abcdef01234567", KEY32] {
            let encoded = encrypt_to_b64("p@ssw0rd", key).unwrap();
            assert_ne!(encoded, "p@ssw0rd");
            assert_eq!(decrypt_from_b64(&encoded, key).unwrap(), "p@ssw0rd");
        }
    }

    #[test]
    fn test_ciphertext_is_block_aligned() {
        let encoded = encrypt_to_b64("0123456789abcdef", KEY16).unwrap();
        // 16 bytes of input plus a full padding block
        assert_eq!(STANDARD.decode(encoded).unwrap().len(), 32);
    }

    #[test]
    fn test_wrong_key_fails() {
        let encoded = encrypt_to_b64("secret", KEY16).unwrap();
        assert!(decrypt_from_b64(&encoded, "ffffffffffffffff").is_err());
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            encrypt_to_b64("x", "short"),
            Err(CryptoError::InvalidKeyLength(5))
        ));
        assert!(matches!(
            decrypt_from_b64("not base64!!", KEY16),
            Err(CryptoError::Base64(_))
        ));
        assert!(matches!(
            decrypt_from_b64(&STANDARD.encode([1u8; 7]), KEY16),
            Err(CryptoError::Padding)
        ));
    }

    #[test]
    fn test_base32_decode() {
        assert_eq!(base32_decode("MZXW6YTBOI======").unwrap(), b"foobar");
        assert_eq!(base32_decode("mzxw6ytboi").unwrap(), b"foobar");
        assert!(base32_decode("1!").is_err());
    }

    #[test]
    fn test_totp_rfc6238_vectors() {
        // RFC 6238 Appendix B seed "12345678901234567890", truncated to 6 digits
        let secret = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";
        let cases = [
            (59, "287082"),
            (1111111109, "081804"),
            (1234567890, "005924"),
        ];
        for (ts, expected) in cases {
            let at = Utc.timestamp_opt(ts, 0).unwrap();
            assert_eq!(totp_code(secret, at).unwrap(), expected);
        }
    }

    #[test]
    fn test_totp_stable_within_step() {
        let secret = "JBSWY3DPEHPK3PXP";
        let a = totp_code(secret, Utc.timestamp_opt(90, 0).unwrap()).unwrap();
        let b = totp_code(secret, Utc.timestamp_opt(119, 0).unwrap()).unwrap();
        let c = totp_code(secret, Utc.timestamp_opt(120, 0).unwrap()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 6);
    }
}
