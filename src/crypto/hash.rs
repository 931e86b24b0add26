//! SHA-256 and HMAC-SHA256 helpers.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 digest size in bytes.
pub const SHA256_SIZE: usize = 0x20;

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; SHA256_SIZE] {
    Sha256::digest(data).into()
}

/// HMAC-SHA256 of `message` under `key`.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<[u8; SHA256_SIZE]> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|_| Error::InvalidArgument("hmac key"))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().into())
}

/// Check `expected` against HMAC-SHA256 of `message` in constant time.
pub fn verify_hmac_sha256(key: &[u8], message: &[u8], expected: &[u8]) -> Result<bool> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|_| Error::InvalidArgument("hmac key"))?;
    mac.update(message);
    Ok(mac.verify_slice(expected).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_abc() {
        let digest = sha256(b"abc");
        assert_eq!(digest[0], 0xba);
        assert_eq!(digest[31], 0xad);
    }

    #[test]
    fn hmac_rfc4231_case_2() {
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(&mac[..4], &[0x5b, 0xdc, 0xc1, 0x46]);
        assert!(verify_hmac_sha256(b"Jefe", b"what do ya want for nothing?", &mac).unwrap());
        assert!(!verify_hmac_sha256(b"Jefe", b"what do ya want for something?", &mac).unwrap());
    }
}
