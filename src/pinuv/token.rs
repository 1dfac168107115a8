//! `pinUvAuthToken` permissions (CTAP2.1 §6.5.5.7) and PIN preparation
//! (CTAP2.1 §6.5.4, "Setting a new PIN").

use crate::error::{Error, InvalidErrorKind};
use bitflags::bitflags;

bitflags! {
    /// Permission bits a `pinUvAuthToken` may be scoped to.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct Permissions: u8 {
        const MAKE_CREDENTIAL        = 0x01;
        const GET_ASSERTION          = 0x02;
        const CREDENTIAL_MANAGEMENT  = 0x04;
        const BIO_ENROLLMENT         = 0x08;
        const LARGE_BLOB_WRITE       = 0x10;
        const AUTHENTICATOR_CFG      = 0x20;
    }
}

/// A token obtained from `authenticatorClientPin`, scoped to a set of
/// permissions and (optionally) a single RP ID.
pub struct PinToken {
    pub token: Vec<u8>,
    pub permissions: Permissions,
    pub rp_id: Option<String>,
}

/// Prepare a PIN for use in `authenticatorClientPin`: UTF-8 encode, require
/// at least 4 Unicode code points, reject longer than 63 code points, then
/// pad with zero bytes to exactly 64 bytes before encryption.
///
/// CTAP2.1 §6.5.4: PINs are between 4 and 63 Unicode code points; the
/// encrypted `newPinEnc`/`pinHashEnc` parameter pads the UTF-8 bytes to 64
/// bytes total, so a 64-byte (unpadded) UTF-8 PIN has no room for the
/// padding and is rejected.
pub fn prepare_pin(pin: &str) -> Result<[u8; 64], Error> {
    let code_points = pin.chars().count();
    ensure!(code_points >= 4, InvalidErrorKind::PinLength);
    ensure!(code_points <= 63, InvalidErrorKind::PinLength);

    let bytes = pin.as_bytes();
    ensure!(bytes.len() <= 63, InvalidErrorKind::PinLength);

    let mut padded = [0u8; 64];
    padded[..bytes.len()].copy_from_slice(bytes);
    Ok(padded)
}

/// `LEFT(SHA-256(pin), 16)`, the `pinHashEnc` plaintext before encryption.
pub fn pin_hash(pin: &str) -> [u8; 16] {
    let digest = crate::crypto::sha256(pin.as_bytes());
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_pins_shorter_than_4_code_points() {
        assert!(prepare_pin("abc").is_err());
    }

    #[test]
    fn accepts_63_byte_unpadded_pin() {
        let pin = "a".repeat(63);
        let padded = prepare_pin(&pin).unwrap();
        assert_eq!(&padded[..63], pin.as_bytes());
        assert_eq!(padded[63], 0);
    }

    #[test]
    fn rejects_64_byte_pin_with_no_room_for_padding() {
        let pin = "a".repeat(64);
        assert!(prepare_pin(&pin).is_err());
    }

    #[test]
    fn permission_bits_combine() {
        let perms = Permissions::MAKE_CREDENTIAL | Permissions::GET_ASSERTION;
        assert!(perms.contains(Permissions::MAKE_CREDENTIAL));
        assert!(!perms.contains(Permissions::BIO_ENROLLMENT));
    }
}
