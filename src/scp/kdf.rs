//! SCP03 and SCP11 key derivation functions.
//!
//! `derive_scp03` is `session::securechannel::kdf::derive` generalized from
//! fixed 0/1/4/6/7 constants hardcoded into individual call sites, to the
//! full derivation-constant table below. `derive_scp11` is built from GP
//! Amendment F §3.1.2, for SCP11's asymmetric key agreement.

use crate::crypto::{self, Hash};
use crate::error::Error;

/// SCP03 derivation constants (GP Amendment D, Table 4-1)
pub const DERIV_CARD_CRYPTOGRAM: u8 = 0x00;
pub const DERIV_HOST_CRYPTOGRAM: u8 = 0x01;
pub const DERIV_S_ENC: u8 = 0x04;
pub const DERIV_S_MAC: u8 = 0x06;
pub const DERIV_S_RMAC: u8 = 0x07;

/// Derive up to 16 bytes of output from `key` using the SCP03
/// counter-mode KDF (AES-CMAC as PRF, NIST SP 800-108 "fixed input
/// data" specialized for SCP03): `AES-CMAC(key, 11 zero bytes ‖
/// derivation_constant ‖ 0x00 ‖ L(2B, bits) ‖ 0x01 ‖ context)`.
pub fn derive_scp03(
    key: &[u8],
    derivation_constant: u8,
    context: &[u8],
    output_len: usize,
) -> Result<Vec<u8>, Error> {
    assert!(output_len <= 16, "SCP03 KDF derives at most one AES block");

    let mut derivation_data = vec![0u8; 16 + context.len()];
    derivation_data[11] = derivation_constant;
    derivation_data[12] = 0x00;
    let length_bits = (output_len * 8) as u16;
    derivation_data[13..15].copy_from_slice(&length_bits.to_be_bytes());
    derivation_data[15] = 0x01;
    derivation_data[16..].copy_from_slice(context);

    let tag = crypto::aes_cmac(key, &derivation_data)?;
    Ok(tag[..output_len].to_vec())
}

/// SCP11 `shared_info` per GP Amendment F §3.1.2: key usage (AUT+ENC+DEK =
/// `0x3C`), key type (AES = `0x88`), key length in bits (`0x10` = 128).
pub const SCP11_SHARED_INFO: [u8; 3] = [0x3C, 0x88, 0x10];

/// The six 16-byte keys produced by [`derive_scp11`], in derivation order.
pub struct Scp11Keys {
    /// Verifies the card's handshake receipt; used once, then discarded
    pub receipt_key: [u8; 16],
    /// S-ENC
    pub s_enc: [u8; 16],
    /// S-MAC
    pub s_mac: [u8; 16],
    /// S-RMAC
    pub s_rmac: [u8; 16],
    /// S-DEK
    pub s_dek: [u8; 16],
    /// Reserved by GP Amendment F; derived but unused
    pub reserved: [u8; 16],
}

/// Derive the SCP11 handshake keys from the ECDH shared secret(s).
///
/// `z` is `Z` for SCP11b, or `Z_ephemeral ‖ Z_static` for SCP11a/c. Three
/// iterations of `SHA-256(z ‖ counter(4B, big-endian, starting at 1) ‖
/// shared_info)` yield 96 bytes, split into six 16-byte keys in order:
/// `[receipt_key, S-ENC, S-MAC, S-RMAC, S-DEK, reserved]`.
pub fn derive_scp11(z: &[u8]) -> Scp11Keys {
    let mut material = Vec::with_capacity(32 * 3);
    for counter in 1u32..=3 {
        let mut block = Vec::with_capacity(z.len() + 4 + SCP11_SHARED_INFO.len());
        block.extend_from_slice(z);
        block.extend_from_slice(&counter.to_be_bytes());
        block.extend_from_slice(&SCP11_SHARED_INFO);
        material.extend_from_slice(&crypto::sha256(&block));
    }

    let mut slice = |i: usize| -> [u8; 16] {
        let mut out = [0u8; 16];
        out.copy_from_slice(&material[i * 16..(i + 1) * 16]);
        out
    };
    Scp11Keys {
        receipt_key: slice(0),
        s_enc: slice(1),
        s_mac: slice(2),
        s_rmac: slice(3),
        s_dek: slice(4),
        reserved: slice(5),
    }
}

/// HKDF-SHA-256 used by PIN/UV Auth Protocol Two to split a shared secret
/// into an HMAC key and an AES key (RFC 5869, zero-length salt).
pub fn derive_pinuv_v2_keys(shared_secret: &[u8]) -> Result<([u8; 32], [u8; 32]), Error> {
    let salt = [0u8; 32];
    let hmac_key = crypto::hkdf(Hash::Sha256, shared_secret, &salt, b"CTAP2 HMAC key", 32)?;
    let aes_key = crypto::hkdf(Hash::Sha256, shared_secret, &salt, b"CTAP2 AES key", 32)?;
    let mut hmac_out = [0u8; 32];
    let mut aes_out = [0u8; 32];
    hmac_out.copy_from_slice(&hmac_key);
    aes_out.copy_from_slice(&aes_key);
    Ok((hmac_out, aes_out))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// SCP03 derivation vector: default test keys (16 bytes `0x40..0x4F`),
    /// zero host/card challenges. S-ENC/S-MAC/S-RMAC must each be a
    /// deterministic function of the key and context alone.
    #[test]
    fn scp03_derivation_is_deterministic_and_distinguishes_constants() {
        let key: [u8; 16] = core::array::from_fn(|i| 0x40 + i as u8);
        let context = [0u8; 16]; // host_challenge(8) || card_challenge(8), both zero

        let s_enc = derive_scp03(&key, DERIV_S_ENC, &context, 16).unwrap();
        let s_mac = derive_scp03(&key, DERIV_S_MAC, &context, 16).unwrap();
        let s_rmac = derive_scp03(&key, DERIV_S_RMAC, &context, 16).unwrap();

        assert_ne!(s_enc, s_mac);
        assert_ne!(s_mac, s_rmac);
        assert_ne!(s_enc, s_rmac);

        // Deterministic: re-deriving with the same inputs reproduces the
        // same key.
        assert_eq!(s_enc, derive_scp03(&key, DERIV_S_ENC, &context, 16).unwrap());
    }

    #[test]
    fn scp_cryptogram_parity() {
        let key: [u8; 16] = core::array::from_fn(|i| 0x50 + i as u8);
        let context = [1u8; 16];
        let card = derive_scp03(&key, DERIV_CARD_CRYPTOGRAM, &context, 8).unwrap();
        let host = derive_scp03(&key, DERIV_HOST_CRYPTOGRAM, &context, 8).unwrap();
        assert_ne!(card, host);
    }

    #[test]
    fn scp11_kdf_produces_six_distinct_16_byte_keys() {
        let z = [0x42u8; 32];
        let keys = derive_scp11(&z);
        let all = [
            keys.receipt_key,
            keys.s_enc,
            keys.s_mac,
            keys.s_rmac,
            keys.s_dek,
            keys.reserved,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in all.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
