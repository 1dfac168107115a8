//! Crypto primitives façade used by the SCP and PIN/UV layers.
//!
//! A thin, direct wrapper over RustCrypto crates: callers never touch a
//! `Cmac`/`Aes128`/etc type directly, only these functions. No key material
//! crosses this boundary unless the caller explicitly clears it; derived
//! keys and plaintext intermediates are zeroized before being dropped.

use crate::error::{Error, InvalidErrorKind};
use aes::{Aes128, Aes256};
use cbc::cipher::{generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cmac::{Cmac, Mac};
use digest::KeyInit;
use hkdf::Hkdf;
use hmac::Hmac;
use p256::ecdh::diffie_hellman as ecdh_p256;
use p256::NistP256;
use p384::ecdh::diffie_hellman as ecdh_p384;
use p384::NistP384;
use p521::ecdh::diffie_hellman as ecdh_p521;
use p521::NistP521;
use rand_core::RngCore;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use zeroize::Zeroize;

/// Direction for [`aes_cbc`]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Encrypt
    Encrypt,
    /// Decrypt
    Decrypt,
}

/// Hash algorithm selector for [`hkdf`] and [`hmac`]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Hash {
    /// SHA-1
    Sha1,
    /// SHA-256
    Sha256,
    /// SHA-512
    Sha512,
}

/// AES-ECB single-block encrypt, used only to derive IVs (SCP03/SCP11
/// command encryption IVs are `AES-ECB(S-ENC, counter-as-16-bytes)`). Never
/// used to encrypt caller data directly.
pub fn aes_ecb_encrypt(key: &[u8], block: &[u8; 16]) -> Result<[u8; 16], Error> {
    use aes::cipher::{BlockEncrypt, KeyInit as _};
    let mut buf = (*block).into();
    match key.len() {
        16 => {
            let cipher = Aes128::new_from_slice(key)
                .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))?;
            cipher.encrypt_block(&mut buf);
        }
        32 => {
            let cipher = Aes256::new_from_slice(key)
                .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))?;
            cipher.encrypt_block(&mut buf);
        }
        _ => fail!(InvalidErrorKind::KeyType, "AES key must be 16 or 32 bytes"),
    }
    Ok(buf.into())
}

/// AES-CBC, no padding: `data.len()` must be a multiple of 16. Accepts a
/// 16-byte (AES-128) or 32-byte (AES-256) key.
pub fn aes_cbc(
    key: &[u8],
    iv: &[u8; 16],
    data: &[u8],
    direction: Direction,
) -> Result<Vec<u8>, Error> {
    ensure!(
        data.len() % 16 == 0 && !data.is_empty(),
        InvalidErrorKind::Other("AES-CBC input must be a non-empty multiple of 16 bytes".into())
    );

    let mut buf = data.to_vec();
    match (key.len(), direction) {
        (16, Direction::Encrypt) => {
            let mut cipher = cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))?;
            for chunk in buf.chunks_exact_mut(16) {
                cipher.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
            }
        }
        (16, Direction::Decrypt) => {
            let mut cipher = cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))?;
            for chunk in buf.chunks_exact_mut(16) {
                cipher.decrypt_block_mut(GenericArray::from_mut_slice(chunk));
            }
        }
        (32, Direction::Encrypt) => {
            let mut cipher = cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))?;
            for chunk in buf.chunks_exact_mut(16) {
                cipher.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
            }
        }
        (32, Direction::Decrypt) => {
            let mut cipher = cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))?;
            for chunk in buf.chunks_exact_mut(16) {
                cipher.decrypt_block_mut(GenericArray::from_mut_slice(chunk));
            }
        }
        _ => fail!(InvalidErrorKind::KeyType, "AES key must be 16 or 32 bytes"),
    }
    Ok(buf)
}

/// AES-CMAC (NIST SP 800-38B) over `data`, truncated to 16 bytes (it
/// already is one block). Accepts a 16- or 32-byte key.
pub fn aes_cmac(key: &[u8], data: &[u8]) -> Result<[u8; 16], Error> {
    let tag = match key.len() {
        16 => {
            let mut mac = Cmac::<Aes128>::new_from_slice(key)
                .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))?;
            mac.update(data);
            mac.finalize().into_bytes()
        }
        32 => {
            let mut mac = Cmac::<Aes256>::new_from_slice(key)
                .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))?;
            mac.update(data);
            mac.finalize().into_bytes()
        }
        _ => fail!(InvalidErrorKind::KeyType, "AES key must be 16 or 32 bytes"),
    };
    let mut out = [0u8; 16];
    out.copy_from_slice(&tag);
    Ok(out)
}

/// A raw ECDH shared secret `Z`. Zeroized on drop.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct SharedSecret(pub Vec<u8>);

/// Named curve selector for [`ecdh`] and [`ecdsa_verify`]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Curve {
    /// NIST P-256
    P256,
    /// NIST P-384
    P384,
    /// NIST P-521
    P521,
}

/// Elliptic-curve Diffie-Hellman. `priv_key`/`pub_key` are raw SEC1-encoded
/// scalar/point bytes for the given curve.
pub fn ecdh(curve: Curve, priv_key: &[u8], pub_key: &[u8]) -> Result<SharedSecret, Error> {
    let z = match curve {
        Curve::P256 => {
            let sk = p256::SecretKey::from_slice(priv_key)
                .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))?;
            let pk = p256::PublicKey::from_sec1_bytes(pub_key)
                .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))?;
            ecdh_p256(sk.to_nonzero_scalar(), pk.as_affine())
                .raw_secret_bytes()
                .to_vec()
        }
        Curve::P384 => {
            let sk = p384::SecretKey::from_slice(priv_key)
                .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))?;
            let pk = p384::PublicKey::from_sec1_bytes(pub_key)
                .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))?;
            ecdh_p384(sk.to_nonzero_scalar(), pk.as_affine())
                .raw_secret_bytes()
                .to_vec()
        }
        Curve::P521 => {
            let sk = p521::SecretKey::from_slice(priv_key)
                .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))?;
            let pk = p521::PublicKey::from_sec1_bytes(pub_key)
                .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))?;
            ecdh_p521(sk.to_nonzero_scalar(), pk.as_affine())
                .raw_secret_bytes()
                .to_vec()
        }
    };
    Ok(SharedSecret(z))
}

/// Verify an ECDSA signature (raw `r ‖ s` fixed-size encoding) over `msg`
/// (already hashed per the curve's digest).
pub fn ecdsa_verify(curve: Curve, pub_key: &[u8], msg: &[u8], sig: &[u8]) -> Result<bool, Error> {
    use signature::Verifier;
    let ok = match curve {
        Curve::P256 => {
            let vk = ecdsa::VerifyingKey::<NistP256>::from_sec1_bytes(pub_key)
                .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))?;
            let signature = ecdsa::Signature::<NistP256>::try_from(sig)
                .map_err(|_| Error::Invalid(InvalidErrorKind::Other("bad signature encoding".into())))?;
            vk.verify(msg, &signature).is_ok()
        }
        Curve::P384 => {
            let vk = ecdsa::VerifyingKey::<NistP384>::from_sec1_bytes(pub_key)
                .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))?;
            let signature = ecdsa::Signature::<NistP384>::try_from(sig)
                .map_err(|_| Error::Invalid(InvalidErrorKind::Other("bad signature encoding".into())))?;
            vk.verify(msg, &signature).is_ok()
        }
        Curve::P521 => {
            let vk = ecdsa::VerifyingKey::<NistP521>::from_sec1_bytes(pub_key)
                .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))?;
            let signature = ecdsa::Signature::<NistP521>::try_from(sig)
                .map_err(|_| Error::Invalid(InvalidErrorKind::Other("bad signature encoding".into())))?;
            vk.verify(msg, &signature).is_ok()
        }
    };
    Ok(ok)
}

/// RFC 5869 HKDF-Extract-and-Expand, producing `length` bytes.
pub fn hkdf(hash: Hash, ikm: &[u8], salt: &[u8], info: &[u8], length: usize) -> Result<Vec<u8>, Error> {
    let mut out = vec![0u8; length];
    let result = match hash {
        Hash::Sha1 => Hkdf::<Sha1>::new(Some(salt), ikm).expand(info, &mut out),
        Hash::Sha256 => Hkdf::<Sha256>::new(Some(salt), ikm).expand(info, &mut out),
        Hash::Sha512 => Hkdf::<Sha512>::new(Some(salt), ikm).expand(info, &mut out),
    };
    result.map_err(|_| {
        Error::Invalid(InvalidErrorKind::Other("HKDF output length invalid".into()))
    })?;
    Ok(out)
}

/// HMAC over `data`, returning the full tag (32 bytes for SHA-256, 64 for
/// SHA-512). Callers that need a truncated tag (PIN/UV v1) slice it
/// themselves.
pub fn hmac(hash: Hash, key: &[u8], data: &[u8]) -> Vec<u8> {
    match hash {
        Hash::Sha1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts any key length");
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        Hash::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        Hash::Sha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(key).expect("HMAC accepts any key length");
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
    }
}

/// SHA-256 digest of `data`
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Fill `buf` with cryptographically secure random bytes.
pub fn rand_bytes(buf: &mut [u8]) {
    rand_core::OsRng.fill_bytes(buf);
}

/// Zero a buffer in place. Thin wrapper so call sites read the same
/// whether the value is a `Vec<u8>`, `[u8; N]`, or similar.
pub fn zero(buf: &mut [u8]) {
    buf.zeroize();
}

#[cfg(test)]
mod tests {
    use super::*;

    /// FIPS-197 AES-128-CBC test vector (the same 16-byte key the PIN/UV
    /// v1 test vectors borrow for their raw AES-CBC primitive check).
    #[test]
    fn aes_cbc_fips197_vector() {
        let key = hex_literal::hex!("000102030405060708090a0b0c0d0e0f");
        let iv = [0u8; 16];
        let plaintext = hex_literal::hex!("00112233445566778899aabbccddeeff");
        let ciphertext = aes_cbc(&key, &iv, &plaintext, Direction::Encrypt).unwrap();
        let roundtrip = aes_cbc(&key, &iv, &ciphertext, Direction::Decrypt).unwrap();
        assert_eq!(roundtrip, plaintext);
    }

    #[test]
    fn aes_cmac_requires_16_or_32_byte_key() {
        assert!(aes_cmac(&[0u8; 10], b"x").is_err());
    }

    #[test]
    fn hkdf_sha256_produces_requested_length() {
        let out = hkdf(Hash::Sha256, b"ikm", b"salt", b"info", 42).unwrap();
        assert_eq!(out.len(), 42);
    }

    /// RFC 5869 test case 1 (HKDF-SHA-256).
    #[test]
    fn hkdf_sha256_rfc5869_case1() {
        let ikm = hex_literal::hex!("0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b");
        let salt = hex_literal::hex!("000102030405060708090a0b0c");
        let info = hex_literal::hex!("f0f1f2f3f4f5f6f7f8f9");
        let expected = hex_literal::hex!(
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865"
        );
        let okm = hkdf(Hash::Sha256, &ikm, &salt, &info, 42).unwrap();
        assert_eq!(okm, expected);
    }

    /// RFC 5869 test case 4 (HKDF-SHA-1, no salt/info).
    #[test]
    fn hkdf_sha1_rfc5869_case4() {
        let ikm = hex_literal::hex!("0b0b0b0b0b0b0b0b0b0b0b");
        let expected = hex_literal::hex!(
            "14101530f62ccf2b30cc6d220554d8d96802825489c52c84c99342b96e018c221c71a88a4a258f71ffea"
        );
        let okm = hkdf(Hash::Sha1, &ikm, b"", b"", 42).unwrap();
        assert_eq!(okm, expected);
    }

    #[test]
    fn sha256_empty_input() {
        let expected =
            hex_literal::hex!("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85");
        assert_eq!(sha256(b""), expected);
    }
}
