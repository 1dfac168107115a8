//! COSE_Key decoding (RFC 8152 §7, restricted to the combinations CTAP2
//! authenticators actually emit) and conversion to usable public keys.
//!
//! Built on the same `ecdsa`/`p256`/`p384`/`p521`/`rsa`/`spki` stack as the
//! card-side asymmetric key handling.

use crate::cbor::Value;
use crate::error::{Error, InvalidErrorKind, ProtocolErrorKind};
use ecdsa::VerifyingKey;
use p256::NistP256;
use p384::NistP384;
use p521::NistP521;
use rsa::{BigUint, RsaPublicKey};

/// COSE key type labels (RFC 8152 §13)
const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

/// COSE algorithm identifiers (RFC 8152 §8, §13)
const ALG_ES256: i64 = -7;
const ALG_EDDSA: i64 = -8;
const ALG_RS256: i64 = -257;

/// COSE EC2/OKP curve identifiers (RFC 8152 §13.1)
const CRV_P256: i64 = 1;
const CRV_P384: i64 = 2;
const CRV_P521: i64 = 3;
const CRV_ED25519: i64 = 6;

/// A public key recovered from a COSE_Key, in the combination the
/// authenticator advertised.
pub enum PublicKey {
    /// ES256 on P-256
    EcP256(VerifyingKey<NistP256>),
    /// ES384 on P-384
    EcP384(VerifyingKey<NistP384>),
    /// ES512 on P-521
    EcP521(VerifyingKey<NistP521>),
    /// EdDSA on Ed25519
    Ed25519(ed25519_dalek::VerifyingKey),
    /// RS256
    Rsa(RsaPublicKey),
}

fn get_int(map: &Value, label: i64) -> Result<i64, Error> {
    let key = Value::from(label);
    let entries = map.as_map()?;
    for (k, v) in entries {
        if *k == key {
            return v.as_i32().map(i64::from);
        }
    }
    fail!(
        ProtocolErrorKind::MalformedResponse,
        "COSE key missing label {label}"
    );
}

fn get_bytes<'a>(map: &'a Value, label: i64) -> Result<&'a [u8], Error> {
    let key = Value::from(label);
    let entries = map.as_map()?;
    for (k, v) in entries {
        if *k == key {
            return v.as_bytes();
        }
    }
    fail!(
        ProtocolErrorKind::MalformedResponse,
        "COSE key missing label {label}"
    );
}

/// Decode a COSE_Key [`Value`] (a CBOR map) into a [`PublicKey`], per the
/// `(kty, alg, crv)` combinations this crate supports.
pub fn decode_public_key(cose_key: &Value) -> Result<PublicKey, Error> {
    let kty = get_int(cose_key, 1)?;
    let alg = get_int(cose_key, 3)?;

    match (kty, alg) {
        (KTY_EC2, ALG_ES256) => {
            let crv = get_int(cose_key, -1)?;
            let x = get_bytes(cose_key, -2)?;
            let y = get_bytes(cose_key, -3)?;
            match crv {
                CRV_P256 => Ok(PublicKey::EcP256(p256_verifying_key(x, y)?)),
                CRV_P384 => Ok(PublicKey::EcP384(p384_verifying_key(x, y)?)),
                CRV_P521 => Ok(PublicKey::EcP521(p521_verifying_key(x, y)?)),
                _ => fail!(InvalidErrorKind::KeyType, "unsupported EC2 curve {crv}"),
            }
        }
        (KTY_OKP, ALG_EDDSA) => {
            let crv = get_int(cose_key, -1)?;
            ensure!(crv == CRV_ED25519, InvalidErrorKind::KeyType);
            let x = get_bytes(cose_key, -2)?;
            let bytes: [u8; 32] = x
                .try_into()
                .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))?;
            let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))?;
            Ok(PublicKey::Ed25519(key))
        }
        (KTY_RSA, ALG_RS256) => {
            let n = get_bytes(cose_key, -1)?;
            let e = get_bytes(cose_key, -2)?;
            let key = RsaPublicKey::new(
                BigUint::from_bytes_be(n),
                BigUint::from_bytes_be(e),
            )
            .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))?;
            Ok(PublicKey::Rsa(key))
        }
        _ => fail!(
            InvalidErrorKind::KeyType,
            "unsupported COSE (kty={kty}, alg={alg}) combination"
        ),
    }
}

fn p256_verifying_key(x: &[u8], y: &[u8]) -> Result<VerifyingKey<NistP256>, Error> {
    use p256::elliptic_curve::sec1::EncodedPoint;
    let point = EncodedPoint::<NistP256>::from_affine_coordinates(
        x.into(),
        y.into(),
        false,
    );
    VerifyingKey::<NistP256>::from_encoded_point(&point)
        .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))
}

fn p384_verifying_key(x: &[u8], y: &[u8]) -> Result<VerifyingKey<NistP384>, Error> {
    use p384::elliptic_curve::sec1::EncodedPoint;
    let point = EncodedPoint::<NistP384>::from_affine_coordinates(
        x.into(),
        y.into(),
        false,
    );
    VerifyingKey::<NistP384>::from_encoded_point(&point)
        .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))
}

fn p521_verifying_key(x: &[u8], y: &[u8]) -> Result<VerifyingKey<NistP521>, Error> {
    use p521::elliptic_curve::sec1::EncodedPoint;
    let point = EncodedPoint::<NistP521>::from_affine_coordinates(
        x.into(),
        y.into(),
        false,
    );
    VerifyingKey::<NistP521>::from_encoded_point(&point)
        .map_err(|_| Error::Invalid(InvalidErrorKind::KeyType))
}

/// Left-pad a big-endian integer to exactly 32 bytes, as required when
/// serializing P-256 coordinates into a COSE key.
pub fn encode_coordinate(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let start = 32usize.saturating_sub(bytes.len());
    out[start..].copy_from_slice(&bytes[bytes.len().saturating_sub(32)..]);
    out
}

/// Re-encode an RSA public key as a DER `SubjectPublicKeyInfo`, matching
/// the well-known RS256 test vector used elsewhere in this crate's test
/// suite.
pub fn rsa_public_key_to_der_spki(key: &RsaPublicKey) -> Result<Vec<u8>, Error> {
    use rsa::pkcs8::EncodePublicKey;
    key.to_public_key_der()
        .map(|doc| doc.as_bytes().to_vec())
        .map_err(|_| Error::Invalid(InvalidErrorKind::Other("RSA SPKI encode failed".into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_coordinate_pads_to_32_bytes() {
        let short = [0x01u8, 0x02];
        let padded = encode_coordinate(&short);
        assert_eq!(padded.len(), 32);
        assert_eq!(&padded[30..], &[0x01, 0x02]);
        assert!(padded[..30].iter().all(|b| *b == 0));
    }

    /// RS256 modulus/exponent for a real RSA-2048 key, decoded the same way
    /// `decode_public_key` builds one from a COSE_Key's `-1`/`-2` labels.
    #[test]
    fn rsa_public_key_to_der_spki_matches_known_good_blob() {
        let n = hex_literal::hex!(
            "d0438c485203e60b7a7fdf953f587ffb1441be471579304deae6bf76650df6"
            "a351b1ce2df4caf76fd11d16002c64f4c393a8245f3c616fcd47ebdff04a4ed"
            "6a4604dc58802a8bb84231ecfc870c7825b85f26adae130bdcb53afd05fa276"
            "ad5f858e780a265e3a1f411cfee2d8b0de6f01dbf15125c605b939b0c7b2397"
            "17734a3b22a63b13ffcbe581fa0a6d8fec4cf574410b5b8daf183176ff70f15"
            "94aaed5ba9b7fa6898e4562259d88677b4eedcef0f01dbf461c718b34d84882"
            "32c2d6f977843bfdcdd13e6d54af3d93058b6591828bd707d3956007843a58d"
            "31d7024db3669fc6accbd43551ee17b75ed5829d34473dc00711d6bd03816b3"
            "cda687025"
        );
        let e = hex_literal::hex!("010001");
        let key = RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e)).unwrap();

        let der = rsa_public_key_to_der_spki(&key).unwrap();
        assert_eq!(der.len(), 294);
        assert_eq!(
            der,
            hex_literal::hex!(
                "30820122300d06092a864886f70d01010105000382010f003082010a02820101"
                "00d0438c485203e60b7a7fdf953f587ffb1441be471579304deae6bf76650df6"
                "a351b1ce2df4caf76fd11d16002c64f4c393a8245f3c616fcd47ebdff04a4ed6"
                "a4604dc58802a8bb84231ecfc870c7825b85f26adae130bdcb53afd05fa276ad"
                "5f858e780a265e3a1f411cfee2d8b0de6f01dbf15125c605b939b0c7b2397177"
                "34a3b22a63b13ffcbe581fa0a6d8fec4cf574410b5b8daf183176ff70f1594aa"
                "ed5ba9b7fa6898e4562259d88677b4eedcef0f01dbf461c718b34d8488232c2d"
                "6f977843bfdcdd13e6d54af3d93058b6591828bd707d3956007843a58d31d702"
                "4db3669fc6accbd43551ee17b75ed5829d34473dc00711d6bd03816b3cda6870"
                "250203010001"
            )
            .to_vec()
        );
    }
}
