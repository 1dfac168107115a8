//! PIN/UV Auth Protocols One and Two (CTAP2.1 §6.5.4, §6.5.5).
//!
//! Built on this crate's own [`crate::crypto`] façade rather than calling
//! RustCrypto types directly, with a Protocol Two implementation (HKDF-split
//! keys, random-IV AES-256-CBC, untruncated HMAC) per CTAP2.1 §6.5.5.

pub mod token;

use crate::cbor::Value;
use crate::cose;
use crate::crypto::{self, Curve, Direction, Hash};
use crate::ctap2::{CommandCode, Ctap2Session};
use crate::error::{Error, InvalidErrorKind, ProtocolErrorKind};
use crate::scp::kdf;

pub use token::{PinToken, Permissions};

/// `authenticatorClientPin` subcommands this crate issues (CTAP2.1 §6.5.2)
mod client_pin_subcommand {
    pub const GET_KEY_AGREEMENT: u64 = 0x02;
    pub const GET_PIN_UV_AUTH_TOKEN_USING_PIN_WITH_PERMISSIONS: u64 = 0x09;
}

/// Which PIN/UV Auth Protocol is in effect. The numeric value is what's sent
/// on the wire as `pinUvAuthProtocol`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Version {
    One = 1,
    Two = 2,
}

/// A negotiated PIN/UV Auth Protocol session: the platform's ephemeral key
/// pair plus, once [`PinUvAuth::encapsulate`] has run, the shared secret.
pub struct PinUvAuth {
    version: Version,
    private_key: Vec<u8>,
    public_key_point: Vec<u8>,
    shared_secret: Option<Vec<u8>>,
}

impl PinUvAuth {
    /// Generate a fresh ephemeral P-256 key pair for a new negotiation.
    pub fn new(version: Version) -> Result<Self, Error> {
        let sk = p256::SecretKey::random(&mut rand_core::OsRng);
        let private_key = sk.to_bytes().to_vec();
        let public_key_point = sk.public_key().to_sec1_bytes().to_vec();
        Ok(Self {
            version,
            private_key,
            public_key_point,
            shared_secret: None,
        })
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// `encapsulate(peerCoseKey)`: run ECDH against the authenticator's
    /// `getKeyAgreement` response, returning the COSE_Key to send back as
    /// the platform's own public key.
    pub fn encapsulate(&mut self, peer_cose_key: &Value) -> Result<Value, Error> {
        let peer_point = peer_point_from_cose(peer_cose_key)?;
        let z = crypto::ecdh(Curve::P256, &self.private_key, &peer_point)?;

        self.shared_secret = Some(match self.version {
            Version::One => crypto::sha256(&z.0).to_vec(),
            Version::Two => {
                let (hmac_key, aes_key) = kdf::derive_pinuv_v2_keys(&z.0)?;
                let mut combined = Vec::with_capacity(64);
                combined.extend_from_slice(&hmac_key);
                combined.extend_from_slice(&aes_key);
                combined
            }
        });

        Ok(platform_cose_key(&self.public_key_point))
    }

    fn shared_secret(&self) -> Result<&[u8], Error> {
        self.shared_secret
            .as_deref()
            .ok_or(Error::Protocol(ProtocolErrorKind::WrongState))
    }

    /// `encrypt(key, demPlaintext)`
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let secret = self.shared_secret()?;
        match self.version {
            Version::One => crypto::aes_cbc(secret, &[0u8; 16], plaintext, Direction::Encrypt),
            Version::Two => {
                let aes_key = &secret[32..64];
                let mut iv = [0u8; 16];
                crypto::rand_bytes(&mut iv);
                let ciphertext = crypto::aes_cbc(aes_key, &iv, plaintext, Direction::Encrypt)?;
                let mut out = iv.to_vec();
                out.extend(ciphertext);
                Ok(out)
            }
        }
    }

    /// `decrypt(key, demCiphertext)`
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        let secret = self.shared_secret()?;
        match self.version {
            Version::One => crypto::aes_cbc(secret, &[0u8; 16], ciphertext, Direction::Decrypt),
            Version::Two => {
                ensure!(
                    ciphertext.len() >= 16,
                    InvalidErrorKind::Other("PIN/UV v2 ciphertext shorter than one IV".into())
                );
                let (iv, body) = ciphertext.split_at(16);
                let iv: [u8; 16] = iv.try_into().expect("split_at(16) guarantees length");
                let aes_key = &secret[32..64];
                crypto::aes_cbc(aes_key, &iv, body, Direction::Decrypt)
            }
        }
    }

    /// `authenticate(key, message)` (CTAP2.1 §6.5.5): v1 truncates the
    /// HMAC-SHA-256 tag to 16 bytes, v2 returns the full 32-byte tag. `key`
    /// is whatever 32-byte key the caller holds; computing a `pinUvAuthParam`
    /// for `makeCredential`/`getAssertion` passes the `pinUvAuthToken`
    /// obtained from [`crate::pinuv::get_pin_token`], not the shared secret
    /// negotiated by [`PinUvAuth::encapsulate`].
    pub fn authenticate(&self, key: &[u8], message: &[u8]) -> Vec<u8> {
        authenticate_raw(self.version, key, message)
    }

    /// `authenticate` keyed by this protocol's own negotiated shared secret
    /// (the HMAC half, for v2), rather than an external token.
    pub fn authenticate_with_shared_secret(&self, message: &[u8]) -> Result<Vec<u8>, Error> {
        let secret = self.shared_secret()?;
        let key = match self.version {
            Version::One => secret,
            Version::Two => &secret[..32],
        };
        Ok(self.authenticate(key, message))
    }
}

/// `authenticate(key, message)` without an established [`PinUvAuth`]
/// session, for callers (largeBlob's `pinUvAuthParam`) that only hold a raw
/// `pinUvAuthToken` and the protocol version it was obtained under.
pub fn authenticate_raw(version: Version, key: &[u8], message: &[u8]) -> Vec<u8> {
    match version {
        Version::One => crypto::hmac(Hash::Sha256, key, message)[..16].to_vec(),
        Version::Two => crypto::hmac(Hash::Sha256, key, message),
    }
}

/// Extract the raw SEC1 point `0x04 ‖ x ‖ y` from an authenticator's
/// `getKeyAgreement` COSE_Key. CTAP2 authenticators may label this key with
/// `alg = -25` (ECDH-ES+HKDF-256) rather than `-7` (ES256), so this bypasses
/// [`cose::decode_public_key`]'s signature-oriented algorithm check.
fn cose_field<'a>(cose_key: &'a Value, label: i64) -> Result<&'a Value, Error> {
    let target = Value::from(label);
    cose_key
        .as_map()?
        .iter()
        .find(|(k, _)| *k == target)
        .map(|(_, v)| v)
        .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))
}

fn peer_point_from_cose(cose_key: &Value) -> Result<Vec<u8>, Error> {
    let kty = cose_field(cose_key, 1)?.as_i32()?;
    ensure!(kty == 2, InvalidErrorKind::KeyType); // EC2

    let x = cose_field(cose_key, -2)?.as_bytes()?;
    let y = cose_field(cose_key, -3)?.as_bytes()?;

    let mut point = vec![0x04u8];
    point.extend_from_slice(&cose::encode_coordinate(x));
    point.extend_from_slice(&cose::encode_coordinate(y));
    Ok(point)
}

/// Encode the platform's ephemeral P-256 public key as a COSE_Key.
pub(crate) fn platform_cose_key(sec1_point: &[u8]) -> Value {
    let x = &sec1_point[1..33];
    let y = &sec1_point[33..65];
    Value::map(vec![
        (1i64.into(), 2i64.into()),  // kty: EC2
        (3i64.into(), (-25i64).into()), // alg: ECDH-ES+HKDF-256
        ((-1i64).into(), 1i64.into()),  // crv: P-256
        ((-2i64).into(), Value::Bytes(x.to_vec())),
        ((-3i64).into(), Value::Bytes(y.to_vec())),
    ])
}

/// `getKeyAgreement` (CTAP2.1 §6.5.5.3): negotiate the shared secret this
/// `protocol` will use, returning the platform's own COSE key for embedding
/// in whatever command drove the negotiation. Shared by [`get_pin_token`]
/// and the `hmac-secret` extension, which each run their own independent
/// key agreement.
pub fn negotiate_key_agreement(
    session: &mut Ctap2Session<'_>,
    protocol: &mut PinUvAuth,
) -> Result<Value, Error> {
    let key_agreement_params = Value::map(vec![
        (1u64.into(), (protocol.version() as u64).into()),
        (2u64.into(), client_pin_subcommand::GET_KEY_AGREEMENT.into()),
    ]);
    let response = session
        .call(CommandCode::ClientPin, Some(&key_agreement_params))?
        .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?;
    let peer_cose_key = response
        .get_uint(1)
        .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?;
    protocol.encapsulate(peer_cose_key)
}

/// `getPinToken(pin, permissions, rp_id?) -> token`: negotiate a PIN/UV
/// Auth Protocol, then exchange the PIN hash for a scoped
/// `pinUvAuthToken` via `getPinUvAuthTokenUsingPinWithPermissions`.
pub fn get_pin_token(
    session: &mut Ctap2Session<'_>,
    protocol: &mut PinUvAuth,
    pin: &str,
    permissions: Permissions,
    rp_id: Option<&str>,
) -> Result<PinToken, Error> {
    let platform_cose_key = negotiate_key_agreement(session, protocol)?;

    let pin_hash_enc = protocol.encrypt(&token::pin_hash(pin))?;

    let mut params = vec![
        (1u64.into(), (protocol.version() as u64).into()),
        (
            2u64.into(),
            client_pin_subcommand::GET_PIN_UV_AUTH_TOKEN_USING_PIN_WITH_PERMISSIONS.into(),
        ),
        (3u64.into(), platform_cose_key),
        (6u64.into(), Value::Bytes(pin_hash_enc)),
        (9u64.into(), (permissions.bits() as u64).into()),
    ];
    if let Some(rp_id) = rp_id {
        params.push((0x0Au64.into(), rp_id.into()));
    }

    let response = session
        .call(CommandCode::ClientPin, Some(&Value::map(params)))?
        .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?;
    let token_enc = response
        .get_uint(2)
        .and_then(|v| v.as_bytes().ok())
        .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?;
    let token = protocol.decrypt(token_enc)?;

    Ok(PinToken {
        token,
        permissions,
        rp_id: rp_id.map(String::from),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctap2::command;
    use crate::ctaphid;
    use crate::transport::mock::MockTransport;

    /// Script one request/response round trip: push one placeholder ack per
    /// outgoing packet `request` would actually produce (their return value
    /// is discarded by `Ctap2Session::call`), then the real response.
    fn script_call(transport: &mut MockTransport, code: CommandCode, params: Option<&Value>, response: &Value) {
        let request_payload = command::encode_request(code, params);
        let out_packets = ctaphid::pack(ctaphid::CID_BROADCAST, ctaphid::CMD_CBOR, &request_payload)
            .unwrap()
            .len();
        for _ in 0..out_packets {
            transport.ctaphid_responses.push_back([0u8; 64]);
        }

        let mut raw = vec![0x00u8];
        raw.extend(crate::cbor::encode(response));
        for packet in ctaphid::pack(ctaphid::CID_BROADCAST, ctaphid::CMD_CBOR, &raw).unwrap() {
            transport.ctaphid_responses.push_back(packet);
        }
    }

    #[test]
    fn get_pin_token_round_trips_through_client_pin_subcommands() {
        let authenticator_sk = p256::SecretKey::random(&mut rand_core::OsRng);
        let authenticator_point = authenticator_sk.public_key().to_sec1_bytes().to_vec();
        let authenticator_cose = platform_cose_key(&authenticator_point);

        let mut protocol = PinUvAuth::new(Version::One).unwrap();
        let platform_cose = protocol.encapsulate(&authenticator_cose).unwrap();
        let pin_hash_enc = protocol.encrypt(&token::pin_hash("1234")).unwrap();

        let raw_token = [0x42u8; 32];
        let token_enc = protocol.encrypt(&raw_token).unwrap();

        let mut transport = MockTransport::default();

        let key_agreement_params = Value::map(vec![
            (1u64.into(), (Version::One as u64).into()),
            (2u64.into(), client_pin_subcommand::GET_KEY_AGREEMENT.into()),
        ]);
        script_call(
            &mut transport,
            CommandCode::ClientPin,
            Some(&key_agreement_params),
            &Value::map(vec![(1u64.into(), authenticator_cose)]),
        );

        let token_params = Value::map(vec![
            (1u64.into(), (Version::One as u64).into()),
            (
                2u64.into(),
                client_pin_subcommand::GET_PIN_UV_AUTH_TOKEN_USING_PIN_WITH_PERMISSIONS.into(),
            ),
            (3u64.into(), platform_cose),
            (6u64.into(), Value::Bytes(pin_hash_enc)),
            (9u64.into(), (Permissions::MAKE_CREDENTIAL.bits() as u64).into()),
            (0x0Au64.into(), "example.com".into()),
        ]);
        script_call(
            &mut transport,
            CommandCode::ClientPin,
            Some(&token_params),
            &Value::map(vec![(2u64.into(), Value::Bytes(token_enc))]),
        );

        // `get_pin_token` re-runs `encapsulate` against the scripted peer key
        // using this same `protocol`'s (already generated) ephemeral key, so
        // it re-derives the identical shared secret used to encrypt above.
        let mut session = Ctap2Session::new(&mut transport);
        let result = get_pin_token(
            &mut session,
            &mut protocol,
            "1234",
            Permissions::MAKE_CREDENTIAL,
            Some("example.com"),
        );
        assert_eq!(result.unwrap().token, raw_token);
    }

    /// PIN/UV v1 `encrypt` fixed vector: key = 16 bytes `00..0F`, plaintext =
    /// 16 bytes `00..0F`.
    #[test]
    fn v1_encrypt_fixed_vector() {
        let key: [u8; 16] = (0..16u8).collect::<Vec<_>>().try_into().unwrap();
        let plaintext: [u8; 16] = (0..16u8).collect::<Vec<_>>().try_into().unwrap();
        let ciphertext = crypto::aes_cbc(&key, &[0u8; 16], &plaintext, Direction::Encrypt).unwrap();
        assert_eq!(
            ciphertext,
            hex_literal::hex!("0a940bb5416ef045f1c39458c653ea5a")
        );
    }

    /// PIN/UV v1 `authenticate` fixed vector: key = `00..0F`, data = `00..0F`.
    #[test]
    fn v1_authenticate_fixed_vector() {
        let key: [u8; 16] = (0..16u8).collect::<Vec<_>>().try_into().unwrap();
        let data: [u8; 16] = (0..16u8).collect::<Vec<_>>().try_into().unwrap();
        let mac = authenticate_raw(Version::One, &key, &data);
        assert_eq!(mac, hex_literal::hex!("9f3aa28826b37485ca05014d7142b3ea"));
    }

    /// Two independently-negotiated sides of the same ECDH arrive at the
    /// same shared secret, and v1's symmetric encrypt/decrypt round-trips.
    #[test]
    fn v1_shared_secret_round_trips_encrypt_decrypt() {
        let mut platform = PinUvAuth::new(Version::One).unwrap();
        let authenticator_sk = p256::SecretKey::random(&mut rand_core::OsRng);
        let authenticator_point = authenticator_sk.public_key().to_sec1_bytes().to_vec();
        let authenticator_cose = platform_cose_key(&authenticator_point);

        platform.encapsulate(&authenticator_cose).unwrap();

        let plaintext = [0x11u8; 32];
        let ciphertext = platform.encrypt(&plaintext).unwrap();
        let roundtrip = platform.decrypt(&ciphertext).unwrap();
        assert_eq!(roundtrip, plaintext);
    }

    #[test]
    fn v1_authenticate_produces_16_byte_tag() {
        let mut platform = PinUvAuth::new(Version::One).unwrap();
        let authenticator_sk = p256::SecretKey::random(&mut rand_core::OsRng);
        let authenticator_cose =
            platform_cose_key(&authenticator_sk.public_key().to_sec1_bytes());
        platform.encapsulate(&authenticator_cose).unwrap();
        assert_eq!(platform.authenticate_with_shared_secret(b"message").unwrap().len(), 16);
    }

    #[test]
    fn v2_authenticate_produces_32_byte_tag_and_round_trips() {
        let mut platform = PinUvAuth::new(Version::Two).unwrap();
        let authenticator_sk = p256::SecretKey::random(&mut rand_core::OsRng);
        let authenticator_cose =
            platform_cose_key(&authenticator_sk.public_key().to_sec1_bytes());
        platform.encapsulate(&authenticator_cose).unwrap();

        assert_eq!(platform.authenticate_with_shared_secret(b"message").unwrap().len(), 32);

        let plaintext = [0x22u8; 32];
        let ciphertext = platform.encrypt(&plaintext).unwrap();
        assert_eq!(ciphertext.len(), 16 + plaintext.len());
        assert_eq!(platform.decrypt(&ciphertext).unwrap(), plaintext);
    }
}
