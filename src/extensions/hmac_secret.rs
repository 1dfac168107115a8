//! `hmac-secret` / `hmac-secret-mc` (CTAP2.1 §11.2): derives a pair of
//! per-credential secrets from platform-supplied salts via an authenticator
//! ECDH exchange independent of any `pinUvAuthToken` negotiation.

use crate::cbor::Value;
use crate::ctap2::Ctap2Session;
use crate::error::{Error, InvalidErrorKind, ProtocolErrorKind};
use crate::extensions::Extension;
use crate::pinuv::{self, PinUvAuth, Version};

const SALT_LEN: usize = 32;

#[derive(Default)]
pub struct HmacSecret {
    protocol: Option<PinUvAuth>,
}

impl HmacSecret {
    /// Which PIN/UV Auth Protocol version to negotiate the extension's own
    /// key agreement under. CTAP2.1 doesn't require this to match whatever
    /// protocol a `pinUvAuthToken` was obtained with; absent any advertised
    /// protocol, protocol one is the universal default.
    fn pick_version(session: &mut Ctap2Session<'_>) -> Result<Version, Error> {
        let protocols = session.info()?.pin_uv_auth_protocols.clone();
        Ok(if protocols.contains(&2) {
            Version::Two
        } else {
            Version::One
        })
    }
}

impl Extension for HmacSecret {
    fn name(&self) -> &'static str {
        "hmac-secret"
    }

    fn process_input(
        &mut self,
        session: &mut Ctap2Session<'_>,
        is_create: bool,
        params: &Value,
    ) -> Result<Option<Value>, Error> {
        if is_create {
            return Ok(matches!(params, Value::Bool(true)).then_some(Value::Bool(true)));
        }

        let salt1 = params
            .get_text("salt1")
            .and_then(|v| v.as_bytes().ok())
            .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?;
        ensure!(salt1.len() == SALT_LEN, InvalidErrorKind::Other("salt1 must be 32 bytes".into()));
        let salt2 = params.get_text("salt2").and_then(|v| v.as_bytes().ok());
        if let Some(salt2) = salt2 {
            ensure!(salt2.len() == SALT_LEN, InvalidErrorKind::Other("salt2 must be 32 bytes".into()));
        }

        let mut salts = salt1.to_vec();
        if let Some(salt2) = salt2 {
            salts.extend_from_slice(salt2);
        }

        let version = Self::pick_version(session)?;
        let mut protocol = PinUvAuth::new(version)?;
        let platform_cose_key = pinuv::negotiate_key_agreement(session, &mut protocol)?;

        let salt_enc = protocol.encrypt(&salts)?;
        let salt_auth = protocol.authenticate_with_shared_secret(&salt_enc)?;

        let entry = Value::map(vec![
            (1u64.into(), platform_cose_key),
            (2u64.into(), Value::Bytes(salt_enc)),
            (3u64.into(), Value::Bytes(salt_auth)),
            (4u64.into(), (protocol.version() as u64).into()),
        ]);
        self.protocol = Some(protocol);
        Ok(Some(entry))
    }

    fn process_output(
        &mut self,
        _session: &mut Ctap2Session<'_>,
        is_create: bool,
        authenticator_output: Option<&Value>,
    ) -> Result<Option<Value>, Error> {
        if is_create {
            return Ok(authenticator_output.cloned());
        }

        let Some(output) = authenticator_output else {
            return Ok(None);
        };
        let protocol = self
            .protocol
            .as_ref()
            .ok_or(Error::Protocol(ProtocolErrorKind::WrongState))?;

        let encrypted = output.as_bytes()?;
        let decrypted = protocol.decrypt(encrypted)?;
        ensure!(
            decrypted.len() == SALT_LEN || decrypted.len() == SALT_LEN * 2,
            ProtocolErrorKind::MalformedResponse
        );

        let mut results = vec![("first".to_string().into(), Value::Bytes(decrypted[..SALT_LEN].to_vec()))];
        if decrypted.len() == SALT_LEN * 2 {
            results.push((
                "second".to_string().into(),
                Value::Bytes(decrypted[SALT_LEN..].to_vec()),
            ));
        }
        Ok(Some(Value::map(results)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctap2::{command, CommandCode};
    use crate::ctaphid;
    use crate::transport::mock::MockTransport;

    fn info_with_protocol(version: u64) -> Value {
        Value::map(vec![
            (1u64.into(), Value::Array(vec!["FIDO_2_0".into()])),
            (3u64.into(), Value::Bytes(vec![0u8; 16])),
            (6u64.into(), Value::Array(vec![version.into()])),
        ])
    }

    fn script(transport: &mut MockTransport, code: CommandCode, params: Option<&Value>, response: &Value) {
        let payload = command::encode_request(code, params);
        let out = ctaphid::pack(ctaphid::CID_BROADCAST, ctaphid::CMD_CBOR, &payload).unwrap().len();
        for _ in 0..out {
            transport.ctaphid_responses.push_back([0u8; 64]);
        }
        let mut raw = vec![0x00u8];
        raw.extend(crate::cbor::encode(response));
        for packet in ctaphid::pack(ctaphid::CID_BROADCAST, ctaphid::CMD_CBOR, &raw).unwrap() {
            transport.ctaphid_responses.push_back(packet);
        }
    }

    #[test]
    fn get_round_trips_single_salt() {
        let mut transport = MockTransport::default();
        script(&mut transport, CommandCode::GetInfo, None, &info_with_protocol(1));

        let authenticator_sk = p256::SecretKey::random(&mut rand_core::OsRng);
        let authenticator_cose =
            pinuv::platform_cose_key(&authenticator_sk.public_key().to_sec1_bytes());
        let key_agreement_params = Value::map(vec![
            (1u64.into(), 1u64.into()),
            (2u64.into(), 0x02u64.into()),
        ]);
        script(
            &mut transport,
            CommandCode::ClientPin,
            Some(&key_agreement_params),
            &Value::map(vec![(1u64.into(), authenticator_cose)]),
        );

        let mut session = Ctap2Session::new(&mut transport);
        let mut ext = HmacSecret::default();

        let params = Value::map(vec![
            ("salt1".into(), Value::Bytes(vec![0x11; SALT_LEN])),
        ]);
        let input = ext.process_input(&mut session, false, &params).unwrap().unwrap();

        let protocol = ext.protocol.as_ref().unwrap();
        let output_plain = [0x99u8; SALT_LEN];
        let output_enc = protocol.encrypt(&output_plain).unwrap();

        let _ = input;
        let result = ext
            .process_output(&mut session, false, Some(&Value::Bytes(output_enc)))
            .unwrap()
            .unwrap();
        assert_eq!(
            result.get_text("first"),
            Some(&Value::Bytes(output_plain.to_vec()))
        );
        assert!(result.get_text("second").is_none());
    }
}
