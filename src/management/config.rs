//! `authenticatorConfig` (CTAP2.1 §6.11): authenticator-wide settings that
//! require `pinUvAuthParam` over a fixed prefix rather than over the
//! subcommand params alone.

use crate::cbor::Value;
use crate::ctap2::{CommandCode, Ctap2Session};
use crate::error::Error;
use crate::pinuv::{PinToken, PinUvAuth};

mod subcommand {
    pub const ENABLE_ENTERPRISE_ATTESTATION: u64 = 0x01;
    pub const TOGGLE_ALWAYS_UV: u64 = 0x02;
    pub const SET_MIN_PIN_LENGTH: u64 = 0x03;
}

const AUTH_PREFIX: [u8; 32] = [0xff; 32];
const COMMAND_BYTE: u8 = 0x0d;

pub struct Config<'s, 't> {
    session: &'s mut Ctap2Session<'t>,
    protocol: PinUvAuth,
    token: PinToken,
}

impl<'s, 't> Config<'s, 't> {
    pub fn new(session: &'s mut Ctap2Session<'t>, protocol: PinUvAuth, token: PinToken) -> Self {
        Self { session, protocol, token }
    }

    fn call(&mut self, subcommand: u64, params: Option<&Value>) -> Result<(), Error> {
        let mut message = AUTH_PREFIX.to_vec();
        message.push(COMMAND_BYTE);
        message.push(subcommand as u8);
        if let Some(params) = params {
            message.extend(crate::cbor::encode(params));
        }
        let pin_uv_auth_param = self.protocol.authenticate(&self.token.token, &message);

        let mut entries = vec![(1u64.into(), subcommand.into())];
        if let Some(params) = params {
            entries.push((2u64.into(), params.clone()));
        }
        entries.push((3u64.into(), (self.protocol.version() as u64).into()));
        entries.push((4u64.into(), Value::Bytes(pin_uv_auth_param)));

        self.session
            .call(CommandCode::Config, Some(&Value::map(entries)))?;
        Ok(())
    }

    pub fn enable_enterprise_attestation(&mut self) -> Result<(), Error> {
        self.call(subcommand::ENABLE_ENTERPRISE_ATTESTATION, None)
    }

    pub fn toggle_always_uv(&mut self) -> Result<(), Error> {
        self.call(subcommand::TOGGLE_ALWAYS_UV, None)
    }

    pub fn set_min_pin_length(
        &mut self,
        new_min_pin_length: Option<u64>,
        min_pin_length_rp_ids: &[String],
        force_change_pin: Option<bool>,
    ) -> Result<(), Error> {
        let mut entries = Vec::new();
        if let Some(len) = new_min_pin_length {
            entries.push((1u64.into(), len.into()));
        }
        if !min_pin_length_rp_ids.is_empty() {
            let rp_ids = min_pin_length_rp_ids
                .iter()
                .map(|id| id.as_str().into())
                .collect();
            entries.push((2u64.into(), Value::Array(rp_ids)));
        }
        if let Some(force) = force_change_pin {
            entries.push((3u64.into(), Value::Bool(force)));
        }
        let params = (!entries.is_empty()).then(|| Value::map(entries));
        self.call(subcommand::SET_MIN_PIN_LENGTH, params.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctap2::command;
    use crate::ctaphid;
    use crate::pinuv::{Permissions, Version};
    use crate::transport::mock::MockTransport;

    /// Script one request/response round trip: push one placeholder ack per
    /// outgoing packet `request` would actually produce, then the real
    /// response.
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
    fn toggle_always_uv_sends_fixed_auth_prefix_param() {
        let mut protocol = PinUvAuth::new(Version::Two).unwrap();
        let authenticator_sk = p256::SecretKey::random(&mut rand_core::OsRng);
        let authenticator_cose =
            crate::pinuv::platform_cose_key(&authenticator_sk.public_key().to_sec1_bytes());
        protocol.encapsulate(&authenticator_cose).unwrap();

        let token = PinToken {
            token: vec![7; 32],
            permissions: Permissions::AUTHENTICATOR_CFG,
            rp_id: None,
        };

        let mut message = AUTH_PREFIX.to_vec();
        message.push(COMMAND_BYTE);
        message.push(subcommand::TOGGLE_ALWAYS_UV as u8);
        let pin_uv_auth_param = protocol.authenticate(&token.token, &message);

        let params = Value::map(vec![
            (1u64.into(), subcommand::TOGGLE_ALWAYS_UV.into()),
            (3u64.into(), (Version::Two as u64).into()),
            (4u64.into(), Value::Bytes(pin_uv_auth_param)),
        ]);

        let mut transport = MockTransport::default();
        script_call(&mut transport, CommandCode::Config, Some(&params), &Value::map(vec![]));

        let mut session = Ctap2Session::new(&mut transport);
        let mut config = Config::new(&mut session, protocol, token);
        config.toggle_always_uv().unwrap();
    }
}
