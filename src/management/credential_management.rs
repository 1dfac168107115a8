//! `authenticatorCredentialManagement` (CTAP2.1 §6.8): enumerate and prune
//! discoverable credentials stored on the authenticator.

use crate::cbor::Value;
use crate::ctap2::{CommandCode, Ctap2Session};
use crate::error::{Error, ProtocolErrorKind};
use crate::pinuv::{PinToken, PinUvAuth};

mod subcommand {
    pub const GET_CREDS_METADATA: u64 = 0x01;
    pub const ENUMERATE_RPS_BEGIN: u64 = 0x02;
    pub const ENUMERATE_RPS_GET_NEXT_RP: u64 = 0x03;
    pub const ENUMERATE_CREDENTIALS_BEGIN: u64 = 0x04;
    pub const ENUMERATE_CREDENTIALS_GET_NEXT: u64 = 0x05;
    pub const DELETE_CREDENTIAL: u64 = 0x06;
    pub const UPDATE_USER_INFORMATION: u64 = 0x07;
}

/// `{ existingResidentCredentialsCount, maxPossibleRemainingResidentCredentialsCount }`
pub struct Metadata {
    pub existing_resident_credentials_count: u64,
    pub max_possible_remaining_resident_credentials_count: u64,
}

/// One relying party entry from `enumerateRPs`.
pub struct RpEntry {
    pub rp_id_hash: Vec<u8>,
    pub rp_id: Option<String>,
}

/// One discoverable credential entry from `enumerateCredentials`.
pub struct CredentialEntry {
    pub user_id: Vec<u8>,
    pub credential_id: Vec<u8>,
}

pub struct CredentialManagement<'s, 't> {
    session: &'s mut Ctap2Session<'t>,
    protocol: PinUvAuth,
    token: PinToken,
}

impl<'s, 't> CredentialManagement<'s, 't> {
    pub fn new(session: &'s mut Ctap2Session<'t>, protocol: PinUvAuth, token: PinToken) -> Self {
        Self { session, protocol, token }
    }

    fn call(&mut self, subcommand: u64, params: Option<&Value>) -> Result<Option<Value>, Error> {
        let mut message = vec![subcommand as u8];
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
            .call(CommandCode::CredentialManagement, Some(&Value::map(entries)))
    }

    pub fn get_metadata(&mut self) -> Result<Metadata, Error> {
        let response = self
            .call(subcommand::GET_CREDS_METADATA, None)?
            .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?;
        Ok(Metadata {
            existing_resident_credentials_count: response
                .get_uint(1)
                .and_then(|v| v.as_u64().ok())
                .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?,
            max_possible_remaining_resident_credentials_count: response
                .get_uint(2)
                .and_then(|v| v.as_u64().ok())
                .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?,
        })
    }

    /// Walks `enumerateRPsBegin`/`enumerateRPsGetNextRP` to completion.
    pub fn enumerate_rps(&mut self) -> Result<Vec<RpEntry>, Error> {
        let Some(first) = self.call(subcommand::ENUMERATE_RPS_BEGIN, None)? else {
            return Ok(Vec::new());
        };
        let total = first.get_uint(5).and_then(|v| v.as_u64().ok()).unwrap_or(0);
        let mut entries = Vec::new();
        entries.push(rp_entry_from_response(&first)?);
        for _ in 1..total {
            let response = self
                .call(subcommand::ENUMERATE_RPS_GET_NEXT_RP, None)?
                .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?;
            entries.push(rp_entry_from_response(&response)?);
        }
        Ok(entries)
    }

    /// Walks `enumerateCredentialsBegin`/`enumerateCredentialsGetNextCredential`
    /// for the RP whose ID hash is `rp_id_hash`.
    pub fn enumerate_credentials(&mut self, rp_id_hash: &[u8]) -> Result<Vec<CredentialEntry>, Error> {
        let params = Value::map(vec![(1u64.into(), Value::Bytes(rp_id_hash.to_vec()))]);
        let Some(first) = self.call(subcommand::ENUMERATE_CREDENTIALS_BEGIN, Some(&params))? else {
            return Ok(Vec::new());
        };
        let total = first.get_uint(9).and_then(|v| v.as_u64().ok()).unwrap_or(0);
        let mut entries = Vec::new();
        entries.push(credential_entry_from_response(&first)?);
        for _ in 1..total {
            let response = self
                .call(subcommand::ENUMERATE_CREDENTIALS_GET_NEXT, None)?
                .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?;
            entries.push(credential_entry_from_response(&response)?);
        }
        Ok(entries)
    }

    pub fn delete_credential(&mut self, credential_id: &[u8]) -> Result<(), Error> {
        let params = Value::map(vec![(
            2u64.into(),
            Value::map(vec![
                ("id".into(), Value::Bytes(credential_id.to_vec())),
                ("type".into(), "public-key".into()),
            ]),
        )]);
        self.call(subcommand::DELETE_CREDENTIAL, Some(&params))?;
        Ok(())
    }

    pub fn update_user_information(
        &mut self,
        credential_id: &[u8],
        user_id: &[u8],
        user_name: Option<&str>,
    ) -> Result<(), Error> {
        let mut user_entries = vec![("id".into(), Value::Bytes(user_id.to_vec()))];
        if let Some(name) = user_name {
            user_entries.push(("name".into(), name.into()));
        }
        let params = Value::map(vec![
            (
                2u64.into(),
                Value::map(vec![
                    ("id".into(), Value::Bytes(credential_id.to_vec())),
                    ("type".into(), "public-key".into()),
                ]),
            ),
            (3u64.into(), Value::map(user_entries)),
        ]);
        self.call(subcommand::UPDATE_USER_INFORMATION, Some(&params))?;
        Ok(())
    }
}

fn rp_entry_from_response(response: &Value) -> Result<RpEntry, Error> {
    let rp_id_hash = response
        .get_uint(4)
        .and_then(|v| v.as_bytes().ok())
        .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?
        .to_vec();
    let rp_id = response
        .get_uint(3)
        .and_then(|v| v.get_text("id"))
        .and_then(|v| v.as_text().ok())
        .map(String::from);
    Ok(RpEntry { rp_id_hash, rp_id })
}

fn credential_entry_from_response(response: &Value) -> Result<CredentialEntry, Error> {
    let user_id = response
        .get_uint(6)
        .and_then(|v| v.get_text("id"))
        .and_then(|v| v.as_bytes().ok())
        .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?
        .to_vec();
    let credential_id = response
        .get_uint(7)
        .and_then(|v| v.get_text("id"))
        .and_then(|v| v.as_bytes().ok())
        .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?
        .to_vec();
    Ok(CredentialEntry { user_id, credential_id })
}
