//! A WebAuthn client built directly on a CTAP2 authenticator: assembles
//! `authenticatorMakeCredential`/`authenticatorGetAssertion` requests from
//! WebAuthn-level options, drives PIN/UV negotiation when required, and
//! decodes the authenticator's reply back into WebAuthn-level results.

pub mod options;
pub mod preprocess;

use crate::cbor::Value;
use crate::ctap2::{CommandCode, Ctap2Session};
use crate::error::{Error, InvalidErrorKind, ProtocolErrorKind, UnsupportedErrorKind};
use crate::extensions::{
    cred_blob::CredBlob, cred_protect::CredProtect, cred_props::CredProps,
    hmac_secret::HmacSecret, large_blob::LargeBlob, min_pin_length::MinPinLength, prf::Prf,
    sign::Sign, third_party_payment::ThirdPartyPayment, Registry,
};
use crate::pinuv::{self, PinUvAuth, Permissions, Version as PinUvVersion};

pub use options::{
    AuthenticatorSelectionCriteria, CredentialDescriptor, GetAssertionOptions,
    GetAssertionResult, MakeCredentialOptions, MakeCredentialResult, PubKeyCredParam, RpEntity,
    ResidentKeyRequirement, UserEntity, UserVerificationRequirement,
};

const CTAP2_ERR_NO_CREDENTIALS: u8 = 0x2E;

/// Bit 6 ("AT") of the authenticator data flags byte: attested credential
/// data follows the fixed `rpIdHash ‖ flags ‖ signCount` header.
const AUTH_DATA_FLAG_ATTESTED_CREDENTIAL_DATA: u8 = 0x40;

/// Bit 7 ("ED") of the authenticator data flags byte: an extensions CBOR map
/// follows whatever attested credential data (if any) precedes it.
const AUTH_DATA_FLAG_EXTENSION_DATA: u8 = 0x80;

const AUTH_DATA_HEADER_LEN: usize = 32 + 1 + 4;

/// Pull the authenticator's per-extension output map out of `authData`
/// (WebAuthn §6.1), skipping over attested credential data (its
/// `credentialPublicKey` is itself CBOR, so its length isn't known up front
/// and has to be discovered by decoding it).
fn extensions_value_from_auth_data(auth_data: &[u8]) -> Result<Option<Value>, Error> {
    ensure!(auth_data.len() >= AUTH_DATA_HEADER_LEN, ProtocolErrorKind::MalformedResponse);
    let flags = auth_data[32];
    if flags & AUTH_DATA_FLAG_EXTENSION_DATA == 0 {
        return Ok(None);
    }

    let mut offset = AUTH_DATA_HEADER_LEN;
    if flags & AUTH_DATA_FLAG_ATTESTED_CREDENTIAL_DATA != 0 {
        ensure!(auth_data.len() >= offset + 16 + 2, ProtocolErrorKind::MalformedResponse);
        offset += 16; // aaguid
        let cred_id_len = u16::from_be_bytes([auth_data[offset], auth_data[offset + 1]]) as usize;
        offset += 2 + cred_id_len;
        ensure!(auth_data.len() > offset, ProtocolErrorKind::MalformedResponse);
        let (_, remainder) = crate::cbor::decode_prefix(&auth_data[offset..])?;
        offset = auth_data.len() - remainder.len();
    }

    ensure!(auth_data.len() > offset, ProtocolErrorKind::MalformedResponse);
    let (extensions, _) = crate::cbor::decode_prefix(&auth_data[offset..])?;
    Ok(Some(extensions))
}

/// Pull the credential id out of a `makeCredential` response's `authData`
/// (WebAuthn §6.5.1): `rpIdHash(32) ‖ flags(1) ‖ signCount(4) ‖ aaguid(16) ‖
/// credIdLen(2, big-endian) ‖ credId ‖ credPublicKey`.
fn credential_id_from_auth_data(auth_data: &[u8]) -> Result<Vec<u8>, Error> {
    const HEADER_LEN: usize = 32 + 1 + 4;
    ensure!(
        auth_data.len() >= HEADER_LEN + 16 + 2,
        ProtocolErrorKind::MalformedResponse
    );
    let flags = auth_data[32];
    ensure!(
        flags & AUTH_DATA_FLAG_ATTESTED_CREDENTIAL_DATA != 0,
        ProtocolErrorKind::MalformedResponse
    );

    let cred_id_len_offset = HEADER_LEN + 16;
    let cred_id_len =
        u16::from_be_bytes([auth_data[cred_id_len_offset], auth_data[cred_id_len_offset + 1]])
            as usize;
    let cred_id_start = cred_id_len_offset + 2;
    ensure!(
        auth_data.len() >= cred_id_start + cred_id_len,
        ProtocolErrorKind::MalformedResponse
    );
    Ok(auth_data[cred_id_start..cred_id_start + cred_id_len].to_vec())
}

/// A WebAuthn client over a single CTAP2 authenticator session.
///
/// `origin` is the relying party origin this client reports in
/// `clientDataJSON` (WebAuthn §5.8.1); callers pin it once rather than
/// threading it through every call.
pub struct BasicClient<'t> {
    session: Ctap2Session<'t>,
    origin: String,
}

impl<'t> BasicClient<'t> {
    pub fn new(session: Ctap2Session<'t>, origin: impl Into<String>) -> Self {
        Self {
            session,
            origin: origin.into(),
        }
    }

    /// Every extension this client knows about, in the registration order
    /// §4.I fixes `processInput`/`processOutput` to run in.
    fn build_registry(pin_uv: Option<(PinUvVersion, Vec<u8>)>) -> Registry {
        let mut registry = Registry::new();
        registry
            .register(Box::new(CredProps::default()))
            .register(Box::new(CredProtect))
            .register(Box::new(CredBlob))
            .register(Box::new(MinPinLength))
            .register(Box::new(HmacSecret::default()));
        let large_blob = match pin_uv {
            Some((version, token)) => LargeBlob::new().with_pin_uv(version, token),
            None => LargeBlob::new(),
        };
        registry
            .register(Box::new(large_blob))
            .register(Box::new(Prf::default()))
            .register(Box::new(Sign::default()))
            .register(Box::new(ThirdPartyPayment));
        registry
    }

    /// `authenticatorMakeCredential` (CTAP2.1 §6.1), preceded by algorithm
    /// negotiation, exclude-list preprocessing, and PIN/UV negotiation.
    pub fn make_credential(
        &mut self,
        options: &MakeCredentialOptions,
        pin: Option<&str>,
    ) -> Result<MakeCredentialResult, Error> {
        let client_data_json = options::client_data_json(
            "create",
            &options.challenge,
            &self.origin,
        );
        let client_data_hash = crate::crypto::sha256(&client_data_json);

        let info = self.session.info()?;
        let max_credential_id_length = info.max_credential_id_length;
        let supported_algorithms = info.algorithms.clone();
        let exclude_list = preprocess::preprocess(
            &options.exclude_credentials,
            max_credential_id_length,
        );

        // Intersect with the authenticator's supported algorithms, when it
        // enumerated any; an authenticator that omits member 10 is assumed
        // to support whatever was requested.
        let pub_key_cred_params: Vec<_> = match &supported_algorithms {
            Some(supported) => options
                .pub_key_cred_params
                .iter()
                .filter(|p| supported.contains(&p.alg))
                .cloned()
                .collect(),
            None => options.pub_key_cred_params.clone(),
        };
        ensure!(
            !pub_key_cred_params.is_empty(),
            InvalidErrorKind::Other(
                "no requested algorithm is supported by the authenticator".into()
            )
        );

        let uv_required = options.authenticator_selection.user_verification
            == Some(UserVerificationRequirement::Required);
        let rk_required = options.authenticator_selection.require_resident_key
            || options.authenticator_selection.resident_key
                == Some(ResidentKeyRequirement::Required);

        let pin_uv_auth = self.negotiate_pin_uv(pin, uv_required, Permissions::MAKE_CREDENTIAL, Some(&options.rp.id))?;

        let mut registry =
            Self::build_registry(pin_uv_auth.as_ref().map(|(p, t)| (p.version(), t.clone())));
        let extension_entries =
            registry.process_inputs(&mut self.session, true, &options.extensions)?;

        let mut params = vec![
            (1u64.into(), Value::Bytes(client_data_hash.to_vec())),
            (
                2u64.into(),
                Value::map(vec![
                    ("id".into(), options.rp.id.clone().into()),
                    (
                        "name".into(),
                        options.rp.name.clone().map(Value::from).unwrap_or(Value::Null),
                    ),
                ]),
            ),
            (
                3u64.into(),
                Value::map(vec![
                    ("id".into(), Value::Bytes(options.user.id.clone())),
                    (
                        "name".into(),
                        options.user.name.clone().map(Value::from).unwrap_or(Value::Null),
                    ),
                    (
                        "displayName".into(),
                        options
                            .user
                            .display_name
                            .clone()
                            .map(Value::from)
                            .unwrap_or(Value::Null),
                    ),
                ]),
            ),
            (
                4u64.into(),
                Value::Array(
                    pub_key_cred_params
                        .iter()
                        .map(|p| {
                            Value::map(vec![
                                ("type".into(), "public-key".into()),
                                ("alg".into(), (p.alg as i64).into()),
                            ])
                        })
                        .collect(),
                ),
            ),
        ];

        if !exclude_list.is_empty() {
            params.push((
                5u64.into(),
                Value::Array(exclude_list.iter().map(CredentialDescriptor::to_cbor).collect()),
            ));
        }

        if !extension_entries.is_empty() {
            params.push((
                6u64.into(),
                Value::map(extension_entries.iter().map(|(k, v)| (k.clone().into(), v.clone())).collect()),
            ));
        }

        let mut ctap_options = Vec::new();
        if rk_required {
            ctap_options.push(("rk".into(), Value::Bool(true)));
        }
        if uv_required {
            ctap_options.push(("uv".into(), Value::Bool(true)));
        }
        if !ctap_options.is_empty() {
            params.push((7u64.into(), Value::map(ctap_options)));
        }

        if let Some((protocol, token)) = &pin_uv_auth {
            let pin_uv_auth_param = protocol.authenticate(token, &client_data_hash);
            params.push((8u64.into(), Value::Bytes(pin_uv_auth_param)));
            params.push((9u64.into(), (protocol.version() as u64).into()));
        }

        let response = self
            .session
            .call(CommandCode::MakeCredential, Some(&Value::map(params)))?
            .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?;

        let attestation_object = crate::cbor::encode(&response);
        let auth_data = response
            .get_uint(2)
            .and_then(|v| v.as_bytes().ok())
            .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?;
        let credential_id = credential_id_from_auth_data(auth_data)?;
        let authenticator_extensions = extensions_value_from_auth_data(auth_data)?;
        let client_extension_results =
            registry.process_outputs(&mut self.session, true, authenticator_extensions.as_ref())?;

        Ok(MakeCredentialResult {
            credential_id,
            attestation_object,
            client_data_json,
            transports: Vec::new(),
            client_extension_results,
        })
    }

    /// `authenticatorGetAssertion` (CTAP2.1 §6.2), including allow-list
    /// preprocessing and, when the list is longer than the authenticator's
    /// `maxCredentialCountInList`, chunked resolution (§4.H-Filter).
    pub fn get_assertion(
        &mut self,
        options: &GetAssertionOptions,
        pin: Option<&str>,
    ) -> Result<GetAssertionResult, Error> {
        let client_data_json = options::client_data_json(
            "get",
            &options.challenge,
            &self.origin,
        );
        let client_data_hash = crate::crypto::sha256(&client_data_json);

        let info = self.session.info()?.clone();
        let allow_list = preprocess::preprocess(
            &options.allow_credentials,
            info.max_credential_id_length,
        );

        let uv_required = options.user_verification == Some(UserVerificationRequirement::Required);
        let pin_uv_auth =
            self.negotiate_pin_uv(pin, uv_required, Permissions::GET_ASSERTION, Some(&options.rp_id))?;

        let mut registry =
            Self::build_registry(pin_uv_auth.as_ref().map(|(p, t)| (p.version(), t.clone())));
        let extension_entries =
            registry.process_inputs(&mut self.session, false, &options.extensions)?;

        let build_params = |rp_id: &str,
                            rp_id_challenge_hash: &[u8; 32],
                            allow: &[CredentialDescriptor],
                            extensions: &[(String, Value)],
                            pin_uv_auth: &Option<(PinUvAuth, Vec<u8>)>| {
            let mut params = vec![
                (1u64.into(), rp_id.into()),
                (2u64.into(), Value::Bytes(rp_id_challenge_hash.to_vec())),
            ];
            if !allow.is_empty() {
                params.push((
                    3u64.into(),
                    Value::Array(allow.iter().map(CredentialDescriptor::to_cbor).collect()),
                ));
            }
            if !extensions.is_empty() {
                params.push((
                    4u64.into(),
                    Value::map(extensions.iter().map(|(k, v)| (k.clone().into(), v.clone())).collect()),
                ));
            }
            if uv_required {
                params.push((5u64.into(), Value::map(vec![("uv".into(), Value::Bool(true))])));
            }
            if let Some((protocol, token)) = pin_uv_auth {
                let pin_uv_auth_param = protocol.authenticate(token, rp_id_challenge_hash);
                params.push((6u64.into(), Value::Bytes(pin_uv_auth_param)));
                params.push((7u64.into(), (protocol.version() as u64).into()));
            }
            Value::map(params)
        };

        let matched = preprocess::chunked_filter(
            &mut self.session,
            &allow_list,
            info.max_credential_count_in_list,
            |session, slice| {
                let params = build_params(
                    &options.rp_id,
                    &client_data_hash,
                    slice,
                    &extension_entries,
                    &pin_uv_auth,
                );
                let response = session
                    .call(CommandCode::GetAssertion, Some(&params))?
                    .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?;
                response
                    .get_uint(1)
                    .and_then(|d| d.get_text("id"))
                    .and_then(|v| v.as_bytes().ok())
                    .map(|b| b.to_vec())
                    .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))
            },
        )?;

        let send_list: Vec<CredentialDescriptor> = match &matched {
            Some(descriptor) => vec![descriptor.clone()],
            None => Vec::new(),
        };

        let params = build_params(
            &options.rp_id,
            &client_data_hash,
            &send_list,
            &extension_entries,
            &pin_uv_auth,
        );
        let response = self
            .session
            .call(CommandCode::GetAssertion, Some(&params))?
            .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?;

        let credential_id = response
            .get_uint(1)
            .and_then(|d| d.get_text("id"))
            .and_then(|v| v.as_bytes().ok())
            .map(|b| b.to_vec())
            .unwrap_or_default();
        let authenticator_data = response
            .get_uint(2)
            .and_then(|v| v.as_bytes().ok())
            .map(|b| b.to_vec())
            .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?;
        let signature = response
            .get_uint(3)
            .and_then(|v| v.as_bytes().ok())
            .map(|b| b.to_vec())
            .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?;
        let user_handle = response
            .get_uint(4)
            .and_then(|u| u.get_text("id"))
            .and_then(|v| v.as_bytes().ok())
            .map(|b| b.to_vec());

        let authenticator_extensions = extensions_value_from_auth_data(&authenticator_data)?;
        let client_extension_results =
            registry.process_outputs(&mut self.session, false, authenticator_extensions.as_ref())?;

        Ok(GetAssertionResult {
            credential_id,
            authenticator_data,
            signature,
            user_handle,
            client_data_json,
            client_extension_results,
        })
    }

    /// Negotiate a `pinUvAuthToken` when user verification is required and
    /// the caller supplied a PIN. Returns `None` when UV isn't required, or
    /// when it's required but the authenticator reports built-in UV and no
    /// PIN was supplied (the `uv: true` option alone covers that case).
    fn negotiate_pin_uv(
        &mut self,
        pin: Option<&str>,
        uv_required: bool,
        permissions: Permissions,
        rp_id: Option<&str>,
    ) -> Result<Option<(PinUvAuth, Vec<u8>)>, Error> {
        if !uv_required {
            return Ok(None);
        }

        let pin = match pin {
            Some(pin) => pin,
            None => {
                if self.session.info()?.option("uv") {
                    return Ok(None);
                }
                fail!(
                    InvalidErrorKind::Other("user verification required but no PIN supplied".into()),
                    "missing PIN for required user verification"
                );
            }
        };

        let protocols = self.session.info()?.pin_uv_auth_protocols.clone();
        let version = if protocols.contains(&2) {
            PinUvVersion::Two
        } else if protocols.contains(&1) || protocols.is_empty() {
            PinUvVersion::One
        } else {
            fail!(
                UnsupportedErrorKind::PinUvAuthProtocol,
                "authenticator advertises no supported PIN/UV auth protocol"
            );
        };

        let mut protocol = PinUvAuth::new(version)?;
        let pin_token = pinuv::get_pin_token(&mut self.session, &mut protocol, pin, permissions, rp_id)?;
        Ok(Some((protocol, pin_token.token)))
    }
}

/// Whether a CTAP2 error indicates "list too long, retry in smaller chunks"
/// (used by integration tests exercising the full allow-list path).
pub fn is_no_credentials_error(err: &Error) -> bool {
    matches!(err, Error::Ctap(code) if *code == CTAP2_ERR_NO_CREDENTIALS)
}
