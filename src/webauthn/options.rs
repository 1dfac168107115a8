//! WebAuthn request/response option types (a minimal subset of the WebAuthn
//! Level 2 dictionaries CTAP2.1 §6.1/§6.2 actually consume).

use crate::cbor::Value;

/// `PublicKeyCredentialDescriptor`
#[derive(Clone, Debug)]
pub struct CredentialDescriptor {
    pub id: Vec<u8>,
    pub transports: Option<Vec<String>>,
}

impl CredentialDescriptor {
    pub fn new(id: Vec<u8>) -> Self {
        Self { id, transports: None }
    }

    pub fn to_cbor(&self) -> Value {
        Value::map(vec![
            ("type".into(), "public-key".into()),
            ("id".into(), Value::Bytes(self.id.clone())),
        ])
    }
}

/// `PublicKeyCredentialRpEntity`
#[derive(Clone, Debug)]
pub struct RpEntity {
    pub id: String,
    pub name: Option<String>,
}

/// `PublicKeyCredentialUserEntity`
#[derive(Clone, Debug)]
pub struct UserEntity {
    pub id: Vec<u8>,
    pub name: Option<String>,
    pub display_name: Option<String>,
}

/// `PublicKeyCredentialParameters`: (alg, type) pair
#[derive(Clone, Copy, Debug)]
pub struct PubKeyCredParam {
    pub alg: i32,
}

/// `AuthenticatorSelectionCriteria`
#[derive(Clone, Debug, Default)]
pub struct AuthenticatorSelectionCriteria {
    pub resident_key: Option<ResidentKeyRequirement>,
    pub require_resident_key: bool,
    pub user_verification: Option<UserVerificationRequirement>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResidentKeyRequirement {
    Discouraged,
    Preferred,
    Required,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UserVerificationRequirement {
    Discouraged,
    Preferred,
    Required,
}

/// `makeCredential` input options
#[derive(Clone, Debug)]
pub struct MakeCredentialOptions {
    pub rp: RpEntity,
    pub user: UserEntity,
    pub challenge: Vec<u8>,
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    pub exclude_credentials: Vec<CredentialDescriptor>,
    pub authenticator_selection: AuthenticatorSelectionCriteria,
    pub extensions: Vec<(String, Value)>,
}

/// `getAssertion` input options
#[derive(Clone, Debug)]
pub struct GetAssertionOptions {
    pub rp_id: String,
    pub challenge: Vec<u8>,
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub user_verification: Option<UserVerificationRequirement>,
    pub extensions: Vec<(String, Value)>,
}

/// The result of a successful `makeCredential` call, assembled for
/// hand-off as a WebAuthn `PublicKeyCredential`.
pub struct MakeCredentialResult {
    pub credential_id: Vec<u8>,
    pub attestation_object: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub transports: Vec<String>,
    pub client_extension_results: Vec<(String, Value)>,
}

/// The result of a successful `getAssertion` call.
pub struct GetAssertionResult {
    pub credential_id: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    pub signature: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
    pub client_data_json: Vec<u8>,
    pub client_extension_results: Vec<(String, Value)>,
}

/// Build `clientDataJSON` for a `create`/`get` ceremony (WebAuthn §5.8.1,
/// restricted to the fields CTAP2 clients are required to populate).
pub fn client_data_json(kind: &str, challenge: &[u8], origin: &str) -> Vec<u8> {
    use base64::Engine;
    let challenge_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(challenge);
    format!(
        "{{\"type\":\"webauthn.{kind}\",\"challenge\":\"{challenge_b64}\",\"origin\":\"{origin}\",\"crossOrigin\":false}}"
    )
    .into_bytes()
}
