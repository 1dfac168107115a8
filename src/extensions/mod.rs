//! CTAP2 extension pipeline (CTAP2.1 §11): a uniform create/get lifecycle
//! each registered extension participates in, invoked in registration order
//! on the way into `authenticatorMakeCredential`/`authenticatorGetAssertion`
//! and again on the way out.

pub mod cred_blob;
pub mod cred_protect;
pub mod cred_props;
pub mod hmac_secret;
pub mod large_blob;
pub mod min_pin_length;
pub mod prf;
pub mod sign;
pub mod third_party_payment;

use crate::cbor::Value;
use crate::ctap2::Ctap2Session;
use crate::error::Error;

/// One registered extension. `process_input` contributes an entry to the
/// authenticator-level `extensions` CBOR map; `process_output` reads back
/// whatever the authenticator returned under the same key and turns it into
/// a client-level result entry.
///
/// Implementations that need a transport round trip of their own (hmac-secret
/// negotiating a shared secret, largeBlob reading/writing the blob array) are
/// handed the session directly rather than threaded through the main
/// makeCredential/getAssertion call.
pub trait Extension {
    /// The client-facing extension identifier, e.g. `"credProtect"`. Used to
    /// look up the caller's requested input and to key the client-level
    /// extension results.
    fn name(&self) -> &'static str;

    /// The CTAP2 wire identifier this extension's authenticator-level map
    /// entry is keyed under. Usually the same as [`Extension::name`]; `prf`
    /// is the one exception, whose requests and responses travel under the
    /// authenticator's `hmac-secret` key.
    fn wire_name(&self) -> &'static str {
        self.name()
    }

    /// Build this extension's authenticator-level input, if the caller asked
    /// for it. `is_create` distinguishes `makeCredential` from `getAssertion`.
    fn process_input(
        &mut self,
        session: &mut Ctap2Session<'_>,
        is_create: bool,
        params: &Value,
    ) -> Result<Option<Value>, Error>;

    /// Turn the authenticator's per-extension output (if any) into the
    /// client-level extension result.
    fn process_output(
        &mut self,
        session: &mut Ctap2Session<'_>,
        is_create: bool,
        authenticator_output: Option<&Value>,
    ) -> Result<Option<Value>, Error>;
}

/// Runs a fixed, ordered set of extensions across one create/get ceremony.
#[derive(Default)]
pub struct Registry {
    extensions: Vec<Box<dyn Extension>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extension: Box<dyn Extension>) -> &mut Self {
        self.extensions.push(extension);
        self
    }

    /// Run `processInput` for every registered extension whose name appears
    /// in `requested` (the caller-supplied extensions map), in registration
    /// order, and assemble the authenticator-level extensions map.
    pub fn process_inputs(
        &mut self,
        session: &mut Ctap2Session<'_>,
        is_create: bool,
        requested: &[(String, Value)],
    ) -> Result<Vec<(String, Value)>, Error> {
        let mut authenticator_extensions = Vec::new();
        for extension in &mut self.extensions {
            let Some((_, params)) = requested.iter().find(|(k, _)| k == extension.name()) else {
                continue;
            };
            if let Some(entry) = extension.process_input(session, is_create, params)? {
                authenticator_extensions.push((extension.wire_name().to_string().into(), entry));
            }
        }
        Ok(authenticator_extensions)
    }

    /// Run `processOutput` for every registered extension, in registration
    /// order, reading back from the authenticator's `extensions` map member.
    pub fn process_outputs(
        &mut self,
        session: &mut Ctap2Session<'_>,
        is_create: bool,
        authenticator_extensions: Option<&Value>,
    ) -> Result<Vec<(String, Value)>, Error> {
        let mut client_results = Vec::new();
        for extension in &mut self.extensions {
            let output = authenticator_extensions.and_then(|v| v.get_text(extension.wire_name()));
            if let Some(entry) = extension.process_output(session, is_create, output)? {
                client_results.push((extension.name().to_string(), entry));
            }
        }
        Ok(client_results)
    }
}
