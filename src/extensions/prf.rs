//! `prf` (WebAuthn Pseudo-Random Function extension): a friendlier facade
//! over `hmac-secret` that lets relying parties evaluate a PRF at arbitrary
//! inputs instead of juggling raw salts directly. Per the WebAuthn spec, `prf`
//! travels on the wire under the authenticator's `hmac-secret` extension
//! identifier ([`Extension::wire_name`]), so it can't be requested alongside
//! a literal `hmac-secret` request in the same ceremony.

use crate::cbor::Value;
use crate::crypto;
use crate::ctap2::Ctap2Session;
use crate::error::{Error, ProtocolErrorKind};
use crate::extensions::hmac_secret::HmacSecret;
use crate::extensions::Extension;

const PRF_SALT_PREFIX: &[u8] = b"WebAuthn PRF\x00";

/// `salt = SHA-256("WebAuthn PRF" ‖ 0x00 ‖ input)`, turning an arbitrary-length
/// PRF input into the 32-byte salt hmac-secret expects.
fn derive_salt(input: &[u8]) -> [u8; 32] {
    let mut buf = Vec::with_capacity(PRF_SALT_PREFIX.len() + input.len());
    buf.extend_from_slice(PRF_SALT_PREFIX);
    buf.extend_from_slice(input);
    crypto::sha256(&buf)
}

#[derive(Default)]
pub struct Prf {
    inner: HmacSecret,
    requested: bool,
}

impl Prf {
    fn synth_hmac_secret_input(eval: &Value) -> Result<Value, Error> {
        let first = eval
            .get_text("first")
            .and_then(|v| v.as_bytes().ok())
            .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?;
        let mut entries = vec![("salt1".to_string().into(), Value::Bytes(derive_salt(first).to_vec()))];
        if let Some(second) = eval.get_text("second").and_then(|v| v.as_bytes().ok()) {
            entries.push(("salt2".to_string().into(), Value::Bytes(derive_salt(second).to_vec())));
        }
        Ok(Value::map(entries))
    }
}

impl Extension for Prf {
    fn name(&self) -> &'static str {
        "prf"
    }

    fn wire_name(&self) -> &'static str {
        "hmac-secret"
    }

    fn process_input(
        &mut self,
        session: &mut Ctap2Session<'_>,
        is_create: bool,
        params: &Value,
    ) -> Result<Option<Value>, Error> {
        if is_create {
            // Create only flags support; the actual salts (if any) are
            // evaluated on the following getAssertion, same as hmac-secret-mc.
            self.requested = true;
            return self.inner.process_input(session, true, &Value::Bool(true));
        }

        let eval = params.get_text("eval");
        // `evalByCredential` is resolved by the caller (which credential ID
        // matched) before this extension runs; by the time we're invoked only
        // the winning credential's eval survives, under the same key.
        let Some(eval) = eval else { return Ok(None) };
        self.requested = true;
        let hmac_params = Self::synth_hmac_secret_input(eval)?;
        self.inner.process_input(session, false, &hmac_params)
    }

    fn process_output(
        &mut self,
        session: &mut Ctap2Session<'_>,
        is_create: bool,
        authenticator_output: Option<&Value>,
    ) -> Result<Option<Value>, Error> {
        if !self.requested {
            return Ok(None);
        }
        if is_create {
            return Ok(Some(Value::map(vec![(
                "enabled".to_string().into(),
                Value::Bool(authenticator_output.is_some()),
            )])));
        }

        let Some(results) = self.inner.process_output(session, false, authenticator_output)? else {
            return Ok(Some(Value::map(vec![(
                "enabled".to_string().into(),
                Value::Bool(false),
            )])));
        };
        Ok(Some(Value::map(vec![
            ("enabled".to_string().into(), Value::Bool(true)),
            ("results".to_string().into(), results),
        ])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    #[test]
    fn derive_salt_is_deterministic_and_input_sensitive() {
        assert_eq!(derive_salt(b"a"), derive_salt(b"a"));
        assert_ne!(derive_salt(b"a"), derive_salt(b"b"));
    }

    #[test]
    fn create_without_eval_still_flags_support() {
        let mut transport = MockTransport::default();
        let mut session = Ctap2Session::new(&mut transport);
        let mut ext = Prf::default();
        let input = ext
            .process_input(&mut session, true, &Value::map(vec![]))
            .unwrap();
        assert_eq!(input, Some(Value::Bool(true)));
    }
}
