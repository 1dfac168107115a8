//! `sign` (CTAP2.1 §11.5): lets a relying party provision an authenticator-
//! held signing key at credential creation and request raw signatures over
//! pre-hashed data at assertion time. The authenticator owns both key
//! generation and signing; this extension only shuttles the request/response
//! payloads through the usual create/get lifecycle.

use crate::cbor::Value;
use crate::ctap2::Ctap2Session;
use crate::error::{Error, ProtocolErrorKind};
use crate::extensions::Extension;

#[derive(Default)]
pub struct Sign {
    requested: bool,
}

impl Extension for Sign {
    fn name(&self) -> &'static str {
        "sign"
    }

    fn process_input(
        &mut self,
        _session: &mut Ctap2Session<'_>,
        is_create: bool,
        params: &Value,
    ) -> Result<Option<Value>, Error> {
        self.requested = true;
        if is_create {
            let generate_key = params
                .get_text("generateKey")
                .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?;
            return Ok(Some(Value::map(vec![(
                "generateKey".to_string().into(),
                generate_key.clone(),
            )])));
        }

        let sign = params
            .get_text("sign")
            .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?;
        Ok(Some(Value::map(vec![(
            "sign".to_string().into(),
            sign.clone(),
        )])))
    }

    fn process_output(
        &mut self,
        _session: &mut Ctap2Session<'_>,
        _is_create: bool,
        authenticator_output: Option<&Value>,
    ) -> Result<Option<Value>, Error> {
        if !self.requested {
            return Ok(None);
        }
        Ok(authenticator_output.cloned())
    }
}
