//! `thirdPartyPayment` (CTAP2.1 §11.4): marks an assertion as being requested
//! on behalf of a third-party payment flow, purely a policy flag with no
//! cryptographic material of its own.

use crate::cbor::Value;
use crate::ctap2::Ctap2Session;
use crate::error::Error;
use crate::extensions::Extension;

#[derive(Default)]
pub struct ThirdPartyPayment;

impl Extension for ThirdPartyPayment {
    fn name(&self) -> &'static str {
        "thirdPartyPayment"
    }

    fn process_input(
        &mut self,
        _session: &mut Ctap2Session<'_>,
        is_create: bool,
        params: &Value,
    ) -> Result<Option<Value>, Error> {
        if is_create {
            // Create carries no input; requesting the extension at all
            // enables the policy for credentials made under it.
            return Ok(Some(Value::Bool(true)));
        }
        let is_payment = matches!(params.get_text("isPayment"), Some(Value::Bool(true)));
        Ok(is_payment.then_some(Value::Bool(true)))
    }

    fn process_output(
        &mut self,
        _session: &mut Ctap2Session<'_>,
        _is_create: bool,
        authenticator_output: Option<&Value>,
    ) -> Result<Option<Value>, Error> {
        Ok(authenticator_output.cloned())
    }
}
