//! `minPinLength` (CTAP2.1 §11.1): on create, reports the authenticator's
//! configured minimum PIN length to relying parties permitted to see it.

use crate::cbor::Value;
use crate::ctap2::Ctap2Session;
use crate::error::Error;
use crate::extensions::Extension;

#[derive(Default)]
pub struct MinPinLength;

impl Extension for MinPinLength {
    fn name(&self) -> &'static str {
        "minPinLength"
    }

    fn process_input(
        &mut self,
        _session: &mut Ctap2Session<'_>,
        is_create: bool,
        params: &Value,
    ) -> Result<Option<Value>, Error> {
        if !is_create || !matches!(params, Value::Bool(true)) {
            return Ok(None);
        }
        Ok(Some(Value::Bool(true)))
    }

    fn process_output(
        &mut self,
        session: &mut Ctap2Session<'_>,
        is_create: bool,
        authenticator_output: Option<&Value>,
    ) -> Result<Option<Value>, Error> {
        if !is_create || authenticator_output.is_none() {
            return Ok(None);
        }
        let min_pin_length = session.info()?.min_pin_length;
        Ok(min_pin_length.map(|len| (len as u64).into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    #[test]
    fn silent_when_not_requested() {
        let mut transport = MockTransport::default();
        let mut session = Ctap2Session::new(&mut transport);
        let mut ext = MinPinLength;
        assert!(ext
            .process_input(&mut session, true, &Value::Bool(false))
            .unwrap()
            .is_none());
    }
}
