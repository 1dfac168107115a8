//! `credProps` (WebAuthn §10.2): reports whether a created credential is a
//! resident (discoverable) credential.

use crate::cbor::Value;
use crate::ctap2::Ctap2Session;
use crate::error::Error;
use crate::extensions::Extension;

#[derive(Default)]
pub struct CredProps {
    rk_requested: bool,
}

impl Extension for CredProps {
    fn name(&self) -> &'static str {
        "credProps"
    }

    fn process_input(
        &mut self,
        _session: &mut Ctap2Session<'_>,
        is_create: bool,
        params: &Value,
    ) -> Result<Option<Value>, Error> {
        if !is_create {
            return Ok(None);
        }
        self.rk_requested = matches!(params, Value::Bool(true));
        // credProps is client-resolved; it contributes nothing to the
        // authenticator-level extensions map.
        Ok(None)
    }

    fn process_output(
        &mut self,
        _session: &mut Ctap2Session<'_>,
        is_create: bool,
        _authenticator_output: Option<&Value>,
    ) -> Result<Option<Value>, Error> {
        if !is_create || !self.rk_requested {
            return Ok(None);
        }
        Ok(Some(Value::map(vec![("rk".into(), Value::Bool(true))])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    #[test]
    fn reports_rk_true_when_requested_on_create() {
        let mut transport = MockTransport::default();
        let mut session = Ctap2Session::new(&mut transport);
        let mut ext = CredProps::default();

        ext.process_input(&mut session, true, &Value::Bool(true)).unwrap();
        let output = ext.process_output(&mut session, true, None).unwrap().unwrap();
        assert_eq!(output.get_text("rk"), Some(&Value::Bool(true)));
    }

    #[test]
    fn silent_when_not_requested() {
        let mut transport = MockTransport::default();
        let mut session = Ctap2Session::new(&mut transport);
        let mut ext = CredProps::default();

        ext.process_input(&mut session, true, &Value::Bool(false)).unwrap();
        assert!(ext.process_output(&mut session, true, None).unwrap().is_none());
    }
}
