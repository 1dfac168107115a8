//! `credBlob` (CTAP2.1 §11.1): up to 32 opaque bytes stored alongside a
//! credential and returned on request.

use crate::cbor::Value;
use crate::ctap2::Ctap2Session;
use crate::error::{Error, InvalidErrorKind};
use crate::extensions::Extension;

const MAX_CRED_BLOB_LEN: usize = 32;

#[derive(Default)]
pub struct CredBlob;

impl Extension for CredBlob {
    fn name(&self) -> &'static str {
        "credBlob"
    }

    fn process_input(
        &mut self,
        _session: &mut Ctap2Session<'_>,
        is_create: bool,
        params: &Value,
    ) -> Result<Option<Value>, Error> {
        if is_create {
            let blob = params.as_bytes()?;
            ensure!(
                blob.len() <= MAX_CRED_BLOB_LEN,
                InvalidErrorKind::TooLong("credBlob exceeds 32 bytes".into())
            );
            Ok(Some(Value::Bytes(blob.to_vec())))
        } else {
            // `getCredBlob: true` requests the stored blob back.
            let requested = matches!(params, Value::Bool(true));
            Ok(requested.then_some(Value::Bool(true)))
        }
    }

    fn process_output(
        &mut self,
        _session: &mut Ctap2Session<'_>,
        is_create: bool,
        authenticator_output: Option<&Value>,
    ) -> Result<Option<Value>, Error> {
        if is_create {
            // The authenticator doesn't echo credBlob on create; storage is
            // confirmed implicitly by a successful makeCredential.
            return Ok(None);
        }
        Ok(authenticator_output.cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    #[test]
    fn rejects_oversized_blob_on_create() {
        let mut transport = MockTransport::default();
        let mut session = Ctap2Session::new(&mut transport);
        let mut ext = CredBlob;
        let oversized = Value::Bytes(vec![0u8; 33]);
        assert!(ext.process_input(&mut session, true, &oversized).is_err());
    }

    #[test]
    fn get_cred_blob_round_trips_output() {
        let mut transport = MockTransport::default();
        let mut session = Ctap2Session::new(&mut transport);
        let mut ext = CredBlob;

        let input = ext
            .process_input(&mut session, false, &Value::Bool(true))
            .unwrap()
            .unwrap();
        assert_eq!(input, Value::Bool(true));

        let stored = Value::Bytes(vec![1, 2, 3]);
        let output = ext.process_output(&mut session, false, Some(&stored)).unwrap();
        assert_eq!(output, Some(stored));
    }
}
