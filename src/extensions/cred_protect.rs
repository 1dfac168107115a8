//! `credProtect` (CTAP2.1 §11.1): scopes a created credential's visibility
//! in the `getAssertion` allow-list/discoverable-credential search.

use crate::cbor::Value;
use crate::ctap2::Ctap2Session;
use crate::error::{Error, InvalidErrorKind};
use crate::extensions::Extension;

/// `credentialProtectionPolicy` values (CTAP2.1 §11.1)
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProtectionPolicy {
    UserVerificationOptional = 1,
    UserVerificationOptionalWithCredentialIdList = 2,
    UserVerificationRequired = 3,
}

impl ProtectionPolicy {
    fn from_u64(value: u64) -> Result<Self, Error> {
        match value {
            1 => Ok(Self::UserVerificationOptional),
            2 => Ok(Self::UserVerificationOptionalWithCredentialIdList),
            3 => Ok(Self::UserVerificationRequired),
            _ => Err(Error::Invalid(InvalidErrorKind::Other(format!(
                "unknown credProtect policy {value}"
            )))),
        }
    }
}

#[derive(Default)]
pub struct CredProtect;

impl Extension for CredProtect {
    fn name(&self) -> &'static str {
        "credProtect"
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
        let policy = ProtectionPolicy::from_u64(params.as_u64()?)?;
        Ok(Some((policy as u64).into()))
    }

    fn process_output(
        &mut self,
        _session: &mut Ctap2Session<'_>,
        is_create: bool,
        authenticator_output: Option<&Value>,
    ) -> Result<Option<Value>, Error> {
        if !is_create {
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
    fn encodes_known_policy_and_rejects_unknown() {
        let mut transport = MockTransport::default();
        let mut session = Ctap2Session::new(&mut transport);
        let mut ext = CredProtect;

        let out = ext.process_input(&mut session, true, &3u64.into()).unwrap().unwrap();
        assert_eq!(out, Value::Uint(3));

        assert!(ext.process_input(&mut session, true, &9u64.into()).is_err());
    }
}
