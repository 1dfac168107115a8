//! CTAP2 command codes and the raw request/response wire shape: a single
//! command byte followed by a canonical CBOR parameter map, and a single
//! status byte followed by a canonical CBOR response map.

use crate::cbor::{self, Value};
use crate::error::Error;

/// CTAP2 command codes (CTAP2.1 §6)
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum CommandCode {
    MakeCredential = 0x01,
    GetAssertion = 0x02,
    GetInfo = 0x04,
    ClientPin = 0x06,
    Reset = 0x07,
    GetNextAssertion = 0x08,
    BioEnrollment = 0x09,
    CredentialManagement = 0x0A,
    Selection = 0x0B,
    LargeBlobs = 0x0C,
    Config = 0x0D,
}

/// CTAP2 status byte: `0x00` is success, everything else is an authenticator
/// error code (CTAP2.1 §6.3)
pub const STATUS_SUCCESS: u8 = 0x00;

/// Status byte an authenticator returns for the command in flight when it
/// honors a CTAPHID_CANCEL (CTAP2.1 §6.3, CTAP2_ERR_KEEPALIVE_CANCEL).
pub const CTAP2_ERR_KEEPALIVE_CANCEL: u8 = 0x2D;

/// Serialize `params` (empty map is omitted entirely, matching how
/// authenticators expect zero-argument commands) behind the command byte.
pub fn encode_request(code: CommandCode, params: Option<&Value>) -> Vec<u8> {
    let mut out = vec![code as u8];
    if let Some(params) = params {
        out.extend(cbor::encode(params));
    }
    out
}

/// Split a raw response into its status byte and, on success, the decoded
/// CBOR response map (`None` if the authenticator returned no data).
pub fn decode_response(raw: &[u8]) -> Result<Option<Value>, Error> {
    if raw.is_empty() {
        fail!(
            crate::error::ProtocolErrorKind::MalformedResponse,
            "empty CTAP2 response"
        );
    }
    let status = raw[0];
    if status != STATUS_SUCCESS {
        return Err(Error::Ctap(status));
    }
    if raw.len() == 1 {
        return Ok(None);
    }
    Ok(Some(cbor::decode(&raw[1..])?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_request_with_no_params() {
        let encoded = encode_request(CommandCode::GetInfo, None);
        assert_eq!(encoded, vec![0x04]);
    }

    #[test]
    fn decode_response_maps_nonzero_status_to_ctap_error() {
        let err = decode_response(&[0x2E]).unwrap_err();
        assert!(matches!(err, Error::Ctap(0x2E)));
    }

    #[test]
    fn decode_response_success_with_no_body() {
        assert_eq!(decode_response(&[0x00]).unwrap(), None);
    }
}
