//! Allow/exclude-list preprocessing and chunked allow-list resolution.

use crate::ctap2::Ctap2Session;
use crate::error::Error;
use crate::webauthn::options::CredentialDescriptor;

/// Discard descriptors whose id exceeds `max_credential_id_length` (when the
/// authenticator reports one); preserve relative order; the `transports`
/// field is always dropped (callers never see it re-serialized).
pub fn preprocess(
    descriptors: &[CredentialDescriptor],
    max_credential_id_length: Option<u32>,
) -> Vec<CredentialDescriptor> {
    descriptors
        .iter()
        .filter(|d| match max_credential_id_length {
            Some(max) => d.id.len() as u32 <= max,
            None => true,
        })
        .map(|d| CredentialDescriptor::new(d.id.clone()))
        .collect()
}

/// CTAP2 error codes this layer recovers from while chunking an allow-list
/// (CTAP2.1 §6.3).
const CTAP2_ERR_NO_CREDENTIALS: u8 = 0x2E;
const CTAP2_ERR_REQUEST_TOO_LARGE: u8 = 0x39;

/// Resolve which member of `allow_list` the authenticator actually holds a
/// credential for, issuing successive `getAssertion` probes with `up:false`
/// when the list is longer than `max_credential_count_in_list`.
///
/// `probe` builds and sends one `authenticatorGetAssertion` call for the
/// given slice and returns the chosen credential id on success.
pub fn chunked_filter(
    session: &mut Ctap2Session<'_>,
    allow_list: &[CredentialDescriptor],
    max_credential_count_in_list: Option<u32>,
    mut probe: impl FnMut(&mut Ctap2Session<'_>, &[CredentialDescriptor]) -> Result<Vec<u8>, Error>,
) -> Result<Option<CredentialDescriptor>, Error> {
    if allow_list.is_empty() {
        return Ok(None);
    }

    let max = (max_credential_count_in_list.unwrap_or(allow_list.len() as u32) as usize)
        .min(allow_list.len());

    let mut offset = 0usize;
    let mut chunk_size = max.max(1);

    while offset < allow_list.len() {
        let end = (offset + chunk_size).min(allow_list.len());
        let slice = &allow_list[offset..end];

        match probe(session, slice) {
            Ok(credential_id) => {
                return Ok(Some(
                    slice
                        .iter()
                        .find(|d| d.id == credential_id)
                        .cloned()
                        .unwrap_or_else(|| CredentialDescriptor::new(credential_id)),
                ));
            }
            Err(Error::Ctap(CTAP2_ERR_NO_CREDENTIALS)) => {
                offset = end;
            }
            Err(Error::Ctap(CTAP2_ERR_REQUEST_TOO_LARGE)) => {
                if chunk_size <= 1 {
                    return Err(Error::Ctap(CTAP2_ERR_REQUEST_TOO_LARGE));
                }
                chunk_size -= 1;
            }
            Err(err) => return Err(err),
        }
    }

    Ok(None)
}
