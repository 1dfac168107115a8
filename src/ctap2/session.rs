//! CTAP2 authenticator session: owns a transport, caches `getInfo`, and
//! carries out the send/cancel/receive dance for a single outstanding
//! command.
//!
//! Owns a transport and exposes one request-response call per command,
//! generalized from UUID-framed binary commands to CTAP2's CBOR-framed
//! ones, with cancellation added since CTAPHID exposes it.

use crate::ctap2::command::{self, CommandCode};
use crate::ctap2::info::{Info, InfoCache};
use crate::cbor::Value;
use crate::ctaphid;
use crate::error::Error;
use crate::transport::Transport;

/// A CTAP2 session over any [`Transport`].
pub struct Ctap2Session<'t> {
    transport: &'t mut dyn Transport,
    info: InfoCache,
    cid: u32,
}

impl<'t> Ctap2Session<'t> {
    pub fn new(transport: &'t mut dyn Transport) -> Self {
        Self {
            transport,
            info: InfoCache::new(),
            cid: ctaphid::CID_BROADCAST,
        }
    }

    /// The cached `getInfo` result, fetching it on first use.
    pub fn info(&mut self) -> Result<&Info, Error> {
        if self.info.get().is_none() {
            let fetched = self.fetch_info()?;
            self.info.set(fetched);
        }
        Ok(self.info.get().expect("just set"))
    }

    /// Force the next [`Ctap2Session::info`] call to re-fetch `getInfo`.
    pub fn refresh_info(&mut self) {
        self.info.invalidate();
    }

    fn fetch_info(&mut self) -> Result<Info, Error> {
        let response = self.call(CommandCode::GetInfo, None)?;
        let response = response.ok_or(Error::Protocol(
            crate::error::ProtocolErrorKind::MalformedResponse,
        ))?;
        Info::parse(&response)
    }

    /// Send a CTAP2 command and block for its response, packing/reassembling
    /// over CTAPHID framing. `params` is the command's CBOR parameter map.
    pub fn call(
        &mut self,
        code: CommandCode,
        params: Option<&Value>,
    ) -> Result<Option<Value>, Error> {
        let payload = command::encode_request(code, params);
        let packets = ctaphid::pack(self.cid, ctaphid::CMD_CBOR, &payload)?;

        for packet in &packets {
            self.transport.transceive_ctaphid_packet(packet)?;
        }

        let mut reassembler = ctaphid::Reassembler::new(self.cid);
        loop {
            let packet = self.transport.transceive_ctaphid_packet(&[0u8; 64])?;
            if let Some((cmd, body)) = reassembler.feed(&packet)? {
                if cmd == ctaphid::CMD_ERROR {
                    return Err(Error::Ctap(*body.first().unwrap_or(&0x7f)));
                }
                if cmd == ctaphid::CMD_KEEPALIVE {
                    continue;
                }
                return match command::decode_response(&body) {
                    Err(Error::Ctap(command::CTAP2_ERR_KEEPALIVE_CANCEL)) => Err(Error::Cancelled),
                    other => other,
                };
            }
        }
    }

    /// Request cancellation of the currently outstanding command. The
    /// in-flight [`Ctap2Session::call`] resolves as [`Error::Cancelled`];
    /// the session remains usable afterward.
    pub fn cancel(&mut self) {
        self.transport.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    #[test]
    fn get_info_round_trips_and_caches() {
        let mut response = vec![0x00u8]; // success status
        response.extend(crate::cbor::encode(&Value::map(vec![
            (1u64.into(), Value::Array(vec!["FIDO_2_0".into()])),
            (3u64.into(), Value::Bytes(vec![0u8; 16])),
        ])));
        let packets = ctaphid::pack(ctaphid::CID_BROADCAST, ctaphid::CMD_CBOR, &response).unwrap();

        // One placeholder reply for the single outgoing request packet (its
        // return value is discarded by `call`), then the scripted response.
        let mut transport = MockTransport::default();
        transport.ctaphid_responses.push_back([0u8; 64]);
        for packet in packets {
            transport.ctaphid_responses.push_back(packet);
        }

        let mut session = Ctap2Session::new(&mut transport);
        let info = session.info().unwrap();
        assert_eq!(info.versions, vec!["FIDO_2_0"]);
    }

    #[test]
    fn nonzero_status_surfaces_as_ctap_error() {
        let packets =
            ctaphid::pack(ctaphid::CID_BROADCAST, ctaphid::CMD_CBOR, &[0x2E]).unwrap();
        let mut transport = MockTransport::default();
        transport.ctaphid_responses.push_back([0u8; 64]);
        for packet in packets {
            transport.ctaphid_responses.push_back(packet);
        }
        let mut session = Ctap2Session::new(&mut transport);
        let err = session.call(CommandCode::GetInfo, None).unwrap_err();
        assert!(matches!(err, Error::Ctap(0x2E)));
    }

    #[test]
    fn keepalive_cancel_status_surfaces_as_cancelled() {
        let packets = ctaphid::pack(
            ctaphid::CID_BROADCAST,
            ctaphid::CMD_CBOR,
            &[command::CTAP2_ERR_KEEPALIVE_CANCEL],
        )
        .unwrap();
        let mut transport = MockTransport::default();
        transport.ctaphid_responses.push_back([0u8; 64]);
        for packet in packets {
            transport.ctaphid_responses.push_back(packet);
        }
        let mut session = Ctap2Session::new(&mut transport);
        let err = session.call(CommandCode::GetInfo, None).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
