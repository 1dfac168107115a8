//! The caller-supplied transport boundary.
//!
//! A single trait covering both framings this crate speaks (APDU and
//! CTAPHID), since a caller only ever has one open transport at a time.

use crate::error::Error;

/// Implemented by callers to supply the actual USB HID, CCID, or NFC
/// transport. This crate performs no device discovery or opening itself.
pub trait Transport {
    /// Send a raw ISO 7816-4 command APDU, returning the raw response APDU
    /// (body plus 2-byte status word).
    fn transceive_apdu(&mut self, apdu: &[u8]) -> Result<Vec<u8>, Error>;

    /// Send a single raw 64-byte CTAPHID packet, returning the next raw
    /// 64-byte packet read back from the device.
    fn transceive_ctaphid_packet(&mut self, packet: &[u8; 64]) -> Result<[u8; 64], Error>;

    /// Request cancellation of any long-running operation in flight on this
    /// transport. Best-effort: the device may ignore it.
    fn cancel(&mut self) {}
}

#[cfg(test)]
pub(crate) mod mock {
    use super::Transport;
    use crate::error::Error;
    use std::collections::VecDeque;

    /// A transport double driven by pre-scripted responses, for unit tests
    /// across this crate.
    #[derive(Default)]
    pub struct MockTransport {
        pub apdu_responses: VecDeque<Vec<u8>>,
        pub ctaphid_responses: VecDeque<[u8; 64]>,
        pub sent_apdus: Vec<Vec<u8>>,
        pub sent_packets: Vec<[u8; 64]>,
        pub cancelled: bool,
    }

    impl Transport for MockTransport {
        fn transceive_apdu(&mut self, apdu: &[u8]) -> Result<Vec<u8>, Error> {
            self.sent_apdus.push(apdu.to_vec());
            self.apdu_responses
                .pop_front()
                .ok_or_else(|| Error::Io("no scripted APDU response left".into()))
        }

        fn transceive_ctaphid_packet(&mut self, packet: &[u8; 64]) -> Result<[u8; 64], Error> {
            self.sent_packets.push(*packet);
            self.ctaphid_responses
                .pop_front()
                .ok_or_else(|| Error::Io("no scripted CTAPHID response left".into()))
        }

        fn cancel(&mut self) {
            self.cancelled = true;
        }
    }
}
