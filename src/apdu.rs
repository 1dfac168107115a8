//! ISO 7816-4 command unit framing (APDUs): short/extended form encoding,
//! `0x61 XX` / `0x6C XX` chaining, and status-word extraction.
//!
//! A single send-and-get-response call at the APDU layer.

use crate::error::Error;

/// Status word meaning "complete success"
pub const SW_SUCCESS: u16 = 0x9000;

/// A single ISO 7816-4 command APDU
#[derive(Clone, Debug)]
pub struct CommandApdu {
    /// Class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data field
    pub data: Vec<u8>,
    /// Expected response length (`None` = no response data expected)
    pub le: Option<u16>,
}

impl CommandApdu {
    /// Build a new command APDU
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: data.into(),
            le: None,
        }
    }

    /// Set the expected response length
    pub fn with_le(mut self, le: u16) -> Self {
        self.le = Some(le);
        self
    }

    /// Serialize using short form when `data.len() <= 255` and `le <= 256`,
    /// extended form otherwise.
    pub fn encode(&self) -> Vec<u8> {
        let short_form = self.data.len() <= 255 && self.le.is_none_or(|le| le <= 256);

        let mut out = vec![self.cla, self.ins, self.p1, self.p2];

        if short_form {
            if !self.data.is_empty() {
                out.push(self.data.len() as u8);
                out.extend_from_slice(&self.data);
            }
            if let Some(le) = self.le {
                out.push(if le == 256 { 0 } else { le as u8 });
            }
        } else {
            out.push(0x00);
            if !self.data.is_empty() {
                out.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
                out.extend_from_slice(&self.data);
            }
            if let Some(le) = self.le {
                out.extend_from_slice(&le.to_be_bytes());
            }
        }
        out
    }
}

/// A single ISO 7816-4 response APDU: body plus 2-byte status word
#[derive(Clone, Debug)]
pub struct ResponseApdu {
    /// Response data field (not including the status word)
    pub data: Vec<u8>,
    /// Status word
    pub sw: u16,
}

impl ResponseApdu {
    /// Split `raw` (which must be at least 2 bytes) into body and status word
    pub fn parse(raw: &[u8]) -> Result<Self, Error> {
        if raw.len() < 2 {
            fail!(
                crate::error::ProtocolErrorKind::MalformedResponse,
                "response APDU shorter than the 2-byte status word"
            );
        }
        let (body, sw_bytes) = raw.split_at(raw.len() - 2);
        let sw = u16::from_be_bytes([sw_bytes[0], sw_bytes[1]]);
        Ok(Self {
            data: body.to_vec(),
            sw,
        })
    }

    /// Whether this response's status word is `0x9000`
    pub fn is_success(&self) -> bool {
        self.sw == SW_SUCCESS
    }
}

/// GET RESPONSE instruction byte, used to retrieve chained `0x61 XX` data
const INS_GET_RESPONSE: u8 = 0xC0;

/// Send `command` over `transceive`, following `0x61 XX` ("more data
/// available") and `0x6C XX` ("wrong Le, retry with this one") chaining
/// until a final status word is reached.
///
/// `transceive` sends one raw APDU and returns one raw response.
pub fn transceive(
    command: &CommandApdu,
    mut transceive: impl FnMut(&[u8]) -> Result<Vec<u8>, Error>,
) -> Result<ResponseApdu, Error> {
    let raw = transceive(&command.encode())?;
    let mut response = ResponseApdu::parse(&raw)?;

    // 0x6C XX: resend with the indicated Le.
    if response.sw & 0xFF00 == 0x6C00 {
        let le = response.sw & 0x00FF;
        let retry = command.clone().with_le(le);
        let raw = transceive(&retry.encode())?;
        response = ResponseApdu::parse(&raw)?;
    }

    // 0x61 XX: more data available via GET RESPONSE, possibly repeatedly.
    let mut full_data = response.data;
    while response.sw & 0xFF00 == 0x6100 {
        let le = response.sw & 0x00FF;
        let get_response = CommandApdu::new(command.cla, INS_GET_RESPONSE, 0x00, 0x00, Vec::new())
            .with_le(if le == 0 { 256 } else { le });
        let raw = transceive(&get_response.encode())?;
        response = ResponseApdu::parse(&raw)?;
        full_data.extend_from_slice(&response.data);
    }

    Ok(ResponseApdu {
        data: full_data,
        sw: response.sw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn short_form_encoding() {
        let apdu = CommandApdu::new(0x00, 0xA4, 0x04, 0x00, vec![1, 2, 3]).with_le(256);
        let encoded = apdu.encode();
        assert_eq!(encoded, vec![0x00, 0xA4, 0x04, 0x00, 0x03, 1, 2, 3, 0x00]);
    }

    #[test]
    fn extended_form_encoding_for_large_data() {
        let data = vec![0xAB; 300];
        let apdu = CommandApdu::new(0x00, 0xA4, 0x04, 0x00, data.clone());
        let encoded = apdu.encode();
        assert_eq!(encoded[4], 0x00);
        assert_eq!(u16::from_be_bytes([encoded[5], encoded[6]]), 300);
        assert_eq!(&encoded[7..], &data[..]);
    }

    #[test]
    fn chains_on_0x61() {
        let apdu = CommandApdu::new(0x00, 0xCA, 0x00, 0x66, Vec::new()).with_le(256);
        let calls = RefCell::new(0u8);
        let response = transceive(&apdu, |_| {
            let mut n = calls.borrow_mut();
            *n += 1;
            match *n {
                1 => Ok(vec![1, 2, 3, 0x61, 0x02]),
                2 => Ok(vec![4, 5, 0x90, 0x00]),
                _ => panic!("unexpected extra call"),
            }
        })
        .unwrap();
        assert_eq!(response.data, vec![1, 2, 3, 4, 5]);
        assert!(response.is_success());
    }

    #[test]
    fn retries_on_0x6c() {
        let apdu = CommandApdu::new(0x00, 0xCA, 0x00, 0x66, Vec::new()).with_le(256);
        let calls = RefCell::new(0u8);
        let response = transceive(&apdu, |_| {
            let mut n = calls.borrow_mut();
            *n += 1;
            match *n {
                1 => Ok(vec![0x6C, 0x05]),
                2 => Ok(vec![0, 0, 0, 0, 0, 0x90, 0x00]),
                _ => panic!("unexpected extra call"),
            }
        })
        .unwrap();
        assert_eq!(response.data.len(), 5);
    }
}
