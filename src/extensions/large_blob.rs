//! `largeBlob` (CTAP2.1 §11.3): a per-authenticator blob array, deflate
//! compressed and checksummed, read and written through the
//! `authenticatorLargeBlobs` command (0x0C) rather than through the
//! `makeCredential`/`getAssertion` extension map.
//!
//! This side compresses and appends the integrity suffix before writing,
//! the mirror image of verifying it after receiving.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;

use crate::cbor::Value;
use crate::crypto;
use crate::ctap2::{CommandCode, Ctap2Session};
use crate::error::{Error, ProtocolErrorKind};
use crate::extensions::Extension;
use crate::pinuv::{self, Version};

const TRUNCATED_HASH_LEN: usize = 16;
const MAX_FRAGMENT_LEN: usize = 960;

enum Pending {
    Read,
    Write(Vec<u8>),
}

pub struct LargeBlob {
    support_requested: bool,
    pending: Option<Pending>,
    pin_uv: Option<(Version, Vec<u8>)>,
}

impl LargeBlob {
    pub fn new() -> Self {
        Self {
            support_requested: false,
            pending: None,
            pin_uv: None,
        }
    }

    /// Attach the `pinUvAuthToken` this call already negotiated for
    /// `makeCredential`/`getAssertion`, reused here to authorize writes.
    pub fn with_pin_uv(mut self, version: Version, token: Vec<u8>) -> Self {
        self.pin_uv = Some((version, token));
        self
    }

    fn read_array(session: &mut Ctap2Session<'_>) -> Result<Vec<u8>, Error> {
        let mut buffer = Vec::new();
        loop {
            let params = Value::map(vec![
                (1u64.into(), (MAX_FRAGMENT_LEN as u64).into()),
                (3u64.into(), (buffer.len() as u64).into()),
            ]);
            let response = session
                .call(CommandCode::LargeBlobs, Some(&params))?
                .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?;
            let chunk = response
                .get_uint(1)
                .and_then(|v| v.as_bytes().ok())
                .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?;
            if chunk.is_empty() {
                break;
            }
            let done = chunk.len() < MAX_FRAGMENT_LEN;
            buffer.extend_from_slice(chunk);
            if done {
                break;
            }
        }

        ensure!(
            buffer.len() > TRUNCATED_HASH_LEN,
            ProtocolErrorKind::MalformedResponse
        );
        let hash_index = buffer.len() - TRUNCATED_HASH_LEN;
        let expected = &crypto::sha256(&buffer[..hash_index])[..TRUNCATED_HASH_LEN];
        ensure!(
            expected == &buffer[hash_index..],
            ProtocolErrorKind::MalformedResponse
        );

        let mut decoder = flate2::write::ZlibDecoder::new(Vec::new());
        decoder
            .write_all(&buffer[..hash_index])
            .and_then(|_| decoder.finish())
            .map_err(|_| Error::Protocol(ProtocolErrorKind::MalformedResponse))
    }

    fn write_array(session: &mut Ctap2Session<'_>, plaintext: &[u8], pin_uv: &(Version, Vec<u8>)) -> Result<(), Error> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(plaintext)
            .map_err(|_| Error::Protocol(ProtocolErrorKind::MalformedResponse))?;
        let compressed = encoder
            .finish()
            .map_err(|_| Error::Protocol(ProtocolErrorKind::MalformedResponse))?;

        let mut array = compressed;
        let suffix_hash = crypto::sha256(&array);
        array.extend_from_slice(&suffix_hash[..TRUNCATED_HASH_LEN]);

        let (version, token) = pin_uv;
        let total_len = array.len();
        let mut offset = 0usize;
        while offset < total_len {
            let end = (offset + MAX_FRAGMENT_LEN).min(total_len);
            let fragment = &array[offset..end];

            let mut message = vec![0xFFu8; 32];
            message.push(0x0C);
            message.push(0x00);
            message.extend_from_slice(&(offset as u32).to_le_bytes());
            message.extend_from_slice(&crypto::sha256(fragment));
            let pin_uv_auth_param = pinuv::authenticate_raw(*version, token, &message);

            let mut entries = vec![
                (2u64.into(), Value::Bytes(fragment.to_vec())),
                (3u64.into(), (offset as u64).into()),
            ];
            if offset == 0 {
                entries.push((4u64.into(), (total_len as u64).into()));
            }
            entries.push((5u64.into(), Value::Bytes(pin_uv_auth_param)));
            entries.push((6u64.into(), (*version as u64).into()));
            let params = Value::map(entries);
            session.call(CommandCode::LargeBlobs, Some(&params))?;
            offset = end;
        }
        Ok(())
    }
}

impl Default for LargeBlob {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for LargeBlob {
    fn name(&self) -> &'static str {
        "largeBlob"
    }

    fn process_input(
        &mut self,
        _session: &mut Ctap2Session<'_>,
        is_create: bool,
        params: &Value,
    ) -> Result<Option<Value>, Error> {
        if is_create {
            let support = params.as_text().unwrap_or("");
            self.support_requested = support == "required" || support == "preferred";
            return Ok(None);
        }

        if matches!(params.get_text("read"), Some(Value::Bool(true))) {
            self.pending = Some(Pending::Read);
        } else if let Some(write) = params.get_text("write").and_then(|v| v.as_bytes().ok()) {
            self.pending = Some(Pending::Write(write.to_vec()));
        }
        Ok(None)
    }

    fn process_output(
        &mut self,
        session: &mut Ctap2Session<'_>,
        is_create: bool,
        _authenticator_output: Option<&Value>,
    ) -> Result<Option<Value>, Error> {
        if is_create {
            if !self.support_requested {
                return Ok(None);
            }
            let supported = session.info()?.option("largeBlobs");
            return Ok(Some(Value::map(vec![(
                "supported".to_string().into(),
                Value::Bool(supported),
            )])));
        }

        match self.pending.take() {
            Some(Pending::Read) => {
                let blob = Self::read_array(session)?;
                Ok(Some(Value::map(vec![(
                    "blob".to_string().into(),
                    Value::Bytes(blob),
                )])))
            }
            Some(Pending::Write(data)) => {
                let pin_uv = self
                    .pin_uv
                    .as_ref()
                    .ok_or(Error::Protocol(ProtocolErrorKind::WrongState))?;
                Self::write_array(session, &data, pin_uv)?;
                Ok(Some(Value::map(vec![(
                    "written".to_string().into(),
                    Value::Bool(true),
                )])))
            }
            None => Ok(None),
        }
    }
}
