//! `authenticatorGetInfo` response decoding and session-lifetime caching.

use crate::cbor::Value;
use crate::error::{Error, ProtocolErrorKind};

/// Decoded `authenticatorGetInfo` response (CTAP2.1 §6.4). Only the fields
/// this crate's operations actually consult are pulled out; the raw map is
/// kept alongside for anything else a caller needs.
#[derive(Clone, Debug)]
pub struct Info {
    pub versions: Vec<String>,
    pub extensions: Vec<String>,
    pub aaguid: [u8; 16],
    pub options: Vec<(String, bool)>,
    pub max_msg_size: Option<u32>,
    pub pin_uv_auth_protocols: Vec<u32>,
    pub max_credential_count_in_list: Option<u32>,
    pub max_credential_id_length: Option<u32>,
    pub transports: Vec<String>,
    pub algorithms: Option<Vec<i32>>,
    pub min_pin_length: Option<u32>,
    pub remaining_discoverable_credentials: Option<u32>,
    raw: Value,
}

impl Info {
    pub fn parse(response: &Value) -> Result<Self, Error> {
        let versions = response
            .get_uint(1)
            .and_then(|v| v.as_array().ok())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_text().ok())
                    .map(String::from)
                    .collect()
            })
            .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?;

        let extensions = response
            .get_uint(2)
            .and_then(|v| v.as_array().ok())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_text().ok())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let aaguid_bytes = response
            .get_uint(3)
            .and_then(|v| v.as_bytes().ok())
            .ok_or(Error::Protocol(ProtocolErrorKind::MalformedResponse))?;
        let mut aaguid = [0u8; 16];
        if aaguid_bytes.len() != 16 {
            return Err(Error::Protocol(ProtocolErrorKind::MalformedResponse));
        }
        aaguid.copy_from_slice(aaguid_bytes);

        let options = response
            .get_uint(4)
            .and_then(|v| v.as_map().ok())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|(k, v)| Some((k.as_text().ok()?.to_string(), v.as_bool().ok()?)))
                    .collect()
            })
            .unwrap_or_default();

        let max_msg_size = response
            .get_uint(5)
            .and_then(|v| v.as_u64().ok())
            .map(|v| v as u32);

        let pin_uv_auth_protocols = response
            .get_uint(6)
            .and_then(|v| v.as_array().ok())
            .map(|a| a.iter().filter_map(|v| v.as_u64().ok()).map(|v| v as u32).collect())
            .unwrap_or_default();

        let max_credential_count_in_list = response
            .get_uint(7)
            .and_then(|v| v.as_u64().ok())
            .map(|v| v as u32);
        let max_credential_id_length = response
            .get_uint(8)
            .and_then(|v| v.as_u64().ok())
            .map(|v| v as u32);

        let transports = response
            .get_uint(9)
            .and_then(|v| v.as_array().ok())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_text().ok())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        // Member 10: the authenticator's supported public-key algorithms, as
        // `{"alg": COSEAlgorithmIdentifier, "type": "public-key"}` entries.
        // Absent means the authenticator hasn't enumerated its algorithms;
        // callers should then assume whatever was requested is supported.
        let algorithms = response.get_uint(10).and_then(|v| v.as_array().ok()).map(|a| {
            a.iter()
                .filter_map(|entry| entry.get_text("alg")?.as_i32().ok())
                .collect()
        });

        let min_pin_length = response
            .get_uint(13)
            .and_then(|v| v.as_u64().ok())
            .map(|v| v as u32);
        let remaining_discoverable_credentials = response
            .get_uint(20)
            .and_then(|v| v.as_u64().ok())
            .map(|v| v as u32);

        Ok(Self {
            versions,
            extensions,
            aaguid,
            options,
            max_msg_size,
            pin_uv_auth_protocols,
            max_credential_count_in_list,
            max_credential_id_length,
            transports,
            algorithms,
            min_pin_length,
            remaining_discoverable_credentials,
            raw: response.clone(),
        })
    }

    /// Whether an option is present and set to `true`; absent options are
    /// treated as `false` per CTAP2.1 §6.4.
    pub fn option(&self, name: &str) -> bool {
        self.options.iter().any(|(k, v)| k == name && *v)
    }

    /// The raw decoded response map, for fields not surfaced above.
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

/// Caches the first `getInfo` result for a session's lifetime; callers may
/// force a refresh.
#[derive(Default)]
pub struct InfoCache {
    cached: Option<Info>,
}

impl InfoCache {
    pub fn new() -> Self {
        Self { cached: None }
    }

    pub fn get(&self) -> Option<&Info> {
        self.cached.as_ref()
    }

    pub fn set(&mut self, info: Info) {
        self.cached = Some(info);
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}
