//! SCP key material: the static/session key bundles and the tagged
//! `ScpKeyParams` variant that selects SCP03 vs SCP11.
//!
//! Shaped like a static AES key bundle identified by a key id, generalized
//! to the SCP03/SCP11 split in the data model.

use crate::error::{Error, InvalidErrorKind, UnsupportedErrorKind};
use x509_cert::Certificate;
use zeroize::Zeroize;

/// Identifies a card key slot: key identifier + key version number.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct KeyRef {
    /// Key identifier
    pub kid: u8,
    /// Key version number
    pub kvn: u8,
}

impl KeyRef {
    /// Construct a new key reference
    pub fn new(kid: u8, kvn: u8) -> Self {
        Self { kid, kvn }
    }

    /// Encode as the 2-byte wire pair `kid || kvn`
    pub fn to_bytes(self) -> [u8; 2] {
        [self.kid, self.kvn]
    }
}

/// SCP11 key identifiers for the three supported variants
pub const SCP11A_KID: u8 = 0x11;
pub const SCP11B_KID: u8 = 0x13;
pub const SCP11C_KID: u8 = 0x15;

/// The three static AES-128 keys used by SCP03: ENC, MAC, and an optional
/// DEK (only needed when the session will import further keys).
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct StaticKeys {
    /// Static ENC key, used to derive S-ENC
    pub enc: [u8; 16],
    /// Static MAC key, used to derive S-MAC/S-RMAC
    pub mac: [u8; 16],
    /// Static DEK, used only for key import (optional)
    pub dek: Option<[u8; 16]>,
}

impl StaticKeys {
    /// Build a key set without a DEK
    pub fn new(enc: [u8; 16], mac: [u8; 16]) -> Self {
        Self {
            enc,
            mac,
            dek: None,
        }
    }

    /// Attach a DEK to an existing key set
    pub fn with_dek(mut self, dek: [u8; 16]) -> Self {
        self.dek = Some(dek);
        self
    }
}

/// The four session keys derived at the start of an SCP03/SCP11 session.
/// Never serialized; never outlive the `ScpSession` they were derived for.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SessionKeys {
    /// S-ENC: session encryption key
    pub s_enc: Vec<u8>,
    /// S-MAC: session command MAC key
    pub s_mac: Vec<u8>,
    /// S-RMAC: session response MAC key
    pub s_rmac: Vec<u8>,
    /// Session DEK, present only when the static key set had one (SCP03)
    /// or the handshake negotiated key-import capability (SCP11)
    pub dek: Option<Vec<u8>>,
}

/// Selects and parameterizes the secure channel protocol variant.
pub enum ScpKeyParams {
    /// SCP03: a static symmetric key set referenced by `key_ref`
    Scp03 {
        /// The card key slot this session authenticates against
        key_ref: KeyRef,
        /// The static AES keys shared with the card
        static_keys: StaticKeys,
    },
    /// SCP11 (a/b/c, selected by `key_ref.kid`): asymmetric key agreement,
    /// optionally backed by an off-card entity certificate chain.
    Scp11 {
        /// The card key slot; `kid` must be 0x11, 0x13, or 0x15
        key_ref: KeyRef,
        /// The card's static EC key agreement public key
        pk_sd_ecka: Vec<u8>,
        /// Off-card entity key reference (SCP11a/c only)
        oce_key_ref: Option<KeyRef>,
        /// Off-card entity static EC key agreement private key (SCP11a/c only)
        sk_oce_ecka: Option<Vec<u8>>,
        /// Certificate chain authenticating the off-card entity (SCP11a/c only)
        certificates: Vec<Certificate>,
    },
}

impl ScpKeyParams {
    /// The key reference this parameter set authenticates against
    pub fn key_ref(&self) -> KeyRef {
        match self {
            ScpKeyParams::Scp03 { key_ref, .. } => *key_ref,
            ScpKeyParams::Scp11 { key_ref, .. } => *key_ref,
        }
    }

    /// Validate the SCP11a/b/c invariants: for `kid == 0x13` (SCP11b) the
    /// off-card entity fields must all be absent; for `0x11`/`0x15`
    /// (SCP11a/c) they must all be present with a non-empty cert chain.
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            ScpKeyParams::Scp03 { .. } => Ok(()),
            ScpKeyParams::Scp11 {
                key_ref,
                oce_key_ref,
                sk_oce_ecka,
                certificates,
                ..
            } => match key_ref.kid {
                SCP11B_KID => {
                    if oce_key_ref.is_some() || sk_oce_ecka.is_some() || !certificates.is_empty() {
                        fail!(
                            InvalidErrorKind::Other(
                                "SCP11b must not carry an OCE key or certificate chain".into()
                            )
                        );
                    }
                    Ok(())
                }
                SCP11A_KID | SCP11C_KID => {
                    if oce_key_ref.is_none() || sk_oce_ecka.is_none() || certificates.is_empty() {
                        fail!(
                            InvalidErrorKind::Other(
                                "SCP11a/c requires an OCE key ref, private key, and non-empty certificate chain"
                                    .into()
                            )
                        );
                    }
                    Ok(())
                }
                other => fail!(
                    UnsupportedErrorKind::ScpKeyParams,
                    "unsupported SCP11 kid: 0x{other:02x}"
                ),
            },
        }
    }
}
