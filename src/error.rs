//! Error types
//!
//! The taxonomy here collapses into a single sum type: callers match on
//! [`Error`] rather than juggling one error type per subsystem.

use thiserror::Error;

/// Errors produced by this crate
#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure. Non-recoverable for the current call; the session
    /// itself may continue to be used.
    #[error("I/O error: {0}")]
    Io(String),

    /// Malformed response, unexpected tag, bad MAC, bad padding, wrong key
    /// set, bad receipt. The session that raised this MUST be torn down.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolErrorKind),

    /// Authenticator-level CTAP2 error. The caller decides recovery.
    #[error("CTAP2 error: 0x{0:02x}")]
    Ctap(u8),

    /// Card-level status word. The caller decides recovery.
    #[error("card status word: 0x{0:04x}")]
    Apdu(u16),

    /// Invalid caller argument (bad PIN length, bad key type, too-long
    /// credential, ...).
    #[error("invalid argument: {0}")]
    Invalid(#[from] InvalidErrorKind),

    /// An explicit cancel or timeout.
    #[error("operation cancelled")]
    Cancelled,

    /// A negotiated feature is absent (extension not supported, PIN/UV
    /// protocol unavailable, ...).
    #[error("unsupported: {0}")]
    Unsupported(#[from] UnsupportedErrorKind),
}

/// Kinds of [`Error::Protocol`]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum ProtocolErrorKind {
    /// A TLV, CBOR, or COSE value did not parse as expected
    #[error("unexpected tag or malformed value")]
    UnexpectedTag,

    /// A response was truncated, oversized, or otherwise ill-formed
    #[error("malformed response")]
    MalformedResponse,

    /// SCP03 card cryptogram did not match the derived expectation
    #[error("wrong key set (cryptogram mismatch)")]
    WrongKeySet,

    /// SCP11 receipt did not verify
    #[error("bad receipt")]
    BadReceipt,

    /// Command or response MAC did not verify
    #[error("bad response MAC")]
    BadResponseMac,

    /// Padding removed during unwrap did not match the expected form
    #[error("bad padding")]
    BadPadding,

    /// A session operation was attempted outside of the state that permits it
    #[error("session is not in the required state")]
    WrongState,

    /// The SCP session's message counter has been exhausted
    #[error("session message counter exhausted")]
    CommandLimitExceeded,
}

/// Kinds of [`Error::Invalid`]
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum InvalidErrorKind {
    /// A PIN did not meet length requirements (4-63 code points, or exactly
    /// 64 bytes once padded)
    #[error("invalid PIN length")]
    PinLength,

    /// A key type or curve was not one of the supported combinations
    #[error("unsupported key type")]
    KeyType,

    /// A credential ID or other bounded field exceeded its maximum length
    #[error("value too long: {0}")]
    TooLong(String),

    /// A caller-supplied argument was otherwise malformed
    #[error("{0}")]
    Other(String),
}

/// Kinds of [`Error::Unsupported`]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum UnsupportedErrorKind {
    /// The requested CTAP2 extension is not supported by the authenticator
    #[error("extension not supported")]
    Extension,

    /// No PIN/UV auth protocol in common with the authenticator
    #[error("no common PIN/UV auth protocol")]
    PinUvAuthProtocol,

    /// The requested SCP key reference / parameter combination isn't valid
    #[error("unsupported SCP key parameters")]
    ScpKeyParams,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
