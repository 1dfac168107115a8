//! GlobalPlatform Secure Channel Protocol (SCP03 / SCP11) key material and
//! session engine.

pub mod kdf;
pub mod keys;
pub mod session;

pub use keys::{KeyRef, ScpKeyParams, SessionKeys, StaticKeys};
pub use session::{ScpSession, ScpState};
