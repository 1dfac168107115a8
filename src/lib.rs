//! Client-side core for two security-critical smart-card/authenticator
//! protocols:
//!
//! * GlobalPlatform Secure Channel Protocol (SCP03 / SCP11a/b/c), which
//!   establishes an authenticated, confidential session with a card's
//!   Security Domain.
//! * CTAP2 / WebAuthn, which drives credential creation, assertion,
//!   PIN/UV management and the CTAP2 extension pipeline against a FIDO
//!   authenticator.
//!
//! Transport (USB HID, CCID, NFC) is supplied by the caller through the
//! [`transport::Transport`] trait; this crate never opens a device itself.
//!
//! # Layout
//!
//! * [`tlv`], [`cbor`], [`cose`]: wire codecs.
//! * [`crypto`]: the crypto primitives façade.
//! * [`apdu`], [`ctaphid`], [`transport`]: command unit framing.
//! * [`scp`]: GlobalPlatform secure channel key material and session engine.
//! * [`ctap2`]: the CTAP2 session and its command set.
//! * [`pinuv`]: PIN/UV Auth Protocols v1 and v2.
//! * [`webauthn`]: the WebAuthn basic client (make-credential / get-assertion).
//! * [`extensions`]: the CTAP2 extension pipeline.
//! * [`management`]: credential/PIN/config/bio management surfaces.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

#[macro_use]
extern crate log;

#[macro_use]
mod macros;

pub mod apdu;
pub mod cbor;
pub mod cose;
pub mod crypto;
pub mod ctap2;
pub mod ctaphid;
pub mod error;
pub mod extensions;
pub mod management;
pub mod pinuv;
pub mod scp;
pub mod tlv;
pub mod transport;
pub mod webauthn;

pub use crate::{error::Error, transport::Transport};
