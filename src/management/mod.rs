//! Authenticator management surfaces (CTAP2.1 §4.J): PIN/UV administration,
//! discoverable-credential housekeeping, authenticator configuration, and
//! biometric enrollment. Each is a thin set of methods on a `Ctap2Session`
//! that assemble a typed subcommand and delegate to `PinUvAuth` for the
//! token math: one method per operation, delegating to a typed command.

pub mod bio_enrollment;
pub mod client_pin;
pub mod config;
pub mod credential_management;

pub use bio_enrollment::BioEnrollment;
pub use client_pin::ClientPin;
pub use config::Config;
pub use credential_management::CredentialManagement;
