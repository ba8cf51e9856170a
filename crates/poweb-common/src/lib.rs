//! Types shared between PoWeb clients and servers.
//!
//! This crate provides:
//! - Binary frame serialization and parsing for the parcel-collection
//!   socket ([`frame`])
//! - Detached Ed25519 nonce signatures and the signer capability
//!   ([`signer`])
//! - Node-registration message codecs ([`registration`])
//! - Protocol constants: content types, headers, paths ([`types`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod frame;
pub mod registration;
pub mod signer;
pub mod types;

pub use frame::{Frame, FrameError};
pub use registration::{MessageError, PrivateNodeRegistration, PrivateNodeRegistrationRequest};
pub use signer::{Certificate, DetachedSignature, NonceSigner, SignaturePurpose};
