//! PoWeb client: the gateway-facing side of the Parcel-over-Web binding.
//!
//! The client registers private nodes, delivers parcels, and collects
//! parcels addressed to the nodes it represents. Collection is the core:
//! a long-lived WebSocket session with a signed handshake, an
//! acknowledgement loop, and keep-alive reconnection, surfaced to the
//! caller as a lazy [`futures_util::Stream`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Parcel collection over the gateway's WebSocket endpoint.
pub mod collection;
/// Gateway endpoint configuration.
pub mod config;
/// Error taxonomy and HTTP status mapping.
pub mod error;

mod client;
mod transport;

pub use client::PowebClient;
pub use collection::{ParcelCollection, ParcelCollectionStream, StreamingMode};
pub use config::GatewayConfig;
pub use error::PowebError;
