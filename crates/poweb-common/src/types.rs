//! Protocol constants for the PoWeb binding.

/// Content type of a serialised parcel.
pub const PARCEL_CONTENT_TYPE: &str = "application/vnd.relaynet.parcel";
/// Content type of a pre-registration request body (hex SHA-256 digest).
pub const PRE_REGISTRATION_CONTENT_TYPE: &str = "application/vnd.relaynet.node-pre-registration";
/// Content type of a pre-registration authorization.
pub const REGISTRATION_AUTHORIZATION_CONTENT_TYPE: &str =
    "application/vnd.relaynet.node-registration.authorization";
/// Content type of a serialised node-registration request.
pub const REGISTRATION_REQUEST_CONTENT_TYPE: &str =
    "application/vnd.relaynet.node-registration.request";
/// Content type of a serialised node registration.
pub const REGISTRATION_CONTENT_TYPE: &str =
    "application/vnd.relaynet.node-registration.registration";

/// Request header selecting the parcel-collection streaming mode.
pub const STREAMING_MODE_HEADER: &str = "X-Relaynet-Streaming-Mode";
/// Streaming-mode header value: hold the connection open indefinitely.
pub const STREAMING_MODE_KEEP_ALIVE: &str = "keep-alive";
/// Streaming-mode header value: drain queued parcels, then close.
pub const STREAMING_MODE_CLOSE_UPON_COMPLETION: &str = "close-upon-completion";

/// Authorization scheme prefix for parcel-delivery countersignatures.
pub const COUNTERSIGNATURE_AUTH_PREFIX: &str = "Relaynet-Countersignature ";

/// Path prefix shared by every PoWeb endpoint.
pub const API_PREFIX: &str = "/v1";
/// Path of the parcel-collection WebSocket endpoint.
pub const PARCEL_COLLECTION_PATH: &str = "/v1/parcel-collection";

/// Default port of a local (loopback, plaintext) gateway.
pub const DEFAULT_LOCAL_PORT: u16 = 276;
/// Default port of a remote (TLS) gateway.
pub const DEFAULT_REMOTE_PORT: u16 = 443;
