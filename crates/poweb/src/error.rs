use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced by the PoWeb client.
///
/// The first two variants are server-or-connectivity faults; callers that
/// only care about that distinction can branch on
/// [`PowebError::is_server_fault`].
#[derive(Debug, Error)]
pub enum PowebError {
    /// Transient connectivity failure or server-side outage; retrying
    /// later may succeed.
    #[error("{0}")]
    ServerConnection(String),
    /// The server violated the PoWeb binding (undecodable message,
    /// unexpected redirect, wrong content type); retrying is unlikely to
    /// help.
    #[error("{0}")]
    ServerBinding(String),
    /// The server rejected the request as a protocol violation by this
    /// client.
    #[error("the server refused the request (HTTP {status})")]
    ClientBinding {
        /// The HTTP status code of the refusal.
        status: u16,
    },
    /// The server refused to accept a specific parcel.
    #[error("The server rejected the parcel")]
    RejectedParcel,
    /// A local precondition on the nonce signers was violated.
    #[error("{0}")]
    NonceSigner(&'static str),
    /// The gateway endpoint configuration is invalid.
    #[error("Invalid gateway configuration: {0}")]
    Config(String),
}

impl PowebError {
    /// Returns `true` for faults attributable to the server or the
    /// connection to it, as opposed to this client or its input.
    #[must_use]
    pub fn is_server_fault(&self) -> bool {
        matches!(self, Self::ServerConnection(_) | Self::ServerBinding(_))
    }
}

/// Maps a unary-endpoint response status to the taxonomy.
///
/// Redirects are server faults here: the transport never follows them,
/// and no PoWeb endpoint legitimately redirects.
pub(crate) fn check_response_status(status: StatusCode) -> Result<(), PowebError> {
    if status.is_redirection() {
        return Err(PowebError::ServerBinding(format!(
            "Unexpected redirect ({})",
            status.as_u16()
        )));
    }
    if status.is_client_error() {
        return Err(PowebError::ClientBinding {
            status: status.as_u16(),
        });
    }
    if status.is_server_error() {
        return Err(PowebError::ServerConnection(format!(
            "The server reported an internal error ({})",
            status.as_u16()
        )));
    }
    Ok(())
}
