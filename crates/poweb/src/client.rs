//! PoWeb client facade: unary endpoints and parcel collection.

use base64::Engine as _;
use poweb_common::registration::{PrivateNodeRegistration, PrivateNodeRegistrationRequest};
use poweb_common::signer::{NonceSigner, SignaturePurpose};
use poweb_common::types::{
    COUNTERSIGNATURE_AUTH_PREFIX, PARCEL_CONTENT_TYPE, PRE_REGISTRATION_CONTENT_TYPE,
    REGISTRATION_AUTHORIZATION_CONTENT_TYPE, REGISTRATION_CONTENT_TYPE,
    REGISTRATION_REQUEST_CONTENT_TYPE,
};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::collection::{self, ParcelCollectionStream, StreamingMode};
use crate::config::GatewayConfig;
use crate::error::{check_response_status, PowebError};
use crate::transport::Transport;

/// A client for one PoWeb gateway.
///
/// The client owns its transport exclusively. Dropping the client (or
/// calling [`PowebClient::close`]) releases it; collection sessions each
/// own their own WebSocket and are unaffected by other sessions.
#[derive(Debug)]
pub struct PowebClient {
    transport: Option<Transport>,
}

impl PowebClient {
    /// Creates a client for the given gateway endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`PowebError::Config`] if the configuration fails
    /// validation.
    pub fn new(config: GatewayConfig) -> Result<Self, PowebError> {
        config.validate().map_err(PowebError::Config)?;
        Ok(Self {
            transport: Some(Transport::new(config)),
        })
    }

    /// Creates a client for the local gateway (loopback, no TLS).
    #[must_use]
    pub fn new_local() -> Self {
        Self {
            transport: Some(Transport::new(GatewayConfig::local())),
        }
    }

    /// Creates a client for a remote gateway (TLS on port 443).
    ///
    /// # Errors
    ///
    /// Returns [`PowebError::Config`] if the host is invalid.
    pub fn new_remote(host: impl Into<String>) -> Result<Self, PowebError> {
        Self::new(GatewayConfig::remote(host))
    }

    /// Releases the transport. Idempotent; any later operation fails with
    /// a connection error.
    pub fn close(&mut self) {
        self.transport = None;
    }

    fn transport(&self) -> Result<&Transport, PowebError> {
        self.transport
            .as_ref()
            .ok_or_else(|| PowebError::ServerConnection("Client is closed".to_string()))
    }

    /// Requests authorization to register a node with the given public
    /// key, pairing the key with the authorization the gateway returns.
    ///
    /// # Errors
    ///
    /// Fails with the shared error mapping of the unary endpoints; a
    /// response carrying the wrong content type is a
    /// [`PowebError::ServerBinding`].
    pub async fn pre_register_node(
        &self,
        node_public_key: &[u8],
    ) -> Result<PrivateNodeRegistrationRequest, PowebError> {
        let digest = hex::encode(Sha256::digest(node_public_key));
        let response = self
            .transport()?
            .post(
                "/pre-registrations",
                digest.into_bytes(),
                PRE_REGISTRATION_CONTENT_TYPE,
                None,
            )
            .await?;
        check_response_status(response.status())?;
        require_content_type(&response, REGISTRATION_AUTHORIZATION_CONTENT_TYPE)?;
        let authorization = read_body(response).await?;
        Ok(PrivateNodeRegistrationRequest::new(
            node_public_key.to_vec(),
            authorization,
        ))
    }

    /// Registers a node, submitting the opaque serialised registration
    /// request and returning the gateway's registration.
    ///
    /// # Errors
    ///
    /// Fails with the shared error mapping of the unary endpoints; an
    /// undecodable registration is a [`PowebError::ServerBinding`].
    pub async fn register_node(
        &self,
        registration_request: &[u8],
    ) -> Result<PrivateNodeRegistration, PowebError> {
        let response = self
            .transport()?
            .post(
                "/nodes",
                registration_request.to_vec(),
                REGISTRATION_REQUEST_CONTENT_TYPE,
                None,
            )
            .await?;
        check_response_status(response.status())?;
        require_content_type(&response, REGISTRATION_CONTENT_TYPE)?;
        let body = read_body(response).await?;
        PrivateNodeRegistration::parse(&body)
            .map_err(|_| PowebError::ServerBinding("Malformed registration received".to_string()))
    }

    /// Delivers a parcel addressed to another node, countersigned by the
    /// given signer.
    ///
    /// # Errors
    ///
    /// A 422 response is a [`PowebError::RejectedParcel`]; everything
    /// else follows the shared error mapping.
    pub async fn deliver_parcel(
        &self,
        parcel: &[u8],
        signer: &NonceSigner,
    ) -> Result<(), PowebError> {
        let countersignature = signer.sign(parcel, SignaturePurpose::ParcelDelivery);
        let authorization = format!(
            "{COUNTERSIGNATURE_AUTH_PREFIX}{}",
            base64::engine::general_purpose::STANDARD.encode(countersignature)
        );
        let response = self
            .transport()?
            .post(
                "/parcels",
                parcel.to_vec(),
                PARCEL_CONTENT_TYPE,
                Some(authorization),
            )
            .await?;
        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            return Err(PowebError::RejectedParcel);
        }
        check_response_status(response.status())?;
        debug!(size = parcel.len(), "parcel delivered");
        Ok(())
    }

    /// Collects parcels addressed to the nodes represented by `signers`.
    ///
    /// Returns a lazy stream: nothing is sent on the network until the
    /// stream is first polled. Every emitted collection carries the
    /// signers' certificates in call order, and must be acknowledged or
    /// dropped before the next one is observed. Dropping the stream
    /// cancels the session.
    ///
    /// # Errors
    ///
    /// Fails with [`PowebError::NonceSigner`] if `signers` is empty,
    /// before any transport activity.
    pub fn collect_parcels(
        &self,
        signers: Vec<NonceSigner>,
        streaming_mode: StreamingMode,
    ) -> Result<ParcelCollectionStream, PowebError> {
        let transport = self.transport()?.clone();
        collection::collect_parcels(transport, signers, streaming_mode)
    }
}

fn require_content_type(response: &reqwest::Response, expected: &str) -> Result<(), PowebError> {
    let received = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if received == expected {
        Ok(())
    } else {
        Err(PowebError::ServerBinding(format!(
            "Received unexpected content type ({received})"
        )))
    }
}

async fn read_body(response: reqwest::Response) -> Result<Vec<u8>, PowebError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| PowebError::ServerConnection(format!("Failed to read response body: {e}")))?;
    Ok(bytes.to_vec())
}
