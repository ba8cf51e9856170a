//! HTTP and WebSocket transport against a single gateway.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::GatewayConfig;
use crate::error::PowebError;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Owns the HTTP client and WebSocket configuration for one gateway.
///
/// Cloning is cheap: the underlying connection pool is shared.
#[derive(Clone, Debug)]
pub(crate) struct Transport {
    http: reqwest::Client,
    config: GatewayConfig,
}

impl Transport {
    pub(crate) fn new(config: GatewayConfig) -> Self {
        Self {
            // Redirects must surface to the error mapper, not be followed.
            http: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("failed to build HTTP client"),
            config,
        }
    }

    pub(crate) fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Sends a POST to a unary endpoint, mapping connect-time failures.
    pub(crate) async fn post(
        &self,
        path: &str,
        body: Vec<u8>,
        content_type: &'static str,
        authorization: Option<String>,
    ) -> Result<reqwest::Response, PowebError> {
        let url = format!("{}{}", self.config.http_base_url(), path);
        let mut request = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, content_type)
            .body(body);
        if let Some(value) = authorization {
            request = request.header(AUTHORIZATION, value);
        }
        request
            .send()
            .await
            .map_err(|e| map_request_error(&e, &url))
    }

    /// Opens a WebSocket to the gateway with the given request headers.
    pub(crate) async fn ws_connect(
        &self,
        path: &str,
        headers: &[(&'static str, &'static str)],
    ) -> Result<WsStream, PowebError> {
        let url = self.config.ws_url(path);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| PowebError::ServerConnection(format!("Invalid WebSocket URL: {e}")))?;
        for (name, value) in headers {
            request
                .headers_mut()
                .insert(*name, value.parse().expect("valid header value"));
        }
        let (ws, _response) = connect_async(request)
            .await
            .map_err(|e| map_ws_connect_error(&e, &url))?;
        Ok(ws)
    }
}

fn map_request_error(err: &reqwest::Error, url: &str) -> PowebError {
    if source_chain_mentions_dns(err) {
        return PowebError::ServerConnection("Failed to resolve DNS".to_string());
    }
    if err.is_timeout() {
        return PowebError::ServerConnection(format!("Request to {url} timed out"));
    }
    if err.is_connect() {
        return PowebError::ServerConnection(format!("Failed to connect to {url}"));
    }
    PowebError::ServerConnection(format!("Failed to send request to {url}: {err}"))
}

fn map_ws_connect_error(err: &WsError, url: &str) -> PowebError {
    match err {
        WsError::Io(io) => {
            if source_chain_mentions_dns(io) {
                PowebError::ServerConnection("Failed to resolve DNS".to_string())
            } else {
                PowebError::ServerConnection(format!("Failed to connect to {url}"))
            }
        }
        WsError::Http(response) => PowebError::ServerConnection(format!(
            "WebSocket upgrade failed ({})",
            response.status().as_u16()
        )),
        other => PowebError::ServerConnection(format!("Failed to connect to {url}: {other}")),
    }
}

/// Resolver failures are reported differently per platform; the stable
/// signal is the wording somewhere in the source chain.
fn source_chain_mentions_dns(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        let message = e.to_string().to_ascii_lowercase();
        if message.contains("dns") || message.contains("failed to lookup address") {
            return true;
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns_detection_walks_the_source_chain() {
        let inner = std::io::Error::new(
            std::io::ErrorKind::Other,
            "failed to lookup address information: Name or service not known",
        );
        let outer = std::io::Error::new(std::io::ErrorKind::Other, inner);
        assert!(source_chain_mentions_dns(&outer));
    }

    #[test]
    fn connection_refused_is_not_dns() {
        let err = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        assert!(!source_chain_mentions_dns(&err));
    }

    #[test]
    fn ws_io_error_maps_to_connect_failure() {
        let err = WsError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        let mapped = map_ws_connect_error(&err, "ws://127.0.0.1:276/v1/parcel-collection");
        assert!(matches!(
            mapped,
            PowebError::ServerConnection(msg)
                if msg == "Failed to connect to ws://127.0.0.1:276/v1/parcel-collection"
        ));
    }
}
