//! Node-registration message codecs.
//!
//! Both messages are length-prefixed binary, like the collection frames:
//! the registration request travels as the `POST /nodes` body, and the
//! registration is parsed from the response.

use crate::signer::Certificate;
use thiserror::Error;

/// Errors that can occur when parsing a registration message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    /// The message is shorter than its length prefixes require.
    #[error("message too short")]
    TooShort {
        /// Minimum expected byte count.
        expected: usize,
        /// Actual byte count received.
        actual: usize,
    },
    /// The gateway address is not valid UTF-8.
    #[error("gateway address is not valid UTF-8")]
    InvalidAddress,
}

fn read_u16(data: &[u8], offset: usize) -> Result<usize, MessageError> {
    let end = offset + 2;
    if data.len() < end {
        return Err(MessageError::TooShort {
            expected: end,
            actual: data.len(),
        });
    }
    Ok(u16::from_be_bytes([data[offset], data[offset + 1]]) as usize)
}

fn read_block(data: &[u8], offset: usize) -> Result<(&[u8], usize), MessageError> {
    let len = read_u16(data, offset)?;
    let start = offset + 2;
    let end = start + len;
    if data.len() < end {
        return Err(MessageError::TooShort {
            expected: end,
            actual: data.len(),
        });
    }
    Ok((&data[start..end], end))
}

/// Request to register a private node, pairing its public key with the
/// authorization obtained from pre-registration.
///
/// Wire layout: `u16be pk_len ‖ public_key ‖ authorization`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateNodeRegistrationRequest {
    /// DER-encoded public key of the node being registered.
    pub node_public_key: Vec<u8>,
    /// Opaque authorization issued by the gateway at pre-registration.
    pub authorization: Vec<u8>,
}

impl PrivateNodeRegistrationRequest {
    /// Creates a registration request.
    #[must_use]
    pub fn new(node_public_key: Vec<u8>, authorization: Vec<u8>) -> Self {
        Self {
            node_public_key,
            authorization,
        }
    }

    /// Serializes the request for transmission.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(2 + self.node_public_key.len() + self.authorization.len());
        v.extend_from_slice(&(self.node_public_key.len() as u16).to_be_bytes());
        v.extend_from_slice(&self.node_public_key);
        v.extend_from_slice(&self.authorization);
        v
    }

    /// Parses a serialised registration request.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::TooShort`] on truncated input.
    pub fn parse(data: &[u8]) -> Result<Self, MessageError> {
        let (public_key, offset) = read_block(data, 0)?;
        Ok(Self {
            node_public_key: public_key.to_vec(),
            authorization: data[offset..].to_vec(),
        })
    }
}

/// A completed node registration issued by the gateway.
///
/// Wire layout: `u16be ‖ node_cert ‖ u16be ‖ gateway_cert ‖ address`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateNodeRegistration {
    /// Certificate issued to the newly registered node.
    pub node_certificate: Certificate,
    /// Certificate of the gateway that issued the registration.
    pub gateway_certificate: Certificate,
    /// Internet address of the gateway, e.g. `frankfurt.relaycorp.cloud`.
    pub internet_gateway_address: String,
}

impl PrivateNodeRegistration {
    /// Serializes the registration for transmission.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let node = self.node_certificate.der();
        let gateway = self.gateway_certificate.der();
        let address = self.internet_gateway_address.as_bytes();
        let mut v = Vec::with_capacity(4 + node.len() + gateway.len() + address.len());
        v.extend_from_slice(&(node.len() as u16).to_be_bytes());
        v.extend_from_slice(node);
        v.extend_from_slice(&(gateway.len() as u16).to_be_bytes());
        v.extend_from_slice(gateway);
        v.extend_from_slice(address);
        v
    }

    /// Parses a serialised registration.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError`] on truncated input or a non-UTF-8 gateway
    /// address.
    pub fn parse(data: &[u8]) -> Result<Self, MessageError> {
        let (node_cert, offset) = read_block(data, 0)?;
        let (gateway_cert, offset) = read_block(data, offset)?;
        let address = std::str::from_utf8(&data[offset..])
            .map_err(|_| MessageError::InvalidAddress)?
            .to_string();
        Ok(Self {
            node_certificate: Certificate::from_der(node_cert.to_vec()),
            gateway_certificate: Certificate::from_der(gateway_cert.to_vec()),
            internet_gateway_address: address,
        })
    }
}
