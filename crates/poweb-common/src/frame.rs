//! PoWeb collection-socket frame serialization and parsing.
//!
//! Each frame is a type-length-value (TLV) binary message sent over
//! WebSocket. The first byte identifies the frame type; remaining bytes
//! carry the payload. Parcel acknowledgements are NOT frames: they travel
//! as WebSocket TEXT messages carrying the raw delivery id.

use thiserror::Error;

/// CHALLENGE frame type: gateway → client, handshake nonce.
pub const TYPE_CHALLENGE: u8 = 0x01;
/// RESPONSE frame type: client → gateway, one nonce signature per signer.
pub const TYPE_RESPONSE: u8 = 0x02;
/// PARCEL DELIVERY frame type: gateway → client, one parcel with its
/// acknowledgement token.
pub const TYPE_PARCEL_DELIVERY: u8 = 0x03;

/// A parsed PoWeb collection frame.
///
/// Variants map 1:1 to wire frame types defined by `TYPE_*` constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Handshake challenge from the gateway.
    Challenge {
        /// Server-chosen nonce the client must sign.
        nonce: Vec<u8>,
    },
    /// Handshake response from the client.
    Response {
        /// Detached nonce signatures, one per signer, in signer order.
        signatures: Vec<Vec<u8>>,
    },
    /// A parcel pushed by the gateway.
    ParcelDelivery {
        /// Opaque token to echo back when acknowledging receipt.
        delivery_id: String,
        /// The serialised parcel; never interpreted by the client.
        parcel: Vec<u8>,
    },
}

/// Errors that can occur during frame parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The input byte slice was empty.
    #[error("frame is empty")]
    Empty,
    /// The frame is too short for the declared type.
    #[error("frame too short")]
    TooShort {
        /// Minimum expected byte count.
        expected: usize,
        /// Actual byte count received.
        actual: usize,
    },
    /// The first byte does not match any known frame type.
    #[error("unknown frame type")]
    UnknownType(u8),
    /// The delivery id is not valid UTF-8.
    #[error("delivery id is not valid UTF-8")]
    InvalidDeliveryId,
}

fn read_u16(data: &[u8], offset: usize) -> Result<usize, FrameError> {
    let end = offset + 2;
    if data.len() < end {
        return Err(FrameError::TooShort {
            expected: end,
            actual: data.len(),
        });
    }
    Ok(u16::from_be_bytes([data[offset], data[offset + 1]]) as usize)
}

impl Frame {
    /// Creates a `Challenge` frame carrying the given nonce.
    #[must_use]
    pub fn challenge(nonce: &[u8]) -> Self {
        Self::Challenge {
            nonce: nonce.to_vec(),
        }
    }

    /// Creates a `Response` frame from signatures in signer order.
    #[must_use]
    pub fn response(signatures: Vec<Vec<u8>>) -> Self {
        Self::Response { signatures }
    }

    /// Creates a `ParcelDelivery` frame.
    #[must_use]
    pub fn parcel_delivery(delivery_id: &str, parcel: &[u8]) -> Self {
        Self::ParcelDelivery {
            delivery_id: delivery_id.to_string(),
            parcel: parcel.to_vec(),
        }
    }

    /// Serializes this frame into a byte vector for WebSocket transmission.
    ///
    /// # Examples
    ///
    /// ```
    /// use poweb_common::frame::{Frame, TYPE_CHALLENGE};
    /// let bytes = Frame::challenge(b"nonce").serialize();
    /// assert_eq!(bytes[0], TYPE_CHALLENGE);
    /// ```
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Self::Challenge { nonce } => {
                let mut v = Vec::with_capacity(1 + nonce.len());
                v.push(TYPE_CHALLENGE);
                v.extend_from_slice(nonce);
                v
            }
            Self::Response { signatures } => {
                let total: usize = signatures.iter().map(|s| 2 + s.len()).sum();
                let mut v = Vec::with_capacity(3 + total);
                v.push(TYPE_RESPONSE);
                v.extend_from_slice(&(signatures.len() as u16).to_be_bytes());
                for signature in signatures {
                    v.extend_from_slice(&(signature.len() as u16).to_be_bytes());
                    v.extend_from_slice(signature);
                }
                v
            }
            Self::ParcelDelivery {
                delivery_id,
                parcel,
            } => {
                let id = delivery_id.as_bytes();
                let mut v = Vec::with_capacity(3 + id.len() + parcel.len());
                v.push(TYPE_PARCEL_DELIVERY);
                v.extend_from_slice(&(id.len() as u16).to_be_bytes());
                v.extend_from_slice(id);
                v.extend_from_slice(parcel);
                v
            }
        }
    }

    /// Parses a byte slice into a typed `Frame`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError`] if the data is empty, too short for the
    /// declared type, carries a non-UTF-8 delivery id, or has an
    /// unrecognized type byte.
    ///
    /// # Examples
    ///
    /// ```
    /// use poweb_common::frame::Frame;
    /// let frame = Frame::parcel_delivery("id", b"parcel");
    /// let parsed = Frame::parse(&frame.serialize()).unwrap();
    /// assert_eq!(frame, parsed);
    /// ```
    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        if data.is_empty() {
            return Err(FrameError::Empty);
        }
        match data[0] {
            TYPE_CHALLENGE => {
                if data.len() < 2 {
                    return Err(FrameError::TooShort {
                        expected: 2,
                        actual: data.len(),
                    });
                }
                Ok(Self::Challenge {
                    nonce: data[1..].to_vec(),
                })
            }
            TYPE_RESPONSE => {
                let count = read_u16(data, 1)?;
                let mut signatures = Vec::with_capacity(count);
                let mut offset = 3;
                for _ in 0..count {
                    let len = read_u16(data, offset)?;
                    offset += 2;
                    let end = offset + len;
                    if data.len() < end {
                        return Err(FrameError::TooShort {
                            expected: end,
                            actual: data.len(),
                        });
                    }
                    signatures.push(data[offset..end].to_vec());
                    offset = end;
                }
                Ok(Self::Response { signatures })
            }
            TYPE_PARCEL_DELIVERY => {
                let id_len = read_u16(data, 1)?;
                let end = 3 + id_len;
                if data.len() < end {
                    return Err(FrameError::TooShort {
                        expected: end,
                        actual: data.len(),
                    });
                }
                let delivery_id = std::str::from_utf8(&data[3..end])
                    .map_err(|_| FrameError::InvalidDeliveryId)?
                    .to_string();
                Ok(Self::ParcelDelivery {
                    delivery_id,
                    parcel: data[end..].to_vec(),
                })
            }
            t => Err(FrameError::UnknownType(t)),
        }
    }

    /// Returns the wire type byte for this frame.
    #[must_use]
    pub const fn frame_type(&self) -> u8 {
        match self {
            Self::Challenge { .. } => TYPE_CHALLENGE,
            Self::Response { .. } => TYPE_RESPONSE,
            Self::ParcelDelivery { .. } => TYPE_PARCEL_DELIVERY,
        }
    }
}
