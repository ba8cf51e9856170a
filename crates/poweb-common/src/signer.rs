//! Detached Ed25519 signatures for the PoWeb handshake and parcel
//! countersignatures.
//!
//! A signature is computed over `purpose_tag ‖ payload` so a handshake
//! nonce signature can never be replayed as a parcel countersignature.
//! The envelope embeds the signer's certificate, which lets the
//! receiving side identify the signer without out-of-band state.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use thiserror::Error;

/// Length of a raw Ed25519 signature.
const SIGNATURE_LENGTH: usize = 64;

/// An X.509 certificate in DER form.
///
/// The PoWeb client never inspects certificates; they are carried as the
/// trust anchors attached to collected parcels and inside signature
/// envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    /// Wraps DER-encoded certificate bytes.
    #[must_use]
    pub fn from_der(der: Vec<u8>) -> Self {
        Self { der }
    }

    /// Returns the DER encoding.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Consumes the certificate, returning the DER encoding.
    #[must_use]
    pub fn into_der(self) -> Vec<u8> {
        self.der
    }
}

/// What a detached signature is being produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignaturePurpose {
    /// Proving possession of a private key during the collection handshake.
    Handshake,
    /// Countersigning a parcel for delivery to the gateway.
    ParcelDelivery,
}

impl SignaturePurpose {
    /// Returns the domain-separation tag prefixed to the signed payload.
    #[must_use]
    pub const fn tag(self) -> &'static [u8] {
        match self {
            Self::Handshake => b"poweb:handshake-nonce",
            Self::ParcelDelivery => b"poweb:parcel-delivery",
        }
    }
}

/// Errors that can occur when parsing a detached-signature envelope.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// The envelope length does not match its certificate-length prefix.
    #[error("signature envelope length mismatch")]
    Length {
        /// Expected byte count.
        expected: usize,
        /// Actual byte count received.
        actual: usize,
    },
}

/// A capability to sign nonces (and parcels) on behalf of one node.
///
/// The certificate is the trust anchor for any parcel the gateway
/// delivers under this signer.
#[derive(Clone)]
#[derive(Debug)]
pub struct NonceSigner {
    certificate: Certificate,
    signing_key: SigningKey,
}

impl NonceSigner {
    /// Binds a certificate to its private key.
    #[must_use]
    pub fn new(certificate: Certificate, signing_key: SigningKey) -> Self {
        Self {
            certificate,
            signing_key,
        }
    }

    /// Returns the certificate associated with this signer.
    #[must_use]
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Produces a detached-signature envelope over the payload.
    ///
    /// The envelope layout is `u16be cert_len ‖ cert_der ‖ signature`,
    /// where the signature covers `purpose_tag ‖ payload`. Ed25519 is
    /// deterministic: equal inputs yield byte-identical envelopes.
    ///
    /// # Examples
    ///
    /// ```
    /// use ed25519_dalek::SigningKey;
    /// use poweb_common::signer::{Certificate, NonceSigner, SignaturePurpose};
    ///
    /// let signer = NonceSigner::new(
    ///     Certificate::from_der(vec![0x30, 0x00]),
    ///     SigningKey::from_bytes(&[1u8; 32]),
    /// );
    /// let envelope = signer.sign(b"nonce", SignaturePurpose::Handshake);
    /// assert_eq!(envelope, signer.sign(b"nonce", SignaturePurpose::Handshake));
    /// ```
    #[must_use]
    pub fn sign(&self, payload: &[u8], purpose: SignaturePurpose) -> Vec<u8> {
        let mut message = Vec::with_capacity(purpose.tag().len() + payload.len());
        message.extend_from_slice(purpose.tag());
        message.extend_from_slice(payload);
        let signature = self.signing_key.sign(&message).to_bytes();

        let cert = self.certificate.der();
        let mut envelope = Vec::with_capacity(2 + cert.len() + SIGNATURE_LENGTH);
        envelope.extend_from_slice(&(cert.len() as u16).to_be_bytes());
        envelope.extend_from_slice(cert);
        envelope.extend_from_slice(&signature);
        envelope
    }
}

/// A parsed detached-signature envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedSignature {
    certificate: Certificate,
    signature: [u8; SIGNATURE_LENGTH],
}

impl DetachedSignature {
    /// Parses a detached-signature envelope.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::Length`] if the envelope is truncated or
    /// carries trailing bytes.
    pub fn parse(data: &[u8]) -> Result<Self, SignatureError> {
        if data.len() < 2 {
            return Err(SignatureError::Length {
                expected: 2,
                actual: data.len(),
            });
        }
        let cert_len = u16::from_be_bytes([data[0], data[1]]) as usize;
        let expected = 2 + cert_len + SIGNATURE_LENGTH;
        if data.len() != expected {
            return Err(SignatureError::Length {
                expected,
                actual: data.len(),
            });
        }
        let mut signature = [0u8; SIGNATURE_LENGTH];
        signature.copy_from_slice(&data[2 + cert_len..]);
        Ok(Self {
            certificate: Certificate::from_der(data[2..2 + cert_len].to_vec()),
            signature,
        })
    }

    /// Returns the certificate embedded in the envelope.
    #[must_use]
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Verifies the signature over `purpose_tag ‖ payload` against the
    /// given verifying key. Returns `true` if the signature is valid.
    #[must_use]
    pub fn verify(
        &self,
        payload: &[u8],
        purpose: SignaturePurpose,
        verifying_key: &VerifyingKey,
    ) -> bool {
        let mut message = Vec::with_capacity(purpose.tag().len() + payload.len());
        message.extend_from_slice(purpose.tag());
        message.extend_from_slice(payload);
        let signature = Signature::from_bytes(&self.signature);
        verifying_key.verify(&message, &signature).is_ok()
    }
}
