//! Outbound HMAC signing.
//!
//! The destination verifies `HMAC-SHA256(secret, timestamp + "." + body)`
//! where `body` is the exact compact JSON we send. The signature is plain
//! lowercase hex with no scheme prefix.

use bytes::Bytes;
use hmac::{Hmac, Mac};
use relay_core::{AdaptedEnvelope, OutboundSecret};
use sha2::Sha256;

use crate::error::{DeliveryError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Envelope serialized and signed, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    /// Compact JSON body that was signed.
    pub body: Bytes,
    /// Lowercase hex HMAC-SHA256.
    pub signature: String,
    /// Decimal Unix seconds used in the canonical message.
    pub timestamp: String,
}

/// Signs envelopes for the destination.
#[derive(Debug, Clone)]
pub struct OutboundSigner {
    secret: OutboundSecret,
}

impl OutboundSigner {
    /// Creates a signer holding the outbound secret.
    pub fn new(secret: OutboundSecret) -> Self {
        Self { secret }
    }

    /// Serializes and signs an envelope at `now` (Unix seconds).
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` if the envelope cannot be encoded.
    pub fn sign(&self, envelope: &AdaptedEnvelope, now: i64) -> Result<SignedEnvelope> {
        let body = serde_json::to_vec(envelope)
            .map_err(|e| DeliveryError::SerializationError { message: e.to_string() })?;
        let timestamp = now.to_string();
        let signature = sign_bytes(&self.secret, &timestamp, &body);

        Ok(SignedEnvelope { body: Bytes::from(body), signature, timestamp })
    }
}

/// Byte sequence the destination reconstructs and verifies.
pub fn canonical_message(timestamp: &str, body: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(timestamp.len() + 1 + body.len());
    message.extend_from_slice(timestamp.as_bytes());
    message.push(b'.');
    message.extend_from_slice(body);
    message
}

/// Hex HMAC over the canonical message for an already-serialized body.
pub fn sign_bytes(secret: &OutboundSecret, timestamp: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.expose_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC-SHA256 accepts any key length"));
    mac.update(&canonical_message(timestamp, body));
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use relay_core::EventId;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn secret() -> OutboundSecret {
        OutboundSecret::new("outbound-secret-0123456789abcdef0123").unwrap()
    }

    fn envelope() -> AdaptedEnvelope {
        AdaptedEnvelope {
            source: "webhook-gateway".into(),
            event_type: "user.created".into(),
            external_id: "evt_123".into(),
            payload: json!({"type": "user.created", "id": "evt_123"}),
            occurred_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            correlation_id: None,
            internal_event_id: EventId(Uuid::nil()),
        }
    }

    #[test]
    fn body_is_compact_json() {
        let signed = OutboundSigner::new(secret()).sign(&envelope(), 1_700_000_000).unwrap();
        let body = std::str::from_utf8(&signed.body).unwrap();

        assert!(!body.contains(": "));
        assert!(!body.contains('\n'));
        assert!(body.starts_with(r#"{"source":"webhook-gateway","event_type":"user.created""#));
    }

    #[test]
    fn signature_matches_independent_computation() {
        let signed = OutboundSigner::new(secret()).sign(&envelope(), 1_700_000_000).unwrap();

        let mut mac = HmacSha256::new_from_slice(secret().expose_bytes()).unwrap();
        mac.update(b"1700000000.");
        mac.update(&signed.body);
        let expected = hex::encode(mac.finalize().into_bytes());

        assert_eq!(signed.timestamp, "1700000000");
        assert_eq!(signed.signature, expected);
        assert!(!signed.signature.starts_with("sha256="));
        assert_eq!(signed.signature.len(), 64);
    }

    #[test]
    fn signing_is_deterministic() {
        let signer = OutboundSigner::new(secret());
        assert_eq!(signer.sign(&envelope(), 42).unwrap(), signer.sign(&envelope(), 42).unwrap());
        assert_ne!(
            signer.sign(&envelope(), 42).unwrap().signature,
            signer.sign(&envelope(), 43).unwrap().signature
        );
    }

    #[test]
    fn different_secrets_produce_different_signatures() {
        let other = OutboundSecret::new("another-outbound-secret-abcdefghijkl").unwrap();
        let a = OutboundSigner::new(secret()).sign(&envelope(), 1).unwrap();
        let b = OutboundSigner::new(other).sign(&envelope(), 1).unwrap();
        assert_ne!(a.signature, b.signature);
    }

    #[test]
    fn canonical_message_layout() {
        assert_eq!(canonical_message("123", b"{}"), b"123.{}".to_vec());
    }
}
