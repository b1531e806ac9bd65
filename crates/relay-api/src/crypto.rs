//! Inbound signature verification.
//!
//! Providers sign `path + "\n" + body` with HMAC-SHA256 and send the hex
//! digest in `X-Signature` (optionally prefixed `sha256=`) together with the
//! Unix timestamp in `X-Timestamp`. Verification is a pure function of the
//! request, the inbound secret and the current time.

use std::fmt;

use hmac::{Hmac, Mac};
use relay_core::{InboundSecret, RelayError};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::VerifierConfig;

type HmacSha256 = Hmac<Sha256>;

/// Accepted clock skew between sender and relay, in seconds.
pub const DEFAULT_TOLERANCE_SECONDS: i64 = 60;

/// Why a request failed authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// `X-Signature` absent or empty.
    MissingSignature,
    /// `X-Timestamp` absent or empty.
    MissingTimestamp,
    /// Signature does not match the canonical message.
    InvalidSignature,
    /// Timestamp unparseable or outside the tolerance window.
    TimestampOutOfWindow,
}

impl RejectReason {
    /// Machine-readable reason returned to the sender.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MissingSignature => "missing_signature",
            Self::MissingTimestamp => "missing_timestamp",
            Self::InvalidSignature => "invalid_signature",
            Self::TimestampOutOfWindow => "timestamp_out_of_window",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RejectReason> for RelayError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::MissingSignature => Self::MissingSignature,
            RejectReason::MissingTimestamp => Self::MissingTimestamp,
            RejectReason::InvalidSignature => Self::InvalidSignature,
            RejectReason::TimestampOutOfWindow => Self::TimestampOutOfWindow,
        }
    }
}

/// Outcome of verifying one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Signature and timestamp are valid.
    Accept,
    /// Request must be rejected.
    Reject(RejectReason),
}

impl Verification {
    /// Whether the request was accepted.
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Verifies inbound requests against the inbound secret.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    secret: InboundSecret,
    tolerance_seconds: i64,
}

impl SignatureVerifier {
    /// Creates a verifier with the given tolerance window.
    pub fn new(secret: InboundSecret, tolerance_seconds: i64) -> Self {
        Self { secret, tolerance_seconds: tolerance_seconds.abs() }
    }

    /// Creates a verifier from configuration.
    pub fn from_config(config: &VerifierConfig) -> Self {
        Self::new(config.secret.clone(), config.tolerance_seconds)
    }

    /// Tolerance window in seconds.
    pub fn tolerance_seconds(&self) -> i64 {
        self.tolerance_seconds
    }

    /// Verifies one request at `now` (Unix seconds).
    ///
    /// Checks run in a fixed order: signature present, timestamp present,
    /// timestamp within `now ± tolerance` (inclusive), signature matches.
    /// A stale timestamp is rejected even when the signature is valid.
    pub fn verify(
        &self,
        path: &str,
        body: &[u8],
        signature: Option<&str>,
        timestamp: Option<&str>,
        now: i64,
    ) -> Verification {
        let Some(signature) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
            return Verification::Reject(RejectReason::MissingSignature);
        };
        let Some(timestamp) = timestamp.map(str::trim).filter(|t| !t.is_empty()) else {
            return Verification::Reject(RejectReason::MissingTimestamp);
        };

        let Ok(sent_at) = timestamp.parse::<i64>() else {
            return Verification::Reject(RejectReason::TimestampOutOfWindow);
        };
        if now.abs_diff(sent_at) > self.tolerance_seconds.unsigned_abs() {
            return Verification::Reject(RejectReason::TimestampOutOfWindow);
        }

        let hex_signature = signature.strip_prefix("sha256=").unwrap_or(signature);
        let Ok(received) = hex::decode(hex_signature) else {
            return Verification::Reject(RejectReason::InvalidSignature);
        };

        let expected = compute_mac(&self.secret, path, body);
        if bool::from(expected.as_slice().ct_eq(received.as_slice())) {
            Verification::Accept
        } else {
            Verification::Reject(RejectReason::InvalidSignature)
        }
    }
}

/// Byte sequence the provider signs: `path`, a newline, then the raw body.
pub fn canonical_message(path: &str, body: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(path.len() + 1 + body.len());
    message.extend_from_slice(path.as_bytes());
    message.push(b'\n');
    message.extend_from_slice(body);
    message
}

/// Hex HMAC-SHA256 a provider would send for `path` and `body`.
pub fn compute_signature(secret: &InboundSecret, path: &str, body: &[u8]) -> String {
    hex::encode(compute_mac(secret, path, body))
}

fn compute_mac(secret: &InboundSecret, path: &str, body: &[u8]) -> Vec<u8> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.expose_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC-SHA256 accepts any key length"));
    mac.update(&canonical_message(path, body));
    mac.finalize().into_bytes().to_vec()
}
