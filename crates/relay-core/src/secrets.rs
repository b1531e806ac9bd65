//! Trust-domain secrets.
//!
//! The relay holds two unrelated HMAC keys: one to authenticate events from
//! the provider and one to sign envelopes for the destination. Each has its
//! own type so a value from one domain cannot be passed where the other is
//! expected. Neither type can be compared with the other, and both redact
//! themselves in `Debug`.

use secrecy::{ExposeSecret, SecretString};

use crate::error::RelayError;

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

macro_rules! trust_secret {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(SecretString);

        impl $name {
            /// Wraps a secret, rejecting values shorter than
            /// [`MIN_SECRET_LEN`] bytes.
            ///
            /// # Errors
            ///
            /// Returns `RelayError::Configuration` if the secret is too short.
            pub fn new(secret: impl Into<String>) -> Result<Self, RelayError> {
                let secret: String = secret.into();
                if secret.len() < MIN_SECRET_LEN {
                    return Err(RelayError::Configuration {
                        message: format!(
                            "{} must be at least {MIN_SECRET_LEN} bytes, got {}",
                            $label,
                            secret.len()
                        ),
                    });
                }
                Ok(Self(SecretString::from(secret)))
            }

            /// Key material for HMAC computation.
            pub fn expose_bytes(&self) -> &[u8] {
                self.0.expose_secret().as_bytes()
            }
        }
    };
}

trust_secret!(
    /// Key used to verify events received from the provider.
    InboundSecret,
    "inbound secret"
);

trust_secret!(
    /// Key used to sign envelopes relayed to the destination.
    OutboundSecret,
    "outbound secret"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_secrets_rejected() {
        let err = InboundSecret::new("too-short").unwrap_err();
        assert_eq!(err.code(), "E3001");
        assert!(OutboundSecret::new("x".repeat(31)).is_err());
    }

    #[test]
    fn minimum_length_accepted() {
        let secret = OutboundSecret::new("k".repeat(MIN_SECRET_LEN)).unwrap();
        assert_eq!(secret.expose_bytes().len(), MIN_SECRET_LEN);
    }

    #[test]
    fn debug_output_is_redacted() {
        let secret = InboundSecret::new("s3cr3t-value-that-is-long-enough-123").unwrap();
        let rendered = format!("{secret:?}");
        assert!(!rendered.contains("s3cr3t"));
        assert!(rendered.contains("REDACTED"));
    }
}
