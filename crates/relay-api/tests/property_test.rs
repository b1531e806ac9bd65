//! Property-based tests for inbound signature verification.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use proptest::{prelude::*, test_runner::Config as ProptestConfig};
use relay_api::{
    crypto::{compute_signature, DEFAULT_TOLERANCE_SECONDS},
    RejectReason, SignatureVerifier, Verification,
};
use relay_core::InboundSecret;

const NOW: i64 = 1_700_000_000;

/// Case count from `PROPTEST_CASES`, falling back to a CI or dev default.
fn proptest_config() -> ProptestConfig {
    let is_ci = std::env::var("CI").unwrap_or_default() == "true";
    let default_cases = if is_ci { 256 } else { 64 };

    let cases =
        std::env::var("PROPTEST_CASES").ok().and_then(|s| s.parse().ok()).unwrap_or(default_cases);

    ProptestConfig::with_cases(cases)
}

fn secret_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9]{32,64}"
}

fn path_strategy() -> impl Strategy<Value = String> {
    "/[a-z/]{0,24}"
}

fn body_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

fn verify(secret: &str, path: &str, body: &[u8], signature: &str, timestamp: i64) -> Verification {
    let verifier = SignatureVerifier::new(InboundSecret::new(secret).unwrap(), DEFAULT_TOLERANCE_SECONDS);
    verifier.verify(path, body, Some(signature), Some(timestamp.to_string().as_str()), NOW)
}

proptest! {
    #![proptest_config(proptest_config())]

    /// Signatures made with the shared secret verify anywhere in the window.
    #[test]
    fn own_signature_accepted_within_window(
        secret in secret_strategy(),
        path in path_strategy(),
        body in body_strategy(),
        offset in -DEFAULT_TOLERANCE_SECONDS..=DEFAULT_TOLERANCE_SECONDS,
    ) {
        let signature = compute_signature(&InboundSecret::new(secret.as_str()).unwrap(), &path, &body);
        prop_assert_eq!(verify(&secret, &path, &body, &signature, NOW + offset), Verification::Accept);
    }

    /// Altering any single body byte invalidates the signature.
    #[test]
    fn altered_body_byte_rejected(
        secret in secret_strategy(),
        path in path_strategy(),
        body in prop::collection::vec(any::<u8>(), 1..512),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let signature = compute_signature(&InboundSecret::new(secret.as_str()).unwrap(), &path, &body);

        let mut altered = body.clone();
        let i = index.index(altered.len());
        altered[i] ^= flip;

        prop_assert_eq!(
            verify(&secret, &path, &altered, &signature, NOW),
            Verification::Reject(RejectReason::InvalidSignature)
        );
    }

    /// Altering any single path byte invalidates the signature.
    #[test]
    fn altered_path_byte_rejected(
        secret in secret_strategy(),
        path in path_strategy(),
        body in body_strategy(),
        index in any::<prop::sample::Index>(),
    ) {
        let signature = compute_signature(&InboundSecret::new(secret.as_str()).unwrap(), &path, &body);

        let mut altered = path.clone().into_bytes();
        let i = index.index(altered.len());
        altered[i] ^= 0x01;
        let altered = String::from_utf8(altered).unwrap();

        prop_assert_eq!(
            verify(&secret, &altered, &body, &signature, NOW),
            Verification::Reject(RejectReason::InvalidSignature)
        );
    }

    /// A signature made under one secret never verifies under another.
    #[test]
    fn different_secret_rejected(
        signing_secret in secret_strategy(),
        verifying_secret in secret_strategy(),
        path in path_strategy(),
        body in body_strategy(),
    ) {
        prop_assume!(signing_secret != verifying_secret);

        let signature =
            compute_signature(&InboundSecret::new(signing_secret.as_str()).unwrap(), &path, &body);

        prop_assert_eq!(
            verify(&verifying_secret, &path, &body, &signature, NOW),
            Verification::Reject(RejectReason::InvalidSignature)
        );
    }

    /// One second past the window is rejected even with a valid signature.
    #[test]
    fn one_second_outside_window_rejected(
        secret in secret_strategy(),
        path in path_strategy(),
        body in body_strategy(),
        past in any::<bool>(),
    ) {
        let signature = compute_signature(&InboundSecret::new(secret.as_str()).unwrap(), &path, &body);
        let offset = DEFAULT_TOLERANCE_SECONDS + 1;
        let timestamp = if past { NOW - offset } else { NOW + offset };

        prop_assert_eq!(
            verify(&secret, &path, &body, &signature, timestamp),
            Verification::Reject(RejectReason::TimestampOutOfWindow)
        );
    }
}
