#![no_main]

//! Fuzz target for inbound signature verification.
//!
//! Splits the input into signature header, timestamp header and body and
//! checks that verification never panics and never accepts a signature that
//! was not computed with the secret.

use libfuzzer_sys::fuzz_target;
use relay_api::{crypto::compute_signature, SignatureVerifier, Verification};
use relay_core::InboundSecret;

const SECRET: &str = "fuzz-inbound-secret-0123456789abcdef";
const PATH: &str = "/webhook/entry";
const NOW: i64 = 1_700_000_000;

fuzz_target!(|data: &[u8]| {
    let Ok(secret) = InboundSecret::new(SECRET) else {
        return;
    };
    let verifier = SignatureVerifier::new(secret.clone(), 60);

    let mut parts = data.splitn(3, |b| *b == b'\n');
    let signature = parts.next().map(String::from_utf8_lossy);
    let timestamp = parts.next().map(String::from_utf8_lossy);
    let body = parts.next().unwrap_or_default();

    let verdict = verifier.verify(PATH, body, signature.as_deref(), timestamp.as_deref(), NOW);

    if verdict == Verification::Accept {
        let expected = compute_signature(&secret, PATH, body);
        let presented = signature.as_deref().unwrap_or_default().trim();
        let presented = presented.strip_prefix("sha256=").unwrap_or(presented);
        assert!(presented.eq_ignore_ascii_case(&expected), "accepted a foreign signature");
    }

    // The correct signature with a fuzzed timestamp is accepted only inside the window.
    let valid = compute_signature(&secret, PATH, body);
    let verdict = verifier.verify(PATH, body, Some(valid.as_str()), timestamp.as_deref(), NOW);
    if verdict == Verification::Accept {
        let ts: i64 = timestamp.as_deref().unwrap_or_default().trim().parse().unwrap_or(i64::MIN);
        assert!((NOW - 60..=NOW + 60).contains(&ts));
    }
});
