//! Property tests for fingerprint derivation.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use relay_core::{EventFingerprint, IdempotencyStrategy};
use serde_json::json;

const SCOPE: &str = "/webhook/entry";

proptest! {
    /// An explicit key decides the fingerprint regardless of body.
    #[test]
    fn header_key_wins(
        key in "[a-zA-Z0-9_-]{1,40}",
        id in "evt_[a-z0-9]{1,12}",
        body in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let payload = json!({ "id": id });
        let fp = EventFingerprint::derive(SCOPE, Some(&key), &payload, &body);

        prop_assert_eq!(fp.strategy, IdempotencyStrategy::Header);
        prop_assert_eq!(fp.value, key);
        prop_assert_eq!(fp.scope, SCOPE);
    }

    /// Without a key, the provider id is used and the body is irrelevant.
    #[test]
    fn provider_id_ignores_body(
        id in "evt_[a-z0-9]{1,12}",
        a in prop::collection::vec(any::<u8>(), 0..256),
        b in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let payload = json!({ "id": id });
        let first = EventFingerprint::derive(SCOPE, None, &payload, &a);
        let second = EventFingerprint::derive(SCOPE, Some("   "), &payload, &b);

        prop_assert_eq!(first.strategy, IdempotencyStrategy::SourceId);
        prop_assert_eq!(first, second);
    }

    /// Content hashes are stable and distinguish differing bodies.
    #[test]
    fn content_hash_tracks_body(
        a in prop::collection::vec(any::<u8>(), 0..256),
        b in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let payload = json!({ "type": "user.created" });
        let fa = EventFingerprint::derive(SCOPE, None, &payload, &a);
        let fa_again = EventFingerprint::derive(SCOPE, None, &payload, &a);
        let fb = EventFingerprint::derive(SCOPE, None, &payload, &b);

        prop_assert_eq!(fa.strategy, IdempotencyStrategy::ContentHash);
        prop_assert_eq!(fa.value.len(), 64);
        prop_assert_eq!(&fa, &fa_again);
        prop_assert_eq!(a == b, fa == fb);
    }

    /// The same key under different ingest paths never collides.
    #[test]
    fn scope_separates_paths(key in "[a-z0-9]{1,20}") {
        let payload = json!({});
        let a = EventFingerprint::derive("/hooks/a", Some(&key), &payload, b"{}");
        let b = EventFingerprint::derive("/hooks/b", Some(&key), &payload, b"{}");

        prop_assert_ne!(a, b);
    }
}

#[test]
fn fingerprints_deduplicate_in_hash_set() {
    use std::collections::HashSet;

    let payload = json!({ "id": "evt_1" });
    let set: HashSet<EventFingerprint> = [
        EventFingerprint::derive(SCOPE, None, &payload, b"a"),
        EventFingerprint::derive(SCOPE, None, &payload, b"b"),
        EventFingerprint::derive(SCOPE, Some("evt_1"), &payload, b"a"),
    ]
    .into_iter()
    .collect();

    assert_eq!(set.len(), 2);
}
