//! Domain models and strongly-typed identifiers.
//!
//! Covers the inbound event as received, the fingerprint used for replay
//! protection, the envelope relayed downstream, and the outcome record kept
//! for audit. Database encoding for identifiers and status enums lives next
//! to the types.

use std::{fmt, str::FromStr};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Internal identifier assigned to every accepted inbound event.
///
/// Generated after verification and deduplication succeed; it follows the
/// event into the relayed envelope and keys its outcome record.
///
/// # Example
///
/// ```
/// use relay_core::models::EventId;
/// let event_id = EventId::new();
/// println!("Relaying event: {}", event_id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for EventId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for EventId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for EventId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// A signed event exactly as it arrived over HTTP.
///
/// The body is kept as the raw received bytes; signature verification runs
/// over these bytes and nothing re-encodes them first.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Request path the event was posted to.
    pub path: String,
    /// Raw request body.
    pub body: Bytes,
    /// Declared `Content-Type`, if any.
    pub content_type: Option<String>,
    /// `X-Signature` header value (hex, optional `sha256=` prefix).
    pub signature: Option<String>,
    /// `X-Timestamp` header value (decimal Unix seconds).
    pub timestamp: Option<String>,
    /// `X-Idempotency-Key` header value.
    pub idempotency_key: Option<String>,
    /// `X-Correlation-Id` header value.
    pub correlation_id: Option<String>,
}

/// Source of the value used to deduplicate an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStrategy {
    /// Explicit `X-Idempotency-Key` header.
    Header,
    /// Provider's own `id` field in the payload.
    SourceId,
    /// SHA-256 of the raw body when neither of the above is present.
    ContentHash,
}

impl IdempotencyStrategy {
    /// Database and log representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::SourceId => "source_id",
            Self::ContentHash => "content_hash",
        }
    }
}

impl fmt::Display for IdempotencyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deduplication key of an inbound event, scoped to its ingest path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventFingerprint {
    /// Endpoint scope (the ingest path).
    pub scope: String,
    /// Fingerprint value.
    pub value: String,
    /// Where the value came from.
    pub strategy: IdempotencyStrategy,
}

impl EventFingerprint {
    /// Derives the fingerprint for an inbound event.
    ///
    /// An explicit idempotency key wins over the provider's `id` field; when
    /// neither is present the SHA-256 of the raw body is used.
    pub fn derive(
        scope: &str,
        idempotency_key: Option<&str>,
        payload: &serde_json::Value,
        raw_body: &[u8],
    ) -> Self {
        if let Some(key) = idempotency_key.map(str::trim).filter(|k| !k.is_empty()) {
            return Self::new(scope, key, IdempotencyStrategy::Header);
        }

        if let Some(id) = provider_event_id(payload) {
            return Self::new(scope, id, IdempotencyStrategy::SourceId);
        }

        let digest = hex::encode(Sha256::digest(raw_body));
        Self::new(scope, digest, IdempotencyStrategy::ContentHash)
    }

    fn new(scope: &str, value: impl Into<String>, strategy: IdempotencyStrategy) -> Self {
        Self { scope: scope.to_string(), value: value.into(), strategy }
    }
}

impl fmt::Display for EventFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.value)
    }
}

/// Extracts the provider's event identifier (`id`), accepting strings and
/// numbers.
pub fn provider_event_id(payload: &serde_json::Value) -> Option<String> {
    match payload.get("id")? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Event envelope relayed to the destination.
///
/// Field order is part of the outbound signature contract: the compact JSON
/// serialization of this struct is the signed body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptedEnvelope {
    /// Identifier of this relay as the event source.
    pub source: String,
    /// Provider event type, or a default.
    pub event_type: String,
    /// Provider event identifier, or the internal id.
    pub external_id: String,
    /// Original inbound payload, unmodified.
    pub payload: serde_json::Value,
    /// Adaptation time.
    #[serde(with = "iso8601_millis")]
    pub occurred_at: DateTime<Utc>,
    /// Correlation identifier propagated from the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Internal event identifier.
    pub internal_event_id: EventId,
}

mod iso8601_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Forwarding status kept in the outcome store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Accepted, not yet attempted.
    Received,
    /// At least one attempt made, no terminal result yet.
    Processing,
    /// Destination accepted the event.
    Success,
    /// Terminal failure or retries exhausted.
    Failed,
}

impl OutcomeStatus {
    /// Database and API representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Whether no further updates are expected.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutcomeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(Self::Received),
            "processing" => Ok(Self::Processing),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown outcome status: {other}")),
        }
    }
}

impl sqlx::Type<PgDb> for OutcomeStatus {
    fn type_info() -> PgTypeInfo {
        <str as sqlx::Type<PgDb>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <&str as sqlx::Type<PgDb>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for OutcomeStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        s.parse().map_err(Into::into)
    }
}

impl sqlx::Encode<'_, PgDb> for OutcomeStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <&str as sqlx::Encode<PgDb>>::encode_by_ref(&self.as_str(), buf)
    }
}

/// Durable per-event forwarding outcome, upserted by event id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OutcomeRecord {
    /// Internal event identifier.
    pub event_id: EventId,
    /// Current status.
    pub status: OutcomeStatus,
    /// Machine-readable failure code.
    pub error_code: Option<String>,
    /// Human-readable failure detail.
    pub error_message: Option<String>,
    /// Retries performed (attempts minus one).
    pub retry_count: i32,
    /// Last HTTP status observed from the destination.
    pub response_status: Option<i32>,
    /// Correlation identifier propagated from the sender.
    pub correlation_id: Option<String>,
    /// When this state was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl OutcomeRecord {
    /// Record for an event that has been accepted but not yet attempted.
    pub fn received(
        event_id: EventId,
        correlation_id: Option<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            status: OutcomeStatus::Received,
            error_code: None,
            error_message: None,
            retry_count: 0,
            response_status: None,
            correlation_id,
            recorded_at,
        }
    }
}
