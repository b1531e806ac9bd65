//! HTTP client for forwarding signed envelopes to the destination.
//!
//! Sends exactly one request per call and reports what happened. Any HTTP
//! response, success or not, is returned as `Ok`; only transport failures
//! are errors. Retry decisions belong to the forwarder.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use relay_core::EventId;
use reqwest::{header::HeaderMap, Response};
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};

use crate::error::{DeliveryError, Result};

/// Response bodies longer than this are truncated before being kept.
const MAX_RESPONSE_BODY_SIZE: usize = 64 * 1024;

/// Size of the retained prefix when a body is truncated.
const MAX_AUDIT_SIZE: usize = 1024;

/// Configuration for the forwarding client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Timeout for a single HTTP request.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(30), user_agent: "Webhook-Relay/1.0".to_string() }
    }
}

/// One outbound request, fully prepared.
///
/// Built once per event and reused verbatim for every attempt.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    /// Event being forwarded.
    pub event_id: EventId,
    /// Destination URL.
    pub url: String,
    /// Compact JSON envelope, byte-identical to what was signed.
    pub body: Bytes,
    /// Hex signature without scheme prefix.
    pub signature: String,
    /// Unix seconds used in the signature.
    pub timestamp: String,
    /// Static device identifier.
    pub device_id: String,
    /// Bearer token for the destination, if configured.
    pub bearer_token: Option<String>,
    /// Correlation identifier, if known.
    pub correlation_id: Option<String>,
}

/// Response from one forwarding attempt.
#[derive(Debug, Clone)]
pub struct ForwardResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body, truncated if large.
    pub body: String,
    /// Parsed `Retry-After` seconds, if present.
    pub retry_after_seconds: Option<u64>,
    /// Round-trip time of the request.
    pub duration: Duration,
}

/// HTTP client for the destination.
///
/// Redirects are not followed: a 3xx answer counts as delivered and is
/// reported as is.
#[derive(Debug, Clone)]
pub struct ForwardingClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl ForwardingClient {
    /// Creates a new forwarding client.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a forwarding client with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Sends one attempt.
    ///
    /// `now` is the wall-clock time used to resolve an HTTP-date
    /// `Retry-After` into a delay.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` when the request exceeds the configured timeout and
    /// `NetworkError` for every other transport failure. HTTP error statuses
    /// are not errors here.
    pub async fn send(
        &self,
        request: &ForwardRequest,
        attempt: u32,
        now: DateTime<Utc>,
    ) -> Result<ForwardResponse> {
        let start_time = std::time::Instant::now();

        let span = info_span!(
            "forward_attempt",
            event_id = %request.event_id,
            url = %request.url,
            attempt
        );

        async move {
            tracing::debug!("sending envelope");

            let mut http_request = self
                .client
                .post(&request.url)
                .header("Content-Type", "application/json")
                .header("X-Signature", &request.signature)
                .header("X-Timestamp", &request.timestamp)
                .header("X-Device-ID", &request.device_id)
                .body(request.body.clone());

            if let Some(token) = &request.bearer_token {
                http_request = http_request.bearer_auth(token);
            }
            if let Some(correlation_id) = &request.correlation_id {
                http_request = http_request.header("X-Correlation-Id", correlation_id);
            }

            let response = match http_request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let duration = start_time.elapsed();
                    tracing::warn!(duration_ms = duration.as_millis(), "request failed: {}", e);

                    if e.is_timeout() {
                        return Err(DeliveryError::timeout(self.config.timeout.as_secs()));
                    }
                    if e.is_connect() {
                        return Err(DeliveryError::network(format!("connection failed: {e}")));
                    }
                    return Err(DeliveryError::network(e.to_string()));
                },
            };

            let forward_response = read_response(response, start_time.elapsed(), now).await;

            tracing::debug!(
                status = forward_response.status_code,
                duration_ms = forward_response.duration.as_millis(),
                "received response"
            );

            Ok(forward_response)
        }
        .instrument(span)
        .await
    }
}

async fn read_response(response: Response, duration: Duration, now: DateTime<Utc>) -> ForwardResponse {
    let status_code = response.status().as_u16();
    let retry_after_seconds = extract_retry_after_seconds(response.headers(), now);

    let body = match response.bytes().await {
        Ok(bytes) if bytes.len() > MAX_RESPONSE_BODY_SIZE => {
            let suffix = "... (truncated)";
            let truncated = String::from_utf8_lossy(&bytes[..MAX_AUDIT_SIZE - suffix.len()]);
            format!("{truncated}{suffix}")
        },
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::warn!("failed to read response body: {}", e);
            format!("[failed to read response body: {e}]")
        },
    };

    ForwardResponse { status_code, body, retry_after_seconds, duration }
}

/// Extracts a `Retry-After` delay in seconds.
///
/// Accepts delta-seconds and HTTP-date forms; a date is measured from `now`
/// and a date already past yields zero. Unparseable values yield `None` so
/// the regular backoff applies.
pub fn extract_retry_after_seconds(headers: &HeaderMap, now: DateTime<Utc>) -> Option<u64> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(seconds);
    }

    let date_time = chrono::DateTime::parse_from_rfc2822(raw).ok()?;
    let remaining = date_time.with_timezone(&Utc) - now;
    Some(remaining.to_std().map(|d| d.as_secs()).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn create_test_request(url: String) -> ForwardRequest {
        ForwardRequest {
            event_id: EventId::new(),
            url,
            body: Bytes::from_static(br#"{"source":"webhook-gateway"}"#),
            signature: "ab".repeat(32),
            timestamp: "1700000000".to_string(),
            device_id: "relay-01".to_string(),
            bearer_token: Some("dest-token".to_string()),
            correlation_id: Some("corr-1".to_string()),
        }
    }

    #[tokio::test]
    async fn successful_forward() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/events"))
            .respond_with(ResponseTemplate::new(201).set_body_string("created"))
            .mount(&mock_server)
            .await;

        let client = ForwardingClient::with_defaults().unwrap();
        let request = create_test_request(format!("{}/events", mock_server.uri()));

        let response = client.send(&request, 1, Utc::now()).await.unwrap();
        assert_eq!(response.status_code, 201);
        assert_eq!(response.body, "created");
    }

    #[tokio::test]
    async fn outbound_headers_set() {
        let mock_server = MockServer::start().await;
        let request = create_test_request(format!("{}/events", mock_server.uri()));

        Mock::given(matchers::method("POST"))
            .and(matchers::header("Content-Type", "application/json"))
            .and(matchers::header("X-Signature", request.signature.as_str()))
            .and(matchers::header("X-Timestamp", "1700000000"))
            .and(matchers::header("X-Device-ID", "relay-01"))
            .and(matchers::header("Authorization", "Bearer dest-token"))
            .and(matchers::header("X-Correlation-Id", "corr-1"))
            .and(matchers::body_bytes(request.body.to_vec()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = ForwardingClient::with_defaults().unwrap();
        let response = client.send(&request, 1, Utc::now()).await.unwrap();
        assert_eq!(response.status_code, 200);
    }

    #[tokio::test]
    async fn optional_headers_omitted() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let mut request = create_test_request(format!("{}/events", mock_server.uri()));
        request.bearer_token = None;
        request.correlation_id = None;

        let client = ForwardingClient::with_defaults().unwrap();
        client.send(&request, 1, Utc::now()).await.unwrap();

        let received = mock_server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].headers.get("authorization").is_none());
        assert!(received[0].headers.get("x-correlation-id").is_none());
    }

    #[tokio::test]
    async fn error_status_is_reported_not_raised() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&mock_server)
            .await;

        let client = ForwardingClient::with_defaults().unwrap();
        let request = create_test_request(format!("{}/events", mock_server.uri()));

        let response = client.send(&request, 1, Utc::now()).await.unwrap();
        assert_eq!(response.status_code, 503);
        assert_eq!(response.body, "unavailable");
    }

    #[tokio::test]
    async fn redirects_not_followed() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/events"))
            .respond_with(
                ResponseTemplate::new(302)
                    .append_header("Location", format!("{}/elsewhere", mock_server.uri())),
            )
            .mount(&mock_server)
            .await;

        let client = ForwardingClient::with_defaults().unwrap();
        let request = create_test_request(format!("{}/events", mock_server.uri()));

        let response = client.send(&request, 1, Utc::now()).await.unwrap();
        assert_eq!(response.status_code, 302);
        assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "120"))
            .mount(&mock_server)
            .await;

        let client = ForwardingClient::with_defaults().unwrap();
        let request = create_test_request(format!("{}/events", mock_server.uri()));

        let response = client.send(&request, 1, Utc::now()).await.unwrap();
        assert_eq!(response.status_code, 429);
        assert_eq!(response.retry_after_seconds, Some(120));
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        let client = ForwardingClient::with_defaults().unwrap();
        let request = create_test_request("http://127.0.0.1:1/events".to_string());

        let err = client.send(&request, 1, Utc::now()).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.error_code(), "network_error");
    }

    #[test]
    fn retry_after_parsing() {
        let now = DateTime::parse_from_rfc3339("2015-10-21T07:27:00Z").unwrap().with_timezone(&Utc);
        let mut headers = HeaderMap::new();
        assert_eq!(extract_retry_after_seconds(&headers, now), None);

        headers.insert("retry-after", HeaderValue::from_static("30"));
        assert_eq!(extract_retry_after_seconds(&headers, now), Some(30));

        headers.insert("retry-after", HeaderValue::from_static("soon"));
        assert_eq!(extract_retry_after_seconds(&headers, now), None);
    }

    #[test]
    fn retry_after_date_is_measured_from_given_time() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));

        let before = DateTime::parse_from_rfc3339("2015-10-21T07:27:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(extract_retry_after_seconds(&headers, before), Some(60));

        let after = DateTime::parse_from_rfc3339("2015-10-21T08:00:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(extract_retry_after_seconds(&headers, after), Some(0));
    }
}
