//! Webhook transport: HTTP POST of the signed envelope.

use crate::transports::{DeliveryRequest, DeliveryResult, TransportAdapter};
use crate::utils::truncate::truncate_chars;
use async_trait::async_trait;
use grcev_sdk::signature;
use std::time::Instant;

/// Captured response bodies are bounded so a chatty subscriber cannot
/// bloat the delivery log.
const MAX_RESPONSE_BODY_CHARS: usize = 2000;

/// Fallback timeout baked into the client; per-request timeouts from the
/// [`DeliveryRequest`] override it.
const CLIENT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Delivers envelopes to subscriber endpoints over HTTP POST.
///
/// Success is any 2xx status. Everything else — non-2xx, connect errors,
/// timeouts, a missing or unparseable endpoint — is captured into the
/// result; the transport never fails out of band.
pub struct WebhookTransport {
    client: reqwest::Client,
    signing_key: Option<Box<[u8]>>,
}

impl WebhookTransport {
    /// Create a transport; with a signing key, every body is signed and
    /// the signature travels in the `Grcev-Signature` header.
    pub fn new(signing_key: Option<Box<[u8]>>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(CLIENT_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            signing_key,
        }
    }
}

#[async_trait]
impl TransportAdapter for WebhookTransport {
    async fn deliver(&self, request: &DeliveryRequest) -> DeliveryResult {
        // Configuration failures short-circuit without a network call.
        let Some(endpoint) = request.endpoint.as_deref() else {
            return DeliveryResult::failed("webhook endpoint is not configured", 0);
        };
        let url = match url::Url::parse(endpoint) {
            Ok(url) => url,
            Err(e) => {
                return DeliveryResult::failed(
                    format!("invalid webhook endpoint {endpoint}: {e}"),
                    0,
                );
            }
        };
        let body = match serde_json::to_string(&request.envelope) {
            Ok(body) => body,
            Err(e) => {
                return DeliveryResult::failed(format!("envelope serialization error: {e}"), 0);
            }
        };

        let mut http_request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .timeout(request.timeout);

        if let Some(key) = &self.signing_key {
            http_request = http_request.header(
                signature::SIGNATURE_HEADER,
                signature::sign_body(&body, key),
            );
        }

        let started = Instant::now();
        match http_request.body(body).send().await {
            Ok(response) => {
                let status = response.status();
                let latency_ms = elapsed_ms(started);
                let response_body = response.text().await.unwrap_or_default();
                let response_body =
                    truncate_chars(&response_body, MAX_RESPONSE_BODY_CHARS).to_owned();

                if status.is_success() {
                    DeliveryResult {
                        success: true,
                        http_status_code: Some(i32::from(status.as_u16())),
                        response_body: Some(response_body),
                        error_message: None,
                        latency_ms,
                    }
                } else {
                    DeliveryResult {
                        success: false,
                        http_status_code: Some(i32::from(status.as_u16())),
                        response_body: Some(response_body),
                        error_message: Some(format!(
                            "webhook returned HTTP {}",
                            status.as_u16()
                        )),
                        latency_ms,
                    }
                }
            }
            // Timeouts land here too and follow the normal retry path.
            Err(e) => DeliveryResult::failed(
                format!("HTTP request failed: {e}"),
                elapsed_ms(started),
            ),
        }
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_event, webhook_subscription};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    fn request_to(endpoint: Option<&str>) -> DeliveryRequest {
        let event = sample_event();
        let subscription = webhook_subscription(3);
        DeliveryRequest {
            endpoint: endpoint.map(str::to_owned),
            envelope: grcev_sdk::objects::WebhookEnvelope {
                event_id: event.id,
                event_type: event.event_type,
                object_type: event.object_type,
                object_id: event.object_id,
                payload: serde_json::json!({"control_id": 7}),
                occurred_at: event.occurred_at,
                schema_version: event.schema_version,
            },
            subscription_code: subscription.subscription_code,
            timeout: Duration::from_secs(5),
        }
    }

    /// Accept one connection, read the request headers, send a canned
    /// response, and report the raw request text back.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, oneshot::Receiver<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (request_tx, request_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                if request_complete(&raw) {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
            let _ = request_tx.send(String::from_utf8_lossy(&raw).into_owned());
        });

        (format!("http://{addr}/hooks/grc"), request_rx)
    }

    /// True once the raw bytes hold the full headers plus a body of the
    /// advertised content-length.
    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some((headers, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let content_length: usize = headers
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse().ok())?
            })
            .unwrap_or(0);
        body.len() >= content_length
    }

    #[tokio::test]
    async fn missing_endpoint_fails_without_a_network_call() {
        let transport = WebhookTransport::new(None);
        let result = transport.deliver(&request_to(None)).await;
        assert!(!result.success);
        assert!(result.http_status_code.is_none());
        assert!(result.error_message.unwrap().contains("endpoint"));
    }

    #[tokio::test]
    async fn unparseable_endpoint_fails_without_a_network_call() {
        let transport = WebhookTransport::new(None);
        let result = transport.deliver(&request_to(Some("not a url"))).await;
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("invalid webhook endpoint"));
    }

    #[tokio::test]
    async fn two_hundred_response_is_delivered() {
        let (endpoint, _request_rx) = serve_once("200 OK", "ok").await;
        let transport = WebhookTransport::new(None);
        let result = transport.deliver(&request_to(Some(&endpoint))).await;
        assert!(result.success);
        assert_eq!(result.http_status_code, Some(200));
        assert_eq!(result.response_body.as_deref(), Some("ok"));
        assert!(result.error_message.is_none());
    }

    #[tokio::test]
    async fn five_hundred_response_is_a_failure_with_captured_body() {
        let (endpoint, _request_rx) = serve_once("500 Internal Server Error", "boom").await;
        let transport = WebhookTransport::new(None);
        let result = transport.deliver(&request_to(Some(&endpoint))).await;
        assert!(!result.success);
        assert_eq!(result.http_status_code, Some(500));
        assert_eq!(result.response_body.as_deref(), Some("boom"));
        assert!(result.error_message.unwrap().contains("500"));
    }

    #[tokio::test]
    async fn configured_key_adds_a_verifiable_signature_header() {
        let (endpoint, request_rx) = serve_once("200 OK", "ok").await;
        let key: Box<[u8]> = b"subscription-shared-secret".to_vec().into_boxed_slice();
        let transport = WebhookTransport::new(Some(key));
        let result = transport.deliver(&request_to(Some(&endpoint))).await;
        assert!(result.success);

        // Header names arrive lowercased on the wire.
        let raw = request_rx.await.unwrap();
        let header_value = raw
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case(signature::SIGNATURE_HEADER)
                    .then(|| value.trim().to_owned())
            })
            .expect("signature header missing");
        let body = raw
            .split_once("\r\n\r\n")
            .map(|(_, body)| body)
            .unwrap_or_default();
        assert!(
            signature::verify_body(body, &header_value, b"subscription-shared-secret").is_ok()
        );
    }
}
