use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::models::{AccrualOutcome, AccrualResponse};
use crate::error::{AppError, AppResult};

/// Accrual client trait - one outbound query per call, never retries
///
/// Retry and backoff belong to the settlement worker so the scheduler can
/// see and govern them.
#[async_trait]
pub trait AccrualClient: Send + Sync {
    async fn query(&self, order_number: &str) -> AccrualOutcome;
}

/// HTTP client for the external accrual calculation service
pub struct HttpAccrualClient {
    client: Client,
    base_url: String,
    /// Wait applied when a 429 carries no usable Retry-After header
    fallback_retry_after: Duration,
    /// Upper bound on any advertised Retry-After
    max_retry_after: Duration,
}

impl HttpAccrualClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        fallback_retry_after: Duration,
        max_retry_after: Duration,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            fallback_retry_after,
            max_retry_after,
        })
    }

    fn order_url(&self, order_number: &str) -> String {
        format!("{}/api/orders/{}", self.base_url, order_number)
    }

    /// Parse a Retry-After value given in whole seconds.
    fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
        value
            .map(str::trim)
            .and_then(|secs| secs.parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

#[async_trait]
impl AccrualClient for HttpAccrualClient {
    #[instrument(skip(self), fields(order = %order_number))]
    async fn query(&self, order_number: &str) -> AccrualOutcome {
        let response = match self.client.get(self.order_url(order_number)).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Accrual service unreachable: {}", e);
                return AccrualOutcome::Transient(format!("request failed: {}", e));
            }
        };

        match response.status() {
            StatusCode::OK => match response.json::<AccrualResponse>().await {
                Ok(body) => {
                    debug!("Accrual service reported {:?}", body.status);
                    body.into_outcome()
                }
                Err(e) => {
                    warn!("Unreadable accrual response: {}", e);
                    AccrualOutcome::Transient(format!("invalid response body: {}", e))
                }
            },
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => AccrualOutcome::NotFound,
            StatusCode::TOO_MANY_REQUESTS => {
                let header = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|value| value.to_str().ok());
                let retry_after = Self::parse_retry_after(header)
                    .unwrap_or(self.fallback_retry_after)
                    .min(self.max_retry_after);

                warn!("Accrual service rate limited, retry after {:?}", retry_after);
                AccrualOutcome::RateLimited { retry_after }
            }
            status => {
                warn!("Accrual service answered {}", status);
                AccrualOutcome::Transient(format!("unexpected status {}", status))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::models::OrderStatus;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const ORDER: &str = "9278923470";

    fn client_for(server: &MockServer) -> HttpAccrualClient {
        HttpAccrualClient::new(
            &server.uri(),
            Duration::from_secs(5),
            Duration::from_secs(60),
            Duration::from_secs(600),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_processed_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/api/orders/{}", ORDER)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "order": ORDER,
                "status": "PROCESSED",
                "accrual": 500
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client_for(&server).query(ORDER).await;
        assert_eq!(
            outcome,
            AccrualOutcome::Settled {
                status: OrderStatus::Processed,
                accrual: dec!(500),
            }
        );
    }

    #[tokio::test]
    async fn test_registered_order_is_pending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/api/orders/{}", ORDER)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "order": ORDER,
                "status": "REGISTERED"
            })))
            .mount(&server)
            .await;

        assert_eq!(client_for(&server).query(ORDER).await, AccrualOutcome::Pending);
    }

    #[tokio::test]
    async fn test_rate_limited_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "2")
                    .set_body_string("No more than N requests per minute allowed"),
            )
            .mount(&server)
            .await;

        assert_eq!(
            client_for(&server).query(ORDER).await,
            AccrualOutcome::RateLimited {
                retry_after: Duration::from_secs(2)
            }
        );
    }

    #[tokio::test]
    async fn test_rate_limited_without_header_uses_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        assert_eq!(
            client_for(&server).query(ORDER).await,
            AccrualOutcome::RateLimited {
                retry_after: Duration::from_secs(60)
            }
        );
    }

    #[tokio::test]
    async fn test_huge_retry_after_is_capped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "999999999"))
            .mount(&server)
            .await;

        assert_eq!(
            client_for(&server).query(ORDER).await,
            AccrualOutcome::RateLimited {
                retry_after: Duration::from_secs(600)
            }
        );
    }

    #[tokio::test]
    async fn test_negative_accrual_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/api/orders/{}", ORDER)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "order": ORDER,
                "status": "PROCESSED",
                "accrual": -50
            })))
            .mount(&server)
            .await;

        assert!(matches!(
            client_for(&server).query(ORDER).await,
            AccrualOutcome::Transient(_)
        ));
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        assert_eq!(client_for(&server).query(ORDER).await, AccrualOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert!(matches!(
            client_for(&server).query(ORDER).await,
            AccrualOutcome::Transient(_)
        ));
    }

    #[tokio::test]
    async fn test_garbled_body_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        assert!(matches!(
            client_for(&server).query(ORDER).await,
            AccrualOutcome::Transient(_)
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        // Nothing listens on the discard port
        let client = HttpAccrualClient::new(
            "http://127.0.0.1:9",
            Duration::from_secs(2),
            Duration::from_secs(60),
            Duration::from_secs(600),
        )
        .unwrap();

        assert!(matches!(
            client.query(ORDER).await,
            AccrualOutcome::Transient(_)
        ));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(
            HttpAccrualClient::parse_retry_after(Some("60")),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            HttpAccrualClient::parse_retry_after(Some(" 2 ")),
            Some(Duration::from_secs(2))
        );
        assert_eq!(HttpAccrualClient::parse_retry_after(Some("soon")), None);
        assert_eq!(HttpAccrualClient::parse_retry_after(None), None);
    }
}
