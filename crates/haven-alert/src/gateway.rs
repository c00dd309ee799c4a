//! SMS notification gateway.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{AlertError, AlertResult};

/// Something that can deliver a short message to a phone number.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, phone: &str, message: &str) -> AlertResult<()>;
}

/// Textbelt REST API client.
pub struct TextbeltClient {
    http: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TextbeltResponse {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

impl TextbeltClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: "https://textbelt.com".to_string(),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> AlertResult<Self> {
        let api_key = std::env::var("TEXTBELT_API_KEY")
            .map_err(|_| AlertError::config_error("TEXTBELT_API_KEY not set"))?;

        let mut client = Self::new(api_key);
        if let Ok(url) = std::env::var("TEXTBELT_URL") {
            client.base_url = url;
        }
        Ok(client)
    }

    /// Point the client at a different endpoint (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Notifier for TextbeltClient {
    async fn send(&self, phone: &str, message: &str) -> AlertResult<()> {
        let url = format!("{}/text", self.base_url);
        debug!("Sending SMS to {}", phone);

        let response = self
            .http
            .post(&url)
            .form(&[
                ("phone", phone),
                ("message", message),
                ("key", &self.api_key),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AlertError::gateway_rejected(format!(
                "gateway returned {}: {}",
                status, body
            )));
        }

        let result: TextbeltResponse = response.json().await?;
        if !result.success {
            return Err(AlertError::gateway_rejected(
                result.error.unwrap_or_else(|| "unknown gateway error".to_string()),
            ));
        }

        info!("SMS sent to {}", phone);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_send_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/text"))
            .and(body_string_contains("phone=%2B15550001111"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
            })))
            .mount(&server)
            .await;

        let client = TextbeltClient::new("test-key").with_base_url(server.uri());
        client.send("+15550001111", "hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_send_gateway_rejection() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/text"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "error": "Out of quota",
            })))
            .mount(&server)
            .await;

        let client = TextbeltClient::new("test-key").with_base_url(server.uri());
        let err = client.send("+15550001111", "hello").await.unwrap_err();
        assert!(matches!(err, AlertError::GatewayRejected(msg) if msg.contains("quota")));
    }

    #[tokio::test]
    async fn test_send_http_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/text"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = TextbeltClient::new("test-key").with_base_url(server.uri());
        assert!(client.send("+15550001111", "hello").await.is_err());
    }
}
