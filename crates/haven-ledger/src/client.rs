//! Firestore REST API client.
//!
//! Production-grade client with:
//! - Token caching with refresh margin
//! - HTTP client tuning (pooling, timeouts)
//! - Exponential backoff with jitter
//! - Observability (tracing spans, metrics)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, StatusCode};

use crate::error::{LedgerError, LedgerResult};
use crate::metrics::record_request;
use crate::retry::{with_retry, RetryConfig};
use crate::token_cache::TokenCache;
use crate::types::{Document, ListDocumentsResponse, RunQueryRequest, RunQueryResult, Value};

/// Ledger client configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration
    pub retry: RetryConfig,
}

impl LedgerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> LedgerResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .map_err(|_| {
                LedgerError::auth_error(
                    "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set to access the ledger",
                )
            })?;

        if project_id.is_empty() {
            return Err(LedgerError::auth_error(
                "GCP_PROJECT_ID or FIREBASE_PROJECT_ID cannot be empty",
            ));
        }

        let connect_timeout_secs: u64 = std::env::var("LEDGER_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            project_id,
            database_id: std::env::var("LEDGER_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
        })
    }
}

/// Firestore REST API client.
pub struct FirestoreClient {
    http: Client,
    config: LedgerConfig,
    base_url: String,
    token_cache: Arc<TokenCache>,
}

impl Clone for FirestoreClient {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            config: self.config.clone(),
            base_url: self.base_url.clone(),
            token_cache: Arc::clone(&self.token_cache),
        }
    }
}

impl FirestoreClient {
    /// Create a new client.
    pub async fn new(config: LedgerConfig) -> LedgerResult<Self> {
        let auth = Self::create_auth_provider()?;

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("haven-ledger/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(LedgerError::Network)?;

        let base_url = format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/{}/documents",
            config.project_id, config.database_id
        );

        Ok(Self {
            http,
            config,
            base_url,
            token_cache: Arc::new(TokenCache::new(auth)),
        })
    }

    fn create_auth_provider() -> LedgerResult<Arc<dyn TokenProvider>> {
        let service_account = CustomServiceAccount::from_env().map_err(|e| {
            LedgerError::auth_error(format!("Failed to load service account: {}", e))
        })?;

        match service_account {
            Some(sa) => Ok(Arc::new(sa)),
            None => Err(LedgerError::auth_error(
                "GOOGLE_APPLICATION_CREDENTIALS not set. \
                 Set it to the path of your service account JSON file.",
            )),
        }
    }

    /// Create from environment variables.
    pub async fn from_env() -> LedgerResult<Self> {
        let config = LedgerConfig::from_env()?;
        Self::new(config).await
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    /// Build document path.
    fn document_path(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, doc_id)
    }

    /// Send an authenticated request, refreshing the token once on an
    /// expired-token 401.
    async fn send_authed<B>(&self, build: B) -> LedgerResult<reqwest::Response>
    where
        B: Fn(&Client, &str) -> reqwest::RequestBuilder,
    {
        let token = self.token_cache.get_token().await?;
        let response = build(&self.http, &token).send().await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if !Self::is_access_token_expired(&body) {
            return Err(LedgerError::from_http_status(401, body));
        }

        self.token_cache.invalidate().await;
        let token = self.token_cache.get_token().await?;
        Ok(build(&self.http, &token).send().await?)
    }

    /// Map a non-success response to an error, consuming the body.
    async fn error_from(url: &str, response: reqwest::Response) -> LedgerError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        LedgerError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
    }

    // =========================================================================
    // CRUD Operations
    // =========================================================================

    /// Get a document. Returns `None` when it does not exist.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> LedgerResult<Option<Document>> {
        let url = self.document_path(collection, doc_id);
        let op = "get_document";

        with_retry(&self.config.retry, op, || async {
            let started = Instant::now();
            let response = self
                .send_authed(|http, token| http.get(&url).bearer_auth(token))
                .await?;
            let status = response.status();
            record_request(op, status.as_u16(), started.elapsed().as_millis() as f64);

            match status {
                StatusCode::OK => Ok(Some(response.json().await?)),
                StatusCode::NOT_FOUND => Ok(None),
                _ => Err(Self::error_from(&url, response).await),
            }
        })
        .await
    }

    /// Create a document with a caller-assigned id.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> LedgerResult<Document> {
        let url = format!("{}/{}?documentId={}", self.base_url, collection, doc_id);
        let body = Document::new(fields);
        let op = "create_document";

        with_retry(&self.config.retry, op, || async {
            let started = Instant::now();
            let response = self
                .send_authed(|http, token| http.post(&url).bearer_auth(token).json(&body))
                .await?;
            let status = response.status();
            record_request(op, status.as_u16(), started.elapsed().as_millis() as f64);

            match status {
                StatusCode::OK | StatusCode::CREATED => Ok(response.json().await?),
                StatusCode::CONFLICT => Err(LedgerError::AlreadyExists(format!(
                    "{}/{}",
                    collection, doc_id
                ))),
                _ => Err(Self::error_from(&url, response).await),
            }
        })
        .await
    }

    /// Patch a document, merging the masked fields.
    pub async fn patch_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: Option<Vec<String>>,
    ) -> LedgerResult<Document> {
        let mut url = self.document_path(collection, doc_id);
        if let Some(mask) = update_mask {
            let params: Vec<String> = mask
                .iter()
                .map(|f| format!("updateMask.fieldPaths={}", f))
                .collect();
            url = format!("{}?{}", url, params.join("&"));
        }

        let body = Document::new(fields);
        let op = "patch_document";

        with_retry(&self.config.retry, op, || async {
            let started = Instant::now();
            let response = self
                .send_authed(|http, token| http.patch(&url).bearer_auth(token).json(&body))
                .await?;
            let status = response.status();
            record_request(op, status.as_u16(), started.elapsed().as_millis() as f64);

            match status {
                StatusCode::OK => Ok(response.json().await?),
                StatusCode::NOT_FOUND => Err(LedgerError::not_found(format!(
                    "{}/{}",
                    collection, doc_id
                ))),
                _ => Err(Self::error_from(&url, response).await),
            }
        })
        .await
    }

    /// Run a structured query and collect the matching documents.
    pub async fn run_query(&self, request: &RunQueryRequest) -> LedgerResult<Vec<Document>> {
        let url = format!("{}:runQuery", self.base_url);
        let op = "run_query";

        with_retry(&self.config.retry, op, || async {
            let started = Instant::now();
            let response = self
                .send_authed(|http, token| http.post(&url).bearer_auth(token).json(request))
                .await?;
            let status = response.status();
            record_request(op, status.as_u16(), started.elapsed().as_millis() as f64);

            if status != StatusCode::OK {
                return Err(Self::error_from(&url, response).await);
            }

            let results: Vec<RunQueryResult> = response.json().await?;
            Ok(results.into_iter().filter_map(|r| r.document).collect())
        })
        .await
    }

    /// List every document in a collection, following page tokens.
    pub async fn list_documents(&self, collection: &str) -> LedgerResult<Vec<Document>> {
        let op = "list_documents";
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let url = match &page_token {
                Some(token) => format!(
                    "{}/{}?pageSize=300&pageToken={}",
                    self.base_url, collection, token
                ),
                None => format!("{}/{}?pageSize=300", self.base_url, collection),
            };

            let page: ListDocumentsResponse = with_retry(&self.config.retry, op, || async {
                let started = Instant::now();
                let response = self
                    .send_authed(|http, token| http.get(&url).bearer_auth(token))
                    .await?;
                let status = response.status();
                record_request(op, status.as_u16(), started.elapsed().as_millis() as f64);

                if status != StatusCode::OK {
                    return Err(Self::error_from(&url, response).await);
                }

                Ok(response.json().await?)
            })
            .await?;

            documents.extend(page.documents.unwrap_or_default());

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_token_expiry_detection() {
        assert!(FirestoreClient::is_access_token_expired(
            "error: ACCESS_TOKEN_EXPIRED"
        ));
        assert!(FirestoreClient::is_access_token_expired(
            r#"{"status": "UNAUTHENTICATED"}"#
        ));
        assert!(!FirestoreClient::is_access_token_expired("forbidden"));
    }

    #[test]
    #[serial]
    fn test_config_requires_project_id() {
        std::env::remove_var("GCP_PROJECT_ID");
        std::env::remove_var("FIREBASE_PROJECT_ID");
        assert!(LedgerConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_config_rejects_empty_project_id() {
        std::env::set_var("GCP_PROJECT_ID", "");
        std::env::remove_var("FIREBASE_PROJECT_ID");
        assert!(LedgerConfig::from_env().is_err());
        std::env::remove_var("GCP_PROJECT_ID");
    }

    #[test]
    #[serial]
    fn test_config_accepts_firebase_project_id() {
        std::env::remove_var("GCP_PROJECT_ID");
        std::env::set_var("FIREBASE_PROJECT_ID", "firebase-project");
        let config = LedgerConfig::from_env().unwrap();
        assert_eq!(config.project_id, "firebase-project");
        std::env::remove_var("FIREBASE_PROJECT_ID");
    }

    #[test]
    #[serial]
    fn test_config_parses_timeout_env() {
        std::env::set_var("GCP_PROJECT_ID", "test");
        std::env::set_var("LEDGER_CONNECT_TIMEOUT_SECS", "15");
        let config = LedgerConfig::from_env().unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        std::env::remove_var("GCP_PROJECT_ID");
        std::env::remove_var("LEDGER_CONNECT_TIMEOUT_SECS");
    }

    #[test]
    #[serial]
    fn test_config_handles_invalid_env_values() {
        std::env::set_var("GCP_PROJECT_ID", "test");
        std::env::set_var("LEDGER_CONNECT_TIMEOUT_SECS", "not-a-number");
        let config = LedgerConfig::from_env().unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        std::env::remove_var("GCP_PROJECT_ID");
        std::env::remove_var("LEDGER_CONNECT_TIMEOUT_SECS");
    }
}
